//! Provider types known to the process.
//!
//! - [`ProviderRegistry`]: immutable id → descriptor table, built once at
//!   startup from code or a JSON manifest
//! - [`RepositoryProvider`]: the plug-in contract
//! - [`MappedProvider`]: a plug-in instance bound to one project

mod descriptor;
mod provider;

pub use descriptor::{
    FactoryCatalog, ManifestEntry, ProviderDescriptor, ProviderFactory, ProviderManifest,
    ProviderRegistry, ProviderRegistryBuilder,
};
pub use provider::{MappedProvider, ProviderState, RepositoryProvider};
