//! Centralized configuration for provider mapping.
//!
//! Constants live on unit structs; runtime switches live on [`MappingOptions`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Keys and timing used by the mapping protocol.
pub struct MappingConfig;

impl MappingConfig {
    /// Qualified property name holding the provider id (persistent) and the
    /// resolved provider (session).
    pub const PROVIDER_PROP_KEY: &'static str = "team.core:repository";
    /// Nature set id that marks a nature as a legacy repository provider.
    pub const TEAM_SET_ID: &'static str = "team.repository-provider";
    /// How often a blocked rule wait re-checks its cancellation token.
    pub const RULE_POLL_INTERVAL: Duration = Duration::from_millis(50);
    /// Default bound on waiting for a project rule. `None` waits indefinitely.
    pub const RULE_WAIT_TIMEOUT: Option<Duration> = None;
}

/// SQLite property store settings.
pub struct RegistryConfig;

impl RegistryConfig {
    pub const BUSY_TIMEOUT_MS: u32 = 5000;
    pub const DB_FILENAME: &'static str = "properties.db";
    pub const CONFIG_DIR_NAME: &'static str = "team";
}

/// Runtime options for [`crate::ProviderMapping`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingOptions {
    /// Fall back to nature-based discovery when no persistent marker exists.
    pub legacy_nature_lookup: bool,
    /// Upper bound on waiting for a project rule. `None` waits indefinitely.
    #[serde(with = "optional_millis")]
    pub rule_wait_timeout: Option<Duration>,
}

impl Default for MappingOptions {
    fn default() -> Self {
        Self {
            legacy_nature_lookup: true,
            rule_wait_timeout: MappingConfig::RULE_WAIT_TIMEOUT,
        }
    }
}

mod optional_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = MappingOptions::default();
        assert!(options.legacy_nature_lookup);
        assert!(options.rule_wait_timeout.is_none());
    }

    #[test]
    fn test_options_from_partial_json() {
        let options: MappingOptions =
            serde_json::from_str(r#"{"rule_wait_timeout": 250}"#).unwrap();
        assert!(options.legacy_nature_lookup);
        assert_eq!(options.rule_wait_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_poll_interval_is_reasonable() {
        assert!(MappingConfig::RULE_POLL_INTERVAL > Duration::ZERO);
        assert!(MappingConfig::RULE_POLL_INTERVAL < Duration::from_secs(1));
    }
}
