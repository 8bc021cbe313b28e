//! Two-level locking for provider mapping.
//!
//! - **Project rules** ([`RuleManager`]): one exclusive rule per project name.
//!   Structural changes to a project (map, unmap, creating links) hold it.
//!   Different projects never contend.
//! - **Mapping lock** ([`MappingLock`]): a single reentrant lock guarding the
//!   persistent marker and session cache of every project. Provider hooks run
//!   while it is held and may look up other projects, which takes it again.
//!
//! The order is always rule first, mapping lock second. [`ScopedLocks`] is the
//! only way to hold both, and [`RuleManager::begin_rule`] refuses to run on a
//! thread that already holds a mapping lock, so an inversion surfaces as
//! [`TeamError::LockOrder`] instead of a deadlock.

use crate::cancel::CancellationToken;
use crate::config::MappingConfig;
use crate::error::{Result, TeamError};
use crate::workspace::Project;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::debug;

thread_local! {
    // Mapping lock acquisitions (any instance) outstanding on this thread.
    static MAPPING_LOCK_DEPTH: Cell<usize> = const { Cell::new(0) };
    static HELD_RULES: RefCell<HashSet<String>> = RefCell::new(HashSet::new());
}

/// How long and how patiently to wait for a project rule.
#[derive(Debug, Clone, Default)]
pub struct RuleWait {
    pub cancel: Option<CancellationToken>,
    pub timeout: Option<Duration>,
}

impl RuleWait {
    pub fn new(cancel: Option<&CancellationToken>, timeout: Option<Duration>) -> Self {
        Self {
            cancel: cancel.cloned(),
            timeout,
        }
    }
}

/// Per-project exclusive scheduling rules.
#[derive(Debug, Default)]
pub struct RuleManager {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl RuleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the rule for `project` is free, then take it.
    ///
    /// Fails with [`TeamError::Interrupted`] when the wait's token is
    /// cancelled, [`TeamError::Timeout`] when its timeout elapses, and
    /// [`TeamError::LockOrder`] when called while holding the mapping lock or
    /// the same rule.
    pub fn begin_rule(&self, project: &Project, wait: &RuleWait) -> Result<RuleGuard<'_>> {
        if MappingLock::any_held_by_current_thread() {
            return Err(TeamError::LockOrder {
                detail: "project rule requested while holding the mapping lock",
            });
        }
        let name = project.name().to_string();
        if HELD_RULES.with(|rules| rules.borrow().contains(&name)) {
            return Err(TeamError::LockOrder {
                detail: "project rule is already held by this thread",
            });
        }

        let started = Instant::now();
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while held.contains(&name) {
            if let Some(token) = &wait.cancel {
                token.check()?;
            }
            let mut slice = MappingConfig::RULE_POLL_INTERVAL;
            if let Some(timeout) = wait.timeout {
                let elapsed = started.elapsed();
                if elapsed >= timeout {
                    return Err(TeamError::Timeout(timeout));
                }
                slice = slice.min(timeout - elapsed);
            }
            held = self
                .released
                .wait_timeout(held, slice)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        held.insert(name.clone());
        drop(held);

        HELD_RULES.with(|rules| rules.borrow_mut().insert(name.clone()));
        debug!("Acquired rule for project {}", name);
        Ok(RuleGuard {
            manager: self,
            project: name,
        })
    }

    /// Whether any thread currently holds the rule for `project`.
    pub fn is_held(&self, project: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(project)
    }
}

/// Releases the project rule on drop.
#[derive(Debug)]
pub struct RuleGuard<'a> {
    manager: &'a RuleManager,
    project: String,
}

impl RuleGuard<'_> {
    pub fn project(&self) -> &str {
        &self.project
    }
}

impl Drop for RuleGuard<'_> {
    fn drop(&mut self) {
        HELD_RULES.with(|rules| rules.borrow_mut().remove(&self.project));
        let mut held = self
            .manager
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.project);
        drop(held);
        self.manager.released.notify_all();
        debug!("Released rule for project {}", self.project);
    }
}

#[derive(Debug, Default)]
struct Ownership {
    owner: Option<ThreadId>,
    depth: usize,
}

/// The global mapping lock.
///
/// Reentrant: the owning thread may take it again, and it is released when
/// the outermost [`MappingGuard`] drops.
#[derive(Debug, Default)]
pub struct MappingLock {
    state: Mutex<Ownership>,
    released: Condvar,
}

impl MappingLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the mapping lock, blocking while another thread owns it.
    pub fn lock(&self) -> MappingGuard<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while state.owner.is_some_and(|owner| owner != me) {
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.owner = Some(me);
        state.depth += 1;
        drop(state);

        MAPPING_LOCK_DEPTH.with(|depth| depth.set(depth.get() + 1));
        MappingGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Whether the calling thread owns this lock.
    pub fn is_held_by_current_thread(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .owner
            == Some(thread::current().id())
    }

    /// Whether the calling thread owns any mapping lock.
    pub fn any_held_by_current_thread() -> bool {
        MAPPING_LOCK_DEPTH.with(Cell::get) > 0
    }
}

/// Proof that the mapping lock is held.
///
/// Everything that writes a persistent marker or a session cache entry takes
/// a `&MappingGuard`. Must be dropped on the thread that took it.
#[derive(Debug)]
pub struct MappingGuard<'a> {
    lock: &'a MappingLock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for MappingGuard<'_> {
    fn drop(&mut self) {
        MAPPING_LOCK_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
        let mut state = self
            .lock
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.lock.released.notify_one();
        }
    }
}

/// Project rule plus mapping lock, taken in order and released in reverse.
#[derive(Debug)]
pub struct ScopedLocks<'a> {
    // Field order is drop order: mapping lock first, then the rule.
    mapping: MappingGuard<'a>,
    rule: RuleGuard<'a>,
}

impl<'a> ScopedLocks<'a> {
    pub fn acquire(
        rules: &'a RuleManager,
        lock: &'a MappingLock,
        project: &Project,
        wait: &RuleWait,
    ) -> Result<Self> {
        let rule = rules.begin_rule(project, wait)?;
        let mapping = lock.lock();
        Ok(Self { mapping, rule })
    }

    pub fn mapping(&self) -> &MappingGuard<'a> {
        &self.mapping
    }

    pub fn project(&self) -> &str {
        self.rule.project()
    }
}
