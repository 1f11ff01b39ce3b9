//! Process-wide singleton accessors for ergonomics, per `SPEC_FULL.md` §9.
//!
//! These are thin wrappers around the same component types
//! [`crate::manager::SecurityManager`] constructs directly; nothing here
//! embeds global state into a component implementation. The slot is guarded
//! by a [`std::sync::OnceLock`] so first access lazily allocates the lock,
//! while `initialize`/`shutdown` let tests swap the singleton out between
//! runs instead of leaking state across the suite.

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::audit::AuditLogger;
use crate::config::SecurityServiceConfig;
use crate::context::ContextManager;
use crate::error::SecurityCoreResult;
use crate::manager::{SecurityManager, SecurityManagerBuilder};
use crate::permissions::PermissionEngine;
use crate::sandbox::SandboxEngine;
use crate::validation::SecurityValidator;

static GLOBAL: OnceLock<RwLock<Option<Arc<SecurityManager>>>> = OnceLock::new();

fn slot() -> &'static RwLock<Option<Arc<SecurityManager>>> {
    GLOBAL.get_or_init(|| RwLock::new(None))
}

/// Builds a [`SecurityManager`] from `config`, starts its background tasks,
/// and installs it as the process-wide instance. Replaces any previously
/// installed instance without shutting it down; callers that care should
/// call [`shutdown`] first.
pub async fn initialize(config: SecurityServiceConfig) -> SecurityCoreResult<Arc<SecurityManager>> {
    let manager = SecurityManagerBuilder::new().with_config(config).build().await?;
    manager.start().await;
    *slot().write() = Some(Arc::clone(&manager));
    Ok(manager)
}

/// Returns the installed instance, if any.
pub fn manager() -> Option<Arc<SecurityManager>> {
    slot().read().clone()
}

/// Shuts the installed instance down (if any) and clears the slot, so a
/// subsequent test can call [`initialize`] again without interference.
pub async fn shutdown() -> SecurityCoreResult<()> {
    let manager = slot().write().take();
    if let Some(manager) = manager {
        manager.shutdown().await?;
    }
    Ok(())
}

/// `None` before the first [`initialize`] call (or after [`shutdown`]); every
/// accessor below shares this shape rather than panicking, since calling one
/// before initialization is a caller-detectable condition, not a programmer
/// bug the core should crash over.
pub fn audit() -> Option<Arc<AuditLogger>> {
    manager().map(|m| Arc::clone(m.audit()))
}

pub fn context_manager() -> Option<Arc<ContextManager>> {
    manager().map(|m| Arc::clone(m.context_manager()))
}

pub fn permission_engine() -> Option<Arc<PermissionEngine>> {
    manager().map(|m| Arc::clone(m.permission_engine()))
}

pub fn validator() -> Option<Arc<SecurityValidator>> {
    manager().map(|m| Arc::clone(m.validator()))
}

pub fn sandbox() -> Option<Arc<SandboxEngine>> {
    manager().map(|m| Arc::clone(m.sandbox()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // Both assertions share one process-wide static, so they run as a single
    // test rather than risk interleaving with a sibling test on another thread.
    #[tokio::test]
    async fn initialize_then_shutdown_round_trip() {
        shutdown().await.unwrap();
        initialize(SecurityServiceConfig::default()).await.unwrap();
        assert!(manager().is_some());
        let _ = audit();
        let _ = context_manager();

        shutdown().await.unwrap();
        assert!(manager().is_none());
    }
}
