//! Top-level configuration for [`crate::manager::SecurityManager`], composing
//! each component's own config type. Mirrors the teacher's `OSLConfig`/
//! `OSLConfigBuilder` shape: one aggregate struct, `Debug + Clone + Default`,
//! built through a small builder that validates before handing off.

use crate::audit::AuditConfig;
use crate::context::ContextManagerConfig;
use crate::error::{SecurityCoreError, SecurityCoreResult};
use crate::permissions::PermissionEngineConfig;
use crate::sandbox::SandboxConfiguration;
use crate::threat::BehaviorConfig;
use crate::validation::SecurityValidatorConfig;

/// Where audit events are persisted.
#[derive(Debug, Clone)]
pub enum AuditSink {
    /// Events are kept only in the in-process ring used by tests and
    /// short-lived tools; nothing survives process exit.
    Memory,
    /// Events are appended as newline-delimited JSON under `log_dir`, with
    /// date-stamped rotation.
    File { log_dir: std::path::PathBuf },
}

impl Default for AuditSink {
    fn default() -> Self {
        Self::Memory
    }
}

/// Aggregate configuration for every component a [`crate::manager::SecurityManager`]
/// constructs. Each field derives `Default`, so `SecurityServiceConfig::default()`
/// produces a usable, permissive-for-development configuration.
#[derive(Debug, Clone, Default)]
pub struct SecurityServiceConfig {
    pub audit: AuditConfig,
    pub audit_sink: AuditSink,
    pub context: ContextManagerConfig,
    pub permissions: PermissionEngineConfig,
    pub validation: SecurityValidatorConfig,
    pub behavior: BehaviorConfig,
    pub sandbox: SandboxConfiguration,
}

/// Builder for [`SecurityServiceConfig`], following the teacher's
/// `OSLConfigBuilder` fluent-setter-then-`build()` shape.
#[derive(Debug, Default)]
pub struct SecurityServiceConfigBuilder {
    config: SecurityServiceConfig,
}

impl SecurityServiceConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_audit(mut self, audit: AuditConfig) -> Self {
        self.config.audit = audit;
        self
    }

    pub fn with_audit_sink(mut self, sink: AuditSink) -> Self {
        self.config.audit_sink = sink;
        self
    }

    pub fn with_context(mut self, context: ContextManagerConfig) -> Self {
        self.config.context = context;
        self
    }

    pub fn with_permissions(mut self, permissions: PermissionEngineConfig) -> Self {
        self.config.permissions = permissions;
        self
    }

    pub fn with_validation(mut self, validation: SecurityValidatorConfig) -> Self {
        self.config.validation = validation;
        self
    }

    pub fn with_behavior(mut self, behavior: BehaviorConfig) -> Self {
        self.config.behavior = behavior;
        self
    }

    pub fn with_sandbox(mut self, sandbox: SandboxConfiguration) -> Self {
        self.config.sandbox = sandbox;
        self
    }

    pub fn build(self) -> SecurityCoreResult<SecurityServiceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl SecurityServiceConfig {
    pub fn builder() -> SecurityServiceConfigBuilder {
        SecurityServiceConfigBuilder::new()
    }

    fn validate(&self) -> SecurityCoreResult<()> {
        if self.context.max_sessions_per_user == 0 {
            return Err(SecurityCoreError::internal(
                "max_sessions_per_user must be at least 1",
            ));
        }
        if self.audit.queue_capacity == 0 {
            return Err(SecurityCoreError::internal("audit queue_capacity must be at least 1"));
        }
        if let AuditSink::File { log_dir } = &self.audit_sink {
            if log_dir.as_os_str().is_empty() {
                return Err(SecurityCoreError::internal("audit log_dir must not be empty"));
            }
        }
        Ok(())
    }
}
