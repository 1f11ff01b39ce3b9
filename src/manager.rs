//! `SecurityManager`: the composition root tying C1-C7 together behind one
//! construction point, mirroring the teacher's `OSLFramework`/
//! `OSLFrameworkBuilder` pattern. Holds `Arc`-shared handles to every
//! component, exposes a `start()`/`shutdown()` lifecycle, and forwards the
//! common request shapes (`check_permission`, `create_context`,
//! `validate_request`, `execute_code`) through the middleware chain.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::audit::{AuditConfig, AuditLogger, AuditStorage, FileAuditStorage, MemoryAuditStorage, RotationPolicy};
use crate::config::{AuditSink, SecurityServiceConfig, SecurityServiceConfigBuilder};
use crate::context::{ContextManager, SecurityContext, SecurityLevel};
use crate::error::{SecurityCoreError, SecurityCoreResult};
use crate::middleware_chain::stages::{
    AuthenticationMiddleware, AuthorizationMiddleware, IpFilterMiddleware, RateLimitMiddleware,
    ThreatDetectionMiddleware,
};
use crate::middleware_chain::{MiddlewareChain, RequestContext, SecurityMiddlewareResult};
use crate::permissions::{AccessRequest, AccessResult, PermissionEngine};
use crate::sandbox::{ExecutionEnvironment, ExecutionResult, SandboxEngine};
use crate::threat::ThreatDetector;
use crate::validation::{SecurityValidator, ValidationContext, ValidationOutcome};

/// Verifies a user's credentials against an external identity backend.
///
/// Credential storage and verification are explicitly out of scope for this
/// core (see `SPEC_FULL.md` §1 Non-goals): a host application implements this
/// trait over whatever backend it already has and hands it to
/// [`SecurityManagerBuilder::with_credential_verifier`]. `authenticate_user`
/// only orchestrates "verify via this trait, then call `C1::create_context`
/// on success".
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, user_id: &str, credentials: &str) -> bool;
}

/// The composition root. Cheap to clone (everything inside is an `Arc`), so
/// it is conventionally held behind one `Arc<SecurityManager>` per process
/// or test.
pub struct SecurityManager {
    audit: Arc<AuditLogger>,
    context: Arc<ContextManager>,
    permissions: Arc<PermissionEngine>,
    validator: Arc<SecurityValidator>,
    threats: Arc<ThreatDetector>,
    sandbox: Arc<SandboxEngine>,
    chain: Arc<MiddlewareChain>,
    credential_verifier: Option<Arc<dyn CredentialVerifier>>,
}

impl SecurityManager {
    pub fn builder() -> SecurityManagerBuilder {
        SecurityManagerBuilder::new()
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    pub fn context_manager(&self) -> &Arc<ContextManager> {
        &self.context
    }

    pub fn permission_engine(&self) -> &Arc<PermissionEngine> {
        &self.permissions
    }

    pub fn validator(&self) -> &Arc<SecurityValidator> {
        &self.validator
    }

    pub fn threat_detector(&self) -> &Arc<ThreatDetector> {
        &self.threats
    }

    pub fn sandbox(&self) -> &Arc<SandboxEngine> {
        &self.sandbox
    }

    pub fn middleware_chain(&self) -> &Arc<MiddlewareChain> {
        &self.chain
    }

    /// Starts background tasks: the audit drain consumer and the context
    /// manager's expired-session sweep.
    pub async fn start(&self) {
        self.audit.start().await;
        self.context.start();
    }

    /// Stops background tasks and flushes the audit queue, awaiting both up
    /// to their own bounded deadlines.
    pub async fn shutdown(&self) -> SecurityCoreResult<()> {
        self.context.shutdown().await;
        self.audit.stop().await?;
        Ok(())
    }

    /// Verifies credentials via the registered [`CredentialVerifier`] and, on
    /// success, opens a session through C1. Returns `AccessDenied` if no
    /// verifier was registered or verification failed.
    pub async fn authenticate_user(
        &self,
        user_id: &str,
        credentials: &str,
        ip_address: &str,
    ) -> SecurityCoreResult<SecurityContext> {
        let Some(verifier) = &self.credential_verifier else {
            return Err(SecurityCoreError::access_denied("no credential verifier configured"));
        };
        if !verifier.verify(user_id, credentials).await {
            return Err(SecurityCoreError::access_denied("credential verification failed"));
        }
        self.context
            .create_context(
                user_id,
                HashSet::new(),
                SecurityLevel::Public,
                ip_address,
                None,
                None,
                HashMap::new(),
            )
            .await
            .map_err(SecurityCoreError::from)
    }

    /// Terminates every session belonging to `user_id` and bars new ones
    /// until [`ContextManager::unsuspend_user`] is called.
    pub async fn suspend_user(&self, user_id: &str, reason: &str) {
        self.context.suspend_user(user_id, reason).await;
    }

    /// Convenience pass-through to [`PermissionEngine::check_permission`].
    pub async fn check_permission(&self, request: &AccessRequest) -> AccessResult {
        self.permissions.check_permission(request).await
    }

    /// Convenience pass-through to [`SecurityValidator::validate_request`].
    pub async fn validate_request(
        &self,
        data: &serde_json::Value,
        context: &ValidationContext,
    ) -> ValidationOutcome {
        self.validator.validate_request(data, context).await
    }

    /// Runs a request through the full middleware chain (C1 auth, C2 authz,
    /// C4 threat scan, rate limiting, IP filtering in priority order).
    pub async fn process_request(&self, ctx: &mut RequestContext) -> SecurityMiddlewareResult {
        self.chain.process(ctx).await
    }

    /// Re-runs the static analysis gate and a sandbox-tier permission check,
    /// then executes `code` inside a fresh environment. The permission check
    /// targets the synthetic resource `sandbox/<config_name>` with action
    /// `execute`, independent of whatever authorization the caller's request
    /// already passed through the chain for a different resource.
    pub async fn execute_code(
        &self,
        user_id: &str,
        code: &str,
        config_name: &str,
    ) -> SecurityCoreResult<ExecutionResult> {
        let resource = format!("sandbox/{config_name}");
        let request = AccessRequest::new(user_id, resource.as_str(), "execute");
        let decision = self.permissions.check_permission(&request).await;
        if !decision.granted() {
            return Err(SecurityCoreError::access_denied(format!(
                "not authorized to execute code in sandbox '{config_name}': {}",
                decision.reason
            )));
        }

        let scan = self.threats.analyze_code(code, Some(user_id), None, None).await;
        if scan.is_threat && scan.risk_score >= 0.75 {
            return Err(SecurityCoreError::security_violation(format!(
                "static analysis rejected code before sandbox execution: risk_score={:.2}",
                scan.risk_score
            )));
        }

        let mut environment = self.sandbox.create_environment(config_name, None).await?;
        Ok(self.sandbox.execute_code(code, &mut environment, Some(user_id)).await)
    }

    /// Destroys a previously created sandbox environment.
    pub async fn destroy_environment(&self, environment: &ExecutionEnvironment) -> bool {
        self.sandbox.destroy_environment(&environment.sandbox_id).await
    }

    pub async fn emergency_lockdown(&self, reason: &str) {
        self.chain.emergency_lockdown(reason).await;
    }

    pub async fn lift_emergency_lockdown(&self) {
        self.chain.lift_emergency_lockdown().await;
    }
}

/// Builder for [`SecurityManager`]. Validates configuration, constructs every
/// component in dependency order (C7 first, since everything else takes an
/// optional handle to it), and registers the default middleware stage set.
pub struct SecurityManagerBuilder {
    config_builder: SecurityServiceConfigBuilder,
    credential_verifier: Option<Arc<dyn CredentialVerifier>>,
    rate_limit_per_minute: u32,
}

impl Default for SecurityManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityManagerBuilder {
    pub fn new() -> Self {
        Self {
            config_builder: SecurityServiceConfigBuilder::new(),
            credential_verifier: None,
            rate_limit_per_minute: 60,
        }
    }

    pub fn with_config(mut self, config: SecurityServiceConfig) -> Self {
        self.config_builder = SecurityServiceConfigBuilder::new()
            .with_audit(config.audit)
            .with_audit_sink(config.audit_sink)
            .with_context(config.context)
            .with_permissions(config.permissions)
            .with_validation(config.validation)
            .with_behavior(config.behavior)
            .with_sandbox(config.sandbox);
        self
    }

    pub fn with_credential_verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.credential_verifier = Some(verifier);
        self
    }

    pub fn with_rate_limit_per_minute(mut self, requests_per_minute: u32) -> Self {
        self.rate_limit_per_minute = requests_per_minute;
        self
    }

    pub async fn build(self) -> SecurityCoreResult<Arc<SecurityManager>> {
        let config = self.config_builder.build()?;

        let storage: Arc<dyn AuditStorage> = match config.audit_sink {
            AuditSink::Memory => Arc::new(MemoryAuditStorage::new()),
            AuditSink::File { log_dir } => {
                Arc::new(FileAuditStorage::new(log_dir, RotationPolicy::default())?)
            }
        };
        let audit = Arc::new(AuditLogger::new(config.audit, storage));

        let context = ContextManager::new(config.context, Some(Arc::clone(&audit)));
        let permissions = Arc::new(PermissionEngine::new(config.permissions, Some(Arc::clone(&audit))));
        let validator = Arc::new(SecurityValidator::new(config.validation, Some(Arc::clone(&audit))));
        let threats = Arc::new(ThreatDetector::new(
            config.behavior,
            Some(Arc::clone(&context)),
            Some(Arc::clone(&audit)),
        ));
        let sandbox = Arc::new(SandboxEngine::new(Some(Arc::clone(&audit))));
        sandbox.register_configuration("default", config.sandbox.clone());

        let chain = Arc::new(MiddlewareChain::new(Arc::clone(&context), Some(Arc::clone(&audit))));
        chain.add_middleware(Box::new(IpFilterMiddleware::new()));
        chain.add_middleware(Box::new(AuthenticationMiddleware::new(Arc::clone(&context))));
        chain.add_middleware(Box::new(AuthorizationMiddleware::new(Arc::clone(&permissions))));
        chain.add_middleware(Box::new(ThreatDetectionMiddleware::new(Arc::clone(&threats))));
        chain.add_middleware(Box::new(RateLimitMiddleware::new(self.rate_limit_per_minute)));

        Ok(Arc::new(SecurityManager {
            audit,
            context,
            permissions,
            validator,
            threats,
            sandbox,
            chain,
            credential_verifier: self.credential_verifier,
        }))
    }
}
