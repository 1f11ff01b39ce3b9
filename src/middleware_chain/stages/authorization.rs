//! Priority 20: calls C2's `check_permission` against the resolved identity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::middleware_chain::error::MiddlewareError;
use crate::middleware_chain::stage::SecurityMiddleware;
use crate::middleware_chain::types::{RequestContext, SecurityMiddlewareResult};
use crate::permissions::{AccessRequest, PermissionEngine};

pub const NAME: &str = "authorization";
pub const PRIORITY: u32 = 20;

pub struct AuthorizationMiddleware {
    engine: Arc<PermissionEngine>,
    enabled: AtomicBool,
}

impl AuthorizationMiddleware {
    pub fn new(engine: Arc<PermissionEngine>) -> Self {
        Self {
            engine,
            enabled: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl SecurityMiddleware for AuthorizationMiddleware {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> u32 {
        PRIORITY
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    async fn process(&self, ctx: &mut RequestContext) -> Result<SecurityMiddlewareResult, MiddlewareError> {
        let Some(security_context) = &ctx.security_context else {
            return Ok(SecurityMiddlewareResult::deny(NAME, "no security context available"));
        };

        let mut request = AccessRequest::new(security_context.user_id.clone(), ctx.resource.clone(), ctx.action.clone());
        if let Some(session_id) = &ctx.session_id {
            request = request.with_session(session_id.clone());
        }
        if let Some(ip) = &ctx.ip_address {
            request = request.with_ip(ip.clone());
        }

        let result = self.engine.check_permission(&request).await;
        if !result.granted() {
            return Ok(SecurityMiddlewareResult::deny(
                NAME,
                format!("permission denied for {} on {}", ctx.action, ctx.resource),
            )
            .with_detail("required_permission", format!("{}:{}", ctx.resource, ctx.action))
            .with_detail("reason", result.reason));
        }

        Ok(SecurityMiddlewareResult::allow(NAME, "authorization successful"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::context::SecurityContext;
    use crate::permissions::PermissionEngineConfig;

    fn ctx_with_identity(user_id: &str) -> RequestContext {
        let mut ctx = RequestContext::new("adapters/demo", "execute");
        ctx.security_context = Some(SecurityContext::new(user_id, "127.0.0.1"));
        ctx.user_id = Some(user_id.to_string());
        ctx
    }

    #[tokio::test]
    async fn no_security_context_is_denied() {
        let engine = Arc::new(PermissionEngine::new(PermissionEngineConfig::default(), None));
        let mw = AuthorizationMiddleware::new(engine);
        let mut ctx = RequestContext::new("adapters/demo", "execute");
        let result = mw.process(&mut ctx).await.unwrap();
        assert!(result.action.is_blocked());
    }

    #[tokio::test]
    async fn unknown_user_defaults_to_deny() {
        let engine = Arc::new(PermissionEngine::new(PermissionEngineConfig::default(), None));
        let mw = AuthorizationMiddleware::new(engine);
        let mut ctx = ctx_with_identity("nobody");
        let result = mw.process(&mut ctx).await.unwrap();
        assert!(result.action.is_blocked());
    }

    #[tokio::test]
    async fn admin_role_is_authorized() {
        let engine = Arc::new(PermissionEngine::new(PermissionEngineConfig::default(), None));
        engine.assign_role("root", "admin").unwrap();
        let mw = AuthorizationMiddleware::new(engine);
        let mut ctx = ctx_with_identity("root");
        let result = mw.process(&mut ctx).await.unwrap();
        assert!(!result.action.is_blocked());
    }
}
