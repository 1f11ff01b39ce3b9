//! Priority 10: resolves the session id to a live `SecurityContext` via C1.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::context::ContextManager;
use crate::middleware_chain::error::MiddlewareError;
use crate::middleware_chain::stage::SecurityMiddleware;
use crate::middleware_chain::types::{RequestContext, SecurityMiddlewareResult};

pub const NAME: &str = "authentication";
pub const PRIORITY: u32 = 10;

pub struct AuthenticationMiddleware {
    context_manager: Arc<ContextManager>,
    enabled: AtomicBool,
}

impl AuthenticationMiddleware {
    pub fn new(context_manager: Arc<ContextManager>) -> Self {
        Self {
            context_manager,
            enabled: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl SecurityMiddleware for AuthenticationMiddleware {
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
        let Some(session_id) = &ctx.session_id else {
            return Ok(SecurityMiddlewareResult::deny(NAME, "no session id provided"));
        };

        let Ok(session_id) = Uuid::parse_str(session_id) else {
            return Ok(SecurityMiddlewareResult::deny(NAME, "malformed session id"));
        };

        let Some(security_context) = self.context_manager.get_context(session_id).await else {
            return Ok(SecurityMiddlewareResult::deny(NAME, "invalid or expired session"));
        };

        ctx.user_id = Some(security_context.user_id.clone());
        ctx.security_context = Some(security_context);

        Ok(SecurityMiddlewareResult::allow(NAME, "authentication successful"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;
    use crate::context::{ContextManagerConfig, SecurityLevel};

    #[tokio::test]
    async fn missing_session_id_is_denied() {
        let manager = ContextManager::new(ContextManagerConfig::default(), None);
        let mw = AuthenticationMiddleware::new(manager);
        let mut ctx = RequestContext::new("adapters/demo", "execute");
        let result = mw.process(&mut ctx).await.unwrap();
        assert!(result.action.is_blocked());
    }

    #[tokio::test]
    async fn unknown_session_id_is_denied() {
        let manager = ContextManager::new(ContextManagerConfig::default(), None);
        let mw = AuthenticationMiddleware::new(manager);
        let mut ctx = RequestContext::new("adapters/demo", "execute").with_session(Uuid::new_v4().to_string());
        let result = mw.process(&mut ctx).await.unwrap();
        assert!(result.action.is_blocked());
    }

    #[tokio::test]
    async fn valid_session_attaches_security_context() {
        let manager = ContextManager::new(ContextManagerConfig::default(), None);
        let security_context = manager
            .create_context(
                "alice",
                HashSet::new(),
                SecurityLevel::Public,
                "127.0.0.1",
                None,
                None,
                HashMap::new(),
            )
            .await
            .unwrap();
        let mw = AuthenticationMiddleware::new(manager);
        let mut ctx =
            RequestContext::new("adapters/demo", "execute").with_session(security_context.session_id.to_string());
        let result = mw.process(&mut ctx).await.unwrap();
        assert!(!result.action.is_blocked());
        assert_eq!(ctx.user_id.as_deref(), Some("alice"));
        assert!(ctx.security_context.is_some());
    }
}
