//! `MiddlewareChain`: the C6 facade — an ordered, enable/disable-able stage
//! list plus the interceptor that runs it and an emergency lockdown switch.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::audit::{AuditEvent, AuditEventType, AuditLevel, AuditLogger, AuditSeverity};
use crate::context::ContextManager;

use super::stage::SecurityMiddleware;
use super::types::{RequestContext, SecurityMiddlewareResult};

#[derive(Debug, Default, Clone, Copy)]
pub struct ChainStatistics {
    pub total_requests: u64,
    pub allowed_requests: u64,
    pub blocked_requests: u64,
}

/// Runs an ordered, sorted-by-priority list of stages over every request.
///
/// The stage list is read far more often than it is mutated, so each entry
/// is kept behind its own `Arc`: a request clones the `Vec` (cheap refcount
/// bumps, not a deep copy) out from under a short-lived read lock, then
/// iterates it without holding the lock across any `.await`.
pub struct MiddlewareChain {
    stages: RwLock<Vec<Arc<dyn SecurityMiddleware>>>,
    context_manager: Arc<ContextManager>,
    audit: Option<Arc<AuditLogger>>,
    stats: parking_lot::Mutex<ChainStatistics>,
    lockdown: std::sync::atomic::AtomicBool,
}

impl MiddlewareChain {
    pub fn new(context_manager: Arc<ContextManager>, audit: Option<Arc<AuditLogger>>) -> Self {
        Self {
            stages: RwLock::new(Vec::new()),
            context_manager,
            audit,
            stats: parking_lot::Mutex::new(ChainStatistics::default()),
            lockdown: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Inserts a stage and re-sorts the list by ascending priority.
    pub fn add_middleware(&self, middleware: Box<dyn SecurityMiddleware>) {
        let mut stages = self.stages.write();
        stages.push(Arc::from(middleware));
        stages.sort_by_key(|m| m.priority());
    }

    pub fn remove_middleware(&self, name: &str) -> bool {
        let mut stages = self.stages.write();
        let before = stages.len();
        stages.retain(|m| m.name() != name);
        stages.len() != before
    }

    pub fn enable_middleware(&self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    pub fn disable_middleware(&self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let stages = self.stages.read();
        let Some(stage) = stages.iter().find(|m| m.name() == name) else {
            return false;
        };
        stage.set_enabled(enabled);
        true
    }

    pub fn middleware_names(&self) -> Vec<String> {
        self.stages.read().iter().map(|m| m.name().to_string()).collect()
    }

    pub fn get_statistics(&self) -> ChainStatistics {
        *self.stats.lock()
    }

    pub fn is_locked_down(&self) -> bool {
        self.lockdown.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Disables every stage except `ip_filter` and terminates all active
    /// sessions. Idempotent.
    pub async fn emergency_lockdown(&self, reason: &str) {
        self.lockdown.store(true, std::sync::atomic::Ordering::Relaxed);
        let stages = self.stages.read().clone();
        for stage in stages.iter() {
            if stage.name() != super::stages::ip_filter::NAME {
                stage.set_enabled(false);
            }
        }
        let terminated = self.context_manager.terminate_all_sessions().await;

        if let Some(audit) = &self.audit {
            let event = AuditEvent::new(
                AuditEventType::EmergencyLockdown,
                format!("emergency lockdown: {reason}"),
                AuditLevel::Critical,
                AuditSeverity::Critical,
            )
            .with_component("middleware_chain")
            .with_metadata("terminated_sessions", terminated.to_string());
            let _ = audit.log_event(event).await;
        }
    }

    /// Re-enables every registered stage. Idempotent.
    pub async fn lift_emergency_lockdown(&self) {
        self.lockdown.store(false, std::sync::atomic::Ordering::Relaxed);
        let stages = self.stages.read().clone();
        for stage in stages.iter() {
            stage.set_enabled(true);
        }

        if let Some(audit) = &self.audit {
            let event = AuditEvent::new(
                AuditEventType::EmergencyLockdown,
                "emergency lockdown lifted".to_string(),
                AuditLevel::Warning,
                AuditSeverity::High,
            )
            .with_component("middleware_chain");
            let _ = audit.log_event(event).await;
        }
    }

    /// Runs every enabled stage in priority order, short-circuiting on the
    /// first blocking result. Never propagates a stage's error to the
    /// caller — it is converted into a DENY result instead.
    pub async fn process(&self, ctx: &mut RequestContext) -> SecurityMiddlewareResult {
        self.stats.lock().total_requests += 1;
        let stages = self.stages.read().clone();
        let mut processed = Vec::new();

        for stage in stages.iter() {
            if !stage.is_enabled() {
                continue;
            }

            stage.pre_process(ctx).await;
            let outcome = stage.process(ctx).await;
            let result = match outcome {
                Ok(result) => result,
                Err(err) => SecurityMiddlewareResult::deny(stage.name(), format!("security check failed: {err}")),
            };
            stage.post_process(ctx, &result).await;
            processed.push(stage.name().to_string());

            if result.action.is_blocked() {
                self.finish(ctx, &result, AuditEventType::AccessDenied, AuditSeverity::High).await;
                self.stats.lock().blocked_requests += 1;
                return result;
            }

            if result.action.is_restricted() {
                self.finish(ctx, &result, AuditEventType::SecurityViolation, AuditSeverity::Medium)
                    .await;
            }
        }

        let allowed = SecurityMiddlewareResult {
            processed_by: processed,
            ..SecurityMiddlewareResult::allow("middleware_chain", "all security checks passed")
        };
        self.finish(ctx, &allowed, AuditEventType::AccessGranted, AuditSeverity::Low).await;
        self.stats.lock().allowed_requests += 1;
        allowed
    }

    async fn finish(
        &self,
        ctx: &RequestContext,
        result: &SecurityMiddlewareResult,
        event_type: AuditEventType,
        severity: AuditSeverity,
    ) {
        let Some(audit) = &self.audit else { return };
        let level = match event_type {
            AuditEventType::AccessDenied => AuditLevel::Warning,
            AuditEventType::SecurityViolation => AuditLevel::Warning,
            _ => AuditLevel::Info,
        };
        let mut event = AuditEvent::new(event_type, result.message.clone(), level, severity)
            .with_component("middleware_chain")
            .with_metadata("action", format!("{:?}", result.action))
            .with_metadata("decision", format!("{:?}", result.decision))
            .with_metadata("processed_by", result.processed_by.join(","));
        if let Some(user_id) = &ctx.user_id {
            event = event.with_user(user_id.clone());
        }
        if let Some(session_id) = &ctx.session_id {
            event = event.with_session(session_id.clone());
        }
        if let Some(ip) = &ctx.ip_address {
            event = event.with_ip(ip.clone());
        }
        let _ = audit.log_event(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextManagerConfig;
    use crate::middleware_chain::stages::IpFilterMiddleware;

    fn chain() -> MiddlewareChain {
        let cm = ContextManager::new(ContextManagerConfig::default(), None);
        MiddlewareChain::new(cm, None)
    }

    #[tokio::test]
    async fn empty_chain_allows_everything() {
        let chain = chain();
        let mut ctx = RequestContext::new("adapters/demo", "execute");
        let result = chain.process(&mut ctx).await;
        assert!(!result.action.is_blocked());
        assert_eq!(chain.get_statistics().allowed_requests, 1);
    }

    #[tokio::test]
    async fn blocked_ip_short_circuits_the_chain() {
        let chain = chain();
        let ip_filter = IpFilterMiddleware::new();
        ip_filter.add_blocked_ip("10.0.0.1");
        chain.add_middleware(Box::new(ip_filter));

        let mut ctx = RequestContext::new("adapters/demo", "execute").with_ip("10.0.0.1");
        let result = chain.process(&mut ctx).await;
        assert!(result.action.is_blocked());
        assert_eq!(chain.get_statistics().blocked_requests, 1);
    }

    #[tokio::test]
    async fn disable_and_enable_round_trip() {
        let chain = chain();
        chain.add_middleware(Box::new(IpFilterMiddleware::new()));
        assert!(chain.disable_middleware("ip_filter"));
        assert!(chain.enable_middleware("ip_filter"));
        assert!(!chain.disable_middleware("missing_stage"));
    }

    #[tokio::test]
    async fn emergency_lockdown_disables_everything_but_ip_filter() {
        let chain = chain();
        chain.add_middleware(Box::new(IpFilterMiddleware::new()));
        chain.add_middleware(Box::new(super::super::stages::RateLimitMiddleware::default()));

        chain.emergency_lockdown("testing").await;
        assert!(chain.is_locked_down());
        let stages = chain.stages.read().clone();
        for stage in stages.iter() {
            if stage.name() == "ip_filter" {
                assert!(stage.is_enabled());
            } else {
                assert!(!stage.is_enabled());
            }
        }

        chain.lift_emergency_lockdown().await;
        assert!(!chain.is_locked_down());
        for stage in chain.stages.read().iter() {
            assert!(stage.is_enabled());
        }
    }
}
