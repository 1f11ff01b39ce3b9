//! Priority 5: deny by IP block-list, or by absence from an allow-list.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::middleware_chain::error::MiddlewareError;
use crate::middleware_chain::stage::SecurityMiddleware;
use crate::middleware_chain::types::{RequestContext, SecurityMiddlewareResult};

pub const NAME: &str = "ip_filter";
pub const PRIORITY: u32 = 5;

pub struct IpFilterMiddleware {
    blocked_ips: RwLock<HashSet<String>>,
    allowed_ips: RwLock<HashSet<String>>,
    enabled: AtomicBool,
}

impl IpFilterMiddleware {
    pub fn new() -> Self {
        Self {
            blocked_ips: RwLock::new(HashSet::new()),
            allowed_ips: RwLock::new(HashSet::new()),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn add_blocked_ip(&self, ip: impl Into<String>) {
        self.blocked_ips.write().insert(ip.into());
    }

    pub fn remove_blocked_ip(&self, ip: &str) {
        self.blocked_ips.write().remove(ip);
    }

    pub fn add_allowed_ip(&self, ip: impl Into<String>) {
        self.allowed_ips.write().insert(ip.into());
    }

    pub fn remove_allowed_ip(&self, ip: &str) {
        self.allowed_ips.write().remove(ip);
    }
}

impl Default for IpFilterMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecurityMiddleware for IpFilterMiddleware {
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
        let Some(ip) = &ctx.ip_address else {
            return Ok(SecurityMiddlewareResult::allow(NAME, "no IP address to filter"));
        };

        if self.blocked_ips.read().contains(ip) {
            return Ok(SecurityMiddlewareResult::block(NAME, format!("IP {ip} is blocked"))
                .with_detail("blocked_ip", ip.clone()));
        }

        let allowed = self.allowed_ips.read();
        if !allowed.is_empty() && !allowed.contains(ip) {
            return Ok(
                SecurityMiddlewareResult::block(NAME, format!("IP {ip} is not in the allow-list"))
                    .with_detail("ip_address", ip.clone()),
            );
        }

        Ok(SecurityMiddlewareResult::allow(NAME, "IP filter check passed"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ctx_from_ip(ip: &str) -> RequestContext {
        RequestContext::new("adapters/demo", "execute").with_ip(ip)
    }

    #[tokio::test]
    async fn no_ip_address_passes_through() {
        let mw = IpFilterMiddleware::new();
        let mut ctx = RequestContext::new("adapters/demo", "execute");
        let result = mw.process(&mut ctx).await.unwrap();
        assert_eq!(result.action, crate::middleware_chain::types::MiddlewareAction::Allow);
    }

    #[tokio::test]
    async fn blocked_ip_is_blocked() {
        let mw = IpFilterMiddleware::new();
        mw.add_blocked_ip("10.0.0.1");
        let mut ctx = ctx_from_ip("10.0.0.1");
        let result = mw.process(&mut ctx).await.unwrap();
        assert!(result.action.is_blocked());
    }

    #[tokio::test]
    async fn allow_list_rejects_non_members() {
        let mw = IpFilterMiddleware::new();
        mw.add_allowed_ip("10.0.0.2");
        let mut ctx = ctx_from_ip("10.0.0.3");
        let result = mw.process(&mut ctx).await.unwrap();
        assert!(result.action.is_blocked());

        let mut ctx = ctx_from_ip("10.0.0.2");
        let result = mw.process(&mut ctx).await.unwrap();
        assert!(!result.action.is_blocked());
    }
}
