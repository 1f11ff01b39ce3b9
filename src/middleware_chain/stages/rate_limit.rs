//! Priority 40: a sliding one-minute window keyed by user id, falling back to
//! IP address, then to a shared anonymous bucket.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::middleware_chain::error::MiddlewareError;
use crate::middleware_chain::stage::SecurityMiddleware;
use crate::middleware_chain::types::{RequestContext, SecurityMiddlewareResult};

pub const NAME: &str = "rate_limit";
pub const PRIORITY: u32 = 40;

pub struct RateLimitMiddleware {
    requests_per_minute: u32,
    history: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
    enabled: AtomicBool,
}

impl RateLimitMiddleware {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            history: Mutex::new(HashMap::new()),
            enabled: AtomicBool::new(true),
        }
    }
}

impl Default for RateLimitMiddleware {
    fn default() -> Self {
        Self::new(60)
    }
}

#[async_trait]
impl SecurityMiddleware for RateLimitMiddleware {
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
        let key = ctx
            .user_id
            .clone()
            .or_else(|| ctx.ip_address.clone())
            .unwrap_or_else(|| "anonymous".to_string());

        let now = Utc::now();
        let cutoff = now - Duration::minutes(1);

        let mut history = self.history.lock();
        let window = history.entry(key).or_default();
        while let Some(oldest) = window.front() {
            if *oldest > cutoff {
                break;
            }
            window.pop_front();
        }

        if window.len() as u32 >= self.requests_per_minute {
            return Ok(SecurityMiddlewareResult::rate_limit(
                NAME,
                format!("rate limit exceeded: {} requests per minute", self.requests_per_minute),
            )
            .with_detail("limit", self.requests_per_minute.to_string())
            .with_detail("current_count", window.len().to_string()));
        }

        window.push_back(now);
        Ok(SecurityMiddlewareResult::allow(NAME, "rate limit check passed")
            .with_detail("current_count", window.len().to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_requests_under_the_cap() {
        let mw = RateLimitMiddleware::new(2);
        let mut ctx = RequestContext::new("adapters/demo", "execute").with_ip("10.0.0.1");
        assert!(!mw.process(&mut ctx).await.unwrap().action.is_restricted());
        assert!(!mw.process(&mut ctx).await.unwrap().action.is_restricted());
    }

    #[tokio::test]
    async fn rate_limits_past_the_cap() {
        let mw = RateLimitMiddleware::new(1);
        let mut ctx = RequestContext::new("adapters/demo", "execute").with_ip("10.0.0.1");
        mw.process(&mut ctx).await.unwrap();
        let result = mw.process(&mut ctx).await.unwrap();
        assert!(result.action.is_restricted());
    }

    #[tokio::test]
    async fn separate_keys_have_independent_budgets() {
        let mw = RateLimitMiddleware::new(1);
        let mut a = RequestContext::new("adapters/demo", "execute").with_ip("10.0.0.1");
        let mut b = RequestContext::new("adapters/demo", "execute").with_ip("10.0.0.2");
        assert!(!mw.process(&mut a).await.unwrap().action.is_restricted());
        assert!(!mw.process(&mut b).await.unwrap().action.is_restricted());
    }
}
