//! Priority 30: runs C4's code and behavior analysis over the request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::audit::AuditSeverity;
use crate::middleware_chain::error::MiddlewareError;
use crate::middleware_chain::stage::SecurityMiddleware;
use crate::middleware_chain::types::{RequestContext, SecurityMiddlewareResult};
use crate::threat::ThreatDetector;

pub const NAME: &str = "threat_detection";
pub const PRIORITY: u32 = 30;

pub struct ThreatDetectionMiddleware {
    detector: Arc<ThreatDetector>,
    enabled: AtomicBool,
}

impl ThreatDetectionMiddleware {
    pub fn new(detector: Arc<ThreatDetector>) -> Self {
        Self {
            detector,
            enabled: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl SecurityMiddleware for ThreatDetectionMiddleware {
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
        if let Some(code) = ctx.code().map(str::to_string) {
            let analysis = self
                .detector
                .analyze_code(
                    &code,
                    ctx.user_id.as_deref(),
                    ctx.adapter_id.as_deref(),
                    ctx.ip_address.as_deref(),
                )
                .await;

            if analysis.is_threat {
                let worst = analysis
                    .threat_events
                    .iter()
                    .map(|event| event.severity)
                    .max()
                    .unwrap_or(AuditSeverity::Low);

                let message = format!("threat detected: {} finding(s)", analysis.threat_events.len());
                let result = match worst {
                    AuditSeverity::Critical => SecurityMiddlewareResult::block(NAME, message),
                    AuditSeverity::High => SecurityMiddlewareResult::quarantine(NAME, message),
                    AuditSeverity::Medium | AuditSeverity::Low => SecurityMiddlewareResult::log_only(NAME, message),
                };
                return Ok(result
                    .with_detail("threat_count", analysis.threat_events.len().to_string())
                    .with_detail("risk_score", analysis.risk_score.to_string()));
            }

            return Ok(SecurityMiddlewareResult::allow(NAME, "no code threats detected"));
        }

        if let Some(user_id) = ctx.user_id.clone() {
            let analysis = self.detector.analyze_behavior(&user_id, ctx.ip_address.as_deref()).await;
            if analysis.is_threat {
                return Ok(SecurityMiddlewareResult::rate_limit(NAME, "suspicious behavior detected")
                    .with_detail("threat_count", analysis.threat_events.len().to_string()));
            }
        }

        Ok(SecurityMiddlewareResult::allow(NAME, "no threats detected"))
    }
}
