//! Ergonomic wrappers over [`AuditLogger`] for entry/exit/error logging.
//!
//! The original service offers `audit_operation`/`audit_adapter_operation` decorators
//! that wrap a callable and auto-log on entry, exit, and error. Rust favors an explicit
//! guard over an attribute-rewriting decorator for this: [`OperationAuditor`] is
//! constructed at the start of an operation and its `success`/`failure` consumes it to
//! emit the matching event with duration attached.

use std::time::Instant;

use super::event::{AuditEventType, AuditLevel, AuditSeverity};
use super::logger::AuditLogger;

/// Tracks one in-flight operation for audit purposes.
///
/// If neither [`Self::success`] nor [`Self::failure`] is called, no event is emitted —
/// this mirrors the decorator's "gracefully no-op when the audit log is not
/// initialized" requirement, since an absent/never-started logger simply means calls
/// here are never made.
pub struct OperationAuditor<'a> {
    logger: Option<&'a AuditLogger>,
    operation: String,
    adapter_id: Option<String>,
    started_at: Instant,
}

impl<'a> OperationAuditor<'a> {
    /// Begin tracking `operation`. `logger` is optional: passing `None` makes every
    /// method a no-op, which is how callers satisfy "no-op when C7 is not initialized"
    /// without sprinkling `if let Some(logger) = ...` at call sites.
    pub fn start(logger: Option<&'a AuditLogger>, operation: impl Into<String>) -> Self {
        Self {
            logger,
            operation: operation.into(),
            adapter_id: None,
            started_at: Instant::now(),
        }
    }

    pub fn for_adapter(mut self, adapter_id: impl Into<String>) -> Self {
        self.adapter_id = Some(adapter_id.into());
        self
    }

    fn duration_ms(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64() * 1000.0
    }

    /// Record successful completion.
    pub async fn success(self) {
        let Some(logger) = self.logger else { return };
        let event_type = if self.adapter_id.is_some() {
            AuditEventType::AdapterExecute
        } else {
            AuditEventType::ApiResponse
        };
        let mut event = super::event::AuditEvent::new(
            event_type,
            format!("{} completed", self.operation),
            AuditLevel::Debug,
            AuditSeverity::Low,
        )
        .with_duration_ms(self.duration_ms());
        if let Some(adapter_id) = self.adapter_id {
            event = event.with_adapter(adapter_id);
        }
        let _ = logger.log_event(event).await;
    }

    /// Record failure with a human-readable `reason`.
    pub async fn failure(self, reason: impl Into<String>) {
        let Some(logger) = self.logger else { return };
        let event_type = if self.adapter_id.is_some() {
            AuditEventType::AdapterError
        } else {
            AuditEventType::ApiError
        };
        let mut event = super::event::AuditEvent::new(
            event_type,
            format!("{} failed", self.operation),
            AuditLevel::Error,
            AuditSeverity::Medium,
        )
        .with_duration_ms(self.duration_ms())
        .with_error("operation_failed", reason);
        if let Some(adapter_id) = self.adapter_id {
            event = event.with_adapter(adapter_id);
        }
        let _ = logger.log_event(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::logger::AuditConfig;
    use crate::audit::storage::EventQuery;

    #[tokio::test]
    async fn no_logger_is_a_silent_no_op() {
        let auditor = OperationAuditor::start(None, "noop");
        auditor.success().await;
    }

    #[tokio::test]
    async fn success_logs_an_event_with_duration() {
        let logger = AuditLogger::in_memory(AuditConfig::default());
        logger.start().await;
        let auditor = OperationAuditor::start(Some(&logger), "load").for_adapter("adapter-1");
        auditor.success().await;
        logger.stop().await.unwrap_or(());
        let events = logger.query_events(EventQuery::default()).await.unwrap_or_default();
        assert_eq!(events.len(), 1);
        assert!(events[0].duration_ms.is_some());
    }
}
