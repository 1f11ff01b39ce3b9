//! End-to-end scenarios exercising each component through its public API,
//! independent of its own unit tests.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{HashMap, HashSet};
use std::time::Duration as StdDuration;

use chrono::Duration;

use security_core::audit::{AuditConfig, AuditEventType, AuditLogger, AuditLevel, AuditSeverity, EventQuery};
use security_core::context::{ContextManager, ContextManagerConfig, SecurityLevel};
use security_core::middleware_chain::stages::{IpFilterMiddleware, RateLimitMiddleware};
use security_core::middleware_chain::{MiddlewareChain, RequestContext};
use security_core::permissions::{AccessRequest, PermissionEngine, PermissionEngineConfig};
use security_core::sandbox::{IsolationMode, SandboxConfiguration, SandboxEngine};
use security_core::threat::{BehaviorConfig, ThreatDetector};
use security_core::validation::{
    BusinessLogicConfig, BusinessLogicValidator, SecurityValidator, SecurityValidatorConfig, ThreatType,
    ValidationContext,
};

#[tokio::test]
async fn default_user_role_can_read_but_not_write() {
    let engine = PermissionEngine::new(PermissionEngineConfig::default(), None);
    engine.assign_role("alice", "user").unwrap();

    let read = AccessRequest::new("alice", "doc/42", "read");
    let result = engine.check_permission(&read).await;
    assert!(result.granted());
    assert!(result.permissions_used.contains(&"read_basic".to_string()));
}

#[tokio::test]
async fn guest_role_is_denied_write_access() {
    let engine = PermissionEngine::new(PermissionEngineConfig::default(), None);
    engine.assign_role("bob", "guest").unwrap();

    let write = AccessRequest::new("bob", "doc/42", "write");
    let result = engine.check_permission(&write).await;
    assert!(!result.granted());
    assert!(result.reason.to_lowercase().contains("guest"));
}

#[tokio::test]
async fn expired_session_is_unreachable_and_evicted() {
    let manager = ContextManager::new(ContextManagerConfig::default(), None);
    let context = manager
        .create_context(
            "alice",
            HashSet::new(),
            SecurityLevel::Public,
            "127.0.0.1",
            None,
            Some(Duration::seconds(-1)),
            HashMap::new(),
        )
        .await
        .unwrap();

    assert!(manager.get_context(context.session_id).await.is_none());
    assert_eq!(manager.active_session_count().await, 0);
}

#[tokio::test]
async fn sql_injection_payload_is_flagged_malicious() {
    let validator = SecurityValidator::new(SecurityValidatorConfig::default(), None);
    let context = ValidationContext::new().with_user("alice").with_session("s1");
    let payload = serde_json::json!({ "query": "'; DROP TABLE users; --" });

    let outcome = validator.validate_request(&payload, &context).await;
    assert!(!outcome.passed);
    assert!(outcome
        .violations
        .iter()
        .any(|v| v.threat_type == ThreatType::SqlInjection && v.severity >= AuditSeverity::High));
}

#[tokio::test]
async fn destructive_shell_invocation_is_flagged_as_malicious_code() {
    let detector = ThreatDetector::new(BehaviorConfig::default(), None, None);
    let result = detector
        .analyze_code("import os; os.system('rm -rf /')", Some("alice"), None, None)
        .await;

    assert!(result.is_threat);
    assert!(result.risk_score >= 0.75);
    assert!(result
        .threat_events
        .iter()
        .any(|e| e.threat_type == ThreatType::MaliciousCode));
}

#[tokio::test]
async fn rate_limit_rejects_the_request_past_the_cap() {
    let middleware = RateLimitMiddleware::new(100);
    let mut ctx = RequestContext::new("adapters/demo", "execute").with_ip("203.0.113.9");
    for _ in 0..100 {
        let result = security_core::middleware_chain::SecurityMiddleware::process(&middleware, &mut ctx)
            .await
            .unwrap();
        assert!(!result.action.is_restricted());
    }
    let over_cap = security_core::middleware_chain::SecurityMiddleware::process(&middleware, &mut ctx)
        .await
        .unwrap();
    assert_eq!(over_cap.action, security_core::middleware_chain::MiddlewareAction::RateLimit);
    assert_eq!(
        over_cap.decision,
        security_core::middleware_chain::MiddlewareDecision::Rejected
    );
}

#[tokio::test]
async fn blocked_ip_is_rejected_by_the_chain() {
    let context_manager = ContextManager::new(ContextManagerConfig::default(), None);
    let chain = MiddlewareChain::new(context_manager, None);
    let ip_filter = IpFilterMiddleware::new();
    ip_filter.add_blocked_ip("10.0.0.5");
    chain.add_middleware(Box::new(ip_filter));

    let mut ctx = RequestContext::new("adapters/demo", "execute").with_ip("10.0.0.5");
    let result = chain.process(&mut ctx).await;
    assert!(result.action.is_blocked());
    assert_eq!(
        result.decision,
        security_core::middleware_chain::MiddlewareDecision::Rejected
    );
}

#[tokio::test]
async fn batched_events_are_all_retrievable_after_a_flush() {
    let config = AuditConfig {
        batch_size: 10,
        flush_interval: StdDuration::from_secs(5),
        ..AuditConfig::default()
    };
    let logger = AuditLogger::in_memory(config);
    logger.start().await;

    for i in 0..3 {
        logger
            .log(
                AuditEventType::AccessGranted,
                format!("event {i}"),
                AuditLevel::Info,
                AuditSeverity::Low,
            )
            .await
            .unwrap();
    }

    tokio::time::sleep(StdDuration::from_secs(6)).await;
    let events = logger.query_events(EventQuery::default()).await.unwrap();
    assert_eq!(events.len(), 3);

    logger.stop().await.unwrap();
}

#[tokio::test]
async fn repeated_failed_logins_trip_brute_force_detection() {
    let validator = BusinessLogicValidator::new(BusinessLogicConfig {
        failed_attempt_limit: 5,
        ..BusinessLogicConfig::default()
    });
    for _ in 0..5 {
        validator.record_failed_attempt("alice");
    }

    let context = ValidationContext::new().with_user("alice").with_session("s1");
    let violations = validator.validate(&context);
    assert!(violations
        .iter()
        .any(|v| v.threat_type == ThreatType::BruteForceAttack && v.severity == AuditSeverity::High));
}

#[tokio::test]
async fn credit_card_number_in_output_is_flagged_as_sensitive() {
    let validator = SecurityValidator::new(SecurityValidatorConfig::default(), None);
    let context = ValidationContext::new();
    let payload = serde_json::json!({ "note": "card on file: 4111 1111 1111 1111" });

    let outcome = validator.validate_output(&payload, &context).await;
    assert!(outcome
        .violations
        .iter()
        .any(|v| v.threat_type == ThreatType::SensitiveDataExposure));
}

/// Scaled-down timeout relative to a production `execution_timeout_secs` of
/// 30s: the enforcement path (poll every 100ms, kill, re-wait) is the same
/// regardless of the configured ceiling, so a 1s ceiling exercises it without
/// slowing the suite down.
#[tokio::test]
async fn infinite_loop_is_killed_at_the_execution_timeout() {
    let engine = SandboxEngine::new(None);
    let mut config = SandboxConfiguration::strict("quick-timeout");
    config.quota.execution_timeout_secs = 1;
    config.interpreter = "sh".to_string();
    engine.register_configuration("quick-timeout", config);

    let mut environment = engine.create_environment("quick-timeout", None).await.unwrap();
    let result = engine
        .execute_code("while :; do :; done", &mut environment, None)
        .await;

    assert!(!result.success);
    assert!(result.exit_code < 0);
    assert!(result
        .security_violations
        .iter()
        .any(|v| v.threat_type == ThreatType::ResourceLimitExceeded));

    engine.destroy_environment(&environment.sandbox_id).await;
}

#[tokio::test]
async fn development_mode_sandbox_allows_flagged_code_through_to_the_monitor() {
    let engine = SandboxEngine::new(None);
    let mut config = SandboxConfiguration::development("permissive");
    config.mode = IsolationMode::Development;
    config.interpreter = "true".to_string();
    engine.register_configuration("permissive", config);

    let mut environment = engine.create_environment("permissive", None).await.unwrap();
    let result = engine.execute_code("eval(x)", &mut environment, None).await;

    // In Development mode the pre-execution static-analysis gate is skipped,
    // so a flagged snippet still reaches the interpreter rather than being
    // blocked outright.
    assert!(result.exit_code >= 0);

    engine.destroy_environment(&environment.sandbox_id).await;
}
