//! Property tests for the behavioral invariants that must hold for every
//! input, not just the handful of examples in `tests/scenarios.rs`.
#![allow(clippy::unwrap_used, clippy::expect_used)]

#[macro_use]
extern crate proptest;

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;

use security_core::context::{ContextManager, ContextManagerConfig, SecurityLevel};
use security_core::middleware_chain::{MiddlewareChain, RequestContext};
use security_core::middleware_chain::stages::IpFilterMiddleware;
use security_core::permissions::{AccessRequest, PermissionEngine, PermissionEngineConfig};
use security_core::validation::{SecurityValidator, SecurityValidatorConfig, ValidationContext};

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(fut)
}

fn mutating_action() -> impl Strategy<Value = String> {
    prop_oneof![Just("write".to_string()), Just("delete".to_string()), Just("create".to_string())]
}

proptest! {
    // Deny-by-default: a subject nobody ever assigned a role to falls back
    // to the guest role internally, and guests can never perform a
    // mutating action no matter what resource they name.
    #[test]
    fn unassigned_user_is_denied_every_mutating_action(
        user_id in "[a-z]{3,12}",
        resource in "[a-z0-9/]{1,20}",
        action in mutating_action(),
    ) {
        let engine = PermissionEngine::new(PermissionEngineConfig::default(), None);
        let request = AccessRequest::new(user_id, resource, action);
        let result = block_on(engine.check_permission(&request));
        prop_assert!(!result.granted());
    }

    // Determinism: issuing the exact same request twice in a row (nothing
    // else touches engine state in between) always yields the same grant
    // decision, whether served from cache or freshly evaluated.
    #[test]
    fn repeating_a_request_never_flips_the_decision(
        user_id in "[a-z]{3,12}",
        resource in "[a-z0-9/]{1,20}",
        action in prop_oneof![Just("read".to_string()), Just("write".to_string()), Just("execute".to_string())],
    ) {
        let engine = PermissionEngine::new(PermissionEngineConfig::default(), None);
        engine.assign_role(&user_id, "user").unwrap();
        let request = AccessRequest::new(user_id, resource, action);
        let first = block_on(engine.check_permission(&request));
        let second = block_on(engine.check_permission(&request));
        prop_assert_eq!(first.granted(), second.granted());
    }

    // Validator idempotence: re-validating the same payload produces the
    // same verdict, since nothing about the payload changed between calls.
    #[test]
    fn validating_the_same_payload_twice_is_idempotent(
        field in "[a-zA-Z0-9 ';_-]{0,40}",
    ) {
        let validator = SecurityValidator::new(SecurityValidatorConfig::default(), None);
        let context = ValidationContext::new();
        let payload = serde_json::json!({ "field": field });

        let first = block_on(validator.validate_request(&payload, &context));
        let second = block_on(validator.validate_request(&payload, &context));
        prop_assert_eq!(first.verdict, second.verdict);
        prop_assert_eq!(first.violations.len(), second.violations.len());
    }

    // Expiry eviction: any context created with an already-past expiry is
    // unreachable immediately, regardless of which user it belongs to.
    #[test]
    fn an_already_expired_context_is_never_reachable(user_id in "[a-z]{3,12}") {
        let manager = ContextManager::new(ContextManagerConfig::default(), None);
        let context = block_on(manager.create_context(
            &user_id,
            HashSet::new(),
            SecurityLevel::Public,
            "127.0.0.1",
            None,
            Some(chrono::Duration::seconds(-1)),
            HashMap::new(),
        ))
        .unwrap();
        prop_assert!(block_on(manager.get_context(context.session_id)).is_none());
    }

    // Session cap: no matter how many sessions a user opens, the table
    // never holds more than `max_sessions_per_user` for that user at once.
    #[test]
    fn session_count_per_user_never_exceeds_the_configured_cap(opens in 1usize..20) {
        let mut config = ContextManagerConfig::default();
        config.max_sessions_per_user = 3;
        let manager = ContextManager::new(config, None);
        for _ in 0..opens {
            block_on(manager.create_context(
                "alice",
                HashSet::new(),
                SecurityLevel::Public,
                "127.0.0.1",
                None,
                None,
                HashMap::new(),
            ))
            .unwrap();
        }
        let sessions = block_on(manager.get_user_sessions("alice"));
        prop_assert!(sessions.len() <= 3);
    }

    // Middleware short-circuit: a blocked IP is rejected by the chain
    // before any resource- or action-specific stage runs, regardless of
    // what resource or action the request names.
    #[test]
    fn a_blocked_ip_is_rejected_for_any_resource_or_action(
        resource in "[a-z0-9/]{1,20}",
        action in "[a-z]{1,10}",
    ) {
        let context_manager = ContextManager::new(ContextManagerConfig::default(), None);
        let chain = MiddlewareChain::new(context_manager, None);
        let ip_filter = IpFilterMiddleware::new();
        ip_filter.add_blocked_ip("198.51.100.7");
        chain.add_middleware(Box::new(ip_filter));

        let mut ctx = RequestContext::new(resource, action).with_ip("198.51.100.7");
        let result = block_on(chain.process(&mut ctx));
        prop_assert!(result.action.is_blocked());
    }
}
