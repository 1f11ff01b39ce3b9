//! Output validation: scans outbound payloads for patterns that look like
//! sensitive data the caller should not be echoing back.

use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::LazyLock;

use crate::audit::AuditSeverity;

use super::types::{SecurityViolation, ThreatType, ValidationContext};

/// Default ceiling on a single string leaf's byte length in outbound payloads.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

const SENSITIVE_PATTERN_SOURCES: &[(&str, &str)] = &[
    ("credit_card", r"\b(?:\d[ -]*?){13,16}\b"),
    ("ssn", r"\b\d{3}-\d{2}-\d{4}\b"),
    ("email", r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"),
    ("ip_address", r"\b(?:\d{1,3}\.){3}\d{1,3}\b"),
    ("credential", r#"(?i)(password|pwd|pass|secret|api[_-]?key|token)\s*[:=]\s*\S+"#),
    ("base64_blob", r"\b[A-Za-z0-9+/]{40,}={0,2}\b"),
    ("hex_hash", r"\b[a-fA-F0-9]{32,64}\b"),
];

static SENSITIVE_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    SENSITIVE_PATTERN_SOURCES
        .iter()
        .filter_map(|(label, pattern)| Regex::new(pattern).ok().map(|re| (*label, re)))
        .collect()
});

pub fn validate_output(
    value: &JsonValue,
    context: &ValidationContext,
    max_output_bytes: usize,
) -> Vec<SecurityViolation> {
    let mut violations = Vec::new();
    walk(value, context, max_output_bytes, &mut violations);
    violations
}

fn walk(
    value: &JsonValue,
    context: &ValidationContext,
    max_output_bytes: usize,
    out: &mut Vec<SecurityViolation>,
) {
    match value {
        JsonValue::String(s) => check_string(s, context, max_output_bytes, out),
        JsonValue::Array(items) => {
            for item in items {
                walk(item, context, max_output_bytes, out);
            }
        }
        JsonValue::Object(map) => {
            for item in map.values() {
                walk(item, context, max_output_bytes, out);
            }
        }
        _ => {}
    }
}

fn check_string(
    s: &str,
    context: &ValidationContext,
    max_output_bytes: usize,
    out: &mut Vec<SecurityViolation>,
) {
    if s.len() > max_output_bytes {
        out.push(annotate(
            SecurityViolation::new(
                ThreatType::ResourceExhaustion,
                AuditSeverity::Medium,
                format!("output string exceeds {max_output_bytes} byte ceiling"),
                "output_validator.size_check",
            ),
            context,
        ));
        return;
    }

    for (label, pattern) in SENSITIVE_PATTERNS.iter() {
        if pattern.is_match(s) {
            out.push(annotate(
                SecurityViolation::new(
                    ThreatType::SensitiveDataExposure,
                    AuditSeverity::High,
                    format!("output matched sensitive-data pattern: {label}"),
                    "output_validator.pattern_match",
                )
                .with_evidence("pattern", *label),
                context,
            ));
        }
    }
}

fn annotate(violation: SecurityViolation, context: &ValidationContext) -> SecurityViolation {
    let mut violation = violation;
    violation.user_id = context.user_id.clone();
    violation.session_id = context.session_id.clone();
    violation.source_ip = context.ip_address.clone();
    violation
}
