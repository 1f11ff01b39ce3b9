//! Input validation: walks a pre-parsed JSON value tree and runs pattern
//! families over every string leaf.

use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

use crate::audit::AuditSeverity;

use super::types::{SecurityViolation, ThreatType, ValidationContext};

/// Default ceiling on a single string leaf's byte length before it is flagged
/// as resource exhaustion rather than pattern-matched.
pub const DEFAULT_MAX_STRING_BYTES: usize = 10 * 1024;

macro_rules! regex_set {
    ($name:ident, $sources:ident, [$($pat:literal),+ $(,)?]) => {
        const $sources: &[&str] = &[$($pat),+];
        static $name: LazyLock<Vec<Regex>> =
            LazyLock::new(|| $sources.iter().filter_map(|p| Regex::new(p).ok()).collect());
    };
}

regex_set!(
    SQL_INJECTION_PATTERNS,
    SQL_INJECTION_PATTERN_SOURCES,
    [
        r"(?i)\bunion\b.*\bselect\b",
        r"(?i)\bselect\b.*\bfrom\b",
        r"(?i)\binsert\b.*\binto\b",
        r"(?i)\bdelete\b.*\bfrom\b",
        r"(?i)\bupdate\b.*\bset\b",
        r"(?i)\bdrop\b.*\btable\b",
        r"(?i)\balter\b.*\btable\b",
        r"(?i)\bcreate\b.*\btable\b",
        r"(?i)\bexec\b\s*\(",
        r"(?i)\bexecute\b\s*\(",
        r"(--|#|/\*|\*/)",
        r"(?i)\bor\b.{0,20}=",
        r"(?i)\band\b.{0,20}=",
        r"'[^']*'\s*=\s*'[^']*'",
        r"\b1\s*=\s*1\b",
        r"\b1\s*=\s*0\b",
    ]
);

regex_set!(
    XSS_PATTERNS,
    XSS_PATTERN_SOURCES,
    [
        r"(?is)<script[^>]*>.*?</script>",
        r"(?is)<iframe[^>]*>.*?</iframe>",
        r"(?is)<object[^>]*>.*?</object>",
        r"(?i)<embed[^>]*>",
        r"(?is)<applet[^>]*>.*?</applet>",
        r"(?i)javascript:",
        r"(?i)vbscript:",
        r"(?i)on\w+\s*=",
        r"(?i)expression\s*\(",
        r"(?i)@import",
        r"(?i)<meta[^>]*http-equiv",
        r"(?i)<link[^>]*href.*javascript:",
        r"(?i)<img[^>]*src.*javascript:",
        r"(?i)<form[^>]*action.*javascript:",
    ]
);

regex_set!(
    COMMAND_INJECTION_PATTERNS,
    COMMAND_INJECTION_PATTERN_SOURCES,
    [
        r"[;&|`]",
        r"\$\(",
        r"`[^`]*`",
        r"\|\s*\w+",
        r">\s*/",
        r"<\s*/",
        r"(?i)\beval\b",
        r"(?i)\bexec\b",
        r"(?i)\bsystem\b",
        r"(?i)\bshell_exec\b",
        r"(?i)\bpassthru\b",
        r"(?i)\bpopen\b",
    ]
);

regex_set!(
    PATH_TRAVERSAL_PATTERNS,
    PATH_TRAVERSAL_PATTERN_SOURCES,
    [
        r"\.\./",
        r"\.\.\\",
        r"(?i)%2e%2e%2f",
        r"(?i)%2e%2e/",
        r"(?i)\.\.%2f",
        r"(?i)%2e%2e%5c",
        r"(?i)%252e%252e%252f",
    ]
);

/// Walks `value`, normalizing and pattern-matching every string leaf, and
/// returns every violation found. `max_string_bytes` bounds an individual
/// leaf; an oversized leaf raises `ResourceExhaustion` and is not further
/// pattern-matched.
pub fn validate_input(
    value: &JsonValue,
    context: &ValidationContext,
    max_string_bytes: usize,
) -> Vec<SecurityViolation> {
    let mut violations = Vec::new();
    walk(value, context, max_string_bytes, &mut violations);
    violations
}

fn walk(
    value: &JsonValue,
    context: &ValidationContext,
    max_string_bytes: usize,
    out: &mut Vec<SecurityViolation>,
) {
    match value {
        JsonValue::String(s) => check_string(s, context, max_string_bytes, out),
        JsonValue::Array(items) => {
            for item in items {
                walk(item, context, max_string_bytes, out);
            }
        }
        JsonValue::Object(map) => {
            for (key, item) in map {
                check_string(key, context, max_string_bytes, out);
                walk(item, context, max_string_bytes, out);
            }
        }
        _ => {}
    }
}

fn check_string(
    s: &str,
    context: &ValidationContext,
    max_string_bytes: usize,
    out: &mut Vec<SecurityViolation>,
) {
    if s.len() > max_string_bytes {
        out.push(annotate(
            SecurityViolation::new(
                ThreatType::ResourceExhaustion,
                AuditSeverity::Medium,
                format!("input string exceeds {max_string_bytes} byte ceiling"),
                "input_validator.size_check",
            ),
            context,
        ));
        return;
    }

    let normalized: String = s.nfkc().collect();

    for (family, patterns) in [
        (ThreatType::SqlInjection, &*SQL_INJECTION_PATTERNS),
        (ThreatType::XssAttack, &*XSS_PATTERNS),
        (ThreatType::CommandInjection, &*COMMAND_INJECTION_PATTERNS),
        (ThreatType::PathTraversal, &*PATH_TRAVERSAL_PATTERNS),
    ] {
        for pattern in patterns.iter() {
            if pattern.is_match(&normalized) {
                out.push(
                    annotate(
                        SecurityViolation::new(
                            family,
                            family.default_severity(),
                            format!("input matched {family:?} pattern"),
                            "input_validator.pattern_match",
                        )
                        .with_evidence("pattern", pattern.as_str())
                        .with_evidence("sample", sample(&normalized)),
                        context,
                    ),
                );
                break;
            }
        }
    }
}

fn sample(s: &str) -> String {
    const MAX: usize = 120;
    if s.len() <= MAX {
        s.to_string()
    } else {
        let mut truncated = s.chars().take(MAX).collect::<String>();
        truncated.push('\u{2026}');
        truncated
    }
}

fn annotate(violation: SecurityViolation, context: &ValidationContext) -> SecurityViolation {
    let mut violation = violation;
    violation.user_id = context.user_id.clone();
    violation.session_id = context.session_id.clone();
    violation.source_ip = context.ip_address.clone();
    violation
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_sql_injection_in_nested_value() {
        let payload = json!({"q": "1; DROP TABLE users; --"});
        let violations = validate_input(&payload, &ValidationContext::new(), DEFAULT_MAX_STRING_BYTES);
        assert!(violations.iter().any(|v| v.threat_type == ThreatType::SqlInjection));
    }

    #[test]
    fn detects_xss_script_tag() {
        let payload = json!("<script>alert(1)</script>");
        let violations = validate_input(&payload, &ValidationContext::new(), DEFAULT_MAX_STRING_BYTES);
        assert!(violations.iter().any(|v| v.threat_type == ThreatType::XssAttack));
    }

    #[test]
    fn detects_path_traversal_in_array_item() {
        let payload = json!(["safe", "../../etc/passwd"]);
        let violations = validate_input(&payload, &ValidationContext::new(), DEFAULT_MAX_STRING_BYTES);
        assert!(violations.iter().any(|v| v.threat_type == ThreatType::PathTraversal));
    }

    #[test]
    fn clean_payload_has_no_violations() {
        let payload = json!({"name": "alice", "count": 3});
        let violations = validate_input(&payload, &ValidationContext::new(), DEFAULT_MAX_STRING_BYTES);
        assert!(violations.is_empty());
    }

    #[test]
    fn oversized_string_flags_resource_exhaustion() {
        let payload = json!("x".repeat(64));
        let violations = validate_input(&payload, &ValidationContext::new(), 16);
        assert!(violations.iter().any(|v| v.threat_type == ThreatType::ResourceExhaustion));
    }

    #[test]
    fn fullwidth_confusable_is_caught_after_normalization() {
        // U+FF1C/FF1E are fullwidth '<'/'>': NFKC folds them to ASCII before matching.
        let payload = json!("\u{ff1c}script\u{ff1e}alert(1)\u{ff1c}/script\u{ff1e}");
        let violations = validate_input(&payload, &ValidationContext::new(), DEFAULT_MAX_STRING_BYTES);
        assert!(violations.iter().any(|v| v.threat_type == ThreatType::XssAttack));
    }

    #[test]
    fn all_pattern_sets_compile() {
        assert_eq!(SQL_INJECTION_PATTERNS.len(), SQL_INJECTION_PATTERN_SOURCES.len());
        assert_eq!(XSS_PATTERNS.len(), XSS_PATTERN_SOURCES.len());
        assert_eq!(COMMAND_INJECTION_PATTERNS.len(), COMMAND_INJECTION_PATTERN_SOURCES.len());
        assert_eq!(PATH_TRAVERSAL_PATTERNS.len(), PATH_TRAVERSAL_PATTERN_SOURCES.len());
    }
}
