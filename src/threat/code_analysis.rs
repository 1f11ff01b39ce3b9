//! Static analysis of arbitrary host-language source text: a line/token
//! scanner over known-dangerous syntactic forms, plus a regex layer run
//! independently as a belt-and-braces check.
//!
//! The adapters this core guards are not necessarily Rust, so there is no
//! single grammar to build a real AST for. Instead this scans tokens and
//! balances delimiters the way a language-agnostic linter would.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::audit::AuditSeverity;
use crate::validation::ThreatType;

use super::event::ThreatEvent;

const SOURCE: &str = "code_analyzer";

static DANGEROUS_FUNCTIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "eval",
        "exec",
        "compile",
        "__import__",
        "getattr",
        "setattr",
        "delattr",
        "globals",
        "locals",
        "vars",
        "execfile",
        "os.system",
        "subprocess.call",
        "subprocess.run",
        "subprocess.Popen",
    ]
    .into_iter()
    .collect()
});

static SUSPICIOUS_MODULES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "os", "sys", "subprocess", "socket", "urllib", "requests", "http", "ftplib", "smtplib",
        "telnetlib", "paramiko", "ctypes", "marshal", "pickle", "importlib", "ffi", "net",
        "process", "child_process",
    ]
    .into_iter()
    .collect()
});

static DANGEROUS_ATTRIBUTES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "__globals__",
        "__locals__",
        "__builtins__",
        "__class__",
        "__subclasses__",
        "__getattribute__",
        "__setattr__",
    ]
    .into_iter()
    .collect()
});

/// Source patterns behind [`RAW_PATTERNS`]; kept as a named constant so the
/// `all_raw_patterns_compile` test below can assert every one of them
/// actually survives `Regex::new` without the static initializer itself
/// needing to panic on a theoretical failure.
const RAW_PATTERN_SOURCES: &[&str] = &[
    r"(?i)os\.system\s*\(",
    r"(?i)subprocess\.(call|run|Popen)",
    r#"(?i)open\s*\(\s*["'][^"']*\.(exe|bat|sh|cmd)["']"#,
    r"(?i)urllib\.request\.urlopen",
    r"(?i)requests\.(get|post|put|delete)",
    r"(?i)socket\.socket\s*\(",
    r"(?i)eval\s*\(",
    r"(?i)exec\s*\(",
    r"__import__\s*\(",
];

// `.ok()`/`.filter_map` rather than `.expect()`: a pattern that somehow
// failed to compile is dropped from the active set instead of crashing
// analysis for every caller; `all_raw_patterns_compile` below pins down
// that none of them actually do.
static RAW_PATTERNS: LazyLock<Vec<Regex>> =
    LazyLock::new(|| RAW_PATTERN_SOURCES.iter().filter_map(|p| Regex::new(p).ok()).collect());

static CALL_TOKEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_.]*)\s*\(").ok());
static IMPORT_TOKEN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:import|from|use|require)\s+([A-Za-z_][A-Za-z0-9_./:]*)").ok()
});
static ATTRIBUTE_TOKEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\.(__[a-zA-Z_]+__)").ok());

/// Scans `source` and returns every finding: dangerous calls, suspicious
/// imports, dangerous attribute access, unbalanced delimiters, and raw
/// pattern matches.
pub fn analyze_code(source: &str) -> Vec<ThreatEvent> {
    let mut events = Vec::new();
    events.extend(scan_calls(source));
    events.extend(scan_imports(source));
    events.extend(scan_attributes(source));
    events.extend(scan_balance(source));
    events.extend(scan_raw_patterns(source));
    events
}

fn scan_calls(source: &str) -> Vec<ThreatEvent> {
    let mut events = Vec::new();
    let Some(call_token) = CALL_TOKEN.as_ref() else {
        return events;
    };
    for capture in call_token.captures_iter(source) {
        let name = &capture[1];
        let tail = name.rsplit('.').next().unwrap_or(name);
        if DANGEROUS_FUNCTIONS.contains(name) || DANGEROUS_FUNCTIONS.contains(tail) {
            events.push(
                ThreatEvent::new(
                    ThreatType::MaliciousCode,
                    AuditSeverity::High,
                    "Dangerous Function Call",
                    format!("call to dangerous function: {name}"),
                    SOURCE,
                    "function_call_scan",
                )
                .with_confidence(0.9)
                .with_evidence("function_name", name),
            );
        }
    }
    events
}

fn scan_imports(source: &str) -> Vec<ThreatEvent> {
    let mut events = Vec::new();
    let Some(import_token) = IMPORT_TOKEN.as_ref() else {
        return events;
    };
    for capture in import_token.captures_iter(source) {
        let module = capture[1].split(['.', '/', ':']).next().unwrap_or(&capture[1]);
        if SUSPICIOUS_MODULES.contains(module) {
            let severity = if matches!(module, "os" | "subprocess" | "process" | "child_process") {
                AuditSeverity::High
            } else {
                AuditSeverity::Medium
            };
            events.push(
                ThreatEvent::new(
                    ThreatType::MaliciousCode,
                    severity,
                    "Suspicious Module Import",
                    format!("import of suspicious module: {module}"),
                    SOURCE,
                    "import_scan",
                )
                .with_confidence(0.7)
                .with_evidence("module_name", module),
            );
        }
    }
    events
}

fn scan_attributes(source: &str) -> Vec<ThreatEvent> {
    let mut events = Vec::new();
    let Some(attribute_token) = ATTRIBUTE_TOKEN.as_ref() else {
        return events;
    };
    for capture in attribute_token.captures_iter(source) {
        let matched = &capture[1];
        if DANGEROUS_ATTRIBUTES.contains(matched) {
            events.push(
                ThreatEvent::new(
                    ThreatType::MaliciousCode,
                    AuditSeverity::High,
                    "Dangerous Attribute Access",
                    format!("access to dangerous attribute: {matched}"),
                    SOURCE,
                    "attribute_scan",
                )
                .with_confidence(0.8)
                .with_evidence("attribute_name", matched),
            );
        }
    }
    events
}

fn scan_balance(source: &str) -> Vec<ThreatEvent> {
    let pairs = [('(', ')'), ('[', ']'), ('{', '}')];
    let mut stack = Vec::new();
    for ch in source.chars() {
        if let Some(&(open, _)) = pairs.iter().find(|(open, _)| *open == ch) {
            stack.push(open);
            continue;
        }
        if let Some(&(open, close)) = pairs.iter().find(|(_, close)| *close == ch) {
            if stack.pop() != Some(open) {
                return vec![ThreatEvent::new(
                    ThreatType::MaliciousCode,
                    AuditSeverity::Medium,
                    "Unbalanced Delimiters",
                    "source contains unbalanced delimiters, possible obfuscation",
                    SOURCE,
                    "balance_scan",
                )
                .with_confidence(0.6)];
            }
        }
    }
    if !stack.is_empty() {
        return vec![ThreatEvent::new(
            ThreatType::MaliciousCode,
            AuditSeverity::Medium,
            "Unbalanced Delimiters",
            "source contains unbalanced delimiters, possible obfuscation",
            SOURCE,
            "balance_scan",
        )
        .with_confidence(0.6)];
    }
    Vec::new()
}

fn scan_raw_patterns(source: &str) -> Vec<ThreatEvent> {
    let mut events = Vec::new();
    for pattern in RAW_PATTERNS.iter() {
        if let Some(found) = pattern.find(source) {
            events.push(
                ThreatEvent::new(
                    ThreatType::MaliciousCode,
                    AuditSeverity::High,
                    "Malicious Code Pattern Detected",
                    format!("detected dangerous pattern: {}", found.as_str()),
                    "pattern_detector",
                    "regex_pattern",
                )
                .with_confidence(0.8)
                .with_evidence("pattern", pattern.as_str()),
            );
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_eval_call() {
        let events = analyze_code("result = eval(user_input)");
        assert!(events.iter().any(|e| e.detection_method == "function_call_scan"));
    }

    #[test]
    fn detects_suspicious_import() {
        let events = analyze_code("import subprocess\nsubprocess.call(['ls'])");
        assert!(events.iter().any(|e| e.detection_method == "import_scan"));
    }

    #[test]
    fn detects_dangerous_attribute() {
        let events = analyze_code("frame.f_globals.__globals__['secret']");
        assert!(events.iter().any(|e| e.detection_method == "attribute_scan"));
    }

    #[test]
    fn detects_unbalanced_delimiters() {
        let events = analyze_code("def broken(: pass");
        assert!(events.iter().any(|e| e.detection_method == "balance_scan"));
    }

    #[test]
    fn clean_source_has_no_findings() {
        let events = analyze_code("fn add(a: i32, b: i32) -> i32 { a + b }");
        assert!(events.is_empty());
    }

    #[test]
    fn all_raw_patterns_compile() {
        assert_eq!(RAW_PATTERNS.len(), RAW_PATTERN_SOURCES.len());
    }

    #[test]
    fn all_token_regexes_compile() {
        assert!(CALL_TOKEN.is_some());
        assert!(IMPORT_TOKEN.is_some());
        assert!(ATTRIBUTE_TOKEN.is_some());
    }
}
