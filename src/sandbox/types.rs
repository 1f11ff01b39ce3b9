//! Shared types for the sandbox subsystem: quotas, environment records, and results.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::AuditSeverity;
use crate::validation::SecurityViolation;

/// Isolation strength available for a sandboxed execution.
///
/// Only [`SandboxTier::Process`] ships a functional executor; the rest are
/// registration-only stubs (see [`crate::sandbox::TierExecutor`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxTier {
    Process,
    Container,
    Vm,
    Hardware,
}

/// How permissive a sandboxed environment is about borderline findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IsolationMode {
    Strict,
    #[default]
    Standard,
    Permissive,
    /// Skips the pre-execution HIGH/CRITICAL short-circuit so a developer can
    /// still run and inspect code a scan flags.
    Development,
}

/// Per-environment resource ceilings, enforced on Unix via `setrlimit` and
/// polled during execution on platforms with a [`crate::sandbox::ProcessSampler`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceQuota {
    pub cpu_cores: f64,
    pub cpu_time_limit_secs: u64,
    pub cpu_usage_ceiling_pct: f64,

    pub memory_limit_bytes: u64,
    pub swap_limit_bytes: u64,

    pub disk_quota_bytes: u64,
    pub file_count_limit: u64,

    pub network_bandwidth_bytes_per_sec: u64,
    pub connection_limit: u32,

    pub process_limit: u64,
    pub thread_limit: u64,
    pub file_descriptor_limit: u64,

    pub execution_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for ResourceQuota {
    fn default() -> Self {
        Self {
            cpu_cores: 1.0,
            cpu_time_limit_secs: 30,
            cpu_usage_ceiling_pct: 80.0,
            memory_limit_bytes: 128 * 1024 * 1024,
            swap_limit_bytes: 256 * 1024 * 1024,
            disk_quota_bytes: 100 * 1024 * 1024,
            file_count_limit: 1000,
            network_bandwidth_bytes_per_sec: 1024 * 1024,
            connection_limit: 10,
            process_limit: 10,
            thread_limit: 50,
            file_descriptor_limit: 100,
            execution_timeout_secs: 60,
            idle_timeout_secs: 300,
        }
    }
}

/// Named, reusable sandbox configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfiguration {
    pub name: String,
    pub tier: SandboxTier,
    pub mode: IsolationMode,
    pub quota: ResourceQuota,
    /// Interpreter used to run materialized scripts. The environment layout
    /// (`PYTHONPATH`/`HOME`/`USER`) is Python-flavored by inheritance; other
    /// interpreters still receive it; unused variables are simply ignored.
    pub interpreter: String,
}

impl Default for SandboxConfiguration {
    fn default() -> Self {
        Self {
            name: "default_sandbox".to_string(),
            tier: SandboxTier::Process,
            mode: IsolationMode::Standard,
            quota: ResourceQuota::default(),
            interpreter: "python3".to_string(),
        }
    }
}

impl SandboxConfiguration {
    pub fn strict(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tier: SandboxTier::Process,
            mode: IsolationMode::Strict,
            quota: ResourceQuota {
                cpu_time_limit_secs: 10,
                memory_limit_bytes: 64 * 1024 * 1024,
                execution_timeout_secs: 30,
                ..ResourceQuota::default()
            },
            interpreter: "python3".to_string(),
        }
    }

    pub fn development(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tier: SandboxTier::Process,
            mode: IsolationMode::Development,
            quota: ResourceQuota {
                cpu_time_limit_secs: 60,
                memory_limit_bytes: 256 * 1024 * 1024,
                execution_timeout_secs: 300,
                ..ResourceQuota::default()
            },
            interpreter: "python3".to_string(),
        }
    }
}

/// A live (or torn-down) execution environment: a unique id plus its
/// workspace/temp/log directories and runtime bookkeeping.
#[derive(Debug, Clone)]
pub struct ExecutionEnvironment {
    pub sandbox_id: String,
    pub config: SandboxConfiguration,
    pub working_directory: PathBuf,
    pub temp_directory: PathBuf,
    pub log_directory: PathBuf,

    pub process_id: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    pub environment_variables: HashMap<String, String>,
}

impl ExecutionEnvironment {
    pub fn is_active(&self) -> bool {
        self.start_time.is_some() && self.end_time.is_none()
    }

    pub fn root_directory(&self) -> PathBuf {
        self.working_directory
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.working_directory.clone())
    }
}

/// Resource consumption sampled over the lifetime of one execution.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub peak_cpu_pct: f64,
    pub peak_memory_bytes: u64,
    pub peak_file_descriptors: u64,
    pub wall_time_secs: f64,
}

/// Outcome of one `execute_code` call.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_secs: f64,
    pub resource_usage: ResourceUsage,
    pub security_violations: Vec<SecurityViolation>,
    pub threat_level: AuditSeverity,
    pub sandbox_id: String,
}

impl ExecutionResult {
    pub fn blocked(sandbox_id: impl Into<String>, reason: impl Into<String>, threat_level: AuditSeverity) -> Self {
        Self {
            success: false,
            exit_code: -1,
            stdout: String::new(),
            stderr: reason.into(),
            execution_time_secs: 0.0,
            resource_usage: ResourceUsage::default(),
            security_violations: Vec::new(),
            threat_level,
            sandbox_id: sandbox_id.into(),
        }
    }
}
