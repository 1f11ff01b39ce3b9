//! The Sandbox Engine (C5): isolated code execution with resource quotas,
//! a pre-execution threat scan, and live resource monitoring.
//!
//! Only the [`SandboxTier::Process`] tier ships a functional executor; the
//! remaining tiers are registration-only stubs exercised by tests.

mod engine;
mod error;
mod process;
mod sampler;
mod tier;
mod types;

pub use engine::{SandboxEngine, SandboxStatistics};
pub use error::{SandboxError, SandboxResult};
pub use sampler::{ProcessSampler, Sample};
pub use tier::{ContainerTierExecutor, HardwareTierExecutor, TierExecutor, VmTierExecutor};
pub use types::{
    ExecutionEnvironment, ExecutionResult, IsolationMode, ResourceQuota, ResourceUsage,
    SandboxConfiguration, SandboxTier,
};

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;

    use super::types::{ExecutionEnvironment, SandboxConfiguration};

    /// A throwaway [`ExecutionEnvironment`] for tier-executor unit tests.
    /// Callers that actually spawn a process still need to create the
    /// directories themselves; this only sets up the paths and config.
    pub fn fake_environment(label: &str) -> ExecutionEnvironment {
        let base_dir = std::env::temp_dir().join("security_core_sandbox_test").join(label);
        let working_directory = base_dir.join("workspace");
        let temp_directory = base_dir.join("temp");
        let log_directory = base_dir.join("logs");

        let mut environment_variables = HashMap::new();
        environment_variables.insert("PYTHONPATH".to_string(), working_directory.display().to_string());
        environment_variables.insert("TMPDIR".to_string(), temp_directory.display().to_string());
        environment_variables.insert("HOME".to_string(), working_directory.display().to_string());
        environment_variables.insert("USER".to_string(), "sandbox".to_string());

        ExecutionEnvironment {
            sandbox_id: format!("sandbox_{label}"),
            config: SandboxConfiguration::default(),
            working_directory,
            temp_directory,
            log_directory,
            process_id: None,
            start_time: None,
            end_time: None,
            environment_variables,
        }
    }
}
