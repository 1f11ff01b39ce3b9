//! `SandboxEngine`: the C5 facade — environment lifecycle, tier dispatch,
//! and running statistics.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditEventType, AuditLevel, AuditLogger, AuditSeverity};

use super::error::SandboxResult;
use super::process::ProcessTierExecutor;
use super::tier::{ContainerTierExecutor, HardwareTierExecutor, TierExecutor, VmTierExecutor};
use super::types::{ExecutionEnvironment, ExecutionResult, SandboxConfiguration, SandboxTier};

#[derive(Debug, Default, Clone, Copy)]
pub struct SandboxStatistics {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub blocked_executions: u64,
    pub security_violations: u64,
    pub active_environments: usize,
}

pub struct SandboxEngine {
    configurations: Mutex<HashMap<String, SandboxConfiguration>>,
    active_environments: Mutex<HashMap<String, ExecutionEnvironment>>,
    process_executor: ProcessTierExecutor,
    container_executor: ContainerTierExecutor,
    vm_executor: VmTierExecutor,
    hardware_executor: HardwareTierExecutor,
    stats: Mutex<SandboxStatistics>,
    audit: Option<Arc<AuditLogger>>,
}

impl SandboxEngine {
    pub fn new(audit: Option<Arc<AuditLogger>>) -> Self {
        let mut configurations = HashMap::new();
        configurations.insert("default".to_string(), SandboxConfiguration::default());
        configurations.insert("strict".to_string(), SandboxConfiguration::strict("strict"));
        configurations.insert("development".to_string(), SandboxConfiguration::development("development"));

        Self {
            configurations: Mutex::new(configurations),
            active_environments: Mutex::new(HashMap::new()),
            process_executor: ProcessTierExecutor::new(),
            container_executor: ContainerTierExecutor,
            vm_executor: VmTierExecutor,
            hardware_executor: HardwareTierExecutor,
            stats: Mutex::new(SandboxStatistics::default()),
            audit,
        }
    }

    pub fn register_configuration(&self, name: impl Into<String>, config: SandboxConfiguration) {
        self.configurations.lock().insert(name.into(), config);
    }

    pub fn get_configuration(&self, name: &str) -> Option<SandboxConfiguration> {
        self.configurations.lock().get(name).cloned()
    }

    fn executor_for(&self, tier: SandboxTier) -> &dyn TierExecutor {
        match tier {
            SandboxTier::Process => &self.process_executor,
            SandboxTier::Container => &self.container_executor,
            SandboxTier::Vm => &self.vm_executor,
            SandboxTier::Hardware => &self.hardware_executor,
        }
    }

    /// Creates a fresh environment: a unique id plus `workspace`/`temp`/`logs`
    /// directories under the system temp root.
    pub async fn create_environment(
        &self,
        config_name: &str,
        custom_config: Option<SandboxConfiguration>,
    ) -> SandboxResult<ExecutionEnvironment> {
        let config = custom_config
            .or_else(|| self.get_configuration(config_name))
            .unwrap_or_else(|| SandboxConfiguration {
                name: config_name.to_string(),
                ..SandboxConfiguration::default()
            });

        let sandbox_id = format!("sandbox_{}", &Uuid::new_v4().simple().to_string()[..8]);
        let base_dir = PathBuf::from(std::env::temp_dir())
            .join("security_core_sandbox")
            .join(&sandbox_id);

        let working_directory = base_dir.join("workspace");
        let temp_directory = base_dir.join("temp");
        let log_directory = base_dir.join("logs");
        let (wd, td, ld) = (working_directory.clone(), temp_directory.clone(), log_directory.clone());
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&wd)?;
            std::fs::create_dir_all(&td)?;
            std::fs::create_dir_all(&ld)?;
            Ok(())
        })
        .await??;

        let mut environment_variables = HashMap::new();
        environment_variables.insert("PYTHONPATH".to_string(), working_directory.display().to_string());
        environment_variables.insert("TMPDIR".to_string(), temp_directory.display().to_string());
        environment_variables.insert("HOME".to_string(), working_directory.display().to_string());
        environment_variables.insert("USER".to_string(), "sandbox".to_string());

        let environment = ExecutionEnvironment {
            sandbox_id: sandbox_id.clone(),
            config: config.clone(),
            working_directory,
            temp_directory,
            log_directory,
            process_id: None,
            start_time: None,
            end_time: None,
            environment_variables,
        };

        self.active_environments.lock().insert(sandbox_id.clone(), environment.clone());
        let active_count = self.active_environments.lock().len();
        self.stats.lock().active_environments = active_count;

        if let Some(audit) = &self.audit {
            let event = AuditEvent::new(
                AuditEventType::SandboxCreate,
                format!("created sandbox environment {sandbox_id}"),
                AuditLevel::Info,
                AuditSeverity::Low,
            )
            .with_component("sandbox_engine")
            .with_metadata("tier", format!("{:?}", config.tier))
            .with_metadata("mode", format!("{:?}", config.mode));
            let _ = audit.log_event(event).await;
        }

        Ok(environment)
    }

    /// Runs `code` inside `environment` via the tier it was created for.
    pub async fn execute_code(
        &self,
        code: &str,
        environment: &mut ExecutionEnvironment,
        user_id: Option<&str>,
    ) -> ExecutionResult {
        self.stats.lock().total_executions += 1;

        let executor = self.executor_for(environment.config.tier);
        let result = match executor.execute(code, environment, user_id).await {
            Ok(result) => result,
            Err(err) => {
                let mut blocked = ExecutionResult::blocked(
                    environment.sandbox_id.clone(),
                    format!("sandbox execution failed: {err}"),
                    AuditSeverity::Critical,
                );
                blocked.security_violations.push(crate::validation::SecurityViolation::new(
                    crate::validation::ThreatType::SystemCallDenied,
                    AuditSeverity::Critical,
                    format!("sandbox failure: {err}"),
                    "sandbox_engine",
                ));
                blocked
            }
        };

        {
            let mut stats = self.stats.lock();
            if result.success {
                stats.successful_executions += 1;
            } else {
                stats.blocked_executions += 1;
            }
            stats.security_violations += result.security_violations.len() as u64;
        }

        self.active_environments
            .lock()
            .insert(environment.sandbox_id.clone(), environment.clone());

        if let Some(audit) = &self.audit {
            let event = AuditEvent::new(
                AuditEventType::SandboxExecute,
                format!("code execution completed in sandbox {}", environment.sandbox_id),
                AuditLevel::Info,
                result.threat_level,
            )
            .with_component("sandbox_engine")
            .with_metadata("exit_code", result.exit_code.to_string())
            .with_metadata("success", result.success.to_string())
            .with_metadata("violations", result.security_violations.len().to_string());
            let event = match user_id {
                Some(user_id) => event.with_user(user_id),
                None => event,
            };
            let _ = audit.log_event(event).await;
        }

        result
    }

    /// Terminates any still-running children, removes the environment's
    /// directory tree, and drops the registration. Idempotent.
    pub async fn destroy_environment(&self, sandbox_id: &str) -> bool {
        let environment = self.active_environments.lock().remove(sandbox_id);
        let Some(environment) = environment else {
            return false;
        };
        let active_count = self.active_environments.lock().len();
        self.stats.lock().active_environments = active_count;

        let executor = self.executor_for(environment.config.tier);
        let _ = executor.cleanup(&environment).await;

        if let Some(audit) = &self.audit {
            let event = AuditEvent::new(
                AuditEventType::SandboxDestroy,
                format!("destroyed sandbox environment {sandbox_id}"),
                AuditLevel::Info,
                AuditSeverity::Low,
            )
            .with_component("sandbox_engine");
            let _ = audit.log_event(event).await;
        }

        true
    }

    pub async fn cleanup_all(&self) {
        let ids: Vec<String> = self.active_environments.lock().keys().cloned().collect();
        for id in ids {
            self.destroy_environment(&id).await;
        }
    }

    pub fn list_active_environments(&self) -> Vec<String> {
        self.active_environments.lock().keys().cloned().collect()
    }

    pub fn get_statistics(&self) -> SandboxStatistics {
        let mut snapshot = *self.stats.lock();
        snapshot.active_environments = self.active_environments.lock().len();
        snapshot
    }
}

impl Default for SandboxEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sandbox::types::IsolationMode;

    #[tokio::test]
    async fn create_environment_lays_out_workspace_temp_and_logs() {
        let engine = SandboxEngine::new(None);
        let env = engine.create_environment("default", None).await.unwrap();
        assert!(env.working_directory.exists());
        assert!(env.temp_directory.exists());
        assert!(env.log_directory.exists());
        assert_eq!(env.environment_variables.get("USER").map(String::as_str), Some("sandbox"));
        engine.destroy_environment(&env.sandbox_id).await;
    }

    #[tokio::test]
    async fn execute_code_runs_under_process_tier_and_updates_statistics() {
        let engine = SandboxEngine::new(None);
        let mut env = engine.create_environment("default", None).await.unwrap();
        env.config.interpreter = "true".to_string();

        let result = engine.execute_code("ignored", &mut env, Some("alice")).await;
        assert!(result.success);

        let stats = engine.get_statistics();
        assert_eq!(stats.total_executions, 1);
        assert_eq!(stats.successful_executions, 1);
        engine.destroy_environment(&env.sandbox_id).await;
    }

    #[tokio::test]
    async fn malicious_code_is_blocked_and_counted() {
        let engine = SandboxEngine::new(None);
        let mut env = engine.create_environment("default", None).await.unwrap();

        let result = engine.execute_code("eval(x)", &mut env, None).await;
        assert!(!result.success);

        let stats = engine.get_statistics();
        assert_eq!(stats.blocked_executions, 1);
        engine.destroy_environment(&env.sandbox_id).await;
    }

    #[tokio::test]
    async fn development_config_is_registered_by_default() {
        let engine = SandboxEngine::new(None);
        let config = engine.get_configuration("development").unwrap();
        assert_eq!(config.mode, IsolationMode::Development);
    }

    #[tokio::test]
    async fn destroy_environment_is_idempotent() {
        let engine = SandboxEngine::new(None);
        let env = engine.create_environment("default", None).await.unwrap();
        assert!(engine.destroy_environment(&env.sandbox_id).await);
        assert!(!engine.destroy_environment(&env.sandbox_id).await);
    }

    #[tokio::test]
    async fn cleanup_all_empties_the_registry() {
        let engine = SandboxEngine::new(None);
        engine.create_environment("default", None).await.unwrap();
        engine.create_environment("default", None).await.unwrap();
        assert_eq!(engine.list_active_environments().len(), 2);
        engine.cleanup_all().await;
        assert!(engine.list_active_environments().is_empty());
    }
}
