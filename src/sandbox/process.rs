//! `ProcessTierExecutor`: the one isolation tier this core actually runs
//! code under — a plain OS process with `setrlimit` ceilings, a polling
//! resource monitor, and a code-analysis pre-check.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::time::timeout;
use uuid::Uuid;

use crate::audit::AuditSeverity;
use crate::validation::{SecurityViolation, ThreatType};

use super::error::SandboxResult;
use super::sampler::{default_sampler, ProcessSampler};
use super::types::{ExecutionEnvironment, ExecutionResult, IsolationMode, ResourceQuota, ResourceUsage, SandboxTier};
use super::tier::TierExecutor;

const MONITOR_INTERVAL: Duration = Duration::from_millis(100);
const KILL_GRACE: Duration = Duration::from_secs(1);

#[derive(Default)]
pub struct ProcessTierExecutor;

impl ProcessTierExecutor {
    pub fn new() -> Self {
        Self
    }

    fn pre_check(&self, code: &str, mode: IsolationMode) -> Option<(Vec<SecurityViolation>, AuditSeverity)> {
        let findings = crate::threat::analyze_code(code);
        if findings.is_empty() {
            return None;
        }
        let worst = findings.iter().map(|f| f.severity).max().unwrap_or(AuditSeverity::Low);
        if worst < AuditSeverity::High || mode == IsolationMode::Development {
            return None;
        }
        let violations = findings
            .into_iter()
            .map(|f| SecurityViolation::new(f.threat_type, f.severity, f.description, "code_analysis"))
            .collect();
        Some((violations, worst))
    }

    async fn materialize(
        &self,
        code: &str,
        environment: &ExecutionEnvironment,
        interpreter: &str,
    ) -> SandboxResult<std::path::PathBuf> {
        let extension = if interpreter.contains("python") { "py" } else { "txt" };
        let path = environment.temp_directory.join(format!("script_{}.{extension}", Uuid::new_v4().simple()));
        let temp_directory = environment.temp_directory.clone();
        let code = code.to_string();
        let write_path = path.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&temp_directory)?;
            std::fs::write(&write_path, code)?;
            Ok(())
        })
        .await??;
        Ok(path)
    }

    fn apply_resource_limits(&self, quota: ResourceQuota) -> impl FnMut() -> std::io::Result<()> + Send + Sync + 'static {
        move || {
            #[cfg(unix)]
            {
                use nix::sys::resource::{setrlimit, Resource};
                let _ = setrlimit(Resource::RLIMIT_CPU, quota.cpu_time_limit_secs, quota.cpu_time_limit_secs);
                let _ = setrlimit(Resource::RLIMIT_AS, quota.memory_limit_bytes, quota.memory_limit_bytes);
                let _ = setrlimit(Resource::RLIMIT_FSIZE, quota.disk_quota_bytes, quota.disk_quota_bytes);
                let _ = setrlimit(Resource::RLIMIT_NPROC, quota.process_limit, quota.process_limit);
                let _ = setrlimit(Resource::RLIMIT_NOFILE, quota.file_descriptor_limit, quota.file_descriptor_limit);
            }
            Ok(())
        }
    }
}

#[async_trait]
impl TierExecutor for ProcessTierExecutor {
    fn tier(&self) -> SandboxTier {
        SandboxTier::Process
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        code: &str,
        environment: &mut ExecutionEnvironment,
        _user_id: Option<&str>,
    ) -> SandboxResult<ExecutionResult> {
        let started_at = Instant::now();
        let quota = environment.config.quota;

        if let Some((violations, threat_level)) = self.pre_check(code, environment.config.mode) {
            let mut result = ExecutionResult::blocked(
                environment.sandbox_id.clone(),
                "blocked by pre-execution security check",
                threat_level,
            );
            result.security_violations = violations;
            return Ok(result);
        }

        let script_path = self.materialize(code, environment, &environment.config.interpreter).await?;

        let mut command = tokio::process::Command::new(&environment.config.interpreter);
        command
            .arg(&script_path)
            .current_dir(&environment.working_directory)
            .env_clear()
            .envs(&environment.environment_variables)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        {
            // SAFETY: the closure only calls async-signal-safe libc wrappers
            // (getrlimit/setrlimit) before exec, as required by `pre_exec`.
            unsafe {
                command.pre_exec(self.apply_resource_limits(quota));
            }
        }
        #[cfg(not(unix))]
        {
            tracing::warn!("resource limits are not enforced on non-Unix targets");
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                let mut result = ExecutionResult::blocked(
                    environment.sandbox_id.clone(),
                    format!("spawn failed: {err}"),
                    AuditSeverity::High,
                );
                result.security_violations.push(SecurityViolation::new(
                    ThreatType::SystemCallDenied,
                    AuditSeverity::High,
                    format!("failed to spawn sandboxed process: {err}"),
                    "process_executor",
                ));
                let _ = std::fs::remove_file(&script_path);
                return Ok(result);
            }
        };

        let pid = child.id();
        environment.process_id = pid;
        environment.start_time = Some(chrono::Utc::now());

        let mut violations = Vec::new();
        let mut peak = ResourceUsage::default();
        let mut sampler: Box<dyn ProcessSampler> = default_sampler();
        let mut killed_for_breach = false;

        let wait_future = async {
            loop {
                match timeout(MONITOR_INTERVAL, child.wait()).await {
                    Ok(exit) => return exit,
                    Err(_) => {
                        if let Some(pid) = pid {
                            if let Some(sample) = sampler.sample(pid) {
                                peak.peak_cpu_pct = peak.peak_cpu_pct.max(sample.cpu_pct);
                                peak.peak_memory_bytes = peak.peak_memory_bytes.max(sample.rss_bytes);
                                peak.peak_file_descriptors = peak.peak_file_descriptors.max(sample.file_descriptors);

                                if sample.rss_bytes > quota.memory_limit_bytes {
                                    violations.push(SecurityViolation::new(
                                        ThreatType::ResourceLimitExceeded,
                                        AuditSeverity::High,
                                        format!("memory limit exceeded: {} bytes", sample.rss_bytes),
                                        "resource_monitor",
                                    ));
                                    terminate_then_kill(pid).await;
                                    killed_for_breach = true;
                                    continue;
                                }
                                if sample.cpu_pct > quota.cpu_usage_ceiling_pct {
                                    violations.push(SecurityViolation::new(
                                        ThreatType::ResourceLimitExceeded,
                                        AuditSeverity::Medium,
                                        format!("cpu usage exceeded: {:.2}%", sample.cpu_pct),
                                        "resource_monitor",
                                    ));
                                }
                                if sample.file_descriptors > quota.file_descriptor_limit {
                                    violations.push(SecurityViolation::new(
                                        ThreatType::ResourceLimitExceeded,
                                        AuditSeverity::Medium,
                                        format!("file descriptor limit exceeded: {}", sample.file_descriptors),
                                        "resource_monitor",
                                    ));
                                }
                            }
                        }
                        if started_at.elapsed() > Duration::from_secs(quota.execution_timeout_secs) {
                            violations.push(SecurityViolation::new(
                                ThreatType::ResourceLimitExceeded,
                                AuditSeverity::High,
                                format!("execution timeout exceeded: {:.2}s", started_at.elapsed().as_secs_f64()),
                                "resource_monitor",
                            ));
                            if let Some(pid) = pid {
                                terminate_then_kill(pid).await;
                            }
                            killed_for_breach = true;
                            return child.wait().await;
                        }
                    }
                }
            }
        };

        let exit = timeout(
            Duration::from_secs(quota.execution_timeout_secs) + KILL_GRACE + Duration::from_secs(5),
            wait_future,
        )
        .await;

        environment.end_time = Some(chrono::Utc::now());
        let _ = std::fs::remove_file(&script_path);

        let exit_code = match exit {
            Ok(Ok(status)) => status.code().unwrap_or(-9),
            Ok(Err(_)) | Err(_) => {
                if let Some(pid) = pid {
                    terminate_then_kill(pid).await;
                }
                -9
            }
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(mut out) = child.stdout.take() {
            let _ = out.read_to_string(&mut stdout).await;
        }
        if let Some(mut err) = child.stderr.take() {
            let _ = err.read_to_string(&mut stderr).await;
        }

        peak.wall_time_secs = started_at.elapsed().as_secs_f64();

        let mut threat_level = AuditSeverity::Low;
        if !violations.is_empty() {
            threat_level = violations.iter().map(|v| v.severity).max().unwrap_or(AuditSeverity::Low);
        }

        Ok(ExecutionResult {
            success: exit_code == 0 && violations.is_empty() && !killed_for_breach,
            exit_code,
            stdout,
            stderr,
            execution_time_secs: peak.wall_time_secs,
            resource_usage: peak,
            security_violations: violations,
            threat_level,
            sandbox_id: environment.sandbox_id.clone(),
        })
    }

    async fn cleanup(&self, environment: &ExecutionEnvironment) -> SandboxResult<()> {
        if let Some(pid) = environment.process_id {
            terminate_then_kill(pid).await;
        }
        if environment.root_directory().exists() {
            std::fs::remove_dir_all(environment.root_directory())?;
        }
        Ok(())
    }
}

#[cfg(unix)]
async fn terminate_then_kill(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let nix_pid = Pid::from_raw(pid as i32);
    let _ = kill(nix_pid, Signal::SIGTERM);
    tokio::time::sleep(KILL_GRACE).await;
    let _ = kill(nix_pid, Signal::SIGKILL);
}

#[cfg(not(unix))]
async fn terminate_then_kill(_pid: u32) {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sandbox::test_support::fake_environment;

    #[tokio::test]
    async fn clean_code_executes_successfully() {
        let executor = ProcessTierExecutor::new();
        let mut env = fake_environment("process-ok");
        std::fs::create_dir_all(&env.working_directory).unwrap();
        std::fs::create_dir_all(&env.temp_directory).unwrap();
        env.config.interpreter = "true".to_string();

        let result = executor.execute("ignored", &mut env, None).await.unwrap();
        assert!(result.success);
        assert_eq!(result.exit_code, 0);

        let _ = std::fs::remove_dir_all(env.root_directory());
    }

    #[tokio::test]
    async fn malicious_code_is_blocked_before_spawn() {
        let executor = ProcessTierExecutor::new();
        let mut env = fake_environment("process-blocked");
        std::fs::create_dir_all(&env.working_directory).unwrap();
        std::fs::create_dir_all(&env.temp_directory).unwrap();

        let result = executor.execute("eval(x)", &mut env, None).await.unwrap();
        assert!(!result.success);
        assert!(result.exit_code < 0);
        assert!(!result.security_violations.is_empty());

        let _ = std::fs::remove_dir_all(env.root_directory());
    }

    #[tokio::test]
    async fn development_mode_skips_the_precheck_short_circuit() {
        let executor = ProcessTierExecutor::new();
        let mut env = fake_environment("process-dev");
        std::fs::create_dir_all(&env.working_directory).unwrap();
        std::fs::create_dir_all(&env.temp_directory).unwrap();
        env.config.mode = IsolationMode::Development;
        env.config.interpreter = "true".to_string();

        let result = executor.execute("eval(x)", &mut env, None).await.unwrap();
        assert!(result.exit_code >= 0 || result.exit_code == -9);

        let _ = std::fs::remove_dir_all(env.root_directory());
    }

    #[tokio::test]
    async fn unknown_interpreter_yields_a_spawn_failure_result() {
        let executor = ProcessTierExecutor::new();
        let mut env = fake_environment("process-spawn-fail");
        std::fs::create_dir_all(&env.working_directory).unwrap();
        std::fs::create_dir_all(&env.temp_directory).unwrap();
        env.config.interpreter = "definitely_not_a_real_binary_xyz".to_string();

        let result = executor.execute("print(1)", &mut env, None).await.unwrap();
        assert!(!result.success);
        assert!(result.exit_code < 0);

        let _ = std::fs::remove_dir_all(env.root_directory());
    }
}
