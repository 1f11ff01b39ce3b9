//! The `TierExecutor` seam: one functional PROCESS implementation plus
//! registration-only stubs for isolation tiers this core does not ship a
//! backend for.

use async_trait::async_trait;

use super::error::{SandboxError, SandboxResult};
use super::types::{ExecutionEnvironment, ExecutionResult, SandboxTier};

#[async_trait]
pub trait TierExecutor: Send + Sync {
    fn tier(&self) -> SandboxTier;

    fn is_available(&self) -> bool;

    async fn execute(
        &self,
        code: &str,
        environment: &mut ExecutionEnvironment,
        user_id: Option<&str>,
    ) -> SandboxResult<ExecutionResult>;

    async fn cleanup(&self, environment: &ExecutionEnvironment) -> SandboxResult<()>;
}

macro_rules! unavailable_tier {
    ($name:ident, $tier:expr, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Default)]
        pub struct $name;

        #[async_trait]
        impl TierExecutor for $name {
            fn tier(&self) -> SandboxTier {
                $tier
            }

            fn is_available(&self) -> bool {
                false
            }

            async fn execute(
                &self,
                _code: &str,
                _environment: &mut ExecutionEnvironment,
                _user_id: Option<&str>,
            ) -> SandboxResult<ExecutionResult> {
                Err(SandboxError::TierUnavailable($tier))
            }

            async fn cleanup(&self, _environment: &ExecutionEnvironment) -> SandboxResult<()> {
                Ok(())
            }
        }
    };
}

unavailable_tier!(
    ContainerTierExecutor,
    SandboxTier::Container,
    "Namespace/cgroup-backed isolation. No backend ships in this core."
);
unavailable_tier!(
    VmTierExecutor,
    SandboxTier::Vm,
    "Hypervisor-backed isolation. No backend ships in this core."
);
unavailable_tier!(
    HardwareTierExecutor,
    SandboxTier::Hardware,
    "Hardware-delegated isolation. No backend ships in this core."
);

#[cfg(test)]
mod tests {
    use super::*;

    async fn assert_unavailable(executor: &dyn TierExecutor, tier: SandboxTier) {
        assert_eq!(executor.tier(), tier);
        assert!(!executor.is_available());
        let mut env = crate::sandbox::test_support::fake_environment("stub-test");
        let err = executor.execute("print(1)", &mut env, None).await.unwrap_err();
        assert!(matches!(err, SandboxError::TierUnavailable(_)));
    }

    #[tokio::test]
    async fn container_tier_is_a_registration_only_stub() {
        assert_unavailable(&ContainerTierExecutor, SandboxTier::Container).await;
    }

    #[tokio::test]
    async fn vm_tier_is_a_registration_only_stub() {
        assert_unavailable(&VmTierExecutor, SandboxTier::Vm).await;
    }

    #[tokio::test]
    async fn hardware_tier_is_a_registration_only_stub() {
        assert_unavailable(&HardwareTierExecutor, SandboxTier::Hardware).await;
    }
}
