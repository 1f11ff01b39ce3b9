//! The `SecurityMiddleware` seam: `name`/`priority`/`enabled` plus the
//! `pre_process`/`process`/`post_process` hook triad the chain drives in order,
//! mirroring the teacher's `Middleware<O>` default-method shape.

use async_trait::async_trait;

use super::error::MiddlewareError;
use super::types::{RequestContext, SecurityMiddlewareResult};

#[async_trait]
pub trait SecurityMiddleware: Send + Sync {
    /// Stable identifier used for enable/disable and audit attribution.
    fn name(&self) -> &str;

    /// Execution order; lower runs first.
    fn priority(&self) -> u32;

    fn is_enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);

    /// Runs before `process`. Default is a no-op.
    async fn pre_process(&self, _ctx: &mut RequestContext) {}

    /// The stage's actual security decision.
    async fn process(&self, ctx: &mut RequestContext) -> Result<SecurityMiddlewareResult, MiddlewareError>;

    /// Runs after `process`, regardless of its outcome. Default is a no-op.
    async fn post_process(&self, _ctx: &RequestContext, _result: &SecurityMiddlewareResult) {}
}
