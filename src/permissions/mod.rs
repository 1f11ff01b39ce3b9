//! The Permission Engine (C2): a catalog of permissions/roles/policy rules plus a
//! cached, three-stage (policy rule → RBAC → ABAC) `check_permission` evaluator.
//!
//! ```no_run
//! # use security_core::permissions::{PermissionEngine, PermissionEngineConfig, AccessRequest};
//! # async fn run(engine: PermissionEngine) {
//! engine.assign_role("alice", "developer").ok();
//! let request = AccessRequest::new("alice", "adapters/demo", "execute");
//! let result = engine.check_permission(&request).await;
//! assert!(result.granted());
//! # }
//! ```

mod access;
mod cache;
mod conditions;
mod engine;
mod error;
mod model;

pub use access::{AccessDecision, AccessRequest, AccessResult};
pub use conditions::{evaluate, evaluate_str, parse, EvalContext, Expr, Value};
pub use engine::{CatalogSnapshot, PermissionEngine, PermissionEngineConfig, PermissionStats};
pub use error::{PermissionError, PermissionResult};
pub use model::{
    Permission, PermissionScope, PermissionType, PolicyEffect, PolicyRule, Role, RoleType,
};
