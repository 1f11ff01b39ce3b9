//! Adapter Security Core
//!
//! A self-contained security substrate for hosts that load and run
//! third-party adapter code: authenticated sessions, RBAC/ABAC permission
//! checks, input/output validation, static and behavioral threat detection,
//! sandboxed code execution, an ordered request-processing middleware chain,
//! and an append-only audit trail tying all of the above together.
//!
//! # Core Components
//!
//! * [`audit`] — append-only event sink with async batching (C7)
//! * [`context`] — authenticated-session lifecycle (C1)
//! * [`permissions`] — cached RBAC/ABAC permission evaluation (C2)
//! * [`validation`] — input/business-logic/output checks (C3)
//! * [`threat`] — static code analysis and behavioral anomaly detection (C4)
//! * [`sandbox`] — isolated code execution with resource quotas (C5)
//! * [`middleware_chain`] — ordered per-request security stage pipeline (C6)
//! * [`manager`] — [`manager::SecurityManager`], the composition root over C1-C7
//! * [`globals`] — process-wide singleton accessors for ergonomics
//!
//! # Example
//!
//! ```no_run
//! use security_core::config::SecurityServiceConfig;
//! use security_core::manager::SecurityManager;
//! use security_core::middleware_chain::RequestContext;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let manager = SecurityManager::builder().build().await.unwrap();
//! manager.start().await;
//!
//! let mut ctx = RequestContext::new("adapters/demo", "execute");
//! let result = manager.process_request(&mut ctx).await;
//! assert!(!result.action.is_blocked());
//!
//! manager.shutdown().await.unwrap();
//! # let _ = SecurityServiceConfig::default();
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod context;
pub mod error;
pub mod globals;
pub mod manager;
pub mod middleware_chain;
pub mod permissions;
pub mod sandbox;
pub mod threat;
pub mod validation;

pub use config::{AuditSink, SecurityServiceConfig, SecurityServiceConfigBuilder};
pub use error::{SecurityCoreError, SecurityCoreResult};
pub use manager::{CredentialVerifier, SecurityManager, SecurityManagerBuilder};
