//! Append-only audit event sink with async batching (C7).
//!
//! This is the one component with no dependency on any other: every other component
//! writes through it, but it writes through nothing. See `SPEC_FULL.md` §4.1.
//!
//! ```
//! use security_core::audit::{AuditConfig, AuditLogger, AuditEventType, AuditLevel, AuditSeverity};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let logger = AuditLogger::in_memory(AuditConfig::default());
//! logger.start().await;
//! let _ = logger.log(AuditEventType::SystemStart, "boot", AuditLevel::Info, AuditSeverity::Low).await;
//! logger.stop().await.ok();
//! # }
//! ```

mod decorators;
mod error;
mod event;
mod logger;
mod storage;

pub use decorators::OperationAuditor;
pub use error::{AuditError, AuditResult};
pub use event::{AuditEvent, AuditEventType, AuditLevel, AuditSeverity};
pub use logger::{AuditConfig, AuditLogger, AuditStats};
pub use storage::{AuditStorage, EventQuery, FileAuditStorage, MemoryAuditStorage, RotationPolicy};
