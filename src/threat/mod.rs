//! The Threat Detector (C4): static code analysis, behavioral anomaly
//! detection, alert aggregation, and automatic suspension on actionable
//! findings.
//!
//! ```no_run
//! # use security_core::threat::{ThreatDetector, BehaviorConfig};
//! # async fn run(detector: ThreatDetector) {
//! let result = detector.analyze_code("eval(x)", Some("alice"), None, None).await;
//! assert!(result.is_threat);
//! # }
//! ```

mod alert;
mod behavior;
mod code_analysis;
mod detector;
mod error;
mod event;

pub use alert::SecurityAlert;
pub use behavior::{BehaviorAnalyzer, BehaviorConfig};
pub use code_analysis::analyze_code;
pub use detector::{DetectionStats, ThreatDetector};
pub use error::{ThreatError, ThreatResult};
pub use event::{ThreatAnalysisResult, ThreatEvent};
