//! The default stage set, one module per stage.

pub mod authentication;
pub mod authorization;
pub mod ip_filter;
pub mod rate_limit;
pub mod threat_detection;

pub use authentication::AuthenticationMiddleware;
pub use authorization::AuthorizationMiddleware;
pub use ip_filter::IpFilterMiddleware;
pub use rate_limit::RateLimitMiddleware;
pub use threat_detection::ThreatDetectionMiddleware;
