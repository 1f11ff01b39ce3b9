//! The Middleware Chain (C6): a single entry point wrapping every request
//! with composable, ordered security stages.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use security_core::context::{ContextManager, ContextManagerConfig};
//! # use security_core::middleware_chain::{MiddlewareChain, RequestContext};
//! # use security_core::middleware_chain::stages::IpFilterMiddleware;
//! # async fn run() {
//! let context_manager = ContextManager::new(ContextManagerConfig::default(), None);
//! let chain = MiddlewareChain::new(context_manager, None);
//! chain.add_middleware(Box::new(IpFilterMiddleware::new()));
//! let mut ctx = RequestContext::new("adapters/demo", "execute");
//! let result = chain.process(&mut ctx).await;
//! assert!(!result.action.is_blocked());
//! # }
//! ```

mod chain;
mod error;
mod stage;
pub mod stages;
mod types;

pub use chain::{ChainStatistics, MiddlewareChain};
pub use error::MiddlewareError;
pub use stage::SecurityMiddleware;
pub use types::{MiddlewareAction, MiddlewareDecision, RequestContext, SecurityMiddlewareResult};
