pub mod authorize;
pub mod cache;
pub mod catalog;
pub mod core;
pub mod error;
pub mod handler;
pub mod monitor;
pub mod pipeline;
pub mod rate_limit;
pub mod upstream;

pub use authorize::{AuthorizedCall, Authorizer};
pub use cache::ExpiringCache;
pub use catalog::Catalog;
pub use crate::core::{Gateway, GatewayState};
pub use error::GatewayError;
pub use monitor::UsageMonitor;
pub use rate_limit::RateLimiter;
pub use upstream::{BackendExecutor, UpstreamByteStream, WreqBackendExecutor};
