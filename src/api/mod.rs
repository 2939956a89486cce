pub mod change_feed;
pub mod client;
pub mod error;
pub mod http;
pub mod rate_limiter;
pub mod wire;

pub use change_feed::{ChangeEvent, ChangeFeed, ChangeFeedManager};
pub use client::{RemoteStore, SaveAck, SiteMetadata, StatResult};
pub use error::ApiError;
pub use http::HttpRemoteStore;
pub use rate_limiter::{RateLimitConfig, RateLimiter};
