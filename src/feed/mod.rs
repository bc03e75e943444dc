//! Feed-side building blocks: everything that talks to the outside world.
//!
//! - [`opml`] - the subscription document parser (`quick-xml`)
//! - [`fetcher`] - HTTP retrieval with retry, timeout and size limits
//! - [`parser`] - RSS/Atom parsing using the `feed-rs` crate
//! - [`client`] - latest-items client with its own per-feed LRU cache
//!
//! # Example
//!
//! ```ignore
//! use blogroll::feed::{HttpFeedClient, HttpFetcher, CachePolicy, Diagnostics, FeedClient};
//!
//! let fetcher = HttpFetcher::new(reqwest::Client::new());
//! let feeds = HttpFeedClient::new(fetcher, 256);
//! let items = feeds
//!     .fetch_latest_items(url, CachePolicy::Refresh, Diagnostics::Quiet)
//!     .await?;
//! ```

/// Logs a per-feed problem at the severity picked by a [`Diagnostics`] value.
macro_rules! feed_diagnostic {
    ($diagnostics:expr, $($arg:tt)+) => {
        match $diagnostics {
            $crate::feed::Diagnostics::Verbose => tracing::warn!($($arg)+),
            $crate::feed::Diagnostics::Quiet => tracing::debug!($($arg)+),
        }
    };
}
pub(crate) use feed_diagnostic;

mod client;
mod fetcher;
mod opml;
mod parser;

pub use client::{
    CachePolicy, Diagnostics, FeedClient, FeedError, HttpFeedClient, DEFAULT_FEED_CACHE_CAPACITY,
};
pub use fetcher::{build_http_client, DocumentFetcher, FetchError, HttpFetcher};
pub use opml::{parse_subscriptions, split_handle, ParseError, ValidationError};
pub use parser::{parse_feed, FeedItem};
