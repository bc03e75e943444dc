use lru::LruCache;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

use super::fetcher::{FetchError, HttpFetcher};
use super::parser::{parse_feed, FeedItem};

/// Default number of feeds kept by [`HttpFeedClient`].
pub const DEFAULT_FEED_CACHE_CAPACITY: usize = 256;

/// Errors from fetching a feed's latest items.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
}

/// How long a previously fetched copy of a feed may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Reuse a copy younger than the given age.
    Ttl(Duration),
    /// Treat the cache as empty and fetch again. The fresh copy is still kept.
    Refresh,
}

impl CachePolicy {
    pub fn max_age(self) -> Duration {
        match self {
            CachePolicy::Ttl(age) => age,
            CachePolicy::Refresh => Duration::ZERO,
        }
    }
}

/// Severity of per-feed problems, such as server-error retries, reported
/// while fetching a feed.
///
/// Passed into each call so that one pass can be quiet without touching
/// any process-wide logging state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Diagnostics {
    /// Report feed failures as warnings.
    #[default]
    Verbose,
    /// Demote feed failures to debug output.
    Quiet,
}

/// Fetches the most recent items of a feed.
pub trait FeedClient: Send + Sync {
    /// Items come back in the feed's own order, which is assumed to be
    /// most recent first.
    fn fetch_latest_items(
        &self,
        url: &str,
        policy: CachePolicy,
        diagnostics: Diagnostics,
    ) -> impl Future<Output = Result<Vec<FeedItem>, FeedError>> + Send;
}

impl<T: FeedClient> FeedClient for Arc<T> {
    fn fetch_latest_items(
        &self,
        url: &str,
        policy: CachePolicy,
        diagnostics: Diagnostics,
    ) -> impl Future<Output = Result<Vec<FeedItem>, FeedError>> + Send {
        (**self).fetch_latest_items(url, policy, diagnostics)
    }
}

struct CachedFeed {
    items: Vec<FeedItem>,
    fetched_at: Instant,
}

/// [`FeedClient`] that fetches over HTTP and keeps recent feeds in an LRU.
pub struct HttpFeedClient {
    fetcher: HttpFetcher,
    cache: Mutex<LruCache<String, CachedFeed>>,
}

impl HttpFeedClient {
    pub fn new(fetcher: HttpFetcher, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            fetcher,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn cached(&self, url: &str, max_age: Duration) -> Option<Vec<FeedItem>> {
        let mut cache = self.cache.lock().ok()?;
        let cached = cache.get(url)?;
        (cached.fetched_at.elapsed() < max_age).then(|| cached.items.clone())
    }

    fn remember(&self, url: &str, items: Vec<FeedItem>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                url.to_string(),
                CachedFeed {
                    items,
                    fetched_at: Instant::now(),
                },
            );
        }
    }
}

impl FeedClient for HttpFeedClient {
    async fn fetch_latest_items(
        &self,
        url: &str,
        policy: CachePolicy,
        diagnostics: Diagnostics,
    ) -> Result<Vec<FeedItem>, FeedError> {
        if let Some(items) = self.cached(url, policy.max_age()) {
            tracing::debug!(feed = %url, "Feed cache hit");
            return Ok(items);
        }

        // Failures are reported once, by the caller that decides what they cost
        let bytes = self.fetcher.fetch_with(url, diagnostics).await.map_err(|e| {
            tracing::debug!(feed = %url, error = %e, "Feed fetch failed");
            FeedError::from(e)
        })?;

        let items = parse_feed(&bytes).map_err(|e| {
            tracing::debug!(feed = %url, error = %e, "Feed could not be parsed");
            FeedError::Parse(e.to_string())
        })?;

        tracing::debug!(feed = %url, items = items.len(), ?policy, "Fetched feed");
        self.remember(url, items.clone());
        Ok(items)
    }
}
