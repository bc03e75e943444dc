//! The blogroll service and its pipeline.
//!
//! A blogroll is built in four steps, each in its own module:
//!
//! 1. fetch the OPML subscription document ([`DocumentFetcher`])
//! 2. parse it into [`SubscriptionEntry`] values ([`parse_subscriptions`])
//! 3. attach every feed's latest post ([`FeedEnricher`])
//! 4. order by recency ([`aggregate`])
//!
//! [`Blogroll`] runs the pipeline behind a per-instance [`CacheManager`],
//! so a second request within the list TTL performs no network access.

mod aggregate;
mod enrich;
mod types;

use std::time::Duration;
use thiserror::Error;

use crate::feed::{
    parse_subscriptions, CachePolicy, Diagnostics, DocumentFetcher, FeedClient, FetchError,
    ParseError,
};
use crate::storage::{cache_key, CacheError, CacheManager, CacheStore};

pub use aggregate::aggregate;
pub use enrich::FeedEnricher;
pub use types::{AggregatedList, PostSummary, SubscriptionEntry};

/// Why a blogroll could not be produced.
///
/// Per-feed failures never show up here; they only cost the affected entry
/// its latest post.
#[derive(Debug, Error)]
pub enum BlogrollError {
    /// The subscription document could not be retrieved
    #[error("Failed to fetch subscription list: {0}")]
    Fetch(#[from] FetchError),
    /// The subscription document is not usable OPML
    #[error("Failed to parse subscription list: {0}")]
    Parse(#[from] ParseError),
    /// No subscription source URL was configured
    #[error("No subscription source URL configured")]
    NoSource,
}

/// Tuning knobs of a [`Blogroll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlogrollOptions {
    /// Lifetime of a cached aggregated list.
    pub list_ttl: Duration,
    /// Maximum age of a per-feed copy reused during enrichment.
    pub feed_ttl: Duration,
    /// Overall bound on retrieving the subscription document.
    pub fetch_timeout: Duration,
    /// Bound on each feed fetch during enrichment.
    pub feed_timeout: Duration,
    pub max_concurrent_fetches: usize,
    pub diagnostics: Diagnostics,
}

impl Default for BlogrollOptions {
    fn default() -> Self {
        Self {
            list_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            feed_ttl: Duration::from_secs(60 * 60),
            fetch_timeout: Duration::from_secs(30),
            feed_timeout: Duration::from_secs(20),
            max_concurrent_fetches: 10,
            diagnostics: Diagnostics::Quiet,
        }
    }
}

/// Cached blogroll builder.
///
/// Generic over where the OPML document comes from (`D`), how feeds are
/// read (`F`) and where aggregated lists are kept (`S`).
pub struct Blogroll<D, F, S> {
    fetcher: D,
    enricher: FeedEnricher<F>,
    cache: CacheManager<S>,
    options: BlogrollOptions,
}

impl<D, F, S> Blogroll<D, F, S>
where
    D: DocumentFetcher,
    F: FeedClient,
    S: CacheStore,
{
    pub fn new(fetcher: D, feeds: F, store: S, options: BlogrollOptions) -> Self {
        let enricher = FeedEnricher::new(
            feeds,
            options.feed_timeout,
            options.max_concurrent_fetches,
            options.diagnostics,
        );
        Self {
            fetcher,
            enricher,
            cache: CacheManager::new(store),
            options,
        }
    }

    pub fn cache(&self) -> &CacheManager<S> {
        &self.cache
    }

    pub fn options(&self) -> &BlogrollOptions {
        &self.options
    }

    /// Returns the blogroll of `instance_id`, building it from `source_url`
    /// on a cache miss.
    ///
    /// A failure to fetch or parse the subscription document is returned and
    /// leaves the cache untouched. A cache that cannot be read or written is
    /// logged and worked around.
    pub async fn get_blogroll(
        &self,
        instance_id: &str,
        source_url: &str,
    ) -> Result<AggregatedList, BlogrollError> {
        if source_url.trim().is_empty() {
            return Err(BlogrollError::NoSource);
        }

        let key = cache_key(instance_id);
        match self.cache.get(&key).await {
            Ok(Some(list)) => {
                tracing::debug!(instance = %instance_id, entries = list.len(), "Blogroll cache hit");
                return Ok(list);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(instance = %instance_id, error = %e, "Blogroll cache unreadable, rebuilding");
            }
        }

        let list = self.build(source_url).await?;

        if let Err(e) = self.cache.set(&key, &list, self.options.list_ttl).await {
            tracing::warn!(instance = %instance_id, error = %e, "Failed to cache blogroll");
        }

        tracing::info!(
            instance = %instance_id,
            entries = list.len(),
            with_posts = list.iter().filter(|e| e.latest_post.is_some()).count(),
            "Built blogroll"
        );
        Ok(list)
    }

    /// Drops the cached blogroll of `instance_id` and re-fetches its feeds.
    ///
    /// The feeds go through the feed client with a zero-age policy, so the
    /// next [`get_blogroll`](Self::get_blogroll) sees fresh items even when
    /// the feed TTL has not run out. Returns the number of feeds refreshed.
    pub async fn invalidate(&self, instance_id: &str) -> Result<usize, CacheError> {
        let feed_urls = self.cache.invalidate_cascade(instance_id).await?;
        let refreshed = self.enricher.force_refresh(&feed_urls).await;

        tracing::info!(
            instance = %instance_id,
            feeds = feed_urls.len(),
            refreshed,
            "Invalidated blogroll"
        );
        Ok(refreshed)
    }

    async fn build(&self, source_url: &str) -> Result<AggregatedList, BlogrollError> {
        let document = tokio::time::timeout(
            self.options.fetch_timeout,
            self.fetcher.fetch_bytes(source_url),
        )
        .await
        .map_err(|_| FetchError::Timeout)??;

        let entries = parse_subscriptions(&document)?;
        tracing::debug!(source = %source_url, subscriptions = entries.len(), "Parsed subscription list");

        let enriched = self
            .enricher
            .enrich_all(entries, CachePolicy::Ttl(self.options.feed_ttl))
            .await;
        Ok(aggregate(enriched))
    }
}
