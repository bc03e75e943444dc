use chrono::{DateTime, Datelike, Utc};
use futures::future;
use futures::stream::{self, StreamExt};
use std::time::Duration;

use super::types::{PostSummary, SubscriptionEntry};
use crate::feed::{feed_diagnostic, CachePolicy, Diagnostics, FeedClient, FeedItem};

/// Attaches each subscription's latest post, fetching feeds concurrently.
pub struct FeedEnricher<F> {
    client: F,
    timeout: Duration,
    concurrency: usize,
    diagnostics: Diagnostics,
}

impl<F: FeedClient> FeedEnricher<F> {
    pub fn new(client: F, timeout: Duration, concurrency: usize, diagnostics: Diagnostics) -> Self {
        Self {
            client,
            timeout,
            concurrency: concurrency.max(1),
            diagnostics,
        }
    }

    /// Enriches every entry and returns them in their original order.
    ///
    /// Up to `concurrency` feeds are fetched at once. A failed, empty or
    /// timed-out feed leaves its entry without a post; it never affects the
    /// other entries.
    pub async fn enrich_all(
        &self,
        entries: Vec<SubscriptionEntry>,
        policy: CachePolicy,
    ) -> Vec<SubscriptionEntry> {
        let mut enriched: Vec<(usize, SubscriptionEntry)> =
            stream::iter(entries.into_iter().enumerate())
                .map(|(index, entry)| async move { (index, self.enrich(entry, policy).await) })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        // Completion order is arbitrary; restore parse order for the stable sort
        enriched.sort_unstable_by_key(|(index, _)| *index);
        enriched.into_iter().map(|(_, entry)| entry).collect()
    }

    /// Attaches the latest post to one entry. Entries without a feed pass through.
    pub async fn enrich(&self, mut entry: SubscriptionEntry, policy: CachePolicy) -> SubscriptionEntry {
        if entry.has_feed() {
            entry.latest_post = self.latest_post(&entry.xml_url, policy).await;
        }
        entry
    }

    /// Re-fetches `feed_urls` with [`CachePolicy::Refresh`] and discards the items.
    ///
    /// Leaves the feed client's cache holding fresh copies. Returns how many
    /// feeds were fetched successfully.
    pub async fn force_refresh(&self, feed_urls: &[String]) -> usize {
        stream::iter(feed_urls)
            .map(|url| async move {
                self.fetch_with_timeout(url, CachePolicy::Refresh)
                    .await
                    .is_some()
            })
            .buffer_unordered(self.concurrency)
            .fold(0, |count, refreshed| future::ready(count + usize::from(refreshed)))
            .await
    }

    async fn latest_post(&self, url: &str, policy: CachePolicy) -> Option<PostSummary> {
        let items = self.fetch_with_timeout(url, policy).await?;
        items.into_iter().next().map(summarize)
    }

    async fn fetch_with_timeout(&self, url: &str, policy: CachePolicy) -> Option<Vec<FeedItem>> {
        let fetch = self.client.fetch_latest_items(url, policy, self.diagnostics);
        match tokio::time::timeout(self.timeout, fetch).await {
            Ok(Ok(items)) => Some(items),
            Ok(Err(e)) => {
                feed_diagnostic!(self.diagnostics, feed = %url, error = %e, "Skipping latest post");
                None
            }
            Err(_) => {
                feed_diagnostic!(
                    self.diagnostics,
                    feed = %url,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Feed fetch timed out, skipping latest post"
                );
                None
            }
        }
    }
}

/// Builds the summary shown for a feed's first item.
fn summarize(item: FeedItem) -> PostSummary {
    let (published_display, sort_key) = match item.published {
        Some(at) => (at.format("%-d %B %Y").to_string(), sort_key(at)),
        None => (String::new(), String::new()),
    };

    PostSummary {
        title: item.title,
        permalink: item.permalink,
        published_display,
        sort_key,
    }
}

/// Fixed-width `YYYYMMDDHHMMSS` key. Years outside 0..=9999 are pinned to
/// the nearest edge; chrono would otherwise add a sign and break string order.
fn sort_key(at: DateTime<Utc>) -> String {
    match at.year() {
        year if year > 9999 => "99991231235959".to_string(),
        year if year < 0 => "00000101000000".to_string(),
        _ => at.format("%Y%m%d%H%M%S").to_string(),
    }
}
