use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// One subscription of the blogroll.
///
/// Created by the OPML parser, given its [`PostSummary`] once by the
/// enricher, and read-only from then on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEntry {
    /// Site URL, from the outline's `htmlUrl` attribute. Never empty.
    pub html_url: String,
    /// Feed URL, from `xmlUrl`. Empty when the outline has no feed.
    #[serde(default)]
    pub xml_url: String,
    /// Display title with any trailing ` @handle` removed. Never empty.
    pub title: String,
    /// Social handle split off the title, without the `@`. Empty if none.
    #[serde(default)]
    pub handle: String,
    /// Most recent item of the feed, if it could be fetched.
    #[serde(default)]
    pub latest_post: Option<PostSummary>,
}

impl SubscriptionEntry {
    /// Whether this subscription has a feed worth enriching.
    pub fn has_feed(&self) -> bool {
        !self.xml_url.is_empty()
    }

    /// Recency key of the latest post. `None` for entries without a dated post.
    pub fn sort_key(&self) -> Option<&str> {
        self.latest_post
            .as_ref()
            .map(|post| post.sort_key.as_str())
            .filter(|key| !key.is_empty())
    }
}

/// The latest published item of a subscription's feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSummary {
    pub title: String,
    pub permalink: String,
    /// e.g. "3 March 2024". Empty when the item carries no date.
    pub published_display: String,
    /// `YYYYMMDDHHMMSS` in UTC, so string order is chronological order.
    /// Empty when the item carries no date.
    pub sort_key: String,
}

/// Subscriptions ordered most recent first.
///
/// Only [`aggregate`](crate::blogroll::aggregate) and the cache decoder
/// construct one, so the ordering invariant holds for every value in the
/// crate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregatedList(Vec<SubscriptionEntry>);

impl AggregatedList {
    pub(crate) fn from_sorted(entries: Vec<SubscriptionEntry>) -> Self {
        Self(entries)
    }

    /// Feed URLs of every subscription in the list, in list order.
    pub fn feed_urls(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|entry| entry.has_feed())
            .map(|entry| entry.xml_url.clone())
            .collect()
    }
}

impl Deref for AggregatedList {
    type Target = [SubscriptionEntry];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'a> IntoIterator for &'a AggregatedList {
    type Item = &'a SubscriptionEntry;
    type IntoIter = std::slice::Iter<'a, SubscriptionEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
