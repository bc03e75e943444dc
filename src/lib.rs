//! blogroll - a ranked list of subscribed sites built from a live OPML link.
//!
//! The crate fetches a remotely hosted OPML subscription list, attaches the
//! latest post of every subscription that has a feed, orders the result by
//! recency and keeps it in a TTL-bounded cache keyed per blogroll instance.
//!
//! - [`feed`] - OPML parsing, HTTP transport and the feed-fetching client
//! - [`blogroll`] - enrichment, ordering and the cache-first [`Blogroll`] service
//! - [`storage`] - cache stores (in-memory and SQLite) and the cache manager
//! - [`config`] - the optional `config.toml`
//! - [`util`] - URL host policy and terminal-safe text

pub mod blogroll;
pub mod config;
pub mod feed;
pub mod storage;
pub mod util;

pub use blogroll::{
    aggregate, AggregatedList, Blogroll, BlogrollError, BlogrollOptions, PostSummary,
    SubscriptionEntry,
};
