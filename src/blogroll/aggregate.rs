use super::types::{AggregatedList, SubscriptionEntry};

/// Orders enriched subscriptions most recent first.
///
/// Entries without a sort key go after every entry that has one. The sort is
/// stable, so ties and undated entries keep their OPML order.
pub fn aggregate(mut entries: Vec<SubscriptionEntry>) -> AggregatedList {
    // None < Some(_), so reversing the comparison also puts undated entries last
    entries.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
    AggregatedList::from_sorted(entries)
}
