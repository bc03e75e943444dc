use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use feed_rs::parser;

/// One item of an RSS/Atom feed, reduced to what a blogroll shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub permalink: String,
    pub published: Option<DateTime<Utc>>,
}

/// Parses RSS/Atom bytes into items, keeping the feed's own order.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedItem>, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;
    Ok(feed.entries.into_iter().map(to_item).collect())
}

fn to_item(entry: Entry) -> FeedItem {
    let permalink = entry
        .links
        .iter()
        .find(|link| matches!(link.rel.as_deref(), None | Some("alternate")))
        .or_else(|| entry.links.first())
        .map(|link| link.href.clone())
        .unwrap_or_default();

    FeedItem {
        title: entry.title.map(|t| t.content).unwrap_or_default(),
        permalink,
        published: entry.published.or(entry.updated),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_rss_items_in_feed_order() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Example</title>
    <item>
        <title>Newest</title>
        <link>https://example.com/newest</link>
        <pubDate>Sun, 03 Mar 2024 10:30:00 GMT</pubDate>
    </item>
    <item>
        <title>Older</title>
        <link>https://example.com/older</link>
        <pubDate>Fri, 01 Mar 2024 09:00:00 GMT</pubDate>
    </item>
</channel></rss>"#;

        let items = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Newest");
        assert_eq!(items[0].permalink, "https://example.com/newest");
        assert_eq!(
            items[0].published,
            Some(Utc.with_ymd_and_hms(2024, 3, 3, 10, 30, 0).unwrap())
        );
        assert_eq!(items[1].title, "Older");
    }

    #[test]
    fn test_atom_uses_alternate_link_and_updated_fallback() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Example</title>
  <id>urn:example</id>
  <updated>2024-02-10T08:00:00Z</updated>
  <entry>
    <title>Entry</title>
    <id>urn:example:1</id>
    <link rel="replies" href="https://example.com/entry#comments"/>
    <link rel="alternate" href="https://example.com/entry"/>
    <updated>2024-02-10T08:00:00Z</updated>
  </entry>
</feed>"#;

        let items = parse_feed(atom.as_bytes()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].permalink, "https://example.com/entry");
        assert_eq!(
            items[0].published,
            Some(Utc.with_ymd_and_hms(2024, 2, 10, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_undated_item_without_title() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><link>https://example.com/untitled</link></item>
</channel></rss>"#;

        let items = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(items[0].title, "");
        assert_eq!(items[0].published, None);
    }

    #[test]
    fn test_malformed_feed_is_error() {
        assert!(parse_feed(b"<not valid xml").is_err());
    }
}
