use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use crate::blogroll::SubscriptionEntry;

/// Errors that make a whole subscription document unusable.
///
/// Distinct from an empty result: `Ok(vec![])` means the list genuinely has
/// no valid subscriptions.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The fetched document has no content at all.
    #[error("OPML document is empty")]
    Empty,

    /// XML parsing failed.
    #[error("XML parse error: {0}")]
    Xml(String),

    /// The root element is not `<opml>`.
    #[error("Not an OPML document (root element <{0}>)")]
    NotOpml(String),

    /// No `<body>` element under the root.
    #[error("OPML document has no <body>")]
    MissingBody,
}

impl From<quick_xml::Error> for ParseError {
    fn from(err: quick_xml::Error) -> Self {
        ParseError::Xml(err.to_string())
    }
}

/// Why an outline was left out of the blogroll. Never surfaced to callers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("outline has no htmlUrl")]
    MissingHtmlUrl,
    #[error("outline has no title")]
    MissingTitle,
}

/// Raw attributes of one `<outline>` element.
#[derive(Debug, Default)]
struct OutlineAttributes {
    html_url: Option<String>,
    xml_url: Option<String>,
    title: Option<String>,
}

impl OutlineAttributes {
    fn into_entry(self) -> Result<SubscriptionEntry, ValidationError> {
        let html_url = self
            .html_url
            .filter(|url| !url.is_empty())
            .ok_or(ValidationError::MissingHtmlUrl)?;
        let title = self
            .title
            .filter(|title| !title.is_empty())
            .ok_or(ValidationError::MissingTitle)?;

        let (title, handle) = match split_handle(&title) {
            (text, Some(handle)) => (text.to_string(), handle.to_string()),
            (_, None) => (title, String::new()),
        };

        Ok(SubscriptionEntry {
            html_url,
            xml_url: self.xml_url.unwrap_or_default(),
            title,
            handle,
            latest_post: None,
        })
    }
}

/// Parses an OPML subscription document into blogroll entries.
///
/// Only the outlines that are direct children of `<body>` are read; outlines
/// nested inside folders are skipped along with their parents' children.
/// Outlines without a non-empty `htmlUrl` and `title` are dropped. Document
/// order is preserved.
///
/// # Errors
///
/// - [`ParseError::Empty`] for a blank document
/// - [`ParseError::Xml`] for malformed XML, including unclosed elements
/// - [`ParseError::NotOpml`] when the root element is not `<opml>`
/// - [`ParseError::MissingBody`] when the root has no `<body>`
///
/// # Security
///
/// XXE is not possible: `quick-xml` (0.37) does not parse `<!ENTITY>`
/// declarations, so custom entity references fail to unescape and the
/// document is rejected as malformed.
pub fn parse_subscriptions(bytes: &[u8]) -> Result<Vec<SubscriptionEntry>, ParseError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseError::Empty);
    }

    // SEC-002: only the five XML builtin entities are ever resolved
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut walk = BodyWalk::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => walk.element(&e, false, &reader)?,
            Event::Empty(e) => walk.element(&e, true, &reader)?,
            Event::End(_) => walk.close(),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    walk.finish()
}

/// Streaming state while looking for the direct children of `<body>`.
#[derive(Default)]
struct BodyWalk {
    entries: Vec<SubscriptionEntry>,
    // Number of currently open elements
    depth: usize,
    saw_root: bool,
    saw_body: bool,
    in_body: bool,
}

impl BodyWalk {
    fn element(
        &mut self,
        e: &BytesStart<'_>,
        is_empty: bool,
        reader: &Reader<&[u8]>,
    ) -> Result<(), ParseError> {
        let element_depth = self.depth + 1;

        match element_depth {
            1 => {
                check_root(e)?;
                self.saw_root = true;
            }
            2 if !self.saw_body && e.name().as_ref() == b"body" => {
                self.saw_body = true;
                self.in_body = !is_empty;
            }
            3 if self.in_body && e.name().as_ref() == b"outline" => {
                match read_outline(e, reader)?.into_entry() {
                    Ok(entry) => self.entries.push(entry),
                    Err(reason) => {
                        tracing::debug!(reason = %reason, "Skipping OPML outline");
                    }
                }
            }
            _ => {}
        }

        if !is_empty {
            self.depth = element_depth;
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.depth == 2 {
            self.in_body = false;
        }
        self.depth = self.depth.saturating_sub(1);
    }

    fn finish(self) -> Result<Vec<SubscriptionEntry>, ParseError> {
        if self.depth > 0 {
            return Err(ParseError::Xml(format!(
                "unexpected end of document with {} unclosed element(s)",
                self.depth
            )));
        }
        if !self.saw_root {
            return Err(ParseError::Xml("document has no root element".to_string()));
        }
        if !self.saw_body {
            return Err(ParseError::MissingBody);
        }
        Ok(self.entries)
    }
}

fn check_root(e: &BytesStart<'_>) -> Result<(), ParseError> {
    if e.name().as_ref() == b"opml" {
        Ok(())
    } else {
        Err(ParseError::NotOpml(
            String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        ))
    }
}

fn read_outline(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<OutlineAttributes, ParseError> {
    let mut outline = OutlineAttributes::default();
    let decoder = reader.decoder();

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let slot = match attr.key.as_ref() {
            b"htmlUrl" => &mut outline.html_url,
            b"xmlUrl" => &mut outline.xml_url,
            b"title" => &mut outline.title,
            _ => continue,
        };
        *slot = Some(attr.decode_and_unescape_value(decoder)?.into_owned());
    }

    Ok(outline)
}

/// Splits a trailing social handle off a title.
///
/// `"My Blog @jdoe"` becomes `("My Blog", Some("jdoe"))`. The handle must be
/// one or more word characters (ASCII letters, digits, `_`) running to the
/// end of the title and preceded by a space and `@`. A title that would be
/// left empty is not split.
pub fn split_handle(title: &str) -> (&str, Option<&str>) {
    if let Some(pos) = title.rfind(" @") {
        let text = &title[..pos];
        let handle = &title[pos + 2..];
        if !text.is_empty() && !handle.is_empty() && handle.chars().all(is_word_char) {
            return (text, Some(handle));
        }
    }
    (title, None)
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
