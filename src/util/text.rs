use std::borrow::Cow;

/// Replaces control characters in remote text before it is written to a terminal.
///
/// Titles and permalinks come from third-party documents and may carry ANSI
/// escapes or stray line breaks. Every control character becomes a single
/// space, so one subscription always renders on its own lines.
///
/// Returns `Cow::Borrowed` when nothing needs replacing.
pub fn sanitize_for_terminal(s: &str) -> Cow<'_, str> {
    if !s.chars().any(char::is_control) {
        return Cow::Borrowed(s);
    }

    Cow::Owned(
        s.chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_is_borrowed() {
        let out = sanitize_for_terminal("My Blog");
        assert!(matches!(out, Cow::Borrowed("My Blog")));
    }

    #[test]
    fn test_escape_and_newline_replaced() {
        assert_eq!(sanitize_for_terminal("evil\x1b[2Jtitle\n"), "evil [2Jtitle ");
    }

    #[test]
    fn test_unicode_preserved() {
        assert_eq!(sanitize_for_terminal("Café ☕"), "Café ☕");
    }
}
