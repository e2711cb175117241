//! CSS selector parsing utilities.

use scraper::Selector;

/// Parses a CSS selector with a safe fallback.
///
/// If parsing fails, logs an error and returns a selector that matches nothing
/// (`*:not(*)`), so a bad selector degrades one check instead of panicking.
///
/// # Arguments
///
/// * `selector_str` - The CSS selector string to parse
/// * `context` - Context description for error logging (e.g., "canonical link extraction")
pub fn parse_selector_with_fallback(selector_str: &str, context: &str) -> Selector {
    Selector::parse(selector_str).unwrap_or_else(|e| {
        log::error!(
            "Failed to parse CSS selector '{}' in {}: {}. Using fallback selector.",
            selector_str,
            context,
            e
        );
        #[allow(clippy::expect_used)]
        Selector::parse("*:not(*)").expect("fallback selector '*:not(*)' always parses")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_valid_selector_matches() {
        let doc = Html::parse_document(r#"<link rel="canonical" href="/a">"#);
        let sel = parse_selector_with_fallback("link[rel]", "test");
        assert_eq!(doc.select(&sel).count(), 1);
    }

    #[test]
    fn test_invalid_selector_matches_nothing() {
        let doc = Html::parse_document("<p>hello</p>");
        let sel = parse_selector_with_fallback("p[[[", "test");
        assert_eq!(doc.select(&sel).count(), 0);
    }
}
