//! URL structure and readability checks.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Lower-case word segments joined by hyphens, with an optional extension.
#[allow(clippy::expect_used)]
static FRIENDLY_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*(\.[a-z0-9]+)?$").expect("valid segment regex")
});

/// Query keys that look like database identifiers (`id`, `pid`, `product_id`).
#[allow(clippy::expect_used)]
static ID_STYLE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(id|[a-z]{1,8}_?id)$").expect("valid id-key regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlStructure {
    pub url_length: usize,
    pub path_depth: usize,
    pub query_param_count: usize,
    pub query_params: Vec<String>,
    pub has_fragment: bool,
    pub has_uppercase: bool,
    pub has_whitespace: bool,
    pub has_special_chars: bool,
    pub uses_hyphens: bool,
    pub uses_underscores: bool,
    pub readability_score: u8,
    pub seo_friendly: bool,
    pub issues: Vec<String>,
}

fn is_plain_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '~')
}

/// Readability starts at 100: length over 75/100 costs 10/20, depth over 3/5
/// costs 10/20, special characters cost 15, each query parameter costs 5 (up
/// to 20); hyphenated segments earn 10 back.
fn readability(structure: &UrlStructure) -> u8 {
    let mut score: i32 = 100;

    if structure.url_length > 100 {
        score -= 20;
    } else if structure.url_length > 75 {
        score -= 10;
    }

    if structure.path_depth > 5 {
        score -= 20;
    } else if structure.path_depth > 3 {
        score -= 10;
    }

    if structure.has_special_chars || structure.has_whitespace {
        score -= 15;
    }

    score -= (5 * structure.query_param_count as i32).min(20);

    if structure.uses_hyphens {
        score += 10;
    }

    score.clamp(0, 100) as u8
}

/// Analyzes the path and query of `url`.
pub fn analyze_url_structure(url: &Url) -> UrlStructure {
    let path = url.path();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let keys: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();

    let mut structure = UrlStructure {
        url_length: url.as_str().len(),
        path_depth: segments.len(),
        query_param_count: keys.len(),
        has_fragment: url.fragment().is_some(),
        has_uppercase: path.chars().any(|c| c.is_ascii_uppercase()),
        has_whitespace: path.contains("%20") || path.contains('+'),
        has_special_chars: !path.chars().all(is_plain_path_char),
        uses_hyphens: segments.iter().any(|s| s.contains('-')),
        uses_underscores: segments.iter().any(|s| s.contains('_')),
        query_params: keys,
        ..Default::default()
    };

    let has_id_keys = structure
        .query_params
        .iter()
        .any(|k| ID_STYLE_KEY.is_match(&k.to_ascii_lowercase()));
    let has_word_segment =
        segments.is_empty() || segments.iter().any(|s| FRIENDLY_SEGMENT.is_match(s));

    structure.seo_friendly = has_word_segment && !structure.has_uppercase && !has_id_keys;
    structure.readability_score = readability(&structure);

    if structure.url_length > 100 {
        structure.issues.push("URL is longer than 100 characters".into());
    }
    if structure.path_depth > 3 {
        structure
            .issues
            .push(format!("URL path is {} levels deep", structure.path_depth));
    }
    if structure.has_uppercase {
        structure.issues.push("URL path contains uppercase letters".into());
    }
    if structure.has_whitespace {
        structure.issues.push("URL path contains encoded whitespace".into());
    }
    if structure.has_special_chars {
        structure.issues.push("URL path contains special characters".into());
    }
    if structure.uses_underscores {
        structure
            .issues
            .push("URL path uses underscores instead of hyphens".into());
    }
    if has_id_keys {
        structure
            .issues
            .push("URL uses id-style query parameters".into());
    }
    if structure.has_fragment {
        structure.issues.push("URL contains a fragment".into());
    }

    structure
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(url: &str) -> UrlStructure {
        analyze_url_structure(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_clean_hyphenated_url() {
        let s = analyze("https://example.com/blog/technical-seo-guide");
        assert_eq!(s.path_depth, 2);
        assert!(s.uses_hyphens);
        assert!(s.seo_friendly);
        // 100 + 10 hyphen bonus, clamped
        assert_eq!(s.readability_score, 100);
        assert!(s.issues.is_empty());
    }

    #[test]
    fn test_root_is_seo_friendly() {
        let s = analyze("https://example.com/");
        assert_eq!(s.path_depth, 0);
        assert!(s.seo_friendly);
        assert_eq!(s.readability_score, 100);
    }

    #[test]
    fn test_uppercase_and_id_params_are_not_friendly() {
        assert!(!analyze("https://example.com/Products/Shoes").seo_friendly);
        assert!(!analyze("https://example.com/products?product_id=7").seo_friendly);
        assert!(!analyze("https://example.com/item?id=7").seo_friendly);
        assert!(analyze("https://example.com/products?color=red").seo_friendly);
    }

    #[test]
    fn test_readability_deductions() {
        // depth 6 (-20), special chars (-15), 5 params (-20 cap)
        let s = analyze("https://example.com/a/b/c/d/e/f!x?a=1&b=2&c=3&d=4&e=5");
        assert_eq!(s.path_depth, 6);
        assert!(s.has_special_chars);
        assert_eq!(s.query_param_count, 5);
        assert_eq!(s.readability_score, 45);
    }

    #[test]
    fn test_long_url_deduction() {
        let long = format!("https://example.com/{}", "a".repeat(90));
        let s = analyze(&long);
        assert!(s.url_length > 100);
        assert_eq!(s.readability_score, 80);
    }

    #[test]
    fn test_whitespace_and_fragment() {
        let s = analyze("https://example.com/my%20page#top");
        assert!(s.has_whitespace);
        assert!(s.has_fragment);
        assert!(s.issues.iter().any(|i| i.contains("fragment")));
    }
}
