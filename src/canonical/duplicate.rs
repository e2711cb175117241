//! Duplicate-content indicators.
//!
//! Hashes and URL variations are produced for an external deduplication
//! step; nothing here compares pages against each other.

use scraper::Html;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::MAX_HTML_TEXT_EXTRACTION_CHARS;
use crate::utils::parse_selector_with_fallback;

const SEO_PARAMS: &[&str] = &[
    "page", "lang", "language", "locale", "category", "q", "query", "search", "sort", "order",
    "filter",
];

const TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "msclkid", "dclid", "yclid", "igshid", "mc_cid", "mc_eid", "_ga", "ref",
    "source",
];

const SESSION_PARAMS: &[&str] = &[
    "sid", "phpsessid", "jsessionid", "aspsessionid", "token", "_token", "xsrf",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicationRisk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterBuckets {
    pub seo: Vec<String>,
    pub tracking: Vec<String>,
    pub session: Vec<String>,
    pub other: Vec<String>,
}

impl ParameterBuckets {
    pub fn total(&self) -> usize {
        self.seo.len() + self.tracking.len() + self.session.len() + self.other.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateContentIndicators {
    pub content_hash: String,
    pub title_hash: Option<String>,
    pub description_hash: Option<String>,
    pub url_variations: Vec<String>,
    pub parameters: ParameterBuckets,
    pub duplication_risk: DuplicationRisk,
}

fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// Visible text of the document with whitespace collapsed.
fn visible_text(document: &Html) -> String {
    let mut out = String::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name()))
            .map(|name| matches!(name, "script" | "style" | "noscript" | "template"))
            .unwrap_or(false);
        if hidden {
            continue;
        }
        for word in text.split_whitespace() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        }
        if out.len() >= MAX_HTML_TEXT_EXTRACTION_CHARS {
            break;
        }
    }
    out
}

fn title_text(document: &Html) -> Option<String> {
    let selector = parse_selector_with_fallback("title", "duplicate content title");
    document
        .select(&selector)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn meta_description(document: &Html) -> Option<String> {
    let selector = parse_selector_with_fallback("meta[name][content]", "duplicate content meta");
    document
        .select(&selector)
        .find(|m| {
            m.value()
                .attr("name")
                .map(|n| n.eq_ignore_ascii_case("description"))
                .unwrap_or(false)
        })
        .and_then(|m| m.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

/// Sorts query keys into SEO-relevant, tracking, session and other buckets.
pub fn categorize_parameters(url: &Url) -> ParameterBuckets {
    let mut buckets = ParameterBuckets::default();
    for (key, _) in url.query_pairs() {
        let lower = key.to_ascii_lowercase();
        let bucket = if SESSION_PARAMS.contains(&lower.as_str())
            || lower.contains("session")
            || lower.contains("csrf")
        {
            &mut buckets.session
        } else if lower.starts_with("utm_") || TRACKING_PARAMS.contains(&lower.as_str()) {
            &mut buckets.tracking
        } else if SEO_PARAMS.contains(&lower.as_str()) {
            &mut buckets.seo
        } else {
            &mut buckets.other
        };
        bucket.push(key.into_owned());
    }
    buckets
}

/// High for session/CSRF keys or more than three tracking keys; medium for
/// more than five keys or any tracking key; otherwise low.
pub fn duplication_risk(buckets: &ParameterBuckets) -> DuplicationRisk {
    if !buckets.session.is_empty() || buckets.tracking.len() > 3 {
        DuplicationRisk::High
    } else if buckets.total() > 5 || !buckets.tracking.is_empty() {
        DuplicationRisk::Medium
    } else {
        DuplicationRisk::Low
    }
}

/// Trailing-slash, `www.`, scheme and lower-case variants of `url`.
pub fn url_variations(url: &Url) -> Vec<String> {
    let original = url.as_str().to_string();
    let mut variants: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if candidate != original && !variants.contains(&candidate) {
            variants.push(candidate);
        }
    };

    let path = url.path();
    if path != "/" {
        let mut toggled = url.clone();
        match path.strip_suffix('/') {
            Some(trimmed) => toggled.set_path(trimmed),
            None => toggled.set_path(&format!("{path}/")),
        }
        push(toggled.to_string());
    }

    if let Some(host) = url.host_str() {
        let other_host = match host.strip_prefix("www.") {
            Some(bare) => bare.to_string(),
            None => format!("www.{host}"),
        };
        let mut toggled = url.clone();
        if toggled.set_host(Some(&other_host)).is_ok() {
            push(toggled.to_string());
        }
    }

    let other_scheme = if url.scheme() == "https" { "http" } else { "https" };
    let mut toggled = url.clone();
    if toggled.set_scheme(other_scheme).is_ok() {
        push(toggled.to_string());
    }

    push(original.to_lowercase());
    variants
}

/// Builds the duplicate-content indicators for a page.
pub fn analyze_duplicate_content(url: &Url, html: &str) -> DuplicateContentIndicators {
    let document = Html::parse_document(html);
    let parameters = categorize_parameters(url);

    DuplicateContentIndicators {
        content_hash: sha256_hex(&visible_text(&document)),
        title_hash: title_text(&document).map(|t| sha256_hex(&t)),
        description_hash: meta_description(&document).map(|d| sha256_hex(&d)),
        url_variations: url_variations(url),
        duplication_risk: duplication_risk(&parameters),
        parameters,
    }
}
