//! Structured data extraction.
//!
//! This module extracts structured data from HTML documents including:
//! - JSON-LD (application/ld+json), flattening arrays and `@graph`
//! - Microdata item types (`itemscope` + `itemtype`)
//! - Open Graph meta tags (og:*)
//! - Twitter Card meta tags (twitter:*)

use std::collections::BTreeMap;

use scraper::Html;
use serde_json::Value;

use crate::utils::parse_selector_with_fallback;

/// Raw structured data found in a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedData {
    /// Number of JSON-LD blocks that decoded.
    pub valid_blocks: usize,
    /// Number of JSON-LD blocks that did not.
    pub invalid_blocks: usize,
    /// JSON-LD entities, one per object after flattening.
    pub items: Vec<Value>,
    /// Schema.org types named by microdata `itemtype` attributes.
    pub microdata_types: Vec<String>,
    pub open_graph: BTreeMap<String, String>,
    pub twitter_cards: BTreeMap<String, String>,
}

/// `"https://schema.org/Article"` and `"schema:Article"` both become `"Article"`.
pub fn short_type_name(raw: &str) -> String {
    raw.trim()
        .trim_end_matches('/')
        .rsplit(['/', ':', '#'])
        .next()
        .unwrap_or_default()
        .to_string()
}

/// `@type` of a JSON-LD entity; a string or an array of strings.
pub fn entity_types(item: &Value) -> Vec<String> {
    match item.get("@type") {
        Some(Value::String(t)) => vec![short_type_name(t)],
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .map(short_type_name)
            .collect(),
        _ => Vec::new(),
    }
}

fn flatten_into(value: Value, items: &mut Vec<Value>) {
    match value {
        Value::Array(values) => {
            for v in values {
                flatten_into(v, items);
            }
        }
        Value::Object(mut object) => {
            if let Some(Value::Array(graph)) = object.remove("@graph") {
                for v in graph {
                    flatten_into(v, items);
                }
            }
            // A bare @context wrapper around a @graph carries no entity of its own
            if object.keys().any(|k| k != "@context") {
                items.push(Value::Object(object));
            }
        }
        _ => {}
    }
}

fn is_json_ld_type(value: &str) -> bool {
    value
        .split(';')
        .next()
        .map(|mime| mime.trim().eq_ignore_ascii_case("application/ld+json"))
        .unwrap_or(false)
}

fn extract_json_ld(document: &Html, data: &mut ExtractedData) {
    let selector = parse_selector_with_fallback("script[type]", "JSON-LD extraction");
    for script in document.select(&selector) {
        if !script.value().attr("type").map(is_json_ld_type).unwrap_or(false) {
            continue;
        }
        let body: String = script.text().collect();
        match serde_json::from_str::<Value>(body.trim()) {
            Ok(value) => {
                data.valid_blocks += 1;
                flatten_into(value, &mut data.items);
            }
            Err(e) => {
                log::debug!("Skipping invalid JSON-LD block: {e}");
                data.invalid_blocks += 1;
            }
        }
    }
}

fn extract_microdata_types(document: &Html) -> Vec<String> {
    let selector = parse_selector_with_fallback("[itemscope][itemtype]", "microdata extraction");
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("itemtype"))
        .flat_map(|types| types.split_whitespace().map(short_type_name).collect::<Vec<_>>())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Collects `content` of meta tags whose `attr` starts with `prefix`.
fn prefixed_meta(document: &Html, attr: &str, prefix: &str) -> BTreeMap<String, String> {
    let selector = parse_selector_with_fallback(
        &format!("meta[{attr}^=\"{prefix}\"][content]"),
        "social meta extraction",
    );
    document
        .select(&selector)
        .filter_map(|el| {
            let key = el.value().attr(attr)?;
            let content = el.value().attr("content")?;
            Some((key.to_string(), content.to_string()))
        })
        .collect()
}

/// Extracts every kind of structured data from `html`.
pub fn extract_structured_data(html: &str) -> ExtractedData {
    let document = Html::parse_document(html);
    let mut data = ExtractedData::default();
    extract_json_ld(&document, &mut data);
    data.microdata_types = extract_microdata_types(&document);
    data.open_graph = prefixed_meta(&document, "property", "og:");
    data.twitter_cards = prefixed_meta(&document, "name", "twitter:");
    data
}
