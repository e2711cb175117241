//! Content-Security-Policy parsing and strength scoring.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Where the analysed policy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CspSource {
    Header,
    Meta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CspAnalysis {
    pub present: bool,
    pub source: Option<CspSource>,
    pub directives: BTreeMap<String, Vec<String>>,
    pub has_unsafe_inline: bool,
    pub has_unsafe_eval: bool,
    pub effectiveness_score: u8,
    pub issues: Vec<String>,
}

/// Splits a policy into `directive -> sources`. Directive names are
/// lower-cased; the first occurrence of a repeated directive wins, as in
/// browsers.
pub fn parse_csp(policy: &str) -> BTreeMap<String, Vec<String>> {
    let mut directives = BTreeMap::new();
    for part in policy.split(';') {
        let mut tokens = part.split_whitespace();
        let Some(name) = tokens.next() else {
            continue;
        };
        directives
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| tokens.map(str::to_string).collect());
    }
    directives
}

/// Analyses the header policy, falling back to the `<meta>` policy.
///
/// Score: `default-src` 30, `script-src` 25, `style-src` 15, no
/// `'unsafe-inline'` 15, no `'unsafe-eval'` 15.
pub fn analyze_csp(header: Option<&str>, meta: Option<&str>) -> CspAnalysis {
    let (policy, source) = match (header, meta) {
        (Some(h), _) => (h, CspSource::Header),
        (None, Some(m)) => (m, CspSource::Meta),
        (None, None) => {
            return CspAnalysis {
                issues: vec!["No Content-Security-Policy defined".into()],
                ..Default::default()
            }
        }
    };

    let directives = parse_csp(policy);
    let any_source = |needle: &str| {
        directives
            .values()
            .flatten()
            .any(|s| s.eq_ignore_ascii_case(needle))
    };
    let has_unsafe_inline = any_source("'unsafe-inline'");
    let has_unsafe_eval = any_source("'unsafe-eval'");

    let mut score = 0u32;
    let mut issues = Vec::new();
    for (directive, points) in [("default-src", 30), ("script-src", 25), ("style-src", 15)] {
        if directives.contains_key(directive) {
            score += points;
        } else {
            issues.push(format!("Missing {directive} directive"));
        }
    }
    if has_unsafe_inline {
        issues.push("Policy allows 'unsafe-inline'".into());
    } else {
        score += 15;
    }
    if has_unsafe_eval {
        issues.push("Policy allows 'unsafe-eval'".into());
    } else {
        score += 15;
    }
    if source == CspSource::Meta {
        issues.push("Policy delivered via <meta>; frame-ancestors and reporting are ignored".into());
    }

    CspAnalysis {
        present: true,
        source: Some(source),
        directives,
        has_unsafe_inline,
        has_unsafe_eval,
        effectiveness_score: score.min(100) as u8,
        issues,
    }
}
