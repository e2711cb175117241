//! Response security-header inspection.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::{
    HEADER_CONTENT_SECURITY_POLICY, HEADER_PERMISSIONS_POLICY, HEADER_REFERRER_POLICY,
    HEADER_STRICT_TRANSPORT_SECURITY, HEADER_X_CONTENT_TYPE_OPTIONS, HEADER_X_FRAME_OPTIONS,
    HEADER_X_XSS_PROTECTION, HSTS_RECOMMENDED_MAX_AGE, RESTRICTIVE_REFERRER_POLICIES,
    SECURITY_HEADERS,
};
use crate::utils::clamp_score;

use super::csp::parse_csp;

/// Observed state of one security header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderStatus {
    pub present: bool,
    pub raw_value: Option<String>,
    pub parsed_attributes: BTreeMap<String, String>,
    /// Present and configured strongly enough to earn full points.
    pub effective: bool,
}

/// Security headers keyed by canonical name, plus the 0-100 sub-score.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityHeaderSet {
    pub headers: BTreeMap<String, HeaderStatus>,
    pub security_score: u8,
    pub missing: Vec<String>,
}

impl SecurityHeaderSet {
    pub fn get(&self, name: &str) -> Option<&HeaderStatus> {
        self.headers.get(name)
    }
}

fn flag(value: bool) -> String {
    value.to_string()
}

fn parse_hsts(value: &str, attrs: &mut BTreeMap<String, String>) -> bool {
    let mut max_age: Option<u64> = None;
    let mut include_subdomains = false;
    let mut preload = false;
    for part in value.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let lower = part.to_ascii_lowercase();
        if let Some(age) = lower.strip_prefix("max-age=") {
            max_age = age.trim_matches('"').parse().ok();
        } else if lower == "includesubdomains" {
            include_subdomains = true;
        } else if lower == "preload" {
            preload = true;
        }
    }
    if let Some(age) = max_age {
        attrs.insert("max_age".into(), age.to_string());
    }
    attrs.insert("include_subdomains".into(), flag(include_subdomains));
    attrs.insert("preload".into(), flag(preload));
    max_age.map(|a| a >= HSTS_RECOMMENDED_MAX_AGE).unwrap_or(false)
}

fn parse_frame_options(value: &str, attrs: &mut BTreeMap<String, String>) -> bool {
    let upper = value.trim().to_ascii_uppercase();
    let blocks = upper == "DENY" || upper == "SAMEORIGIN";
    attrs.insert("blocks_framing".into(), flag(blocks));
    blocks
}

fn parse_content_type_options(value: &str, attrs: &mut BTreeMap<String, String>) -> bool {
    let nosniff = value.trim().eq_ignore_ascii_case("nosniff");
    attrs.insert("nosniff".into(), flag(nosniff));
    nosniff
}

fn parse_xss_protection(value: &str, attrs: &mut BTreeMap<String, String>) -> bool {
    let trimmed = value.trim();
    let enabled = trimmed.starts_with('1');
    attrs.insert("enabled".into(), flag(enabled));
    if enabled {
        let block = trimmed.to_ascii_lowercase().contains("mode=block");
        attrs.insert("mode_block".into(), flag(block));
    }
    enabled
}

fn parse_referrer_policy(value: &str, attrs: &mut BTreeMap<String, String>) -> bool {
    // Browsers honor the last recognized token of a comma-separated list
    let policy = value
        .split(',')
        .map(|p| p.trim().to_ascii_lowercase())
        .filter(|p| !p.is_empty())
        .last()
        .unwrap_or_default();
    let restrictive = RESTRICTIVE_REFERRER_POLICIES.contains(&policy.as_str());
    attrs.insert("policy".into(), policy);
    attrs.insert("restrictive".into(), flag(restrictive));
    restrictive
}

fn parse_csp_header(value: &str, attrs: &mut BTreeMap<String, String>) -> bool {
    let directives = parse_csp(value);
    for (name, sources) in &directives {
        attrs.insert(name.clone(), sources.join(" "));
    }
    !directives.is_empty()
}

fn parse_permissions_policy(value: &str, attrs: &mut BTreeMap<String, String>) -> bool {
    let features = value
        .split(',')
        .filter_map(|f| f.split('=').next())
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .count();
    attrs.insert("features".into(), features.to_string());
    true
}

fn inspect_header(name: &str, value: &str) -> HeaderStatus {
    let mut attrs = BTreeMap::new();
    let effective = match name {
        HEADER_STRICT_TRANSPORT_SECURITY => parse_hsts(value, &mut attrs),
        HEADER_CONTENT_SECURITY_POLICY => parse_csp_header(value, &mut attrs),
        HEADER_X_FRAME_OPTIONS => parse_frame_options(value, &mut attrs),
        HEADER_X_CONTENT_TYPE_OPTIONS => parse_content_type_options(value, &mut attrs),
        HEADER_X_XSS_PROTECTION => parse_xss_protection(value, &mut attrs),
        HEADER_REFERRER_POLICY => parse_referrer_policy(value, &mut attrs),
        HEADER_PERMISSIONS_POLICY => parse_permissions_policy(value, &mut attrs),
        _ => true,
    };
    HeaderStatus {
        present: true,
        raw_value: Some(value.to_string()),
        parsed_attributes: attrs,
        effective,
    }
}

/// Inspects `headers` (lower-cased names, as a `FetchResponse` carries them).
///
/// Each configured header earns its full weight when effective and half when
/// merely present, so adding a header never lowers the score.
pub fn analyze_security_headers(headers: &HashMap<String, String>) -> SecurityHeaderSet {
    let mut set = SecurityHeaderSet::default();
    let mut points = 0.0;

    for (name, weight) in SECURITY_HEADERS {
        let status = match headers.get(&name.to_ascii_lowercase()) {
            Some(value) => inspect_header(name, value),
            None => {
                set.missing.push(name.to_string());
                HeaderStatus::default()
            }
        };
        if status.effective {
            points += f64::from(*weight);
        } else if status.present {
            points += f64::from(*weight) / 2.0;
        }
        set.headers.insert(name.to_string(), status);
    }

    set.security_score = clamp_score(points);
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_header_set_scores_zero() {
        let set = analyze_security_headers(&HashMap::new());
        assert_eq!(set.security_score, 0);
        assert_eq!(set.missing.len(), SECURITY_HEADERS.len());
        assert!(!set.get(HEADER_X_FRAME_OPTIONS).unwrap().present);
    }

    #[test]
    fn test_all_effective_headers_score_100() {
        let set = analyze_security_headers(&headers(&[
            ("Strict-Transport-Security", "max-age=63072000; includeSubDomains; preload"),
            ("Content-Security-Policy", "default-src 'self'"),
            ("X-Frame-Options", "DENY"),
            ("X-Content-Type-Options", "nosniff"),
            ("X-XSS-Protection", "1; mode=block"),
            ("Referrer-Policy", "strict-origin-when-cross-origin"),
            ("Permissions-Policy", "geolocation=(), camera=()"),
        ]));
        assert_eq!(set.security_score, 100);
        assert!(set.missing.is_empty());
        let hsts = set.get(HEADER_STRICT_TRANSPORT_SECURITY).unwrap();
        assert_eq!(hsts.parsed_attributes["max_age"], "63072000");
        assert_eq!(hsts.parsed_attributes["include_subdomains"], "true");
        assert_eq!(hsts.parsed_attributes["preload"], "true");
    }

    #[test]
    fn test_weak_headers_earn_half_points() {
        let set = analyze_security_headers(&headers(&[
            ("Strict-Transport-Security", "max-age=300"),
            ("X-Frame-Options", "ALLOW-FROM https://example.com"),
        ]));
        // 25/2 + 15/2
        assert_eq!(set.security_score, 20);
        assert_eq!(
            set.get(HEADER_X_FRAME_OPTIONS).unwrap().parsed_attributes["blocks_framing"],
            "false"
        );
    }

    #[test]
    fn test_adding_any_header_never_decreases_score() {
        let candidates = [
            ("strict-transport-security", "max-age=10"),
            ("content-security-policy", ""),
            ("x-frame-options", "nonsense"),
            ("x-content-type-options", "sniff"),
            ("x-xss-protection", "0"),
            ("referrer-policy", "unsafe-url"),
            ("permissions-policy", ""),
        ];
        let base = analyze_security_headers(&HashMap::new()).security_score;
        for (name, value) in candidates {
            let set = analyze_security_headers(&headers(&[(name, value)]));
            assert!(set.security_score >= base, "{name} lowered the score");
        }
    }

    #[test]
    fn test_referrer_policy_uses_last_token() {
        let set = analyze_security_headers(&headers(&[(
            "Referrer-Policy",
            "unsafe-url, no-referrer",
        )]));
        let status = set.get(HEADER_REFERRER_POLICY).unwrap();
        assert!(status.effective);
        assert_eq!(status.parsed_attributes["policy"], "no-referrer");
    }
}
