//! Markup scans for the transport analyzer: mixed content, external
//! resource domains and the `<meta>` CSP fallback.

use std::collections::BTreeSet;

use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{CDN_INDICATORS, HIGH_RISK_INDICATORS, SOCIAL_MEDIA_INDICATORS};
use crate::utils::{bare_host, contains_any, parse_selector_with_fallback};

/// `http://` references on an HTTPS page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixedContent {
    /// Images, scripts and stylesheets. Anchors are listed but not counted.
    pub total_issues: usize,
    pub images: Vec<String>,
    pub scripts: Vec<String>,
    pub stylesheets: Vec<String>,
    pub links: Vec<String>,
}

/// Distinct third-party domains loaded by the page, by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalResources {
    pub total_domains: usize,
    pub domains: Vec<String>,
    pub cdn: Vec<String>,
    pub high_risk: Vec<String>,
    pub social_media: Vec<String>,
    pub other: Vec<String>,
}

/// Everything the transport analyzer needs from the HTML, gathered in one parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupScan {
    pub mixed_content: Option<MixedContent>,
    pub external_resources: ExternalResources,
    pub meta_csp: Option<String>,
}

fn is_insecure(reference: &str) -> bool {
    reference
        .get(..7)
        .map(|prefix| prefix.eq_ignore_ascii_case("http://"))
        .unwrap_or(false)
}

fn attr_values(document: &Html, selector: &str, attr: &str) -> Vec<String> {
    let selector = parse_selector_with_fallback(selector, "transport markup scan");
    document
        .select(&selector)
        .filter_map(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn is_stylesheet(link: &ElementRef<'_>) -> bool {
    link.value()
        .attr("rel")
        .map(|rel| {
            rel.split_whitespace()
                .any(|t| t.eq_ignore_ascii_case("stylesheet"))
        })
        .unwrap_or(false)
}

fn stylesheet_hrefs(document: &Html) -> Vec<String> {
    let selector = parse_selector_with_fallback("link[href]", "transport stylesheet scan");
    document
        .select(&selector)
        .filter(is_stylesheet)
        .filter_map(|el| el.value().attr("href"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn meta_csp(document: &Html) -> Option<String> {
    let selector = parse_selector_with_fallback("meta[http-equiv][content]", "meta csp");
    document
        .select(&selector)
        .find(|m| {
            m.value()
                .attr("http-equiv")
                .map(|v| v.trim().eq_ignore_ascii_case("content-security-policy"))
                .unwrap_or(false)
        })
        .and_then(|m| m.value().attr("content"))
        .map(|c| c.trim().to_string())
}

fn insecure_only(values: &[String]) -> Vec<String> {
    values.iter().filter(|v| is_insecure(v)).cloned().collect()
}

/// Buckets a domain; tracking indicators win over social ones, which win over CDN.
fn classify(domain: &str, resources: &mut ExternalResources) {
    let bucket = if contains_any(domain, HIGH_RISK_INDICATORS) {
        &mut resources.high_risk
    } else if contains_any(domain, SOCIAL_MEDIA_INDICATORS) {
        &mut resources.social_media
    } else if contains_any(domain, CDN_INDICATORS) {
        &mut resources.cdn
    } else {
        &mut resources.other
    };
    bucket.push(domain.to_string());
}

/// Scans `html` as served from `page`.
pub fn scan_markup(page: &Url, html: &str) -> MarkupScan {
    let document = Html::parse_document(html);

    let images = attr_values(&document, "img[src]", "src");
    let scripts = attr_values(&document, "script[src]", "src");
    let stylesheets = stylesheet_hrefs(&document);
    let iframes = attr_values(&document, "iframe[src]", "src");

    let mixed_content = (page.scheme() == "https").then(|| {
        let mut mixed = MixedContent {
            images: insecure_only(&images),
            scripts: insecure_only(&scripts),
            stylesheets: insecure_only(&stylesheets),
            links: insecure_only(&attr_values(&document, "a[href]", "href")),
            ..Default::default()
        };
        mixed.total_issues = mixed.images.len() + mixed.scripts.len() + mixed.stylesheets.len();
        mixed
    });

    let own_host = page.host_str().map(bare_host).unwrap_or_default();
    let domains: BTreeSet<String> = images
        .iter()
        .chain(&scripts)
        .chain(&stylesheets)
        .chain(&iframes)
        .filter_map(|reference| page.join(reference).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .filter_map(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .filter(|host| bare_host(host) != own_host)
        .collect();

    let mut external_resources = ExternalResources {
        total_domains: domains.len(),
        ..Default::default()
    };
    for domain in &domains {
        classify(domain, &mut external_resources);
    }
    external_resources.domains = domains.into_iter().collect();

    MarkupScan {
        mixed_content,
        external_resources,
        meta_csp: meta_csp(&document),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[test]
    fn test_mixed_content_counts_exclude_anchors() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="http://example.com/a.css">
            <script src="http://example.com/a.js"></script>
            </head><body>
            <img src="http://example.com/a.png">
            <a href="http://example.com/other">x</a>
            <img src="https://example.com/ok.png">
            </body></html>"#;
        let scan = scan_markup(&page("https://example.com/"), html);
        let mixed = scan.mixed_content.unwrap();
        assert_eq!(mixed.total_issues, 3);
        assert_eq!(mixed.images.len(), 1);
        assert_eq!(mixed.scripts.len(), 1);
        assert_eq!(mixed.stylesheets.len(), 1);
        assert_eq!(mixed.links.len(), 1);
    }

    #[test]
    fn test_http_page_has_no_mixed_content_section() {
        let scan = scan_markup(&page("http://example.com/"), r#"<img src="http://x.com/a.png">"#);
        assert!(scan.mixed_content.is_none());
    }

    #[test]
    fn test_external_domains_classified() {
        let html = r#"
            <script src="https://www.googletagmanager.com/gtm.js"></script>
            <script src="https://cdn.jsdelivr.net/npm/x.js"></script>
            <script src="https://connect.facebook.net/sdk.js"></script>
            <iframe src="https://www.youtube.com/embed/1"></iframe>
            <img src="/local.png">
            <img src="https://www.example.com/logo.png">
            <img src="https://images.partner.org/a.png">"#;
        let scan = scan_markup(&page("https://example.com/"), html);
        let ext = scan.external_resources;
        assert_eq!(ext.total_domains, 5);
        assert_eq!(ext.high_risk, vec!["connect.facebook.net", "www.googletagmanager.com"]);
        assert_eq!(ext.cdn, vec!["cdn.jsdelivr.net"]);
        assert_eq!(ext.social_media, vec!["www.youtube.com"]);
        assert_eq!(ext.other, vec!["images.partner.org"]);
    }

    #[test]
    fn test_meta_csp_extracted() {
        let html = r#"<meta http-equiv="Content-Security-Policy" content="default-src 'self'">"#;
        let scan = scan_markup(&page("https://example.com/"), html);
        assert_eq!(scan.meta_csp.as_deref(), Some("default-src 'self'"));
    }
}
