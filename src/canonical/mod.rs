//! Canonical URL analysis.
//!
//! Checks the page's `<link rel="canonical">` tags, the structure of its URL,
//! its own redirect chain, and query-parameter driven duplication risk.

mod duplicate;
mod url_structure;

use std::sync::Arc;

use scraper::Html;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::MAX_REDIRECT_HOPS;
use crate::fetch::{probe, walk_redirect_chain, Fetcher, RedirectChain, RequestOptions};
use crate::models::{AnalyzerResult, AuditOptions, Impact, Recommendation};
use crate::security::UrlPolicy;
use crate::utils::{clamp_score, parse_selector_with_fallback};

pub use duplicate::{
    analyze_duplicate_content, categorize_parameters, duplication_risk, url_variations,
    DuplicateContentIndicators, DuplicationRisk, ParameterBuckets,
};
pub use url_structure::{analyze_url_structure, UrlStructure};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalTagAnalysis {
    pub has_canonical: bool,
    pub canonical_count: usize,
    /// Every canonical href found, as written.
    pub canonical_urls: Vec<String>,
    /// The first canonical, resolved against the page URL.
    pub canonical_url: Option<String>,
    pub is_relative: bool,
    pub is_self_referencing: bool,
    pub scheme_mismatch: bool,
    pub host_mismatch: bool,
    pub canonical_status: Option<u16>,
    pub canonical_issues: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectAnalysis {
    pub chain: Option<RedirectChain>,
    pub error: Option<String>,
}

impl RedirectAnalysis {
    fn redirect_count(&self) -> Option<usize> {
        self.chain.as_ref().map(|c| c.redirect_count)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalReport {
    pub canonical_analysis: CanonicalTagAnalysis,
    pub url_structure: UrlStructure,
    pub redirect_analysis: RedirectAnalysis,
    pub duplicate_content: DuplicateContentIndicators,
}

/// Lower-cases, drops the fragment and strips trailing slashes for comparison.
fn normalize_for_comparison(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.as_str().to_lowercase().trim_end_matches('/').to_string()
}

/// Hrefs of every `<link>` whose rel tokens include `canonical`.
fn extract_canonical_hrefs(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = parse_selector_with_fallback("link[rel]", "canonical link extraction");
    document
        .select(&selector)
        .filter(|link| {
            link.value()
                .attr("rel")
                .map(|rel| {
                    rel.split_whitespace()
                        .any(|token| token.eq_ignore_ascii_case("canonical"))
                })
                .unwrap_or(false)
        })
        .map(|link| link.value().attr("href").unwrap_or("").trim().to_string())
        .collect()
}

/// Static checks of the canonical tags; the target probe happens afterwards.
fn inspect_canonical_tags(
    page: &Url,
    hrefs: Vec<String>,
    recs: &mut Vec<Recommendation>,
) -> (CanonicalTagAnalysis, Option<Url>) {
    let mut analysis = CanonicalTagAnalysis {
        has_canonical: !hrefs.is_empty(),
        canonical_count: hrefs.len(),
        ..Default::default()
    };

    let Some(first) = hrefs.first().cloned() else {
        recs.push(Recommendation::warning(
            Impact::High,
            "Missing canonical tag",
            "Add <link rel=\"canonical\" href=\"...\"> pointing at the preferred URL",
        ));
        return (analysis, None);
    };
    analysis.canonical_urls = hrefs;

    if analysis.canonical_count > 1 {
        analysis.canonical_issues.push(format!(
            "Multiple canonical tags found ({})",
            analysis.canonical_count
        ));
        recs.push(Recommendation::error(
            Impact::High,
            "Multiple canonical tags found",
            "Keep exactly one canonical tag per page",
        ));
    }

    if first.is_empty() {
        analysis
            .canonical_issues
            .push("Canonical tag has an empty href".into());
        recs.push(Recommendation::error(
            Impact::High,
            "Canonical tag has an empty href",
            "Set the canonical href to the absolute preferred URL",
        ));
        return (analysis, None);
    }

    analysis.is_relative = Url::parse(&first).is_err();
    let resolved = match page.join(&first) {
        Ok(resolved) if matches!(resolved.scheme(), "http" | "https") && resolved.host_str().is_some() => {
            resolved
        }
        _ => {
            analysis
                .canonical_issues
                .push(format!("Canonical URL is not a valid absolute URL: {first}"));
            recs.push(Recommendation::error(
                Impact::High,
                "Canonical URL is invalid",
                "Use an absolute http(s) URL in the canonical tag",
            ));
            return (analysis, None);
        }
    };
    analysis.canonical_url = Some(resolved.to_string());

    if analysis.is_relative {
        recs.push(Recommendation::info(
            Impact::Low,
            "Canonical URL is relative",
            "Prefer absolute canonical URLs to avoid resolution mistakes",
        ));
    }

    analysis.is_self_referencing =
        normalize_for_comparison(page) == normalize_for_comparison(&resolved);

    if page.scheme() == "https" && resolved.scheme() == "http" {
        analysis.scheme_mismatch = true;
        analysis
            .canonical_issues
            .push("Canonical URL uses HTTP on an HTTPS page".into());
        recs.push(Recommendation::warning(
            Impact::High,
            "Canonical URL uses HTTP on an HTTPS page",
            "Point the canonical at the HTTPS version of the page",
        ));
    }

    if page.host_str() != resolved.host_str() {
        analysis.host_mismatch = true;
        analysis.canonical_issues.push(format!(
            "Canonical URL points to a different host ({})",
            resolved.host_str().unwrap_or_default()
        ));
        recs.push(Recommendation::warning(
            Impact::Medium,
            "Canonical URL points to a different host",
            "Confirm cross-domain canonicalization is intended",
        ));
    }

    if !analysis.is_self_referencing && !analysis.host_mismatch {
        recs.push(Recommendation::info(
            Impact::Low,
            "Canonical URL points to a different page",
            "Confirm this page is meant to be consolidated into the canonical target",
        ));
    }

    (analysis, Some(resolved))
}

fn redirect_points(redirects: &RedirectAnalysis) -> f64 {
    match &redirects.chain {
        Some(chain) if chain.is_truncated() => 0.0,
        Some(chain) => match chain.redirect_count {
            0 => 20.0,
            1 => 15.0,
            2..=3 => 10.0,
            _ => 0.0,
        },
        None => 0.0,
    }
}

/// 20 canonical present, 20 issue-free, 10 self-referencing; 15 SEO-friendly
/// plus 15 x readability; redirect cleanliness 20/15/10/0; duplication risk
/// 10/5/0.
fn compute_score(report: &CanonicalReport) -> u8 {
    let canonical = &report.canonical_analysis;
    let mut score = 0.0;

    if canonical.has_canonical {
        score += 20.0;
        if canonical.canonical_issues.is_empty() {
            score += 20.0;
        }
        if canonical.is_self_referencing {
            score += 10.0;
        }
    }

    if report.url_structure.seo_friendly {
        score += 15.0;
    }
    score += 15.0 * f64::from(report.url_structure.readability_score) / 100.0;

    score += redirect_points(&report.redirect_analysis);

    score += match report.duplicate_content.duplication_risk {
        DuplicationRisk::Low => 10.0,
        DuplicationRisk::Medium => 5.0,
        DuplicationRisk::High => 0.0,
    };

    clamp_score(score)
}

fn structure_recommendations(structure: &UrlStructure, recs: &mut Vec<Recommendation>) {
    if !structure.seo_friendly {
        recs.push(Recommendation::warning(
            Impact::Medium,
            "URL is not SEO-friendly",
            "Use short, lower-case, hyphen-separated words and avoid id-style parameters",
        ));
    }
    if structure.readability_score < 60 {
        recs.push(Recommendation::info(
            Impact::Low,
            format!("URL readability is low ({}/100)", structure.readability_score),
            "Shorten the URL, reduce nesting and drop unnecessary parameters",
        ));
    }
}

fn redirect_recommendations(redirects: &RedirectAnalysis, recs: &mut Vec<Recommendation>) {
    let Some(chain) = &redirects.chain else {
        return;
    };
    if chain.loop_detected {
        recs.push(Recommendation::error(
            Impact::High,
            "Redirect loop detected",
            "Fix the redirect rules so the URL resolves to a final page",
        ));
    } else if chain.max_redirects_reached {
        recs.push(Recommendation::error(
            Impact::High,
            format!("Redirect chain exceeds {MAX_REDIRECT_HOPS} hops"),
            "Redirect directly to the final destination",
        ));
    } else if chain.blocked_target.is_some() {
        recs.push(Recommendation::warning(
            Impact::Medium,
            "URL redirects to a private or disallowed address",
            "Redirect only to public destinations",
        ));
    } else if chain.redirect_count > 1 {
        recs.push(Recommendation::warning(
            Impact::Medium,
            format!("URL passes through {} redirects", chain.redirect_count),
            "Collapse the redirect chain into a single 301",
        ));
    } else if chain.redirect_count == 1 {
        recs.push(Recommendation::info(
            Impact::Low,
            "URL redirects once before resolving",
            "Link to the final URL directly",
        ));
    }
}

fn duplicate_recommendations(dup: &DuplicateContentIndicators, recs: &mut Vec<Recommendation>) {
    match dup.duplication_risk {
        DuplicationRisk::High => recs.push(Recommendation::warning(
            Impact::High,
            "High duplicate-content risk from URL parameters",
            "Strip session and tracking parameters or canonicalize to the clean URL",
        )),
        DuplicationRisk::Medium => recs.push(Recommendation::info(
            Impact::Medium,
            "URL parameters may create duplicate content",
            "Make sure the canonical tag points at the parameter-free URL",
        )),
        DuplicationRisk::Low => {}
    }
}

/// Canonical-URL analyzer.
pub struct CanonicalAnalyzer {
    fetcher: Arc<dyn Fetcher>,
    policy: UrlPolicy,
}

impl CanonicalAnalyzer {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            policy: UrlPolicy::strict(),
        }
    }

    pub fn with_policy(mut self, policy: UrlPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn analyze(
        &self,
        url: &str,
        html: &str,
        _options: &AuditOptions,
    ) -> AnalyzerResult<CanonicalReport> {
        let page = match Url::parse(url) {
            Ok(page) => page,
            Err(e) => return AnalyzerResult::failed(format!("Invalid page URL '{url}': {e}")),
        };
        log::debug!("Starting canonical analysis for {url}");

        let mut recs = Vec::new();
        let mut errors = Vec::new();

        // All DOM work happens before the first await
        let hrefs = extract_canonical_hrefs(html);
        let (mut canonical_analysis, target) = inspect_canonical_tags(&page, hrefs, &mut recs);
        let url_structure = analyze_url_structure(&page);
        let duplicate_content = analyze_duplicate_content(&page, html);

        if let Some(target) = target {
            self.probe_canonical(&target, &mut canonical_analysis, &mut recs, &mut errors)
                .await;
        }

        let redirect_analysis =
            match walk_redirect_chain(self.fetcher.as_ref(), url, MAX_REDIRECT_HOPS, &self.policy)
                .await
            {
                Ok(chain) => RedirectAnalysis {
                    chain: Some(chain),
                    error: None,
                },
                Err(e) => {
                    log::warn!("Redirect chain walk failed for {url}: {e}");
                    errors.push(format!("redirect chain: {e}"));
                    RedirectAnalysis {
                        chain: None,
                        error: Some(e.message),
                    }
                }
            };

        structure_recommendations(&url_structure, &mut recs);
        redirect_recommendations(&redirect_analysis, &mut recs);
        duplicate_recommendations(&duplicate_content, &mut recs);

        let report = CanonicalReport {
            canonical_analysis,
            url_structure,
            redirect_analysis,
            duplicate_content,
        };
        let score = compute_score(&report);
        log::debug!(
            "Finished canonical analysis for {url}: score {score}, redirects {:?}",
            report.redirect_analysis.redirect_count()
        );

        AnalyzerResult::completed(score, report, recs, errors)
    }

    async fn probe_canonical(
        &self,
        target: &Url,
        analysis: &mut CanonicalTagAnalysis,
        recs: &mut Vec<Recommendation>,
        errors: &mut Vec<String>,
    ) {
        if let Err(reason) = self.policy.check(target.as_str()) {
            analysis
                .canonical_issues
                .push("Canonical URL points to a disallowed address".into());
            errors.push(format!("canonical target: {reason}"));
            return;
        }

        match probe(self.fetcher.as_ref(), target.as_str(), &RequestOptions::no_follow()).await {
            Ok(response) => {
                analysis.canonical_status = Some(response.status);
                if !response.is_success() {
                    analysis
                        .canonical_issues
                        .push(format!("Canonical URL returns HTTP {}", response.status));
                    recs.push(Recommendation::error(
                        Impact::High,
                        format!("Canonical URL returns HTTP {}", response.status),
                        "Point the canonical at a URL that answers 200 without redirecting",
                    ));
                }
            }
            Err(e) => {
                log::warn!("Canonical probe failed for {target}: {e}");
                errors.push(format!("canonical target: {e}"));
            }
        }
    }
}
