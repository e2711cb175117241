//! Shared data model for the audit pipeline.
//!
//! Every analyzer returns an [`AnalyzerResult`] carrying its own typed details
//! plus the uniform contract fields (`score`, `recommendations`, `errors`),
//! so the orchestrator can aggregate heterogeneous results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{EnumIter, IntoStaticStr};

use crate::utils::parse_selector_with_fallback;

/// How serious a recommendation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    /// Sort rank, highest first.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Error => 3,
            Severity::Warning => 2,
            Severity::Info => 1,
        }
    }
}

/// Expected effect of acting on a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl Impact {
    /// Sort rank, highest first.
    pub fn rank(&self) -> u8 {
        match self {
            Impact::High => 3,
            Impact::Medium => 2,
            Impact::Low => 1,
        }
    }
}

/// A single remediation item. Flat and analyzer-agnostic so lists from
/// different analyzers can be merged and sorted together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub severity: Severity,
    pub message: String,
    pub impact: Impact,
    pub fix: String,
}

impl Recommendation {
    pub fn new(
        severity: Severity,
        impact: Impact,
        message: impl Into<String>,
        fix: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            message: message.into(),
            impact,
            fix: fix.into(),
        }
    }

    pub fn error(impact: Impact, message: impl Into<String>, fix: impl Into<String>) -> Self {
        Self::new(Severity::Error, impact, message, fix)
    }

    pub fn warning(impact: Impact, message: impl Into<String>, fix: impl Into<String>) -> Self {
        Self::new(Severity::Warning, impact, message, fix)
    }

    pub fn info(impact: Impact, message: impl Into<String>, fix: impl Into<String>) -> Self {
        Self::new(Severity::Info, impact, message, fix)
    }
}

/// Sorts recommendations by severity (error first), then impact (high first).
///
/// The sort is stable, so equal items keep their analyzer order.
pub fn sort_recommendations(recommendations: &mut [Recommendation]) {
    recommendations.sort_by(|a, b| {
        b.severity
            .rank()
            .cmp(&a.severity.rank())
            .then_with(|| b.impact.rank().cmp(&a.impact.rank()))
    });
}

/// The uniform result every analyzer returns.
///
/// `details` is `None` when the analyzer could not run at all; such a result
/// carries `score == 0`, its reason in `errors`, and no weight in the overall
/// score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerResult<T> {
    pub score: u8,
    #[serde(flatten)]
    pub details: Option<T>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub findings: BTreeMap<String, Value>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl<T> AnalyzerResult<T> {
    pub fn completed(
        score: u8,
        details: T,
        recommendations: Vec<Recommendation>,
        errors: Vec<String>,
    ) -> Self {
        Self {
            score: score.min(100),
            details: Some(details),
            findings: BTreeMap::new(),
            recommendations,
            errors,
        }
    }

    /// A result for an analyzer that produced no score signal.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            score: 0,
            details: None,
            findings: BTreeMap::new(),
            recommendations: Vec::new(),
            errors: vec![crate::utils::sanitize::sanitize_and_truncate_error_message(
                &reason.into(),
            )],
        }
    }

    pub fn with_finding(mut self, key: &str, value: Value) -> Self {
        self.findings.insert(key.to_string(), value);
        self
    }

    /// Whether this result should carry weight in the overall score.
    pub fn produced_score(&self) -> bool {
        self.details.is_some()
    }
}

/// The analyzers run by the orchestrator, named as they appear in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
pub enum AnalyzerKind {
    #[strum(serialize = "page_speed")]
    PageSpeed,
    #[strum(serialize = "mobile_optimization")]
    MobileOptimization,
    #[strum(serialize = "security")]
    Security,
    #[strum(serialize = "sitemap_analysis")]
    SitemapAnalysis,
    #[strum(serialize = "canonical_urls")]
    CanonicalUrls,
    #[strum(serialize = "structured_data")]
    StructuredData,
}

impl AnalyzerKind {
    pub fn service_name(&self) -> &'static str {
        self.into()
    }
}

impl std::fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.service_name())
    }
}

fn default_true() -> bool {
    true
}

/// Per-audit options, deserializable from the caller's option map.
///
/// Every `include_*` flag defaults to `true`; unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditOptions {
    #[serde(default)]
    pub force_refresh: bool,
    #[serde(default = "default_true")]
    pub include_page_speed: bool,
    #[serde(default = "default_true")]
    pub include_mobile_analysis: bool,
    #[serde(default = "default_true")]
    pub include_security_analysis: bool,
    #[serde(default = "default_true")]
    pub include_sitemap_analysis: bool,
    #[serde(default = "default_true")]
    pub include_canonical_analysis: bool,
    #[serde(default = "default_true")]
    pub include_structured_data: bool,
    #[serde(default)]
    pub max_urls_to_analyze: Option<usize>,
    #[serde(default)]
    pub max_accessibility_tests: Option<usize>,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            force_refresh: false,
            include_page_speed: true,
            include_mobile_analysis: true,
            include_security_analysis: true,
            include_sitemap_analysis: true,
            include_canonical_analysis: true,
            include_structured_data: true,
            max_urls_to_analyze: None,
            max_accessibility_tests: None,
        }
    }
}

impl AuditOptions {
    pub fn is_enabled(&self, kind: AnalyzerKind) -> bool {
        match kind {
            AnalyzerKind::PageSpeed => self.include_page_speed,
            AnalyzerKind::MobileOptimization => self.include_mobile_analysis,
            AnalyzerKind::Security => self.include_security_analysis,
            AnalyzerKind::SitemapAnalysis => self.include_sitemap_analysis,
            AnalyzerKind::CanonicalUrls => self.include_canonical_analysis,
            AnalyzerKind::StructuredData => self.include_structured_data,
        }
    }

    pub fn max_sitemap_urls(&self) -> usize {
        self.max_urls_to_analyze
            .unwrap_or(crate::config::DEFAULT_MAX_SITEMAP_URLS)
    }

    pub fn max_accessibility_tests(&self) -> usize {
        self.max_accessibility_tests
            .unwrap_or(crate::config::DEFAULT_MAX_ACCESSIBILITY_TESTS)
    }
}

/// Structural counts of the page, normally produced by the crawler's DOM parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomSummary {
    pub html_size_bytes: usize,
    pub image_count: usize,
    pub images_with_srcset: usize,
    pub script_count: usize,
    pub external_script_count: usize,
    pub stylesheet_count: usize,
    pub iframe_count: usize,
}

impl DomSummary {
    /// Derives the summary from raw HTML when the crawler did not supply one.
    pub fn from_html(html: &str) -> Self {
        let document = scraper::Html::parse_document(html);
        let count = |selector: &str| {
            let sel = parse_selector_with_fallback(selector, "DOM summary");
            document.select(&sel).count()
        };

        Self {
            html_size_bytes: html.len(),
            image_count: count("img"),
            images_with_srcset: count("img[srcset]"),
            script_count: count("script"),
            external_script_count: count("script[src]"),
            stylesheet_count: count("link[rel~='stylesheet']"),
            iframe_count: count("iframe"),
        }
    }
}

/// The immutable input to one audit.
///
/// `url` is where the page was fetched from, not its SEO canonical.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditTarget {
    pub url: String,
    pub html: String,
    pub dom_summary: Option<DomSummary>,
    pub options: AuditOptions,
}

impl AuditTarget {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
            dom_summary: None,
            options: AuditOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AuditOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_dom_summary(mut self, summary: DomSummary) -> Self {
        self.dom_summary = Some(summary);
        self
    }
}
