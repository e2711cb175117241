//! Crawlability analysis: robots.txt and XML sitemaps.
//!
//! This module:
//! - Fetches and parses `robots.txt`
//! - Discovers sitemaps (robots.txt references, then conventional paths)
//! - Fetches, gunzips and parses each sitemap under size and count bounds
//! - Samples sitemap URLs for live accessibility
//! - Scores crawlability and emits recommendations

mod parse;
mod sitemap;

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::{cache_key, Cache, Clock};
use crate::config::{
    ACCESSIBILITY_CONCURRENCY, CONVENTIONAL_SITEMAP_PATHS, DEFAULT_CACHE_TTL_SECS,
    MAX_DECOMPRESSED_SITEMAP_SIZE, MAX_FAILED_URL_SAMPLES, MAX_SITEMAPS_PER_AUDIT,
};
use crate::fetch::{decode_body, is_gzip, probe, Fetcher, RequestOptions};
use crate::models::{AnalyzerResult, AuditOptions, Impact, Recommendation};
use crate::security::UrlPolicy;
use crate::utils::clamp_score;

pub use parse::{parse_robots_txt, RobotsDirectiveSet, RobotsSyntaxError, UserAgentGroup};
pub use sitemap::{
    parse_lastmod, parse_sitemap_xml, IssueLevel, ParsedSitemap, SitemapEntry, SitemapKind,
    SitemapReference, SitemapStatistics, SitemapValidation, ValidationIssue,
};

const CACHE_NAMESPACE: &str = "sitemap";

/// robots.txt fetch outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotsTxtStatus {
    pub url: String,
    pub accessible: bool,
    pub status_code: Option<u16>,
    pub directives: Option<RobotsDirectiveSet>,
    pub blocks_all_crawlers: bool,
}

/// How a sitemap URL was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SitemapSource {
    RobotsTxt,
    ConventionalPath,
    SitemapIndex,
}

/// Fetch and parse outcome for one discovered sitemap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitemapSummary {
    pub url: String,
    pub source: SitemapSource,
    pub accessible: bool,
    pub status_code: Option<u16>,
    pub compressed: bool,
    #[serde(rename = "type")]
    pub kind: Option<SitemapKind>,
    pub children: Vec<SitemapReference>,
    pub statistics: Option<SitemapStatistics>,
    pub validation: SitemapValidation,
    pub error: Option<String>,
    /// Retained entries, used for sampling and not reported.
    #[serde(skip)]
    pub entries: Vec<SitemapEntry>,
}

impl SitemapSummary {
    fn new(url: &str, source: SitemapSource) -> Self {
        Self {
            url: url.to_string(),
            source,
            accessible: false,
            status_code: None,
            compressed: false,
            kind: None,
            children: Vec::new(),
            statistics: None,
            validation: SitemapValidation::default(),
            error: None,
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedUrl {
    pub url: String,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

/// Live-accessibility sample of sitemap URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlAccessibility {
    pub tested: usize,
    pub accessible: usize,
    pub inaccessible: usize,
    /// Sampled URLs that robots.txt disallows for `*`.
    pub blocked_by_robots: usize,
    /// Sampled URLs skipped because they failed URL validation.
    pub skipped_unsafe: usize,
    /// Status code (or `"error"`) -> count.
    pub status_codes: BTreeMap<String, usize>,
    pub failed_urls: Vec<FailedUrl>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStatistics {
    pub total_sitemaps: usize,
    pub accessible_sitemaps: usize,
    pub total_urls: usize,
    pub validation_errors: usize,
    pub validation_warnings: usize,
    pub max_sitemaps_reached: bool,
    pub max_sitemap_depth_reached: bool,
}

/// Details of the crawlability analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SitemapReport {
    pub robots_txt: RobotsTxtStatus,
    pub sitemaps: Vec<SitemapSummary>,
    pub url_accessibility: UrlAccessibility,
    pub statistics: CrawlStatistics,
}

/// Analyzes robots.txt and sitemaps for a site.
pub struct RobotsSitemapAnalyzer {
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<dyn Cache>,
    clock: Arc<dyn Clock>,
    policy: UrlPolicy,
    cache_ttl: Duration,
    max_index_depth: usize,
}

impl RobotsSitemapAnalyzer {
    pub fn new(fetcher: Arc<dyn Fetcher>, cache: Arc<dyn Cache>, clock: Arc<dyn Clock>) -> Self {
        Self {
            fetcher,
            cache,
            clock,
            policy: UrlPolicy::strict(),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            max_index_depth: 0,
        }
    }

    pub fn with_policy(mut self, policy: UrlPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// How many levels of sitemap indexes to expand (0 reports children only).
    pub fn with_max_index_depth(mut self, depth: usize) -> Self {
        self.max_index_depth = depth;
        self
    }

    /// Runs the analysis for the site that `url` belongs to.
    ///
    /// Uses the cached result unless `options.force_refresh` is set; a fresh
    /// result without errors is written back.
    pub async fn analyze(&self, url: &str, options: &AuditOptions) -> AnalyzerResult<SitemapReport> {
        let origin = match Url::parse(url) {
            Ok(parsed) if parsed.host_str().is_some() => parsed.origin().ascii_serialization(),
            _ => return AnalyzerResult::failed(format!("Cannot derive site origin from '{url}'")),
        };

        let key = cache_key(
            CACHE_NAMESPACE,
            &origin,
            &(
                options.max_sitemap_urls(),
                options.max_accessibility_tests(),
                self.max_index_depth,
            ),
        );

        if !options.force_refresh {
            if let Some(cached) = self.cache.get(&key) {
                match serde_json::from_value::<AnalyzerResult<SitemapReport>>(cached) {
                    Ok(result) => {
                        log::debug!("Sitemap analysis cache hit for {origin}");
                        return result;
                    }
                    Err(e) => log::warn!("Discarding unreadable sitemap cache entry {key}: {e}"),
                }
            }
        }

        log::debug!("Starting sitemap analysis for {origin}");
        let result = self.run(&origin, options).await;
        log::debug!("Finished sitemap analysis for {origin}: score {}", result.score);

        if result.errors.is_empty() {
            match serde_json::to_value(&result) {
                Ok(value) => self.cache.set(&key, value, self.cache_ttl),
                Err(e) => log::warn!("Could not serialize sitemap result for caching: {e}"),
            }
        }
        result
    }

    async fn run(&self, origin: &str, options: &AuditOptions) -> AnalyzerResult<SitemapReport> {
        let mut errors: Vec<String> = Vec::new();
        let mut report = SitemapReport {
            robots_txt: self.fetch_robots(origin, &mut errors).await,
            ..Default::default()
        };

        let candidates = self.discover(origin, &report.robots_txt).await;
        report.sitemaps = self
            .fetch_sitemaps(
                candidates,
                options.max_sitemap_urls(),
                &mut report.statistics,
                &mut errors,
            )
            .await;

        let sample = sample_urls(&report.sitemaps, options.max_accessibility_tests());
        report.url_accessibility = self
            .test_accessibility(sample, report.robots_txt.directives.as_ref())
            .await;
        for summary in &mut report.sitemaps {
            summary.entries = Vec::new();
        }

        summarize(&mut report);
        let score = compute_score(&report);
        let recommendations = build_recommendations(&report);

        AnalyzerResult::completed(score, report, recommendations, errors)
    }

    async fn fetch_robots(&self, origin: &str, errors: &mut Vec<String>) -> RobotsTxtStatus {
        let robots_url = format!("{origin}/robots.txt");
        let mut status = RobotsTxtStatus {
            url: robots_url.clone(),
            ..Default::default()
        };

        if let Err(reason) = self.policy.check(&robots_url) {
            errors.push(format!("robots.txt: {reason}"));
            return status;
        }

        match self.fetcher.get(&robots_url, &RequestOptions::follow()).await {
            Ok(response) => {
                status.status_code = Some(response.status);
                if response.is_success() {
                    let directives = parse_robots_txt(&response.text());
                    status.accessible = true;
                    status.blocks_all_crawlers = directives.blocks_everything();
                    status.directives = Some(directives);
                } else {
                    log::info!("robots.txt at {robots_url} returned {}", response.status);
                }
            }
            Err(e) => {
                log::warn!("Failed to fetch {robots_url}: {e}");
                errors.push(format!("robots.txt: {e}"));
            }
        }
        status
    }

    /// Sitemap URLs from robots.txt, or else the conventional paths that exist.
    async fn discover(&self, origin: &str, robots: &RobotsTxtStatus) -> Vec<(String, SitemapSource)> {
        let referenced: Vec<String> = robots
            .directives
            .as_ref()
            .map(|d| d.sitemaps.clone())
            .unwrap_or_default();
        if !referenced.is_empty() {
            return referenced
                .into_iter()
                .map(|u| (u, SitemapSource::RobotsTxt))
                .collect();
        }

        let mut found = Vec::new();
        for path in CONVENTIONAL_SITEMAP_PATHS {
            let candidate = format!("{origin}{path}");
            if !self.policy.is_allowed(&candidate) {
                continue;
            }
            match probe(self.fetcher.as_ref(), &candidate, &RequestOptions::follow()).await {
                Ok(response) if response.is_success() && looks_like_sitemap(response.content_type()) => {
                    log::debug!("Found sitemap at conventional path {candidate}");
                    found.push((candidate, SitemapSource::ConventionalPath));
                }
                Ok(response) => {
                    log::debug!("No sitemap at {candidate} ({})", response.status);
                }
                Err(e) => log::debug!("Probe of {candidate} failed: {e}"),
            }
        }
        found
    }

    async fn fetch_sitemaps(
        &self,
        candidates: Vec<(String, SitemapSource)>,
        max_urls: usize,
        stats: &mut CrawlStatistics,
        errors: &mut Vec<String>,
    ) -> Vec<SitemapSummary> {
        let mut queue: VecDeque<(String, SitemapSource, usize)> = candidates
            .into_iter()
            .map(|(url, source)| (url, source, 0))
            .collect();
        let mut seen: HashSet<String> = HashSet::new();
        let mut summaries = Vec::new();

        while let Some((url, source, depth)) = queue.pop_front() {
            if !seen.insert(url.clone()) {
                continue;
            }
            if summaries.len() >= MAX_SITEMAPS_PER_AUDIT {
                stats.max_sitemaps_reached = true;
                log::warn!("Sitemap fetch bound of {MAX_SITEMAPS_PER_AUDIT} reached");
                break;
            }

            let summary = self.fetch_sitemap(&url, source, max_urls, errors).await;
            if summary.kind == Some(SitemapKind::SitemapIndex) && !summary.children.is_empty() {
                if depth < self.max_index_depth {
                    for child in &summary.children {
                        queue.push_back((child.loc.clone(), SitemapSource::SitemapIndex, depth + 1));
                    }
                } else if self.max_index_depth > 0 {
                    stats.max_sitemap_depth_reached = true;
                }
            }
            summaries.push(summary);
        }
        summaries
    }

    async fn fetch_sitemap(
        &self,
        url: &str,
        source: SitemapSource,
        max_urls: usize,
        errors: &mut Vec<String>,
    ) -> SitemapSummary {
        let mut summary = SitemapSummary::new(url, source);

        if let Err(reason) = self.policy.check(url) {
            summary.error = Some(reason.clone());
            errors.push(format!("sitemap {url}: {reason}"));
            return summary;
        }

        let response = match self.fetcher.get(url, &RequestOptions::follow()).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Failed to fetch sitemap {url}: {e}");
                summary.error = Some(e.message.clone());
                errors.push(format!("sitemap {url}: {e}"));
                return summary;
            }
        };
        summary.status_code = Some(response.status);
        if !response.is_success() {
            log::warn!("Sitemap {url} returned {}", response.status);
            summary.error = Some(format!("HTTP {}", response.status));
            errors.push(format!("sitemap {url}: HTTP {}", response.status));
            return summary;
        }
        summary.accessible = true;
        summary.compressed = is_gzip(&response.body);

        let body = match decode_body(&response, MAX_DECOMPRESSED_SITEMAP_SIZE) {
            Ok(body) => body,
            Err(e) => {
                summary.error = Some(e.message.clone());
                errors.push(format!("sitemap {url}: {e}"));
                return summary;
            }
        };

        match parse_sitemap_xml(&String::from_utf8_lossy(&body), max_urls, self.clock.now()) {
            Ok(parsed) => {
                summary.kind = Some(parsed.kind);
                summary.children = parsed.children;
                summary.statistics = Some(parsed.statistics);
                summary.validation = parsed.validation;
                summary.entries = parsed.entries;
            }
            Err(e) => {
                log::warn!("Failed to parse sitemap {url}: {e}");
                summary.error = Some(e.to_string());
                errors.push(format!("sitemap {url}: {e}"));
            }
        }
        summary
    }
}

fn looks_like_sitemap(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("xml") || ct.contains("text") || ct.contains("gzip")
        })
        .unwrap_or(false)
}

impl RobotsSitemapAnalyzer {
    /// Probes sampled URLs with bounded concurrency.
    async fn test_accessibility(
        &self,
        sample: Vec<String>,
        directives: Option<&RobotsDirectiveSet>,
    ) -> UrlAccessibility {
        let mut result = UrlAccessibility::default();
        let mut targets = Vec::with_capacity(sample.len());

        for url in sample {
            if let (Some(directives), Ok(parsed)) = (directives, Url::parse(&url)) {
                let path = match parsed.query() {
                    Some(query) => format!("{}?{}", parsed.path(), query),
                    None => parsed.path().to_string(),
                };
                if !directives.is_allowed("*", &path) {
                    result.blocked_by_robots += 1;
                }
            }
            if self.policy.check(&url).is_err() {
                result.skipped_unsafe += 1;
                continue;
            }
            targets.push(url);
        }

        let mut outcomes: Vec<(usize, String, Result<u16, String>)> =
            stream::iter(targets.into_iter().enumerate())
                .map(|(index, url)| {
                    let fetcher = Arc::clone(&self.fetcher);
                    async move {
                        let outcome = probe(fetcher.as_ref(), &url, &RequestOptions::follow())
                            .await
                            .map(|response| response.status)
                            .map_err(|e| e.message);
                        (index, url, outcome)
                    }
                })
                .buffer_unordered(ACCESSIBILITY_CONCURRENCY)
                .collect()
                .await;
        outcomes.sort_by_key(|(index, _, _)| *index);

        for (_, url, outcome) in outcomes {
            result.tested += 1;
            let (key, failure) = match outcome {
                Ok(status) if (200..300).contains(&status) => (status.to_string(), None),
                Ok(status) => (
                    status.to_string(),
                    Some(FailedUrl {
                        url,
                        status_code: Some(status),
                        error: None,
                    }),
                ),
                Err(message) => (
                    "error".to_string(),
                    Some(FailedUrl {
                        url,
                        status_code: None,
                        error: Some(message),
                    }),
                ),
            };
            *result.status_codes.entry(key).or_insert(0) += 1;
            match failure {
                None => result.accessible += 1,
                Some(failed) => {
                    result.inaccessible += 1;
                    if result.failed_urls.len() < MAX_FAILED_URL_SAMPLES {
                        result.failed_urls.push(failed);
                    }
                }
            }
        }
        result
    }
}

/// First `limit` distinct URLs across all retained sitemap entries.
fn sample_urls(sitemaps: &[SitemapSummary], limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    sitemaps
        .iter()
        .flat_map(|s| s.entries.iter())
        .map(|e| e.loc.as_str())
        .filter(|loc| !loc.is_empty() && seen.insert(*loc))
        .take(limit)
        .map(str::to_string)
        .collect()
}

fn summarize(report: &mut SitemapReport) {
    let stats = &mut report.statistics;
    stats.total_sitemaps = report.sitemaps.len();
    stats.accessible_sitemaps = report.sitemaps.iter().filter(|s| s.accessible).count();
    stats.total_urls = report
        .sitemaps
        .iter()
        .filter_map(|s| s.statistics.as_ref())
        .map(|st| st.total_urls)
        .sum();
    stats.validation_errors = report.sitemaps.iter().map(|s| s.validation.error_count).sum();
    stats.validation_warnings = report
        .sitemaps
        .iter()
        .map(|s| s.validation.warning_count)
        .sum();
}

/// Quality points for one parsed sitemap (lastmod present, fresh, valid).
fn sitemap_quality_points(summary: &SitemapSummary) -> f64 {
    let Some(stats) = &summary.statistics else {
        return 0.0;
    };
    let mut points = 0.0;
    if stats.with_lastmod > 0 {
        points += 5.0;
    }
    if stats.recently_updated > 0 {
        points += 5.0;
    }
    if summary.validation.error_count == 0 {
        points += 5.0;
    }
    points
}

/// Crawlability score.
///
/// robots.txt reachable 20 (+10 with a sitemap reference); any sitemap 20
/// (+20 x reachable fraction); 25 x sampled accessible fraction; sitemap
/// quality up to 15.
fn compute_score(report: &SitemapReport) -> u8 {
    let mut score = 0.0;

    if report.robots_txt.accessible {
        score += 20.0;
        let references = report
            .robots_txt
            .directives
            .as_ref()
            .map(|d| !d.sitemaps.is_empty())
            .unwrap_or(false);
        if references {
            score += 10.0;
        }
    }

    if !report.sitemaps.is_empty() {
        let reachable = report.sitemaps.iter().filter(|s| s.accessible).count() as f64;
        score += 20.0 + 20.0 * reachable / report.sitemaps.len() as f64;
    }

    let access = &report.url_accessibility;
    if access.tested > 0 {
        score += 25.0 * access.accessible as f64 / access.tested as f64;
    }

    let quality: f64 = report.sitemaps.iter().map(sitemap_quality_points).sum();
    score += quality.min(15.0);

    clamp_score(score)
}

fn build_recommendations(report: &SitemapReport) -> Vec<Recommendation> {
    let mut recs = Vec::new();
    let robots = &report.robots_txt;

    if !robots.accessible {
        recs.push(Recommendation::error(
            Impact::High,
            "robots.txt file not accessible",
            "Serve a robots.txt file at the site root that returns HTTP 200",
        ));
    }
    if let Some(directives) = &robots.directives {
        if robots.blocks_all_crawlers {
            recs.push(Recommendation::error(
                Impact::High,
                "robots.txt blocks all crawlers from the entire site",
                "Remove 'Disallow: /' from the 'User-agent: *' group unless the site must stay unindexed",
            ));
        }
        if directives.sitemaps.is_empty() {
            recs.push(Recommendation::warning(
                Impact::Medium,
                "robots.txt does not reference a sitemap",
                "Add a 'Sitemap: https://your-site/sitemap.xml' line to robots.txt",
            ));
        }
        if !directives.syntax_errors.is_empty() {
            recs.push(Recommendation::warning(
                Impact::Low,
                format!(
                    "robots.txt has {} syntax error(s)",
                    directives.syntax_errors.len()
                ),
                "Fix malformed lines so crawlers interpret the rules as intended",
            ));
        }
    }

    if report.sitemaps.is_empty() {
        recs.push(Recommendation::error(
            Impact::High,
            "No XML sitemap found",
            "Publish an XML sitemap and reference it from robots.txt",
        ));
    } else {
        let unreachable = report.sitemaps.iter().filter(|s| !s.accessible).count();
        if unreachable > 0 {
            recs.push(Recommendation::warning(
                Impact::High,
                format!("{unreachable} sitemap(s) could not be fetched"),
                "Make sure every sitemap URL returns HTTP 200 with XML content",
            ));
        }
        let unparsed = report
            .sitemaps
            .iter()
            .filter(|s| s.accessible && s.kind.is_none())
            .count();
        if unparsed > 0 {
            recs.push(Recommendation::error(
                Impact::High,
                format!("{unparsed} sitemap(s) are not valid sitemap XML"),
                "Use a <urlset> or <sitemapindex> root element as defined by sitemaps.org",
            ));
        }
    }

    let stats = &report.statistics;
    if stats.validation_errors > 0 {
        recs.push(Recommendation::warning(
            Impact::Medium,
            format!(
                "Sitemaps contain {} invalid entr{}",
                stats.validation_errors,
                if stats.validation_errors == 1 { "y" } else { "ies" }
            ),
            "Every <loc> must be an absolute http(s) URL",
        ));
    }
    if stats.validation_warnings > 0 {
        recs.push(Recommendation::info(
            Impact::Low,
            format!(
                "Sitemaps have {} questionable lastmod, changefreq or priority value(s)",
                stats.validation_warnings
            ),
            "Use W3C dates, standard changefreq tokens and priorities between 0.0 and 1.0",
        ));
    }
    if stats.max_sitemaps_reached || stats.max_sitemap_depth_reached {
        recs.push(Recommendation::info(
            Impact::Low,
            "Sitemap expansion stopped at the configured bound",
            "Split very large sitemap hierarchies or flatten nested indexes",
        ));
    }

    let fresh = report
        .sitemaps
        .iter()
        .filter_map(|s| s.statistics.as_ref())
        .any(|st| st.recently_updated > 0);
    let dated = report
        .sitemaps
        .iter()
        .filter_map(|s| s.statistics.as_ref())
        .any(|st| st.with_lastmod > 0);
    if dated && !fresh {
        recs.push(Recommendation::info(
            Impact::Low,
            "No sitemap URL was updated in the last 30 days",
            "Keep <lastmod> current when content changes",
        ));
    } else if !dated && stats.accessible_sitemaps > 0 {
        recs.push(Recommendation::info(
            Impact::Low,
            "Sitemap entries have no <lastmod> dates",
            "Add <lastmod> so crawlers can prioritise changed pages",
        ));
    }

    let access = &report.url_accessibility;
    if access.inaccessible > 0 {
        recs.push(Recommendation::warning(
            Impact::High,
            format!(
                "{} of {} sampled sitemap URLs are not accessible",
                access.inaccessible, access.tested
            ),
            "Remove or fix sitemap URLs that do not return HTTP 200",
        ));
    }
    if access.blocked_by_robots > 0 {
        recs.push(Recommendation::warning(
            Impact::Medium,
            format!(
                "{} sampled sitemap URL(s) are disallowed by robots.txt",
                access.blocked_by_robots
            ),
            "List only crawlable URLs in sitemaps",
        ));
    }

    recs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{FixedClock, MemoryCache, NoopCache};
    use crate::fetch::fake::FakeFetcher;
    use crate::fetch::FetchResponse;
    use chrono::{TimeZone, Utc};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const SITE: &str = "https://example.com";

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap()))
    }

    fn analyzer(fetcher: FakeFetcher) -> RobotsSitemapAnalyzer {
        RobotsSitemapAnalyzer::new(Arc::new(fetcher), Arc::new(NoopCache), clock())
    }

    fn xml(body: &str) -> FetchResponse {
        FakeFetcher::with_headers(
            FakeFetcher::body(200, body),
            &[("content-type", "application/xml")],
        )
    }

    fn urlset(locs: &[&str]) -> String {
        let mut out = String::from(r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#);
        for loc in locs {
            out.push_str(&format!(
                "<url><loc>{loc}</loc><lastmod>2024-06-01</lastmod></url>"
            ));
        }
        out.push_str("</urlset>");
        out
    }

    #[tokio::test]
    async fn test_full_crawlability_scores_100() {
        let fetcher = FakeFetcher::new()
            .on_get(
                &format!("{SITE}/robots.txt"),
                FakeFetcher::body(200, "User-agent: *\nDisallow: /admin\nSitemap: https://example.com/sitemap.xml\n"),
            )
            .on_get(
                &format!("{SITE}/sitemap.xml"),
                xml(&urlset(&["https://example.com/", "https://example.com/about"])),
            )
            .on_head(&format!("{SITE}/"), FakeFetcher::status(200))
            .on_head(&format!("{SITE}/about"), FakeFetcher::status(200));

        let result = analyzer(fetcher)
            .analyze("https://example.com/page", &AuditOptions::default())
            .await;
        let report = result.details.as_ref().unwrap();

        assert!(report.robots_txt.accessible);
        assert_eq!(report.sitemaps.len(), 1);
        assert_eq!(report.sitemaps[0].source, SitemapSource::RobotsTxt);
        assert_eq!(report.url_accessibility.tested, 2);
        assert_eq!(report.url_accessibility.accessible, 2);
        assert_eq!(report.statistics.total_urls, 2);
        assert!(result.errors.is_empty());
        assert_eq!(result.score, 100);
    }

    #[tokio::test]
    async fn test_robots_missing_and_no_sitemaps() {
        let fetcher = FakeFetcher::new()
            .on_get(&format!("{SITE}/robots.txt"), FakeFetcher::status(404))
            .on_head(&format!("{SITE}/sitemap.xml"), FakeFetcher::status(404))
            .on_head(&format!("{SITE}/sitemap_index.xml"), FakeFetcher::status(404))
            .on_head(&format!("{SITE}/sitemaps.xml"), FakeFetcher::status(404))
            .on_head(&format!("{SITE}/sitemap1.xml"), FakeFetcher::status(404));

        let result = analyzer(fetcher).analyze(SITE, &AuditOptions::default()).await;
        let report = result.details.as_ref().unwrap();

        assert!(!report.robots_txt.accessible);
        assert_eq!(report.robots_txt.status_code, Some(404));
        assert!(report.sitemaps.is_empty());
        assert_eq!(result.score, 0);
        assert!(result.recommendations.iter().any(|r| {
            r.severity == crate::models::Severity::Error
                && r.message == "robots.txt file not accessible"
        }));
    }

    #[tokio::test]
    async fn test_robots_without_directives_caps_at_20() {
        let fetcher = FakeFetcher::new()
            .on_get(&format!("{SITE}/robots.txt"), FakeFetcher::body(200, "# nothing here\n"));
        let result = analyzer(fetcher).analyze(SITE, &AuditOptions::default()).await;
        assert!(result.details.as_ref().unwrap().robots_txt.accessible);
        assert!(result.score <= 20);
    }

    #[tokio::test]
    async fn test_conventional_path_requires_xml_content_type() {
        let fetcher = FakeFetcher::new()
            .on_get(&format!("{SITE}/robots.txt"), FakeFetcher::status(404))
            .on_head(
                &format!("{SITE}/sitemap.xml"),
                FakeFetcher::with_headers(FakeFetcher::status(200), &[("content-type", "image/png")]),
            )
            .on_head(
                &format!("{SITE}/sitemap_index.xml"),
                FakeFetcher::with_headers(FakeFetcher::status(200), &[("content-type", "text/xml")]),
            )
            .on_get(&format!("{SITE}/sitemap_index.xml"), xml(&urlset(&[])));

        let result = analyzer(fetcher).analyze(SITE, &AuditOptions::default()).await;
        let report = result.details.unwrap();
        assert_eq!(report.sitemaps.len(), 1);
        assert_eq!(report.sitemaps[0].url, format!("{SITE}/sitemap_index.xml"));
        assert_eq!(report.sitemaps[0].source, SitemapSource::ConventionalPath);
    }

    #[tokio::test]
    async fn test_gzipped_sitemap_is_decoded() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(urlset(&["https://example.com/a"]).as_bytes())
            .unwrap();
        let gz = FetchResponse {
            status: 200,
            body: encoder.finish().unwrap(),
            ..Default::default()
        };
        let fetcher = FakeFetcher::new()
            .on_get(
                &format!("{SITE}/robots.txt"),
                FakeFetcher::body(200, "Sitemap: https://example.com/sitemap.xml.gz\n"),
            )
            .on_get(&format!("{SITE}/sitemap.xml.gz"), gz)
            .on_head(&format!("{SITE}/a"), FakeFetcher::status(200));

        let result = analyzer(fetcher).analyze(SITE, &AuditOptions::default()).await;
        let sitemap = &result.details.as_ref().unwrap().sitemaps[0];
        assert!(sitemap.compressed);
        assert_eq!(sitemap.kind, Some(SitemapKind::UrlSet));
        assert_eq!(sitemap.statistics.as_ref().unwrap().total_urls, 1);
    }

    #[tokio::test]
    async fn test_sitemap_index_not_recursed_by_default() {
        let index = r#"<sitemapindex><sitemap><loc>https://example.com/posts.xml</loc></sitemap></sitemapindex>"#;
        let fetcher = FakeFetcher::new()
            .on_get(
                &format!("{SITE}/robots.txt"),
                FakeFetcher::body(200, "Sitemap: https://example.com/index.xml\n"),
            )
            .on_get(&format!("{SITE}/index.xml"), xml(index))
            .on_get(&format!("{SITE}/posts.xml"), xml(&urlset(&["https://example.com/p1"])))
            .on_head(&format!("{SITE}/p1"), FakeFetcher::status(200));

        let fetcher = Arc::new(fetcher);
        let result = RobotsSitemapAnalyzer::new(fetcher.clone(), Arc::new(NoopCache), clock())
            .analyze(SITE, &AuditOptions::default())
            .await;
        let report = result.details.unwrap();
        assert_eq!(report.sitemaps.len(), 1);
        assert_eq!(report.sitemaps[0].kind, Some(SitemapKind::SitemapIndex));
        assert_eq!(report.sitemaps[0].children.len(), 1);
        assert_eq!(fetcher.calls("GET", "https://example.com/posts.xml"), 0);
        assert!(!report.statistics.max_sitemap_depth_reached);
    }

    #[tokio::test]
    async fn test_sitemap_index_recursion_is_bounded() {
        let index = r#"<sitemapindex><sitemap><loc>https://example.com/posts.xml</loc></sitemap><sitemap><loc>https://example.com/nested.xml</loc></sitemap></sitemapindex>"#;
        let nested = r#"<sitemapindex><sitemap><loc>https://example.com/deep.xml</loc></sitemap></sitemapindex>"#;
        let fetcher = Arc::new(
            FakeFetcher::new()
                .on_get(
                    &format!("{SITE}/robots.txt"),
                    FakeFetcher::body(200, "Sitemap: https://example.com/index.xml\n"),
                )
                .on_get(&format!("{SITE}/index.xml"), xml(index))
                .on_get(&format!("{SITE}/nested.xml"), xml(nested))
                .on_get(&format!("{SITE}/posts.xml"), xml(&urlset(&["https://example.com/p1"])))
                .on_head(&format!("{SITE}/p1"), FakeFetcher::status(200)),
        );

        let result = RobotsSitemapAnalyzer::new(fetcher.clone(), Arc::new(NoopCache), clock())
            .with_max_index_depth(1)
            .analyze(SITE, &AuditOptions::default())
            .await;
        let report = result.details.unwrap();
        assert_eq!(report.sitemaps.len(), 3);
        assert_eq!(report.sitemaps[1].source, SitemapSource::SitemapIndex);
        assert!(report.statistics.max_sitemap_depth_reached);
        assert_eq!(fetcher.calls("GET", "https://example.com/deep.xml"), 0);
        assert_eq!(report.url_accessibility.tested, 1);
    }

    #[tokio::test]
    async fn test_sampling_respects_limit_and_records_failures() {
        let locs: Vec<String> = (0..8).map(|i| format!("https://example.com/p{i}")).collect();
        let loc_refs: Vec<&str> = locs.iter().map(String::as_str).collect();
        let mut fetcher = FakeFetcher::new()
            .on_get(
                &format!("{SITE}/robots.txt"),
                FakeFetcher::body(200, "User-agent: *\nDisallow: /p1\nSitemap: https://example.com/sitemap.xml\n"),
            )
            .on_get(&format!("{SITE}/sitemap.xml"), xml(&urlset(&loc_refs)));
        for (i, loc) in locs.iter().enumerate() {
            let status = if i % 2 == 0 { 200 } else { 404 };
            fetcher = fetcher.on_head(loc, FakeFetcher::status(status));
        }

        let options = AuditOptions {
            max_accessibility_tests: Some(4),
            ..Default::default()
        };
        let result = analyzer(fetcher).analyze(SITE, &options).await;
        let access = &result.details.as_ref().unwrap().url_accessibility;
        assert_eq!(access.tested, 4);
        assert_eq!(access.accessible, 2);
        assert_eq!(access.inaccessible, 2);
        assert_eq!(access.status_codes.get("404"), Some(&2));
        assert_eq!(access.blocked_by_robots, 1);
        assert_eq!(access.failed_urls[0].url, "https://example.com/p1");
    }

    #[tokio::test]
    async fn test_sitemap_pointing_at_private_host_is_not_fetched() {
        let fetcher = Arc::new(FakeFetcher::new().on_get(
            &format!("{SITE}/robots.txt"),
            FakeFetcher::body(200, "Sitemap: http://10.0.0.5/sitemap.xml\n"),
        ));
        let result = RobotsSitemapAnalyzer::new(fetcher.clone(), Arc::new(NoopCache), clock())
            .analyze(SITE, &AuditOptions::default())
            .await;
        let report = result.details.as_ref().unwrap();
        assert!(!report.sitemaps[0].accessible);
        assert_eq!(fetcher.calls("GET", "http://10.0.0.5/sitemap.xml"), 0);
        assert!(!result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_result_is_cached_and_force_refresh_bypasses() {
        let fetcher = Arc::new(
            FakeFetcher::new()
                .on_get(&format!("{SITE}/robots.txt"), FakeFetcher::body(200, "User-agent: *\n")),
        );
        let cache = Arc::new(MemoryCache::with_clock(clock()));
        let analyzer = RobotsSitemapAnalyzer::new(fetcher.clone(), cache.clone(), clock());

        // probes of conventional paths fail with connect errors, which are not errors of the analysis
        let first = analyzer.analyze(SITE, &AuditOptions::default()).await;
        let second = analyzer.analyze(SITE, &AuditOptions::default()).await;
        assert_eq!(first, second);
        assert_eq!(fetcher.calls("GET", "https://example.com/robots.txt"), 1);
        assert_eq!(cache.len(), 1);

        let refresh = AuditOptions {
            force_refresh: true,
            ..Default::default()
        };
        analyzer.analyze(SITE, &refresh).await;
        assert_eq!(fetcher.calls("GET", "https://example.com/robots.txt"), 2);
    }

    #[tokio::test]
    async fn test_unavailable_sitemap_is_reported_and_not_cached() {
        let fetcher = Arc::new(
            FakeFetcher::new()
                .on_get(
                    &format!("{SITE}/robots.txt"),
                    FakeFetcher::body(200, "User-agent: *\nSitemap: https://example.com/sitemap.xml\n"),
                )
                .on_get(&format!("{SITE}/sitemap.xml"), FakeFetcher::status(503)),
        );
        let cache = Arc::new(MemoryCache::with_clock(clock()));
        let analyzer = RobotsSitemapAnalyzer::new(fetcher.clone(), cache.clone(), clock());

        let first = analyzer.analyze(SITE, &AuditOptions::default()).await;
        let sitemap = &first.details.as_ref().unwrap().sitemaps[0];
        assert_eq!(sitemap.status_code, Some(503));
        assert_eq!(sitemap.error.as_deref(), Some("HTTP 503"));
        assert_eq!(
            first.errors,
            vec!["sitemap https://example.com/sitemap.xml: HTTP 503".to_string()]
        );
        assert!(cache.is_empty());

        analyzer.analyze(SITE, &AuditOptions::default()).await;
        assert_eq!(fetcher.calls("GET", "https://example.com/sitemap.xml"), 2);
    }

    #[test]
    fn test_score_components() {
        let mut report = SitemapReport::default();
        report.robots_txt.accessible = true;
        assert_eq!(compute_score(&report), 20);

        let mut summary = SitemapSummary::new("https://example.com/s.xml", SitemapSource::RobotsTxt);
        summary.accessible = true;
        report.sitemaps.push(summary);
        report
            .sitemaps
            .push(SitemapSummary::new("https://example.com/t.xml", SitemapSource::RobotsTxt));
        // 20 + 20 + 20 * 1/2
        assert_eq!(compute_score(&report), 50);
    }
}
