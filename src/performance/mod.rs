//! Performance-signal analysis.
//!
//! Core Web Vitals come from the PageSpeed Insights API when a key is
//! configured; otherwise, or when the API fails, a static heuristic stands in.
//! Mobile-friendliness is scored separately from markup alone.

mod mobile;
mod pagespeed;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::{cache_key, Cache};
use crate::config::{
    Config, CDN_INDICATORS, DEFAULT_CACHE_TTL_SECS, HEURISTIC_BASELINE_SCORE, MAX_URL_LENGTH,
};
use crate::fetch::Fetcher;
use crate::models::{AnalyzerResult, AuditOptions, DomSummary, Impact, Recommendation};
use crate::utils::contains_any;
use crate::utils::sanitize::sanitize_and_truncate_error_message;

pub use mobile::{analyze_mobile, mobile_recommendations, MobileReport};
pub use pagespeed::{
    parse_pagespeed_response, rate, CoreWebVitals, DeviceRun, Diagnostic, MetricRating,
    MetricSource, MetricValue, Opportunity, PageSpeedClient, Strategy,
};

const CACHE_NAMESPACE: &str = "performance";
/// Page weight above which the HTML itself is flagged.
const LARGE_HTML_BYTES: usize = 500 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedSource {
    Api,
    Heuristic,
}

/// Inputs and outcome of the no-API estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeuristicSignals {
    pub is_https: bool,
    pub cdn_hosted: bool,
    pub long_url: bool,
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSpeedReport {
    pub source: SpeedSource,
    pub speed_score: u8,
    pub desktop: Option<DeviceRun>,
    pub mobile: Option<DeviceRun>,
    /// Mobile vitals when available, else desktop.
    pub core_web_vitals: Option<CoreWebVitals>,
    pub heuristic: Option<HeuristicSignals>,
    pub dom_summary: DomSummary,
}

/// Baseline 50, -10 without HTTPS, +5 on a CDN-looking host, -5 for very long
/// URLs.
pub fn heuristic_signals(url: &str) -> HeuristicSignals {
    let parsed = Url::parse(url).ok();
    let is_https = parsed.as_ref().map(|u| u.scheme() == "https").unwrap_or(false);
    let cdn_hosted = parsed
        .as_ref()
        .and_then(|u| u.host_str())
        .map(|h| contains_any(h, CDN_INDICATORS))
        .unwrap_or(false);
    let long_url = url.len() >= MAX_URL_LENGTH;

    let mut score = HEURISTIC_BASELINE_SCORE;
    if !is_https {
        score -= 10;
    }
    if cdn_hosted {
        score += 5;
    }
    if long_url {
        score -= 5;
    }

    HeuristicSignals {
        is_https,
        cdn_hosted,
        long_url,
        score: score.clamp(0, 100) as u8,
    }
}

fn vitals_recommendations(run: &DeviceRun, recs: &mut Vec<Recommendation>) {
    let strategy = run.strategy.as_str();
    let vitals = &run.core_web_vitals;
    for (name, value) in [
        ("Largest Contentful Paint", &vitals.lcp_ms),
        ("Cumulative Layout Shift", &vitals.cls),
        ("First Contentful Paint", &vitals.fcp_ms),
        ("First Input Delay", &vitals.fid_ms),
    ] {
        match value.as_ref().map(|v| v.rating) {
            Some(MetricRating::Poor) => recs.push(Recommendation::warning(
                Impact::High,
                format!("Poor {name} on {strategy}"),
                format!("Investigate the {name} diagnostics for the {strategy} run"),
            )),
            Some(MetricRating::NeedsImprovement) => recs.push(Recommendation::info(
                Impact::Medium,
                format!("{name} needs improvement on {strategy}"),
                format!("Review the {name} opportunities for the {strategy} run"),
            )),
            _ => {}
        }
    }
}

fn opportunity_recommendations(runs: &[&DeviceRun], recs: &mut Vec<Recommendation>) {
    let mut seen: Vec<&str> = Vec::new();
    for run in runs {
        for opportunity in &run.opportunities {
            if seen.contains(&opportunity.id.as_str()) {
                continue;
            }
            seen.push(&opportunity.id);
            let fix = opportunity
                .display_value
                .clone()
                .unwrap_or_else(|| format!("See the '{}' Lighthouse audit", opportunity.id));
            recs.push(if opportunity.score < 0.5 {
                Recommendation::warning(Impact::Medium, opportunity.title.clone(), fix)
            } else {
                Recommendation::info(Impact::Low, opportunity.title.clone(), fix)
            });
        }
    }
}

fn dom_recommendations(dom: &DomSummary, recs: &mut Vec<Recommendation>) {
    if dom.html_size_bytes > LARGE_HTML_BYTES {
        recs.push(Recommendation::warning(
            Impact::Medium,
            format!("HTML document is large ({} KB)", dom.html_size_bytes / 1024),
            "Trim inline data and markup, or paginate long content",
        ));
    }
    if dom.script_count > 20 {
        recs.push(Recommendation::info(
            Impact::Medium,
            format!("Page includes {} scripts", dom.script_count),
            "Bundle and defer scripts that are not needed for first render",
        ));
    }
    if dom.external_script_count > 10 {
        recs.push(Recommendation::info(
            Impact::Medium,
            format!("{} external scripts loaded", dom.external_script_count),
            "Remove unused third-party scripts and load the rest asynchronously",
        ));
    }
    if dom.stylesheet_count > 10 {
        recs.push(Recommendation::info(
            Impact::Low,
            format!("{} stylesheets loaded", dom.stylesheet_count),
            "Combine stylesheets and inline critical CSS",
        ));
    }
    if dom.iframe_count > 3 {
        recs.push(Recommendation::info(
            Impact::Low,
            format!("{} iframes embedded", dom.iframe_count),
            "Lazy-load iframes below the fold",
        ));
    }
}

fn score_recommendation(score: u8, recs: &mut Vec<Recommendation>) {
    if score < 50 {
        recs.push(Recommendation::error(
            Impact::High,
            format!("Page speed score is low ({score}/100)"),
            "Address the listed opportunities, starting with render-blocking resources",
        ));
    } else if score < 90 {
        recs.push(Recommendation::warning(
            Impact::Medium,
            format!("Page speed score could be improved ({score}/100)"),
            "Work through the listed opportunities",
        ));
    }
}

/// Performance-signal analyzer.
pub struct PerformanceSignalAnalyzer {
    cache: Arc<dyn Cache>,
    api: Option<PageSpeedClient>,
    cache_ttl: Duration,
}

impl PerformanceSignalAnalyzer {
    /// An analyzer that only uses heuristics.
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self {
            cache,
            api: None,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }

    /// Uses the PageSpeed API iff `config` carries an API key.
    pub fn from_config(fetcher: Arc<dyn Fetcher>, cache: Arc<dyn Cache>, config: &Config) -> Self {
        let api = config.pagespeed_api_key.as_ref().map(|key| {
            PageSpeedClient::new(
                fetcher,
                config.pagespeed_endpoint.clone(),
                key.clone(),
                Duration::from_secs(config.pagespeed_timeout_seconds),
            )
        });
        Self {
            api,
            ..Self::new(cache)
        }
        .with_cache_ttl(Duration::from_secs(config.cache_ttl_secs))
    }

    pub fn with_pagespeed(mut self, client: PageSpeedClient) -> Self {
        self.api = Some(client);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Speed analysis. `dom_summary` is derived from `html` when not supplied.
    pub async fn analyze(
        &self,
        url: &str,
        html: &str,
        dom_summary: Option<&DomSummary>,
        options: &AuditOptions,
    ) -> AnalyzerResult<PageSpeedReport> {
        let dom = dom_summary
            .cloned()
            .unwrap_or_else(|| DomSummary::from_html(html));
        log::debug!("Starting performance analysis for {url}");

        let Some(api) = &self.api else {
            log::debug!("No PageSpeed API key configured, using heuristics for {url}");
            return heuristic_result(url, dom, Vec::new());
        };

        // force_refresh stays out of the key so a refresh repopulates the normal entry
        let key = cache_key(
            CACHE_NAMESPACE,
            url,
            &(options.include_page_speed, options.include_mobile_analysis),
        );
        if !options.force_refresh {
            if let Some(cached) = self.cache.get(&key) {
                match serde_json::from_value::<AnalyzerResult<PageSpeedReport>>(cached) {
                    Ok(result) => {
                        log::debug!("Performance cache hit for {url}");
                        return result;
                    }
                    Err(e) => log::warn!("Discarding unreadable performance cache entry {key}: {e}"),
                }
            }
        }

        let (desktop, mobile) = tokio::join!(
            api.run(url, Strategy::Desktop),
            api.run(url, Strategy::Mobile)
        );
        let mut errors = Vec::new();
        let mut keep = |run: anyhow::Result<DeviceRun>| match run {
            Ok(run) => Some(run),
            Err(e) => {
                log::warn!("PageSpeed run failed for {url}: {e:#}");
                errors.push(sanitize_and_truncate_error_message(&format!("pagespeed: {e:#}")));
                None
            }
        };
        let desktop = keep(desktop);
        let mobile = keep(mobile);

        let scores: Vec<u8> = [&desktop, &mobile]
            .into_iter()
            .flatten()
            .filter_map(|run| run.performance_score)
            .collect();
        if scores.is_empty() {
            log::warn!("PageSpeed unavailable for {url}, falling back to heuristics");
            if errors.is_empty() {
                errors.push("pagespeed: response carried no performance score".to_string());
            }
            return heuristic_result(url, dom, errors);
        }
        let speed_score = (scores.iter().map(|s| f64::from(*s)).sum::<f64>()
            / scores.len() as f64)
            .round() as u8;

        let mut recs = Vec::new();
        score_recommendation(speed_score, &mut recs);
        let runs: Vec<&DeviceRun> = [&mobile, &desktop].into_iter().flatten().collect();
        for run in &runs {
            vitals_recommendations(run, &mut recs);
        }
        opportunity_recommendations(&runs, &mut recs);
        dom_recommendations(&dom, &mut recs);

        let core_web_vitals = runs.first().map(|run| run.core_web_vitals.clone());
        let report = PageSpeedReport {
            source: SpeedSource::Api,
            speed_score,
            desktop,
            mobile,
            core_web_vitals,
            heuristic: None,
            dom_summary: dom,
        };
        let cacheable = errors.is_empty();
        let result = AnalyzerResult::completed(speed_score, report, recs, errors);

        if cacheable {
            match serde_json::to_value(&result) {
                Ok(value) => self.cache.set(&key, value, self.cache_ttl),
                Err(e) => log::warn!("Could not serialize performance result for caching: {e}"),
            }
        }
        log::debug!("Finished performance analysis for {url}: score {speed_score}");
        result
    }

    /// Mobile-friendliness, scored from markup only.
    pub fn analyze_mobile(&self, html: &str) -> AnalyzerResult<MobileReport> {
        let report = analyze_mobile(html);
        let recs = mobile_recommendations(&report);
        AnalyzerResult::completed(report.mobile_score, report, recs, Vec::new())
    }
}

fn heuristic_result(url: &str, dom: DomSummary, errors: Vec<String>) -> AnalyzerResult<PageSpeedReport> {
    let signals = heuristic_signals(url);
    let mut recs = Vec::new();
    if !signals.is_https {
        recs.push(Recommendation::warning(
            Impact::Medium,
            "Page is not served over HTTPS",
            "Serve over HTTPS to enable HTTP/2 and modern transport optimizations",
        ));
    }
    if signals.long_url {
        recs.push(Recommendation::info(
            Impact::Low,
            "URL is extremely long",
            "Shorten the URL",
        ));
    }
    dom_recommendations(&dom, &mut recs);

    let score = signals.score;
    let report = PageSpeedReport {
        source: SpeedSource::Heuristic,
        speed_score: score,
        desktop: None,
        mobile: None,
        core_web_vitals: None,
        heuristic: Some(signals),
        dom_summary: dom,
    };
    AnalyzerResult::completed(score, report, recs, errors)
}
