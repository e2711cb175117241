//! PageSpeed Insights v5 client and response parsing.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{EnumIter, IntoStaticStr};
use url::Url;

use crate::config::{
    CLS_THRESHOLDS, FCP_THRESHOLDS_MS, FID_THRESHOLDS_MS, LCP_THRESHOLDS_MS,
    OPPORTUNITY_SCORE_THRESHOLD,
};
use crate::fetch::{Fetcher, RequestOptions};

/// Lighthouse audits reported as opportunities when they score below threshold.
const OPPORTUNITY_AUDITS: &[&str] = &[
    "render-blocking-resources",
    "unused-css-rules",
    "unused-javascript",
    "modern-image-formats",
    "uses-optimized-images",
    "uses-responsive-images",
    "offscreen-images",
    "unminified-css",
    "unminified-javascript",
    "uses-text-compression",
    "efficient-animated-content",
    "server-response-time",
    "redirects",
    "uses-rel-preconnect",
];

/// Lighthouse audits always surfaced as diagnostics when present.
const DIAGNOSTIC_AUDITS: &[&str] = &[
    "dom-size",
    "bootup-time",
    "mainthread-work-breakdown",
    "font-display",
    "third-party-summary",
    "total-byte-weight",
    "critical-request-chains",
    "long-tasks",
    "largest-contentful-paint-element",
    "layout-shift-elements",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, IntoStaticStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Strategy {
    Desktop,
    Mobile,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricRating {
    Good,
    NeedsImprovement,
    Poor,
}

/// Rates `value` against `(good, poor)` upper bounds, both inclusive.
pub fn rate(value: f64, (good, poor): (f64, f64)) -> MetricRating {
    if value <= good {
        MetricRating::Good
    } else if value <= poor {
        MetricRating::NeedsImprovement
    } else {
        MetricRating::Poor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricSource {
    Lab,
    Field,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: f64,
    pub rating: MetricRating,
    pub source: MetricSource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreWebVitals {
    pub lcp_ms: Option<MetricValue>,
    pub cls: Option<MetricValue>,
    pub fcp_ms: Option<MetricValue>,
    pub fid_ms: Option<MetricValue>,
}

impl CoreWebVitals {
    pub fn poor_metrics(&self) -> Vec<&'static str> {
        [
            ("LCP", &self.lcp_ms),
            ("CLS", &self.cls),
            ("FCP", &self.fcp_ms),
            ("FID", &self.fid_ms),
        ]
        .into_iter()
        .filter(|(_, m)| matches!(m, Some(v) if v.rating == MetricRating::Poor))
        .map(|(name, _)| name)
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub title: String,
    pub score: f64,
    pub savings_ms: Option<f64>,
    pub display_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub id: String,
    pub title: String,
    pub score: Option<f64>,
    pub display_value: Option<String>,
}

/// One PageSpeed run for one device strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRun {
    pub strategy: Strategy,
    pub performance_score: Option<u8>,
    pub core_web_vitals: CoreWebVitals,
    pub opportunities: Vec<Opportunity>,
    pub diagnostics: Vec<Diagnostic>,
}

fn metric(value: Option<f64>, thresholds: (f64, f64), source: MetricSource) -> Option<MetricValue> {
    value.filter(|v| v.is_finite()).map(|value| MetricValue {
        value,
        rating: rate(value, thresholds),
        source,
    })
}

fn string_at(audit: &Value, field: &str) -> Option<String> {
    audit.get(field).and_then(Value::as_str).map(str::to_string)
}

/// Extracts a `DeviceRun` from a PageSpeed v5 JSON response.
///
/// Lab values come from `lighthouseResult.audits`; field values from
/// `loadingExperience.metrics` replace them when present.
pub fn parse_pagespeed_response(strategy: Strategy, body: &Value) -> Result<DeviceRun> {
    if let Some(message) = body.pointer("/error/message").and_then(Value::as_str) {
        anyhow::bail!("PageSpeed API error: {message}");
    }
    let audits = body
        .pointer("/lighthouseResult/audits")
        .context("PageSpeed response has no lighthouseResult.audits")?;

    let lab = |id: &str| {
        audits
            .get(id)
            .and_then(|a| a.get("numericValue"))
            .and_then(Value::as_f64)
    };
    let field = |key: &str| {
        body.pointer(&format!("/loadingExperience/metrics/{key}/percentile"))
            .and_then(Value::as_f64)
    };
    let pick = |field_value: Option<f64>, lab_value: Option<f64>, thresholds: (f64, f64)| {
        metric(field_value, thresholds, MetricSource::Field)
            .or_else(|| metric(lab_value, thresholds, MetricSource::Lab))
    };

    let core_web_vitals = CoreWebVitals {
        lcp_ms: pick(
            field("LARGEST_CONTENTFUL_PAINT_MS"),
            lab("largest-contentful-paint"),
            LCP_THRESHOLDS_MS,
        ),
        // CrUX reports CLS multiplied by 100
        cls: pick(
            field("CUMULATIVE_LAYOUT_SHIFT_SCORE").map(|v| v / 100.0),
            lab("cumulative-layout-shift"),
            CLS_THRESHOLDS,
        ),
        fcp_ms: pick(
            field("FIRST_CONTENTFUL_PAINT_MS"),
            lab("first-contentful-paint"),
            FCP_THRESHOLDS_MS,
        ),
        fid_ms: pick(
            field("FIRST_INPUT_DELAY_MS"),
            lab("max-potential-fid"),
            FID_THRESHOLDS_MS,
        ),
    };

    let opportunities = OPPORTUNITY_AUDITS
        .iter()
        .filter_map(|id| {
            let audit = audits.get(*id)?;
            let score = audit.get("score").and_then(Value::as_f64)?;
            (score < OPPORTUNITY_SCORE_THRESHOLD).then(|| Opportunity {
                id: id.to_string(),
                title: string_at(audit, "title").unwrap_or_else(|| id.to_string()),
                score,
                savings_ms: audit
                    .pointer("/details/overallSavingsMs")
                    .and_then(Value::as_f64),
                display_value: string_at(audit, "displayValue"),
            })
        })
        .collect();

    let diagnostics = DIAGNOSTIC_AUDITS
        .iter()
        .filter_map(|id| {
            let audit = audits.get(*id)?;
            Some(Diagnostic {
                id: id.to_string(),
                title: string_at(audit, "title").unwrap_or_else(|| id.to_string()),
                score: audit.get("score").and_then(Value::as_f64),
                display_value: string_at(audit, "displayValue"),
            })
        })
        .collect();

    let performance_score = body
        .pointer("/lighthouseResult/categories/performance/score")
        .and_then(Value::as_f64)
        .map(|s| (s * 100.0).round().clamp(0.0, 100.0) as u8);

    Ok(DeviceRun {
        strategy,
        performance_score,
        core_web_vitals,
        opportunities,
        diagnostics,
    })
}

/// Thin PageSpeed Insights client over a `Fetcher`.
pub struct PageSpeedClient {
    fetcher: Arc<dyn Fetcher>,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl PageSpeedClient {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            timeout,
        }
    }

    pub fn request_url(&self, url: &str, strategy: Strategy) -> Result<Url> {
        Url::parse_with_params(
            &self.endpoint,
            &[
                ("url", url),
                ("strategy", strategy.as_str()),
                ("category", "performance"),
                ("key", self.api_key.as_str()),
            ],
        )
        .with_context(|| format!("Invalid PageSpeed endpoint: {}", self.endpoint))
    }

    pub async fn run(&self, url: &str, strategy: Strategy) -> Result<DeviceRun> {
        let request = self.request_url(url, strategy)?;
        let options = RequestOptions::follow().with_timeout(self.timeout);
        let response = self
            .fetcher
            .get(request.as_str(), &options)
            .await
            .with_context(|| format!("PageSpeed {} request failed", strategy.as_str()))?;

        let body: Value = serde_json::from_slice(&response.body)
            .with_context(|| format!("PageSpeed returned invalid JSON (HTTP {})", response.status))?;
        if !response.is_success() {
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("no error message");
            anyhow::bail!("PageSpeed returned HTTP {}: {message}", response.status);
        }
        parse_pagespeed_response(strategy, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::fake::FakeFetcher;
    use serde_json::json;

    fn sample_response(score: f64) -> Value {
        json!({
            "lighthouseResult": {
                "categories": {"performance": {"score": score}},
                "audits": {
                    "largest-contentful-paint": {"numericValue": 3200.0},
                    "cumulative-layout-shift": {"numericValue": 0.05},
                    "first-contentful-paint": {"numericValue": 1200.0},
                    "max-potential-fid": {"numericValue": 450.0},
                    "render-blocking-resources": {
                        "title": "Eliminate render-blocking resources",
                        "score": 0.4,
                        "displayValue": "Potential savings of 800 ms",
                        "details": {"overallSavingsMs": 800.0}
                    },
                    "unused-css-rules": {"title": "Reduce unused CSS", "score": 0.95},
                    "some-other-audit": {"title": "Ignored", "score": 0.0},
                    "dom-size": {"title": "Avoid an excessive DOM size", "score": 0.8, "displayValue": "1,204 elements"}
                }
            }
        })
    }

    #[test]
    fn test_rate_boundaries_are_inclusive() {
        assert_eq!(rate(2500.0, LCP_THRESHOLDS_MS), MetricRating::Good);
        assert_eq!(rate(2501.0, LCP_THRESHOLDS_MS), MetricRating::NeedsImprovement);
        assert_eq!(rate(4000.0, LCP_THRESHOLDS_MS), MetricRating::NeedsImprovement);
        assert_eq!(rate(0.26, CLS_THRESHOLDS), MetricRating::Poor);
    }

    #[test]
    fn test_parse_lab_metrics_and_lists() {
        let run = parse_pagespeed_response(Strategy::Mobile, &sample_response(0.72)).unwrap();
        assert_eq!(run.performance_score, Some(72));
        let lcp = run.core_web_vitals.lcp_ms.as_ref().unwrap();
        assert_eq!(lcp.rating, MetricRating::NeedsImprovement);
        assert_eq!(lcp.source, MetricSource::Lab);
        assert_eq!(run.core_web_vitals.fid_ms.as_ref().unwrap().rating, MetricRating::Poor);
        assert_eq!(run.core_web_vitals.poor_metrics(), vec!["FID"]);
        assert_eq!(run.opportunities.len(), 1);
        assert_eq!(run.opportunities[0].id, "render-blocking-resources");
        assert_eq!(run.opportunities[0].savings_ms, Some(800.0));
        assert_eq!(run.diagnostics.len(), 1);
        assert_eq!(run.diagnostics[0].display_value.as_deref(), Some("1,204 elements"));
    }

    #[test]
    fn test_field_data_overrides_lab() {
        let mut body = sample_response(0.9);
        body["loadingExperience"] = json!({
            "metrics": {
                "LARGEST_CONTENTFUL_PAINT_MS": {"percentile": 2100},
                "CUMULATIVE_LAYOUT_SHIFT_SCORE": {"percentile": 30}
            }
        });
        let run = parse_pagespeed_response(Strategy::Desktop, &body).unwrap();
        let lcp = run.core_web_vitals.lcp_ms.unwrap();
        assert_eq!(lcp.source, MetricSource::Field);
        assert_eq!(lcp.rating, MetricRating::Good);
        let cls = run.core_web_vitals.cls.unwrap();
        assert!((cls.value - 0.3).abs() < 1e-9);
        assert_eq!(cls.rating, MetricRating::Poor);
        assert_eq!(run.core_web_vitals.fcp_ms.unwrap().source, MetricSource::Lab);
    }

    #[test]
    fn test_api_error_payload_is_an_error() {
        let body = json!({"error": {"code": 400, "message": "API key not valid"}});
        let err = parse_pagespeed_response(Strategy::Mobile, &body).unwrap_err();
        assert!(err.to_string().contains("API key not valid"));
    }

    #[tokio::test]
    async fn test_client_builds_request_and_parses() {
        let probe = PageSpeedClient::new(
            Arc::new(FakeFetcher::new()),
            "https://psi.example.com/run",
            "k",
            Duration::from_secs(5),
        );
        let request = probe
            .request_url("https://example.com/a?b=1", Strategy::Mobile)
            .unwrap();
        assert_eq!(
            request.as_str(),
            "https://psi.example.com/run?url=https%3A%2F%2Fexample.com%2Fa%3Fb%3D1&strategy=mobile&category=performance&key=k"
        );

        let fetcher = FakeFetcher::new().on_get(
            request.as_str(),
            FakeFetcher::body(200, &sample_response(0.5).to_string()),
        );
        let client = PageSpeedClient::new(
            Arc::new(fetcher),
            "https://psi.example.com/run",
            "k",
            Duration::from_secs(5),
        );
        let run = client.run("https://example.com/a?b=1", Strategy::Mobile).await.unwrap();
        assert_eq!(run.performance_score, Some(50));
        assert_eq!(run.strategy, Strategy::Mobile);
    }
}
