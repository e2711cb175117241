//! The merged audit report and overall-score aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical::CanonicalReport;
use crate::config::ScoreWeights;
use crate::models::{sort_recommendations, AnalyzerKind, AnalyzerResult, Recommendation};
use crate::performance::{MobileReport, PageSpeedReport};
use crate::robots::SitemapReport;
use crate::structured::StructuredDataReport;
use crate::transport::TransportReport;
use crate::utils::clamp_score;

/// One analyzer failure, attributed to the analyzer that hit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceError {
    pub service: String,
    pub message: String,
}

/// Result of one audit. A disabled analyzer serializes as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub url: String,
    pub analyzed_at: DateTime<Utc>,
    pub technical_score: u8,
    pub page_speed: Option<AnalyzerResult<PageSpeedReport>>,
    pub mobile_optimization: Option<AnalyzerResult<MobileReport>>,
    pub security: Option<AnalyzerResult<TransportReport>>,
    pub sitemap_analysis: Option<AnalyzerResult<SitemapReport>>,
    pub canonical_urls: Option<AnalyzerResult<CanonicalReport>>,
    pub structured_data: Option<AnalyzerResult<StructuredDataReport>>,
    pub recommendations: Vec<Recommendation>,
    pub errors: Vec<ServiceError>,
}

/// Score signal of one analyzer slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SlotScore {
    pub kind: AnalyzerKind,
    /// `None` when the analyzer was disabled or produced no score.
    pub score: Option<u8>,
}

impl SlotScore {
    pub(crate) fn of<T>(kind: AnalyzerKind, slot: &Option<AnalyzerResult<T>>) -> Self {
        let score = slot
            .as_ref()
            .filter(|r| r.produced_score())
            .map(|r| r.score);
        Self { kind, score }
    }
}

fn weight_of(weights: &ScoreWeights, kind: AnalyzerKind) -> f64 {
    match kind {
        AnalyzerKind::PageSpeed => weights.page_speed,
        AnalyzerKind::MobileOptimization => weights.mobile_optimization,
        AnalyzerKind::Security => weights.security,
        AnalyzerKind::SitemapAnalysis => weights.sitemap_analysis,
        AnalyzerKind::CanonicalUrls => weights.canonical_urls,
        AnalyzerKind::StructuredData => weights.structured_data,
    }
}

/// Weighted mean over the slots that produced a score.
///
/// Weights are renormalized over those slots, so a skipped or failed analyzer
/// changes the granularity of the overall score but not its scale.
pub(crate) fn technical_score(weights: &ScoreWeights, slots: &[SlotScore]) -> u8 {
    let (weighted, total) = slots
        .iter()
        .filter_map(|slot| slot.score.map(|s| (weight_of(weights, slot.kind).max(0.0), s)))
        .fold((0.0, 0.0), |(acc, total), (weight, score)| {
            (acc + weight * f64::from(score), total + weight)
        });
    if total <= 0.0 {
        return 0;
    }
    clamp_score(weighted / total)
}

/// Collects recommendations and errors from every slot.
#[derive(Default)]
pub(crate) struct Merger {
    recommendations: Vec<Recommendation>,
    errors: Vec<ServiceError>,
}

impl Merger {
    pub(crate) fn absorb<T>(&mut self, kind: AnalyzerKind, slot: &Option<AnalyzerResult<T>>) {
        let Some(result) = slot else {
            return;
        };
        self.recommendations
            .extend(result.recommendations.iter().cloned());
        self.errors
            .extend(result.errors.iter().map(|message| ServiceError {
                service: kind.service_name().to_string(),
                message: message.clone(),
            }));
    }

    pub(crate) fn finish(mut self) -> (Vec<Recommendation>, Vec<ServiceError>) {
        sort_recommendations(&mut self.recommendations);
        (self.recommendations, self.errors)
    }
}
