//! Audit orchestration.
//!
//! Runs every enabled analyzer against one page concurrently, isolates each
//! one behind a timeout and a panic guard, then merges the results into an
//! [`AuditReport`] with a renormalized weighted overall score.

mod report;

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::cache::{Cache, Clock, MemoryCache, SystemClock};
use crate::canonical::CanonicalAnalyzer;
use crate::config::{Config, ScoreWeights, ANALYZER_TIMEOUT, MAX_URL_LENGTH};
use crate::error_handling::{AuditError, InitializationError};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::models::{AnalyzerKind, AnalyzerResult, AuditTarget};
use crate::performance::PerformanceSignalAnalyzer;
use crate::robots::RobotsSitemapAnalyzer;
use crate::security::UrlPolicy;
use crate::structured::StructuredDataAnalyzer;
use crate::transport::{CertificateInspector, TlsInspector, TransportSecurityAnalyzer};

pub use report::{AuditReport, ServiceError};
use report::{technical_score, Merger, SlotScore};

/// Lifecycle of one audit, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditPhase {
    Idle,
    Running(AnalyzerKind),
    Aggregating,
    Done,
}

impl fmt::Display for AuditPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditPhase::Idle => f.write_str("idle"),
            AuditPhase::Running(kind) => write!(f, "running({kind})"),
            AuditPhase::Aggregating => f.write_str("aggregating"),
            AuditPhase::Done => f.write_str("done"),
        }
    }
}

/// External services the analyzers depend on.
pub struct Collaborators {
    pub fetcher: Arc<dyn Fetcher>,
    pub cache: Arc<dyn Cache>,
    pub clock: Arc<dyn Clock>,
    pub inspector: Arc<dyn CertificateInspector>,
}

impl Collaborators {
    /// Live collaborators: reqwest fetcher, in-memory cache, wall clock, rustls inspector.
    pub fn from_config(config: &Config) -> Result<Self, InitializationError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Ok(Self {
            fetcher: Arc::new(HttpFetcher::new(config)?),
            cache: Arc::new(MemoryCache::with_clock(clock.clone())),
            clock,
            inspector: Arc::new(TlsInspector::new(config)),
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs the analyzers for one page and merges their results.
pub struct AuditOrchestrator {
    robots: RobotsSitemapAnalyzer,
    canonical: CanonicalAnalyzer,
    transport: TransportSecurityAnalyzer,
    performance: PerformanceSignalAnalyzer,
    structured: StructuredDataAnalyzer,
    clock: Arc<dyn Clock>,
    weights: ScoreWeights,
    policy: UrlPolicy,
    analyzer_timeout: Duration,
}

impl AuditOrchestrator {
    /// Builds an orchestrator with live collaborators.
    pub fn from_config(config: &Config) -> Result<Self, InitializationError> {
        Ok(Self::with_collaborators(
            config,
            Collaborators::from_config(config)?,
        ))
    }

    pub fn with_collaborators(config: &Config, collaborators: Collaborators) -> Self {
        let Collaborators {
            fetcher,
            cache,
            clock,
            inspector,
        } = collaborators;
        let policy = config.url_policy();
        let cache_ttl = Duration::from_secs(config.cache_ttl_secs);

        Self {
            robots: RobotsSitemapAnalyzer::new(fetcher.clone(), cache.clone(), clock.clone())
                .with_policy(policy)
                .with_cache_ttl(cache_ttl)
                .with_max_index_depth(config.max_sitemap_index_depth),
            canonical: CanonicalAnalyzer::new(fetcher.clone()).with_policy(policy),
            transport: TransportSecurityAnalyzer::new(fetcher.clone(), inspector, clock.clone())
                .with_policy(policy),
            performance: PerformanceSignalAnalyzer::from_config(fetcher, cache, config),
            structured: StructuredDataAnalyzer::new(),
            clock,
            weights: config.weights.clone(),
            policy,
            analyzer_timeout: ANALYZER_TIMEOUT,
        }
    }

    /// Upper bound for each analyzer, including all of its sub-requests.
    pub fn with_analyzer_timeout(mut self, timeout: Duration) -> Self {
        self.analyzer_timeout = timeout;
        self
    }

    /// Rejects a top-level URL before any analyzer runs.
    fn validate_target(&self, url: &str) -> Result<(), AuditError> {
        if url.len() > MAX_URL_LENGTH {
            return Err(AuditError::InvalidUrl(format!(
                "URL is {} characters long (limit {MAX_URL_LENGTH})",
                url.len()
            )));
        }
        self.policy.check(url).map_err(AuditError::InvalidUrl)
    }

    /// Runs one analyzer behind the timeout and panic guard.
    ///
    /// Returns `None` for a disabled analyzer; a timeout or panic becomes a
    /// failed result that carries no weight in the overall score.
    async fn guarded<T, F>(
        &self,
        url: &str,
        kind: AnalyzerKind,
        enabled: bool,
        analysis: F,
    ) -> Option<AnalyzerResult<T>>
    where
        F: Future<Output = AnalyzerResult<T>>,
    {
        if !enabled {
            log::debug!("Audit {url}: {kind} disabled");
            return None;
        }
        log::debug!("Audit {url}: phase {}", AuditPhase::Running(kind));
        let start = Instant::now();

        let outcome =
            tokio::time::timeout(self.analyzer_timeout, AssertUnwindSafe(analysis).catch_unwind())
                .await;
        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => {
                let message = panic_message(&*panic);
                log::error!("{kind} analyzer panicked for {url}: {message}");
                AnalyzerResult::failed(format!("{kind} analyzer panicked: {message}"))
            }
            Err(_) => {
                log::warn!(
                    "{kind} analyzer timed out for {url} after {:?}",
                    self.analyzer_timeout
                );
                AnalyzerResult::failed(format!(
                    "{kind} analyzer timed out after {}s",
                    self.analyzer_timeout.as_secs_f64()
                ))
            }
        };

        log::debug!(
            "Audit {url}: {kind} finished in {:.2}s (score {}, {} errors)",
            start.elapsed().as_secs_f64(),
            result.score,
            result.errors.len()
        );
        Some(result)
    }

    /// Audits one page.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::InvalidUrl` when the top-level URL fails validation.
    /// Every analyzer failure is reported inside the returned `AuditReport`.
    pub async fn run(&self, target: &AuditTarget) -> Result<AuditReport, AuditError> {
        let url = target.url.as_str();
        log::debug!("Audit {url}: phase {}", AuditPhase::Idle);
        self.validate_target(url)?;

        let html = target.html.as_str();
        let options = &target.options;
        let enabled = |kind| options.is_enabled(kind);
        log::info!("Starting audit of {url}");
        let start = Instant::now();

        let (page_speed, mobile_optimization, security, sitemap_analysis, canonical_urls, structured_data) = tokio::join!(
            self.guarded(
                url,
                AnalyzerKind::PageSpeed,
                enabled(AnalyzerKind::PageSpeed),
                self.performance
                    .analyze(url, html, target.dom_summary.as_ref(), options),
            ),
            self.guarded(
                url,
                AnalyzerKind::MobileOptimization,
                enabled(AnalyzerKind::MobileOptimization),
                async { self.performance.analyze_mobile(html) },
            ),
            self.guarded(
                url,
                AnalyzerKind::Security,
                enabled(AnalyzerKind::Security),
                self.transport.analyze(url, html, options),
            ),
            self.guarded(
                url,
                AnalyzerKind::SitemapAnalysis,
                enabled(AnalyzerKind::SitemapAnalysis),
                self.robots.analyze(url, options),
            ),
            self.guarded(
                url,
                AnalyzerKind::CanonicalUrls,
                enabled(AnalyzerKind::CanonicalUrls),
                self.canonical.analyze(url, html, options),
            ),
            self.guarded(
                url,
                AnalyzerKind::StructuredData,
                enabled(AnalyzerKind::StructuredData),
                async { self.structured.analyze(html) },
            ),
        );

        log::debug!("Audit {url}: phase {}", AuditPhase::Aggregating);
        let slots = [
            SlotScore::of(AnalyzerKind::PageSpeed, &page_speed),
            SlotScore::of(AnalyzerKind::MobileOptimization, &mobile_optimization),
            SlotScore::of(AnalyzerKind::Security, &security),
            SlotScore::of(AnalyzerKind::SitemapAnalysis, &sitemap_analysis),
            SlotScore::of(AnalyzerKind::CanonicalUrls, &canonical_urls),
            SlotScore::of(AnalyzerKind::StructuredData, &structured_data),
        ];
        let score = technical_score(&self.weights, &slots);

        let mut merger = Merger::default();
        merger.absorb(AnalyzerKind::PageSpeed, &page_speed);
        merger.absorb(AnalyzerKind::MobileOptimization, &mobile_optimization);
        merger.absorb(AnalyzerKind::Security, &security);
        merger.absorb(AnalyzerKind::SitemapAnalysis, &sitemap_analysis);
        merger.absorb(AnalyzerKind::CanonicalUrls, &canonical_urls);
        merger.absorb(AnalyzerKind::StructuredData, &structured_data);
        let (recommendations, errors) = merger.finish();

        if !errors.is_empty() {
            log::warn!("Audit of {url} completed with {} analyzer errors", errors.len());
        }
        log::info!(
            "Audit of {url} done in {:.2}s: technical score {score}",
            start.elapsed().as_secs_f64()
        );
        log::debug!("Audit {url}: phase {}", AuditPhase::Done);

        Ok(AuditReport {
            url: url.to_string(),
            analyzed_at: self.clock.now(),
            technical_score: score,
            page_speed,
            mobile_optimization,
            security,
            sitemap_analysis,
            canonical_urls,
            structured_data,
            recommendations,
            errors,
        })
    }

    /// Like [`run`](Self::run), but abandons every outstanding request once
    /// `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Cancelled` if the token fires before the audit
    /// finishes, in addition to the errors of [`run`](Self::run).
    pub async fn run_with_cancellation(
        &self,
        target: &AuditTarget,
        cancel: CancellationToken,
    ) -> Result<AuditReport, AuditError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::warn!("Audit of {} cancelled", target.url);
                Err(AuditError::Cancelled)
            }
            result = self.run(target) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FixedClock;
    use crate::error_handling::FetchError;
    use crate::fetch::fake::FakeFetcher;
    use crate::fetch::{FetchResponse, RequestOptions};
    use crate::models::{AuditOptions, Severity};
    use crate::transport::RawCertificate;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    struct NoCertificate;

    #[async_trait]
    impl CertificateInspector for NoCertificate {
        async fn inspect(&self, host: &str, _port: u16) -> anyhow::Result<RawCertificate> {
            Err(anyhow::anyhow!("TLS handshake failed for {host}"))
        }
    }

    /// A fetcher whose requests never complete.
    struct HangingFetcher;

    #[async_trait]
    impl Fetcher for HangingFetcher {
        async fn get(&self, _url: &str, _o: &RequestOptions) -> Result<FetchResponse, FetchError> {
            futures::future::pending().await
        }

        async fn head(&self, _url: &str, _o: &RequestOptions) -> Result<FetchResponse, FetchError> {
            futures::future::pending().await
        }
    }

    fn orchestrator(fetcher: Arc<dyn Fetcher>) -> AuditOrchestrator {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        AuditOrchestrator::with_collaborators(
            &Config::default(),
            Collaborators {
                fetcher,
                cache: Arc::new(MemoryCache::with_clock(clock.clone())),
                clock,
                inspector: Arc::new(NoCertificate),
            },
        )
    }

    fn only(kinds: &[AnalyzerKind]) -> AuditOptions {
        AuditOptions {
            include_page_speed: kinds.contains(&AnalyzerKind::PageSpeed),
            include_mobile_analysis: kinds.contains(&AnalyzerKind::MobileOptimization),
            include_security_analysis: kinds.contains(&AnalyzerKind::Security),
            include_sitemap_analysis: kinds.contains(&AnalyzerKind::SitemapAnalysis),
            include_canonical_analysis: kinds.contains(&AnalyzerKind::CanonicalUrls),
            include_structured_data: kinds.contains(&AnalyzerKind::StructuredData),
            ..AuditOptions::default()
        }
    }

    const MARKUP_ONLY_PAGE: &str = r#"<html><head>
        <meta name="viewport" content="width=device-width, initial-scale=1">
        <style>@media (max-width: 600px) { body { margin: 0 } }</style>
        <script type="application/ld+json">
        {"@type":"Organization","name":"Acme","url":"https://example.com"}
        </script>
        </head><body></body></html>"#;

    fn explode() -> AnalyzerResult<()> {
        panic!("analyzer exploded")
    }

    #[tokio::test]
    async fn test_invalid_url_aborts_before_any_request() {
        let fetcher = Arc::new(FakeFetcher::new());
        let audit = orchestrator(fetcher.clone());

        for url in ["file:///etc/passwd", "http://127.0.0.1/admin", "not a url"] {
            let err = audit.run(&AuditTarget::new(url, "")).await.unwrap_err();
            assert!(matches!(err, AuditError::InvalidUrl(_)), "{url}");
        }
        let long = format!("https://example.com/{}", "a".repeat(MAX_URL_LENGTH));
        assert!(matches!(
            audit.run(&AuditTarget::new(long, "")).await,
            Err(AuditError::InvalidUrl(_))
        ));
        assert_eq!(fetcher.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_disabled_analyzers_are_null_and_carry_no_weight() {
        let audit = orchestrator(Arc::new(FakeFetcher::new()));
        let target = AuditTarget::new("https://example.com/", MARKUP_ONLY_PAGE).with_options(only(&[
            AnalyzerKind::MobileOptimization,
            AnalyzerKind::StructuredData,
        ]));

        let report = audit.run(&target).await.unwrap();
        assert_eq!(report.mobile_optimization.as_ref().unwrap().score, 100);
        assert_eq!(report.structured_data.as_ref().unwrap().score, 100);
        assert_eq!(report.technical_score, 100);
        assert!(report.errors.is_empty());

        let json = serde_json::to_value(&report).unwrap();
        for field in ["page_speed", "security", "sitemap_analysis", "canonical_urls"] {
            assert!(json[field].is_null(), "{field} should be null");
        }
        assert_eq!(json["analyzed_at"], "2024-05-01T12:00:00Z");
    }

    #[tokio::test]
    async fn test_unreachable_site_still_produces_report() {
        let audit = orchestrator(Arc::new(FakeFetcher::new()));
        let report = audit
            .run(&AuditTarget::new("https://example.com/", "<html></html>"))
            .await
            .unwrap();

        assert!(report.security.is_some());
        assert!(report.sitemap_analysis.is_some());
        assert!(report
            .errors
            .iter()
            .any(|e| e.service == "security" && e.message.starts_with("certificate")));
        assert!(report
            .errors
            .iter()
            .any(|e| e.service == "sitemap_analysis" && e.message.starts_with("robots.txt")));

        let ranks: Vec<u8> = report
            .recommendations
            .iter()
            .map(|r| r.severity.rank())
            .collect();
        assert!(ranks.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(report.recommendations[0].severity, Severity::Error);
    }

    #[tokio::test]
    async fn test_hanging_analyzer_times_out_without_sinking_the_audit() {
        let audit = orchestrator(Arc::new(HangingFetcher))
            .with_analyzer_timeout(Duration::from_millis(50));
        let target = AuditTarget::new("https://example.com/", MARKUP_ONLY_PAGE).with_options(only(&[
            AnalyzerKind::CanonicalUrls,
            AnalyzerKind::StructuredData,
        ]));

        let report = audit.run(&target).await.unwrap();
        let canonical = report.canonical_urls.as_ref().unwrap();
        assert!(canonical.details.is_none());
        assert_eq!(canonical.score, 0);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].service, "canonical_urls");
        assert!(report.errors[0].message.contains("timed out"));
        // Only structured data carries weight
        assert_eq!(report.technical_score, 100);
    }

    #[tokio::test]
    async fn test_panicking_analyzer_becomes_error_entry() {
        let audit = orchestrator(Arc::new(FakeFetcher::new()));
        let result = audit
            .guarded(
                "https://example.com/",
                AnalyzerKind::Security,
                true,
                async { explode() },
            )
            .await
            .unwrap();
        assert!(!result.produced_score());
        assert!(result.errors[0].contains("analyzer exploded"));
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_audit() {
        let audit = orchestrator(Arc::new(HangingFetcher));
        let target = AuditTarget::new("https://example.com/", "<html></html>");

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        assert_eq!(
            audit.run_with_cancellation(&target, cancel).await.unwrap_err(),
            AuditError::Cancelled
        );

        let already = CancellationToken::new();
        already.cancel();
        assert_eq!(
            audit.run_with_cancellation(&target, already).await.unwrap_err(),
            AuditError::Cancelled
        );
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(
            AuditPhase::Running(AnalyzerKind::CanonicalUrls).to_string(),
            "running(canonical_urls)"
        );
        assert_eq!(AuditPhase::Done.to_string(), "done");
    }
}
