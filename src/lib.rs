//! seo_audit library: technical SEO audits of a single web page
//!
//! Given a page URL and its HTML, the audit checks crawlability (robots.txt and
//! sitemaps), canonicalization, transport security, performance signals and
//! structured data, then merges everything into one [`AuditReport`] with a
//! weighted technical score and a prioritized recommendation list.
//!
//! # Example
//!
//! ```no_run
//! use seo_audit::{run_audit, AuditTarget, Config};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config {
//!     timeout_seconds: 20,
//!     ..Default::default()
//! };
//!
//! let html = "<html><head><title>Example</title></head></html>";
//! let report = run_audit(&config, AuditTarget::new("https://example.com/", html)).await?;
//! println!("Technical score: {}", report.technical_score);
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Certificate inspection uses rustls
//! with the `ring` provider; call [`initialization::init_crypto_provider`]
//! once at startup if other code in the process relies on the global provider.

pub mod audit;
pub mod cache;
pub mod canonical;
pub mod config;
mod error_handling;
pub mod fetch;
pub mod initialization;
mod models;
pub mod performance;
pub mod robots;
pub mod security;
pub mod structured;
pub mod transport;
mod utils;

// Re-export public API
pub use audit::{AuditOrchestrator, AuditPhase, AuditReport, Collaborators, ServiceError};
pub use config::{Config, LogFormat, LogLevel, ScoreWeights};
pub use error_handling::{AuditError, FetchError, FetchErrorKind, InitializationError};
pub use models::{
    sort_recommendations, AnalyzerKind, AnalyzerResult, AuditOptions, AuditTarget, DomSummary,
    Impact, Recommendation, Severity,
};
pub use run::{fetch_page, run_audit};

// Convenience entry points over the orchestrator
mod run {
    use anyhow::{Context, Result};

    use crate::audit::{AuditOrchestrator, AuditReport};
    use crate::config::Config;
    use crate::fetch::{Fetcher, HttpFetcher, RequestOptions};
    use crate::models::AuditTarget;

    /// Runs one audit with live collaborators built from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the target URL
    /// is rejected. Analyzer failures are reported inside the `AuditReport`.
    pub async fn run_audit(config: &Config, target: AuditTarget) -> Result<AuditReport> {
        let orchestrator =
            AuditOrchestrator::from_config(config).context("Failed to initialize audit")?;
        let report = orchestrator
            .run(&target)
            .await
            .with_context(|| format!("Audit of {} failed", target.url))?;
        Ok(report)
    }

    /// Downloads the page to audit, following redirects.
    ///
    /// The URL must pass the same policy the audit itself applies.
    pub async fn fetch_page(config: &Config, url: &str) -> Result<String> {
        config
            .url_policy()
            .check(url)
            .map_err(|reason| anyhow::anyhow!(reason))
            .with_context(|| format!("Refusing to fetch {url}"))?;

        let fetcher = HttpFetcher::new(config).context("Failed to initialize HTTP client")?;
        let response = fetcher
            .get(url, &RequestOptions::follow())
            .await
            .with_context(|| format!("Failed to fetch {url}"))?;
        if !response.is_success() {
            log::warn!("{url} returned HTTP {}", response.status);
        }
        Ok(response.text())
    }
}
