//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `seo_audit` library that handles:
//! - Command-line argument parsing
//! - Environment variable loading (.env file)
//! - Logger initialization
//! - Printing the audit report as JSON
//!
//! All core functionality is implemented in the library crate.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use seo_audit::initialization::{init_crypto_provider, init_logger_with};
use seo_audit::{fetch_page, run_audit, AuditOptions, AuditTarget, Config, LogFormat, LogLevel};

/// Analyzers that can be switched off from the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Analyzer {
    PageSpeed,
    Mobile,
    Security,
    Sitemap,
    Canonical,
    StructuredData,
}

/// Technical SEO audit of a single web page.
#[derive(Debug, Parser)]
#[command(name = "seo_audit", version, about)]
struct Cli {
    /// URL of the page to audit
    url: String,

    /// Read the page HTML from this file instead of downloading it
    #[arg(long, value_name = "PATH")]
    html_file: Option<PathBuf>,

    /// PageSpeed Insights API key (speed analysis falls back to heuristics without one)
    #[arg(long, env = "PAGESPEED_API_KEY", hide_env_values = true)]
    pagespeed_api_key: Option<String>,

    /// Per-request HTTP timeout in seconds
    #[arg(long, default_value_t = seo_audit::config::DEFAULT_HTTP_TIMEOUT_SECS)]
    timeout_seconds: u64,

    /// Maximum URL entries kept per sitemap
    #[arg(long)]
    max_urls: Option<usize>,

    /// Number of sitemap URLs probed for accessibility
    #[arg(long)]
    max_accessibility_tests: Option<usize>,

    /// Levels of sitemap indexes to expand (0 reports child sitemaps only)
    #[arg(long, default_value_t = 0)]
    max_sitemap_index_depth: usize,

    /// Skip an analyzer (repeatable)
    #[arg(long, value_enum)]
    skip: Vec<Analyzer>,

    /// Ignore cached analyzer results
    #[arg(long)]
    force_refresh: bool,

    /// Allow private and loopback hosts (staging servers)
    #[arg(long)]
    allow_private_targets: bool,

    /// Log level: error, warn, info, debug or trace
    #[arg(long, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Log format: plain or json
    #[arg(long, value_enum, default_value = "plain")]
    log_format: LogFormat,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            log_level: self.log_level.clone(),
            log_format: self.log_format.clone(),
            timeout_seconds: self.timeout_seconds,
            pagespeed_api_key: self.pagespeed_api_key.clone().filter(|k| !k.is_empty()),
            max_sitemap_index_depth: self.max_sitemap_index_depth,
            allow_private_targets: self.allow_private_targets,
            ..Default::default()
        }
    }

    fn options(&self) -> AuditOptions {
        let enabled = |analyzer| !self.skip.contains(&analyzer);
        AuditOptions {
            force_refresh: self.force_refresh,
            include_page_speed: enabled(Analyzer::PageSpeed),
            include_mobile_analysis: enabled(Analyzer::Mobile),
            include_security_analysis: enabled(Analyzer::Security),
            include_sitemap_analysis: enabled(Analyzer::Sitemap),
            include_canonical_analysis: enabled(Analyzer::Canonical),
            include_structured_data: enabled(Analyzer::StructuredData),
            max_urls_to_analyze: self.max_urls,
            max_accessibility_tests: self.max_accessibility_tests,
        }
    }
}

async fn run(cli: Cli) -> Result<String> {
    let config = cli.config();
    let html = match &cli.html_file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => fetch_page(&config, &cli.url).await?,
    };

    let target = AuditTarget::new(cli.url.clone(), html).with_options(cli.options());
    let report = run_audit(&config, target).await?;
    let json = if cli.pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    };
    json.context("Failed to serialize audit report")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if it exists)
    // This allows setting PAGESPEED_API_KEY in .env without exporting it manually
    // Try loading from current directory first, then from the executable's directory
    if dotenvy::dotenv().is_err() {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let env_path = exe_dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                }
            }
        }
    }

    let cli = Cli::parse();

    init_logger_with(cli.log_level.clone().into(), cli.log_format.clone())
        .context("Failed to initialize logger")?;

    // Initialize crypto provider for TLS operations
    init_crypto_provider();

    match run(cli).await {
        Ok(json) => {
            println!("{json}");
            Ok(())
        }
        Err(e) => {
            eprintln!("seo_audit error: {:#}", e);
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_enable_everything() {
        let cli = Cli::try_parse_from(["seo_audit", "https://example.com/"]).unwrap();
        let options = cli.options();
        assert_eq!(options, AuditOptions::default());
        assert_eq!(cli.config().max_sitemap_index_depth, 0);
    }

    #[test]
    fn test_cli_skip_flags() {
        let cli = Cli::try_parse_from([
            "seo_audit",
            "https://example.com/",
            "--skip",
            "page-speed",
            "--skip",
            "structured-data",
            "--max-urls",
            "25",
            "--force-refresh",
        ])
        .unwrap();
        let options = cli.options();
        assert!(!options.include_page_speed);
        assert!(!options.include_structured_data);
        assert!(options.include_security_analysis);
        assert!(options.force_refresh);
        assert_eq!(options.max_sitemap_urls(), 25);
    }
}
