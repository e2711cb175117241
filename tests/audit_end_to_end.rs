//! End-to-end audits against a local mock site.
//!
//! The mock server listens on 127.0.0.1, so every config here sets
//! `allow_private_targets`; the SSRF guard would refuse loopback otherwise.

use std::time::Duration;

use seo_audit::{
    run_audit, AuditError, AuditOptions, AuditOrchestrator, AuditTarget, Config, LogFormat,
    LogLevel, Severity,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config() -> Config {
    Config {
        log_level: LogLevel::Error,
        log_format: LogFormat::Plain,
        timeout_seconds: 5,
        tls_timeout_seconds: 2,
        allow_private_targets: true,
        ..Default::default()
    }
}

fn only_canonical() -> AuditOptions {
    AuditOptions {
        include_page_speed: false,
        include_mobile_analysis: false,
        include_security_analysis: false,
        include_sitemap_analysis: false,
        include_structured_data: false,
        ..AuditOptions::default()
    }
}

fn only_security() -> AuditOptions {
    AuditOptions {
        include_page_speed: false,
        include_mobile_analysis: false,
        include_sitemap_analysis: false,
        include_canonical_analysis: false,
        include_structured_data: false,
        ..AuditOptions::default()
    }
}

#[tokio::test]
async fn test_self_referencing_canonical_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(path("/page"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let url = format!("{}/page", server.uri());
    let html = format!(r#"<html><head><link rel="canonical" href="{url}"></head></html>"#);
    let target = AuditTarget::new(url.clone(), html).with_options(only_canonical());

    let report = run_audit(&test_config(), target).await.unwrap();
    let canonical = report.canonical_urls.as_ref().expect("canonical slot enabled");
    let details = canonical.details.as_ref().expect("canonical analysis ran");

    assert!(details.canonical_analysis.has_canonical);
    assert!(details.canonical_analysis.is_self_referencing);
    assert!(details.canonical_analysis.canonical_issues.is_empty());
    assert_eq!(details.canonical_analysis.canonical_status, Some(200));
    assert!(canonical.score >= 70, "score was {}", canonical.score);
    assert!(canonical.errors.is_empty());
    assert_eq!(report.technical_score, canonical.score);
}

#[tokio::test]
async fn test_http_site_without_security_headers() {
    let server = MockServer::start().await;
    Mock::given(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;

    let url = format!("{}/", server.uri());
    let target = AuditTarget::new(url, "<html></html>").with_options(only_security());
    let report = run_audit(&test_config(), target).await.unwrap();

    let security = report.security.as_ref().expect("security slot enabled");
    let details = security.details.as_ref().expect("security analysis ran");
    assert!(!details.https_analysis.is_https);
    assert!(details.certificate.is_none());
    assert!(security.score < 50, "score was {}", security.score);

    let messages: Vec<&str> = report
        .recommendations
        .iter()
        .map(|r| r.message.as_str())
        .collect();
    assert!(messages.contains(&"Site not served over HTTPS"));
    assert!(messages.contains(&"Missing Strict-Transport-Security header"));
    assert!(messages.contains(&"Missing Content-Security-Policy header"));
    assert_eq!(report.recommendations[0].severity, Severity::Error);
}

#[tokio::test]
async fn test_redirect_loop_is_bounded() {
    let server = MockServer::start().await;
    Mock::given(path("/loop"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/loop"))
        .mount(&server)
        .await;

    let url = format!("{}/loop", server.uri());
    let target = AuditTarget::new(url, "<html></html>").with_options(only_canonical());
    let report = run_audit(&test_config(), target).await.unwrap();

    let details = report
        .canonical_urls
        .as_ref()
        .and_then(|r| r.details.as_ref())
        .expect("canonical analysis ran");
    let chain = details
        .redirect_analysis
        .chain
        .as_ref()
        .expect("redirect chain walked");
    assert!(chain.loop_detected);
    assert!(chain.hops.len() <= 10);
}

#[tokio::test]
async fn test_loopback_target_rejected_without_opt_in() {
    let config = Config {
        allow_private_targets: false,
        ..test_config()
    };
    let orchestrator = AuditOrchestrator::from_config(&config).unwrap();
    let err = orchestrator
        .run(&AuditTarget::new("http://127.0.0.1:8080/", "<html></html>"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::InvalidUrl(_)));
}

#[tokio::test]
async fn test_cancellation_abandons_slow_site() {
    let server = MockServer::start().await;
    Mock::given(path("/"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let orchestrator = AuditOrchestrator::from_config(&test_config()).unwrap();
    let target = AuditTarget::new(format!("{}/", server.uri()), "<html></html>")
        .with_options(only_canonical());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let result = orchestrator.run_with_cancellation(&target, cancel).await;
    assert_eq!(result.unwrap_err(), AuditError::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_report_serializes_disabled_analyzers_as_null() {
    let server = MockServer::start().await;
    Mock::given(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let html = r#"<html><head>
        <meta name="viewport" content="width=device-width, initial-scale=1">
        <script type="application/ld+json">{"@type":"Product","name":"Widget"}</script>
        </head></html>"#;
    let options = AuditOptions {
        include_page_speed: false,
        include_security_analysis: false,
        include_sitemap_analysis: false,
        ..AuditOptions::default()
    };
    let target = AuditTarget::new(format!("{}/", server.uri()), html).with_options(options);
    let report = run_audit(&test_config(), target).await.unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert!(json["page_speed"].is_null());
    assert!(json["security"].is_null());
    assert!(json["sitemap_analysis"].is_null());
    assert!(json["structured_data"]["score"].as_u64().unwrap() > 0);
    assert_eq!(json["structured_data"]["schema_types"][0], "Product");
    assert!(json["mobile_optimization"]["has_viewport"].as_bool().unwrap());
    assert!(json["technical_score"].as_u64().unwrap() <= 100);
    assert!(json["recommendations"].is_array());
    assert!(json["errors"].is_array());
}
