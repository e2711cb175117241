//! robots.txt and sitemap analysis against a local mock site.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use seo_audit::{run_audit, AuditOptions, AuditTarget, Config, LogFormat, LogLevel, Severity};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config() -> Config {
    Config {
        log_level: LogLevel::Error,
        log_format: LogFormat::Plain,
        timeout_seconds: 5,
        allow_private_targets: true,
        ..Default::default()
    }
}

fn only_sitemap() -> AuditOptions {
    AuditOptions {
        include_page_speed: false,
        include_mobile_analysis: false,
        include_security_analysis: false,
        include_canonical_analysis: false,
        include_structured_data: false,
        ..AuditOptions::default()
    }
}

fn gzip(data: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

#[tokio::test]
async fn test_missing_robots_and_sitemaps() {
    // Every path falls through to wiremock's default 404
    let server = MockServer::start().await;

    let target =
        AuditTarget::new(format!("{}/", server.uri()), "<html></html>").with_options(only_sitemap());
    let report = run_audit(&test_config(), target).await.unwrap();

    let sitemap = report.sitemap_analysis.as_ref().expect("sitemap slot enabled");
    let details = sitemap.details.as_ref().expect("sitemap analysis ran");
    assert!(!details.robots_txt.accessible);
    assert_eq!(details.robots_txt.status_code, Some(404));
    assert!(details.sitemaps.is_empty());
    assert!(report.recommendations.iter().any(|r| {
        r.severity == Severity::Error && r.message == "robots.txt file not accessible"
    }));
}

#[tokio::test]
async fn test_gzipped_sitemap_from_robots_is_parsed_and_sampled() {
    let server = MockServer::start().await;
    let base = server.uri();

    let robots = format!("User-agent: *\nDisallow: /private/\n\nSitemap: {base}/sitemap.xml.gz\n");
    let sitemap = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>{base}/a</loc><lastmod>2024-01-01</lastmod><changefreq>weekly</changefreq></url>
  <url><loc>{base}/b</loc><changefreq>daily</changefreq><priority>0.5</priority></url>
  <url><loc>{base}/private/c</loc></url>
</urlset>"#
    );

    Mock::given(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(robots))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml.gz"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/x-gzip")
                .set_body_bytes(gzip(&sitemap)),
        )
        .mount(&server)
        .await;
    Mock::given(path("/a"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(path("/private/c"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    // /b is left unmocked and answers 404

    let target =
        AuditTarget::new(format!("{base}/"), "<html></html>").with_options(only_sitemap());
    let report = run_audit(&test_config(), target).await.unwrap();
    let details = report
        .sitemap_analysis
        .as_ref()
        .and_then(|r| r.details.as_ref())
        .expect("sitemap analysis ran");

    assert!(details.robots_txt.accessible);
    assert_eq!(details.sitemaps.len(), 1);
    let summary = &details.sitemaps[0];
    assert!(summary.accessible);
    assert!(summary.compressed);
    let stats = summary.statistics.as_ref().expect("urlset statistics");
    assert_eq!(stats.total_urls, 3);
    assert_eq!(stats.with_lastmod, 1);
    assert_eq!(stats.with_changefreq, 2);
    assert_eq!(stats.with_priority, 1);

    let access = &details.url_accessibility;
    assert_eq!(access.tested, 3);
    assert_eq!(access.accessible, 2);
    assert_eq!(access.inaccessible, 1);
    assert_eq!(access.blocked_by_robots, 1);
    assert_eq!(access.failed_urls.len(), 1);
    assert!(access.failed_urls[0].url.ends_with("/b"));
}
