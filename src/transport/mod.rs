//! Transport-security analysis.
//!
//! Scores HTTPS usage and enforcement, the TLS certificate, response security
//! headers, mixed content, third-party resource hygiene and CSP strength.

mod csp;
mod headers;
mod markup;
mod tls;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::Clock;
use crate::config::{HEADER_CONTENT_SECURITY_POLICY, SECURITY_HEADERS};
use crate::fetch::{probe, Fetcher, RequestOptions};
use crate::models::{AnalyzerResult, AuditOptions, Impact, Recommendation};
use crate::security::UrlPolicy;
use crate::utils::clamp_score;
use crate::utils::sanitize::sanitize_and_truncate_error_message;

pub use csp::{analyze_csp, parse_csp, CspAnalysis, CspSource};
pub use headers::{analyze_security_headers, HeaderStatus, SecurityHeaderSet};
pub use markup::{scan_markup, ExternalResources, MarkupScan, MixedContent};
pub use tls::{
    assess_certificate, certificate_points, parse_leaf_certificate, CertificateInfo,
    CertificateInspector, RawCertificate, TlsInspector,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpsAnalysis {
    pub is_https: bool,
    /// The other-scheme twin of the page URL that was probed.
    pub counterpart_url: Option<String>,
    pub counterpart_status: Option<u16>,
    /// HTTPS page: the HTTP twin answers 301/308 with an https `Location`.
    pub redirects_to_https: bool,
    /// HTTP page: the HTTPS twin answers successfully.
    pub https_available: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportReport {
    pub https_analysis: HttpsAnalysis,
    pub certificate: Option<CertificateInfo>,
    pub security_headers: Option<SecurityHeaderSet>,
    pub mixed_content: Option<MixedContent>,
    pub external_resources: ExternalResources,
    pub csp_analysis: CspAnalysis,
}

fn counterpart(page: &Url) -> Option<Url> {
    let mut twin = page.clone();
    let scheme = if page.scheme() == "https" { "http" } else { "https" };
    twin.set_scheme(scheme).ok()?;
    Some(twin)
}

/// HTTPS 40 (+5 enforced), certificate 25, headers 20 x sub-score, mixed
/// content 10 minus one per issue, external domains 5 minus one per five.
fn compute_score(report: &TransportReport) -> u8 {
    let https = &report.https_analysis;
    let mut score = 0.0;

    if https.is_https {
        score += 40.0;
        if https.redirects_to_https {
            score += 5.0;
        }
    }
    if let Some(cert) = &report.certificate {
        score += certificate_points(cert);
    }
    if let Some(headers) = &report.security_headers {
        score += 20.0 * f64::from(headers.security_score) / 100.0;
    }
    if let Some(mixed) = &report.mixed_content {
        score += (10.0 - mixed.total_issues as f64).max(0.0);
    }
    let domains = report.external_resources.total_domains as f64;
    score += (5.0 - (domains / 5.0).floor()).max(0.0);

    clamp_score(score)
}

fn header_impact(weight: u32) -> Impact {
    if weight >= 20 {
        Impact::High
    } else if weight >= 10 {
        Impact::Medium
    } else {
        Impact::Low
    }
}

fn build_recommendations(report: &TransportReport) -> Vec<Recommendation> {
    let mut recs = Vec::new();
    let https = &report.https_analysis;

    if !https.is_https {
        let fix = if https.https_available {
            "HTTPS already answers; redirect all HTTP traffic to it with a 301"
        } else {
            "Install a TLS certificate and serve every page over HTTPS"
        };
        recs.push(Recommendation::error(Impact::High, "Site not served over HTTPS", fix));
    } else if !https.redirects_to_https {
        recs.push(Recommendation::warning(
            Impact::Medium,
            "HTTP version does not redirect to HTTPS",
            "Answer plain-HTTP requests with a 301 to the HTTPS URL",
        ));
    }

    if let Some(cert) = &report.certificate {
        if cert.is_expired {
            recs.push(Recommendation::error(
                Impact::High,
                "SSL certificate has expired or is not yet valid",
                "Renew the certificate immediately",
            ));
        } else if cert.expires_soon {
            recs.push(Recommendation::warning(
                Impact::High,
                format!("SSL certificate expires in {} days", cert.days_until_expiry),
                "Renew the certificate or enable automatic renewal",
            ));
        }
        if cert.self_signed {
            recs.push(Recommendation::error(
                Impact::High,
                "SSL certificate is self-signed",
                "Use a certificate issued by a publicly trusted CA",
            ));
        } else if !cert.trusted {
            recs.push(Recommendation::warning(
                Impact::Medium,
                "SSL certificate chain is not trusted",
                "Serve the full intermediate chain from a trusted CA",
            ));
        }
        if !cert.hostname_matches {
            recs.push(Recommendation::error(
                Impact::High,
                "SSL certificate does not match the hostname",
                "Issue a certificate whose SAN list covers this host",
            ));
        }
        if cert.weak_key {
            recs.push(Recommendation::warning(
                Impact::Medium,
                "SSL certificate uses a weak key",
                "Reissue with at least a 2048-bit RSA or an ECDSA key",
            ));
        }
    }

    if let Some(headers) = &report.security_headers {
        for (name, weight) in SECURITY_HEADERS {
            let Some(status) = headers.get(name) else {
                continue;
            };
            if !status.present {
                let impact = header_impact(*weight);
                let message = format!("Missing {name} header");
                let fix = format!("Add the {name} response header");
                recs.push(if *weight >= 15 {
                    Recommendation::warning(impact, message, fix)
                } else {
                    Recommendation::info(impact, message, fix)
                });
            } else if !status.effective {
                recs.push(Recommendation::info(
                    Impact::Low,
                    format!("Weak {name} configuration"),
                    format!("Tighten the {name} value"),
                ));
            }
        }
    }

    if let Some(mixed) = &report.mixed_content {
        if mixed.total_issues > 0 {
            recs.push(Recommendation::error(
                Impact::High,
                format!("{} resources loaded over HTTP on an HTTPS page", mixed.total_issues),
                "Load images, scripts and stylesheets over HTTPS",
            ));
        }
        if !mixed.links.is_empty() {
            recs.push(Recommendation::info(
                Impact::Low,
                format!("{} links point to HTTP URLs", mixed.links.len()),
                "Update internal and external links to HTTPS where available",
            ));
        }
    }

    let external = &report.external_resources;
    if !external.high_risk.is_empty() {
        recs.push(Recommendation::info(
            Impact::Medium,
            format!("{} tracking or advertising domains loaded", external.high_risk.len()),
            "Audit third-party tags and remove the ones no longer needed",
        ));
    }
    if external.total_domains > 10 {
        recs.push(Recommendation::warning(
            Impact::Low,
            format!("Page loads resources from {} external domains", external.total_domains),
            "Self-host critical assets and trim third-party dependencies",
        ));
    }

    let csp = &report.csp_analysis;
    if csp.has_unsafe_inline {
        recs.push(Recommendation::warning(
            Impact::Medium,
            "Content-Security-Policy allows 'unsafe-inline'",
            "Replace inline code with nonces or hashes",
        ));
    }
    if csp.has_unsafe_eval {
        recs.push(Recommendation::warning(
            Impact::Medium,
            "Content-Security-Policy allows 'unsafe-eval'",
            "Remove eval-style code paths and drop 'unsafe-eval'",
        ));
    }

    recs
}

/// Transport-security analyzer.
pub struct TransportSecurityAnalyzer {
    fetcher: Arc<dyn Fetcher>,
    inspector: Arc<dyn CertificateInspector>,
    clock: Arc<dyn Clock>,
    policy: UrlPolicy,
}

impl TransportSecurityAnalyzer {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        inspector: Arc<dyn CertificateInspector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            fetcher,
            inspector,
            clock,
            policy: UrlPolicy::strict(),
        }
    }

    pub fn with_policy(mut self, policy: UrlPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn analyze(
        &self,
        url: &str,
        html: &str,
        _options: &AuditOptions,
    ) -> AnalyzerResult<TransportReport> {
        let page = match Url::parse(url) {
            Ok(page) => page,
            Err(e) => return AnalyzerResult::failed(format!("Invalid page URL '{url}': {e}")),
        };
        log::debug!("Starting transport security analysis for {url}");

        let mut errors = Vec::new();
        let scan = scan_markup(&page, html);

        let https_analysis = self.check_https(&page, &mut errors).await;

        let certificate = if https_analysis.is_https {
            self.inspect_certificate(&page, &mut errors).await
        } else {
            None
        };

        let (security_headers, csp_header) =
            match self.fetcher.get(url, &RequestOptions::follow()).await {
                Ok(response) => (
                    Some(analyze_security_headers(&response.headers)),
                    response
                        .header(HEADER_CONTENT_SECURITY_POLICY)
                        .map(str::to_string),
                ),
                Err(e) => {
                    log::warn!("Security header fetch failed for {url}: {e}");
                    errors.push(format!("security headers: {e}"));
                    (None, None)
                }
            };
        let csp_analysis = analyze_csp(csp_header.as_deref(), scan.meta_csp.as_deref());

        let report = TransportReport {
            https_analysis,
            certificate,
            security_headers,
            mixed_content: scan.mixed_content,
            external_resources: scan.external_resources,
            csp_analysis,
        };
        let score = compute_score(&report);
        let recs = build_recommendations(&report);
        log::debug!("Finished transport security analysis for {url}: score {score}");

        AnalyzerResult::completed(score, report, recs, errors)
    }

    /// Probes the other-scheme twin of `page`. Only a policy rejection of the
    /// twin lands in `errors`; an unreachable twin is recorded on the analysis.
    async fn check_https(&self, page: &Url, errors: &mut Vec<String>) -> HttpsAnalysis {
        let mut analysis = HttpsAnalysis {
            is_https: page.scheme() == "https",
            ..Default::default()
        };
        let Some(twin) = counterpart(page) else {
            return analysis;
        };
        analysis.counterpart_url = Some(twin.to_string());

        if let Err(reason) = self.policy.check(twin.as_str()) {
            errors.push(format!("https check: {reason}"));
            analysis.error = Some(reason);
            return analysis;
        }

        let options = if analysis.is_https {
            RequestOptions::no_follow()
        } else {
            RequestOptions::follow()
        };
        match probe(self.fetcher.as_ref(), twin.as_str(), &options).await {
            Ok(response) => {
                analysis.counterpart_status = Some(response.status);
                if analysis.is_https {
                    let to_https = response
                        .location()
                        .and_then(|loc| twin.join(loc).ok())
                        .map(|target| target.scheme() == "https")
                        .unwrap_or(false);
                    analysis.redirects_to_https = matches!(response.status, 301 | 308) && to_https;
                } else {
                    analysis.https_available = response.is_success();
                }
            }
            Err(e) => {
                log::debug!("Counterpart probe failed for {twin}: {e}");
                analysis.error = Some(e.message);
            }
        }
        analysis
    }

    async fn inspect_certificate(
        &self,
        page: &Url,
        errors: &mut Vec<String>,
    ) -> Option<CertificateInfo> {
        let host = page.host_str()?.trim_start_matches('[').trim_end_matches(']');
        let port = page.port_or_known_default().unwrap_or(443);
        match self.inspector.inspect(host, port).await {
            Ok(raw) => Some(assess_certificate(raw, host, self.clock.now())),
            Err(e) => {
                log::warn!("Certificate inspection failed for {host}:{port}: {e:#}");
                errors.push(sanitize_and_truncate_error_message(&format!(
                    "certificate: {e:#}"
                )));
                None
            }
        }
    }
}
