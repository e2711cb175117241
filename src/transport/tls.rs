//! TLS certificate inspection.
//!
//! Connects to `host:port` with `tokio-rustls` and reads the leaf certificate
//! with `x509-parser`. The handshake uses a verifier that records the WebPKI
//! verdict instead of enforcing it, so expired, self-signed and mismatched
//! certificates can still be reported on.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::public_key::PublicKey;

use crate::config::{
    Config, CERT_EXPIRY_WARNING_DAYS, MIN_RSA_KEY_BITS, TCP_CONNECT_TIMEOUT_SECS,
};

/// Leaf certificate facts as read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCertificate {
    pub subject: String,
    pub issuer: String,
    pub subject_cn: Option<String>,
    pub issuer_cn: Option<String>,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub key_algorithm: String,
    pub key_size_bits: Option<u32>,
    pub san_domains: Vec<String>,
    pub tls_version: Option<String>,
    /// Why WebPKI validation failed, if it did.
    pub chain_error: Option<String>,
}

/// Certificate facts plus the judgements the security score is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub issuer: String,
    pub subject: String,
    pub issuer_cn: Option<String>,
    pub subject_cn: Option<String>,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub days_until_expiry: i64,
    pub is_expired: bool,
    pub expires_soon: bool,
    pub self_signed: bool,
    pub hostname_matches: bool,
    pub key_algorithm: String,
    pub key_size_bits: Option<u32>,
    pub weak_key: bool,
    pub san_domains: Vec<String>,
    pub tls_version: Option<String>,
    pub trusted: bool,
    pub chain_error: Option<String>,
}

/// Source of leaf certificates; faked in tests.
#[async_trait]
pub trait CertificateInspector: Send + Sync {
    async fn inspect(&self, host: &str, port: u16) -> Result<RawCertificate>;
}

/// True when `pattern` (a SAN or CN) covers `host`. A leading `*.` matches
/// exactly one label.
fn name_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    match pattern.strip_prefix("*.") {
        Some(suffix) => host
            .strip_suffix(suffix)
            .and_then(|label| label.strip_suffix('.'))
            .map(|label| !label.is_empty() && !label.contains('.'))
            .unwrap_or(false),
        None => pattern == host,
    }
}

/// Evaluates `raw` for `host` at `now`.
pub fn assess_certificate(raw: RawCertificate, host: &str, now: DateTime<Utc>) -> CertificateInfo {
    let days_until_expiry = (raw.valid_to - now).num_days();
    let is_expired = raw.valid_to <= now || raw.valid_from > now;
    let names: Vec<&String> = if raw.san_domains.is_empty() {
        raw.subject_cn.iter().collect()
    } else {
        raw.san_domains.iter().collect()
    };
    let hostname_matches = names.iter().any(|n| name_matches(n, host));
    let weak_key = raw.key_algorithm == "RSA"
        && raw.key_size_bits.map(|b| b < MIN_RSA_KEY_BITS).unwrap_or(false);

    CertificateInfo {
        self_signed: raw.issuer == raw.subject,
        issuer: raw.issuer,
        subject: raw.subject,
        issuer_cn: raw.issuer_cn,
        subject_cn: raw.subject_cn,
        valid_from: raw.valid_from,
        valid_to: raw.valid_to,
        days_until_expiry,
        is_expired,
        expires_soon: !is_expired && days_until_expiry < CERT_EXPIRY_WARNING_DAYS,
        hostname_matches,
        key_algorithm: raw.key_algorithm,
        key_size_bits: raw.key_size_bits,
        weak_key,
        san_domains: raw.san_domains,
        tls_version: raw.tls_version,
        trusted: raw.chain_error.is_none(),
        chain_error: raw.chain_error,
    }
}

/// Points out of 25 for the certificate component of the security score.
pub fn certificate_points(cert: &CertificateInfo) -> f64 {
    if cert.is_expired {
        return 0.0;
    }
    let mut points: f64 = 25.0;
    if cert.self_signed {
        points -= 15.0;
    }
    if cert.expires_soon {
        points -= 10.0;
    }
    if !cert.hostname_matches {
        points -= 10.0;
    }
    if cert.weak_key {
        points -= 5.0;
    }
    points.max(0.0)
}

/// Accepts any chain but remembers what WebPKI thought of it. Handshake
/// signatures are still verified.
#[derive(Debug)]
struct InspectionVerifier {
    webpki: Arc<WebPkiServerVerifier>,
    provider: Arc<CryptoProvider>,
    chain_result: Mutex<Option<String>>,
}

impl ServerCertVerifier for InspectionVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if let Err(e) = self.webpki.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            if let Ok(mut slot) = self.chain_result.lock() {
                *slot = Some(e.to_string());
            }
        }
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn key_details(cert: &X509Certificate<'_>) -> (String, Option<u32>) {
    let spki = cert.public_key();
    match spki.parsed() {
        Ok(PublicKey::RSA(rsa)) => ("RSA".to_string(), Some(rsa.key_size() as u32)),
        Ok(PublicKey::EC(ec)) => ("ECDSA".to_string(), Some(ec.key_size() as u32)),
        _ => {
            let oid = spki.algorithm.algorithm.to_id_string();
            let name = match oid.as_str() {
                "1.3.101.112" => "Ed25519".to_string(),
                "1.3.101.113" => "Ed448".to_string(),
                _ => oid,
            };
            (name, None)
        }
    }
}

fn san_dns_names(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut sans = Vec::new();
    for ext in cert.extensions() {
        if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
            for name in &san.general_names {
                if let GeneralName::DNSName(dns) = name {
                    sans.push(dns.to_string());
                }
            }
        }
    }
    sans
}

fn first_cn(name: &x509_parser::x509::X509Name<'_>) -> Option<String> {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string)
}

fn timestamp(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(ts, 0).context("certificate validity out of range")
}

/// Parses a DER leaf certificate.
pub fn parse_leaf_certificate(der: &[u8]) -> Result<RawCertificate> {
    let (_, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| anyhow::anyhow!("Failed to parse certificate: {e}"))?;
    let (key_algorithm, key_size_bits) = key_details(&cert);

    Ok(RawCertificate {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        subject_cn: first_cn(cert.subject()),
        issuer_cn: first_cn(cert.issuer()),
        valid_from: timestamp(cert.validity().not_before.timestamp())?,
        valid_to: timestamp(cert.validity().not_after.timestamp())?,
        key_algorithm,
        key_size_bits,
        san_domains: san_dns_names(&cert),
        tls_version: None,
        chain_error: None,
    })
}

/// Live inspector over TCP + rustls.
pub struct TlsInspector {
    connect_timeout: Duration,
    handshake_timeout: Duration,
}

impl TlsInspector {
    pub fn new(config: &Config) -> Self {
        Self {
            connect_timeout: Duration::from_secs(TCP_CONNECT_TIMEOUT_SECS),
            handshake_timeout: Duration::from_secs(config.tls_timeout_seconds),
        }
    }

    fn verifier(provider: Arc<CryptoProvider>) -> Result<Arc<InspectionVerifier>> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let webpki = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
            .build()
            .context("Failed to build WebPKI verifier")?;
        Ok(Arc::new(InspectionVerifier {
            webpki,
            provider,
            chain_result: Mutex::new(None),
        }))
    }
}

#[async_trait]
impl CertificateInspector for TlsInspector {
    async fn inspect(&self, host: &str, port: u16) -> Result<RawCertificate> {
        log::debug!("Inspecting TLS certificate for {host}:{port}");
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier = Self::verifier(provider.clone())?;
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .context("Failed to select TLS protocol versions")?
            .dangerous()
            .with_custom_certificate_verifier(verifier.clone())
            .with_no_client_auth();

        let server_name = ServerName::try_from(host.to_string())
            .with_context(|| format!("Invalid TLS server name: {host}"))?;

        let sock = tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .with_context(|| {
                format!(
                    "TCP connection timeout for {host}:{port} ({}s)",
                    self.connect_timeout.as_secs()
                )
            })?
            .with_context(|| format!("Failed to connect to {host}:{port}"))?;

        let connector = TlsConnector::from(Arc::new(config));
        let tls_stream = tokio::time::timeout(
            self.handshake_timeout,
            connector.connect(server_name, sock),
        )
        .await
        .with_context(|| {
            format!(
                "TLS handshake timeout for {host} ({}s)",
                self.handshake_timeout.as_secs()
            )
        })?
        .with_context(|| format!("TLS handshake failed for {host}"))?;

        let connection = tls_stream.get_ref().1;
        let leaf = connection
            .peer_certificates()
            .and_then(|certs| certs.first())
            .with_context(|| format!("No certificate presented by {host}"))?;

        let mut raw = parse_leaf_certificate(leaf.as_ref())?;
        raw.tls_version = connection.protocol_version().map(|v| format!("{v:?}"));
        raw.chain_error = verifier.chain_result.lock().ok().and_then(|slot| slot.clone());

        log::debug!(
            "Certificate for {host}: issuer {:?}, expires {}",
            raw.issuer_cn,
            raw.valid_to
        );
        Ok(raw)
    }
}
