//! Response body decoding.

use std::io::Read;

use flate2::read::GzDecoder;

use super::FetchResponse;
use crate::error_handling::{FetchError, FetchErrorKind};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// True when the body starts with the gzip magic bytes.
pub fn is_gzip(body: &[u8]) -> bool {
    body.len() >= 2 && body[..2] == GZIP_MAGIC
}

fn declares_gzip(response: &FetchResponse) -> bool {
    let encoding = response
        .header("content-encoding")
        .map(|v| v.to_ascii_lowercase().contains("gzip"))
        .unwrap_or(false);
    let content_type = response
        .content_type()
        .map(|v| v.to_ascii_lowercase().contains("gzip"))
        .unwrap_or(false);
    encoding || content_type || response.final_url.to_ascii_lowercase().ends_with(".gz")
}

/// Returns the response body, gunzipped when it is gzip-encoded.
///
/// Gzip is detected from `Content-Encoding`/`Content-Type` or the magic bytes.
/// Decompression stops at `limit` bytes; exceeding it is an error rather than
/// a silent truncation (gzip bomb guard). A body that declares gzip but does
/// not decode is returned as-is when it lacks the magic bytes, since some
/// servers mislabel plain XML.
pub fn decode_body(response: &FetchResponse, limit: usize) -> Result<Vec<u8>, FetchError> {
    let magic = is_gzip(&response.body);
    if !magic && !declares_gzip(response) {
        return Ok(response.body.clone());
    }

    let mut decoded = Vec::new();
    let mut decoder = GzDecoder::new(response.body.as_slice()).take(limit as u64 + 1);
    match decoder.read_to_end(&mut decoded) {
        Ok(_) if decoded.len() > limit => Err(FetchError::new(
            FetchErrorKind::BodyTooLarge,
            &response.final_url,
            format!("decompressed body exceeds {limit} bytes"),
        )),
        Ok(_) => Ok(decoded),
        Err(_) if !magic => Ok(response.body.clone()),
        Err(e) => Err(FetchError::new(
            FetchErrorKind::Decode,
            &response.final_url,
            format!("gzip decode failed: {e}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn response(body: Vec<u8>) -> FetchResponse {
        FetchResponse {
            status: 200,
            body,
            final_url: "https://example.com/sitemap.xml".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_plain_body_passes_through() {
        let r = response(b"<urlset/>".to_vec());
        assert_eq!(decode_body(&r, 1024).unwrap(), b"<urlset/>");
    }

    #[test]
    fn test_gzip_detected_by_magic_bytes() {
        let r = response(gzip(b"<urlset></urlset>"));
        assert!(is_gzip(&r.body));
        assert_eq!(decode_body(&r, 1024).unwrap(), b"<urlset></urlset>");
    }

    #[test]
    fn test_gzip_bomb_is_rejected() {
        let r = response(gzip(&vec![b'a'; 64 * 1024]));
        let err = decode_body(&r, 1024).unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::BodyTooLarge);
    }

    #[test]
    fn test_mislabelled_plain_body_is_returned_raw() {
        let mut r = response(b"<urlset/>".to_vec());
        r.headers
            .insert("content-encoding".into(), "gzip".into());
        assert_eq!(decode_body(&r, 1024).unwrap(), b"<urlset/>");
    }

    #[test]
    fn test_corrupt_gzip_is_decode_error() {
        let mut body = gzip(b"<urlset></urlset>");
        body.truncate(12);
        let err = decode_body(&response(body), 1024).unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Decode);
    }
}
