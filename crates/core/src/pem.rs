//! PEM normalization and X.509 inspection for the IdP signing certificate.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

use crate::error::{Result, TesseraError};

pub const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
pub const PEM_END: &str = "-----END CERTIFICATE-----";

const LINE_WIDTH: usize = 64;

/// Turn a certificate into a PEM block.
///
/// Input that already carries the BEGIN delimiter is returned unchanged, so the
/// function is idempotent. Anything else is treated as a base64 body: whitespace
/// is dropped, the body is wrapped at 64 columns and delimiters are added.
/// Blank input stays blank.
pub fn normalize_cert(raw: &str) -> String {
    if raw.contains(PEM_BEGIN) {
        return raw.to_string();
    }

    let body: Vec<char> = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if body.is_empty() {
        return String::new();
    }

    let mut pem = String::with_capacity(body.len() + body.len() / LINE_WIDTH + 64);
    pem.push_str(PEM_BEGIN);
    pem.push('\n');
    for line in body.chunks(LINE_WIDTH) {
        pem.extend(line.iter());
        pem.push('\n');
    }
    pem.push_str(PEM_END);
    pem.push('\n');
    pem
}

/// Base64 body of a PEM certificate with delimiters and all whitespace removed.
pub fn certificate_body(pem: &str) -> String {
    pem.replace(PEM_BEGIN, "")
        .replace(PEM_END, "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Structural check: exactly one delimiter pair enclosing a non-empty body.
pub fn is_pem_certificate(pem: &str) -> bool {
    let trimmed = pem.trim();
    trimmed.starts_with(PEM_BEGIN)
        && trimmed.ends_with(PEM_END)
        && trimmed.matches(PEM_BEGIN).count() == 1
        && trimmed.matches(PEM_END).count() == 1
        && !certificate_body(trimmed).is_empty()
}

/// Parsed view of a trusted certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub pem: String,
    pub der: Vec<u8>,
    pub subject: String,
    pub issuer: String,
    pub serial: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Lowercase hex SHA-256 of the DER encoding.
    pub fingerprint_sha256: String,
}

impl CertificateInfo {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.not_after
    }
}

/// Normalize, decode and parse a certificate.
pub fn parse_certificate(raw: &str) -> Result<CertificateInfo> {
    let pem = normalize_cert(raw);
    if !is_pem_certificate(&pem) {
        return Err(TesseraError::CertificateInvalid(
            "expected a single PEM certificate block".into(),
        ));
    }

    let der = BASE64
        .decode(certificate_body(&pem))
        .map_err(|e| TesseraError::CertificateInvalid(format!("body is not base64: {e}")))?;

    let (_, cert) = X509Certificate::from_der(&der)
        .map_err(|e| TesseraError::CertificateInvalid(format!("not an X.509 certificate: {e}")))?;

    let validity = cert.validity();
    let not_before = timestamp(validity.not_before.timestamp())?;
    let not_after = timestamp(validity.not_after.timestamp())?;

    let info = CertificateInfo {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        serial: cert.raw_serial_as_string(),
        not_before,
        not_after,
        fingerprint_sha256: hex::encode(Sha256::digest(&der)),
        pem,
        der,
    };
    Ok(info)
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| TesseraError::CertificateInvalid(format!("validity out of range: {secs}")))
}
