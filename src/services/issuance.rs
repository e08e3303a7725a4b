//! Certificate issuance engine
//!
//! Builds a peer TLS certificate template from a decoded request and signs it
//! with the CA. Only the subject and subject alternative names are taken from
//! the request; usages, validity and CA constraints are always set here.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rcgen::{
    CertificateParams, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose,
    PublicKeyData, SerialNumber,
};
use rustls_pki_types::CertificateDer;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::services::pem::DecodedRequest;
use crate::utils::error::{IssueError, PemError};

/// Default lifetime of issued certificates (30 days)
pub const DEFAULT_CERTIFICATE_VALIDITY: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Parameters of the certificate about to be signed
#[derive(Debug, Clone)]
pub struct CertificateTemplate {
    params: CertificateParams,
}

impl CertificateTemplate {
    pub fn params(&self) -> &CertificateParams {
        &self.params
    }
}

/// Build the template for a peer certificate issued at `issued_at`
///
/// Fails when `issued_at + validity` is not a representable date.
pub fn build_template(
    request: &DecodedRequest,
    issued_at: OffsetDateTime,
    validity: Duration,
) -> Result<CertificateTemplate, IssueError> {
    let requested = &request.params.params;
    let not_after = time::Duration::try_from(validity)
        .ok()
        .and_then(|validity| issued_at.checked_add(validity))
        .ok_or_else(|| IssueError::Validity(format!("{:?} after {}", validity, issued_at)))?;

    let mut params = CertificateParams::default();
    params.distinguished_name = requested.distinguished_name.clone();
    params.subject_alt_names = requested.subject_alt_names.clone();
    params.serial_number = Some(derive_serial(request.der.as_ref(), issued_at));
    params.not_before = issued_at;
    params.not_after = not_after;
    params.is_ca = IsCa::ExplicitNoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];
    params.use_authority_key_identifier_extension = true;

    Ok(CertificateTemplate { params })
}

/// Sign `template` for `requester_key` with the CA certificate and key
///
/// The result is checked against the CA certificate's public key, so a CA key
/// that does not belong to the CA certificate is reported as an error rather
/// than producing an unverifiable certificate.
pub fn sign(
    template: &CertificateTemplate,
    requester_key: &impl PublicKeyData,
    ca_certificate: &CertificateDer<'_>,
    ca_key: KeyPair,
) -> Result<CertificateDer<'static>, IssueError> {
    let issuer = Issuer::from_ca_cert_der(ca_certificate, ca_key)
        .map_err(|e| IssueError::Issuer(e.to_string()))?;

    let certificate = template
        .params
        .signed_by(requester_key, &issuer)
        .map_err(|e| IssueError::Signing(e.to_string()))?;

    verify_issued_by(certificate.der(), ca_certificate)?;

    Ok(certificate.der().clone())
}

fn verify_issued_by(
    issued: &CertificateDer<'_>,
    ca_certificate: &CertificateDer<'_>,
) -> Result<(), IssueError> {
    let (_, issued) = x509_parser::parse_x509_certificate(issued.as_ref())
        .map_err(|e| IssueError::Verification(e.to_string()))?;
    let (_, ca) = x509_parser::parse_x509_certificate(ca_certificate.as_ref())
        .map_err(|e| IssueError::Verification(e.to_string()))?;

    issued
        .verify_signature(Some(ca.public_key()))
        .map_err(|e| IssueError::Verification(e.to_string()))
}

/// Check that `ca_key` belongs to `ca_certificate` and that the certificate
/// may issue certificates
pub fn check_ca_pair(
    ca_certificate: &CertificateDer<'_>,
    ca_key: &KeyPair,
) -> Result<CertificateSummary, IssueError> {
    let (_, ca) = x509_parser::parse_x509_certificate(ca_certificate.as_ref())
        .map_err(|e| IssueError::Verification(e.to_string()))?;

    if !ca.is_ca() {
        return Err(IssueError::Issuer(
            "certificate is not a CA certificate".to_string(),
        ));
    }
    if ca.public_key().raw != ca_key.subject_public_key_info().as_slice() {
        return Err(IssueError::Verification(
            "private key does not match the CA certificate".to_string(),
        ));
    }

    summarize(ca_certificate).map_err(|e| IssueError::Verification(e.to_string()))
}

/// Positive 128-bit serial from the request DER and issuance time
fn derive_serial(request_der: &[u8], issued_at: OffsetDateTime) -> SerialNumber {
    let mut hasher = Sha256::new();
    hasher.update(request_der);
    hasher.update(issued_at.unix_timestamp_nanos().to_be_bytes());
    let digest = hasher.finalize();

    let mut serial = [0u8; 16];
    serial.copy_from_slice(&digest[..16]);
    serial[0] = (serial[0] & 0x7f) | 0x40;
    SerialNumber::from_slice(&serial)
}

/// Human-oriented facts about a certificate, for logs and operator commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub subject: String,
    pub issuer: String,
    pub serial: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub fingerprint: String,
    pub is_ca: bool,
}

/// Summarize a DER certificate
pub fn summarize(der: &CertificateDer<'_>) -> Result<CertificateSummary, PemError> {
    let (_, cert) =
        x509_parser::parse_x509_certificate(der.as_ref()).map_err(|e| PemError::InvalidContent {
            kind: "certificate",
            reason: e.to_string(),
        })?;

    let validity = cert.validity();
    let timestamp = |t: i64| DateTime::<Utc>::from_timestamp(t, 0).unwrap_or_default();

    Ok(CertificateSummary {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        serial: cert.raw_serial_as_string(),
        not_before: timestamp(validity.not_before.timestamp()),
        not_after: timestamp(validity.not_after.timestamp()),
        fingerprint: hex::encode(Sha256::digest(der.as_ref())),
        is_ca: cert.is_ca(),
    })
}
