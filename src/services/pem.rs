//! PEM codec for certificate requests, certificates and private keys
//!
//! Every decoder expects exactly one PEM block of its own type. Empty input,
//! undecodable armor, a block of another type or several blocks are all
//! rejected, so callers never silently sign with the wrong material.
//!
//! Private keys may be PKCS#8, PKCS#1 RSA or SEC1 P-256. The latter two are
//! re-encoded as PKCS#8 before being handed to the signer.

use pkcs8::EncodePrivateKey;
use rcgen::{CertificateSigningRequestParams, KeyPair};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rustls_pemfile::Item;
use rustls_pki_types::{CertificateDer, CertificateSigningRequestDer};

use crate::utils::error::{IssueError, PemError};

const CERTIFICATE_LABEL: &str = "CERTIFICATE";
const CERTIFICATE_REQUEST_LABEL: &str = "CERTIFICATE REQUEST";
const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";

/// A parsed PKCS#10 request, keeping the original DER alongside
pub struct DecodedRequest {
    pub der: CertificateSigningRequestDer<'static>,
    pub params: CertificateSigningRequestParams,
}

/// Decode a single `CERTIFICATE REQUEST` block
pub fn decode_certificate_request(bytes: &[u8]) -> Result<DecodedRequest, PemError> {
    let der = match read_single_item(bytes, CERTIFICATE_REQUEST_LABEL)? {
        Item::Csr(der) => der,
        other => return Err(unexpected(CERTIFICATE_REQUEST_LABEL, &other)),
    };

    let params =
        CertificateSigningRequestParams::from_der(&der).map_err(|e| PemError::InvalidContent {
            kind: "certificate request",
            reason: e.to_string(),
        })?;

    Ok(DecodedRequest { der, params })
}

/// Decode a single `CERTIFICATE` block and check it parses as X.509
pub fn decode_certificate(bytes: &[u8]) -> Result<CertificateDer<'static>, PemError> {
    let der = match read_single_item(bytes, CERTIFICATE_LABEL)? {
        Item::X509Certificate(der) => der,
        other => return Err(unexpected(CERTIFICATE_LABEL, &other)),
    };

    x509_parser::parse_x509_certificate(der.as_ref()).map_err(|e| PemError::InvalidContent {
        kind: "certificate",
        reason: e.to_string(),
    })?;

    Ok(der)
}

/// Decode a single private key block into a signing key
///
/// Accepts `PRIVATE KEY` (PKCS#8), `RSA PRIVATE KEY` (PKCS#1) and
/// `EC PRIVATE KEY` (SEC1, P-256 only).
pub fn decode_private_key(bytes: &[u8]) -> Result<KeyPair, PemError> {
    match read_single_item(bytes, PRIVATE_KEY_LABEL)? {
        Item::Pkcs8Key(der) => key_pair_from_pkcs8(der.secret_pkcs8_der()),
        Item::Pkcs1Key(der) => {
            let pkcs8 = rsa::RsaPrivateKey::from_pkcs1_der(der.secret_pkcs1_der())
                .map_err(invalid_key)?
                .to_pkcs8_der()
                .map_err(invalid_key)?;
            key_pair_from_pkcs8(pkcs8.as_bytes())
        }
        Item::Sec1Key(der) => {
            let pkcs8 = p256::SecretKey::from_sec1_der(der.secret_sec1_der())
                .map_err(|e| invalid_key(format!("unsupported EC key: {}", e)))?
                .to_pkcs8_der()
                .map_err(invalid_key)?;
            key_pair_from_pkcs8(pkcs8.as_bytes())
        }
        other => Err(unexpected(PRIVATE_KEY_LABEL, &other)),
    }
}

fn key_pair_from_pkcs8(der: &[u8]) -> Result<KeyPair, PemError> {
    KeyPair::try_from(der).map_err(invalid_key)
}

fn invalid_key(e: impl std::fmt::Display) -> PemError {
    PemError::InvalidContent {
        kind: "private key",
        reason: e.to_string(),
    }
}

/// Encode certificates as concatenated `CERTIFICATE` blocks, in order
pub fn encode_certificates(certs: &[CertificateDer<'_>]) -> Result<Vec<u8>, IssueError> {
    if certs.is_empty() {
        return Err(IssueError::Encoding("no certificates to encode".to_string()));
    }

    let config = ::pem::EncodeConfig::new().set_line_ending(::pem::LineEnding::LF);
    let mut out = String::new();
    for cert in certs {
        if cert.as_ref().is_empty() {
            return Err(IssueError::Encoding("empty certificate".to_string()));
        }
        let block = ::pem::Pem::new(CERTIFICATE_LABEL, cert.as_ref().to_vec());
        out.push_str(&::pem::encode_config(&block, config));
    }

    Ok(out.into_bytes())
}

fn read_single_item(bytes: &[u8], expected: &'static str) -> Result<Item, PemError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(PemError::Empty);
    }

    let mut reader = bytes;
    let mut items = rustls_pemfile::read_all(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| PemError::Malformed(e.to_string()))?;

    match items.len() {
        0 => Err(PemError::Malformed(format!("no {} block found", expected))),
        1 => Ok(items.remove(0)),
        count => Err(PemError::MultipleBlocks { expected, count }),
    }
}

fn unexpected(expected: &'static str, item: &Item) -> PemError {
    PemError::UnexpectedType {
        expected,
        found: item_label(item),
    }
}

fn item_label(item: &Item) -> &'static str {
    match item {
        Item::X509Certificate(_) => CERTIFICATE_LABEL,
        Item::Csr(_) => CERTIFICATE_REQUEST_LABEL,
        Item::Pkcs8Key(_) => PRIVATE_KEY_LABEL,
        Item::Pkcs1Key(_) => "RSA PRIVATE KEY",
        Item::Sec1Key(_) => "EC PRIVATE KEY",
        Item::Crl(_) => "X509 CRL",
        _ => "unsupported block",
    }
}
