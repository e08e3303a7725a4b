//! Certificate signing request reconciliation
//!
//! [`SignerController::reconcile`] drives one request toward a terminal
//! outcome: approved and signed, or a recorded failure condition. Every pass
//! fetches current state and writes at most once (plus one health update), so
//! redelivery of the same identifier is harmless.
//!
//! Approval and signing never happen in the same pass. Approving writes the
//! request, that write produces a new event, and signing happens on the
//! reconciliation triggered by it.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::models::{ConditionType, RequestCondition, SigningRequest, StatusComponent};
use crate::services::approval::{self, ApprovalDecision};
use crate::services::ca_loader::CaLoader;
use crate::services::issuance::{self, DEFAULT_CERTIFICATE_VALIDITY};
use crate::services::pem;
use crate::services::status::HealthReporter;
use crate::services::store::RequestStore;
use crate::utils::error::ReconcileError;

/// Reasons recorded on `Failed` conditions and on aggregate health
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// CA secret could not be read
    CaFailure,
    /// Request PEM is malformed (client fault)
    CsrDecodeFailure,
    CorruptCaCert,
    CorruptCaKey,
    SigningFailure,
    EncodeFailure,
    /// Writing a failure condition itself failed
    UpdateFailure,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::CaFailure => "CAFailure",
            FailureReason::CsrDecodeFailure => "CSRDecodeFailure",
            FailureReason::CorruptCaCert => "CorruptCACert",
            FailureReason::CorruptCaKey => "CorruptCAKey",
            FailureReason::SigningFailure => "SigningFailure",
            FailureReason::EncodeFailure => "EncodeFailure",
            FailureReason::UpdateFailure => "UpdateFailure",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconciler for signing requests addressed to one signer
pub struct SignerController {
    signer_name: String,
    requests: Arc<dyn RequestStore>,
    ca: CaLoader,
    health: Arc<dyn HealthReporter>,
    validity: Duration,
}

impl SignerController {
    pub fn new(
        signer_name: impl Into<String>,
        requests: Arc<dyn RequestStore>,
        ca: CaLoader,
        health: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            signer_name: signer_name.into(),
            requests,
            ca,
            health,
            validity: DEFAULT_CERTIFICATE_VALIDITY,
        }
    }

    /// Override the lifetime of issued certificates
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    pub fn signer_name(&self) -> &str {
        &self.signer_name
    }

    /// Reconcile the request called `name`
    ///
    /// Returns an error only for transient failures that should be retried:
    /// fetch, approval write, CA read and certificate persistence. Problems
    /// with the request or the CA contents are recorded on the request and
    /// reported as success so they are not retried.
    pub async fn reconcile(&self, name: &str) -> Result<(), ReconcileError> {
        let mut request = match self.requests.get(name).await {
            Ok(request) => request,
            Err(e) if e.is_not_found() => {
                debug!("Certificate signing request {} no longer exists", name);
                return Ok(());
            }
            Err(e) => {
                error!("Unable to fetch certificate signing request {}: {}", name, e);
                return Err(ReconcileError::Fetch(e));
            }
        };

        // Requests for other signers are none of our business, and logging
        // them would flood the logs.
        if request.spec.signer_name != self.signer_name {
            return Ok(());
        }

        // Issuance is one-shot; there is no re-certification of issued requests.
        if request.is_issued() {
            debug!("Certificate signing request {} already has a certificate", name);
            return Ok(());
        }

        match approval::decide(&request.status.conditions) {
            ApprovalDecision::Undecided => {
                approval::approve(self.requests.as_ref(), request, &self.signer_name)
                    .await
                    .map_err(|e| {
                        warn!(
                            "Unable to approve certificate for {} and signer {}: {}",
                            name, self.signer_name, e
                        );
                        ReconcileError::Approval(e)
                    })?;
                info!("Approved certificate signing request {}", name);
                return Ok(());
            }
            ApprovalDecision::Denied => {
                debug!("Certificate signing request {} was denied, not signing", name);
                return Ok(());
            }
            ApprovalDecision::Approved => {}
        }

        let material = match self.ca.load().await {
            Ok(material) => material,
            Err(e) => {
                let message = format!("Could not get CA certificate and key: {}", e);
                self.signer_failure(&mut request, FailureReason::CaFailure, message)
                    .await;
                return Err(ReconcileError::CaUnavailable(e));
            }
        };

        let decoded = match pem::decode_certificate_request(&request.spec.request) {
            Ok(decoded) => decoded,
            Err(e) => {
                // A malformed request is the requester's fault, so aggregate
                // health stays untouched.
                let message = format!("Could not decode Certificate Request: {}", e);
                warn!("{}: {}", FailureReason::CsrDecodeFailure, message);
                self.record_failure(&mut request, FailureReason::CsrDecodeFailure, message)
                    .await;
                return Ok(());
            }
        };

        let ca_certificate = match pem::decode_certificate(&material.certificate) {
            Ok(cert) => cert,
            Err(e) => {
                let message = format!(
                    "Unable to decode CA certificate for {}: {}",
                    self.signer_name, e
                );
                self.signer_failure(&mut request, FailureReason::CorruptCaCert, message)
                    .await;
                return Ok(());
            }
        };

        let ca_key = match pem::decode_private_key(&material.key) {
            Ok(key) => key,
            Err(e) => {
                let message = format!(
                    "Unable to decode CA private key for {}: {}",
                    self.signer_name, e
                );
                self.signer_failure(&mut request, FailureReason::CorruptCaKey, message)
                    .await;
                return Ok(());
            }
        };

        let signed = issuance::build_template(&decoded, OffsetDateTime::now_utc(), self.validity)
            .and_then(|template| {
                issuance::sign(&template, &decoded.params.public_key, &ca_certificate, ca_key)
            });
        let signed = match signed {
            Ok(signed) => signed,
            Err(e) => {
                let message = format!(
                    "Unable to sign certificate for {} and signer {}: {}",
                    name, self.signer_name, e
                );
                self.signer_failure(&mut request, FailureReason::SigningFailure, message)
                    .await;
                return Ok(());
            }
        };

        request.status.certificate = match pem::encode_certificates(std::slice::from_ref(&signed))
        {
            Ok(encoded) => encoded,
            Err(e) => {
                let message = format!("Could not encode certificate: {}", e);
                self.signer_failure(&mut request, FailureReason::EncodeFailure, message)
                    .await;
                return Ok(());
            }
        };

        if let Err(e) = self.requests.update_status(&request).await {
            error!(
                "Unable to update signed certificate for {} and signer {}: {}",
                name, self.signer_name, e
            );
            return Err(ReconcileError::Persist(e));
        }

        match issuance::summarize(&signed) {
            Ok(summary) => info!(
                serial = %summary.serial,
                fingerprint = %summary.fingerprint,
                not_after = %summary.not_after,
                "Certificate signed, issued and approved for {} by {}",
                name,
                self.signer_name
            ),
            Err(_) => info!(
                "Certificate signed, issued and approved for {} by {}",
                name, self.signer_name
            ),
        }
        self.health.set_not_degraded(StatusComponent::CertificateSigner);
        Ok(())
    }

    /// Systemic fault: record it on the request and degrade aggregate health
    async fn signer_failure(
        &self,
        request: &mut SigningRequest,
        reason: FailureReason,
        message: String,
    ) {
        error!("{}: {}", reason, message);
        self.record_failure(request, reason, message.clone()).await;
        self.health
            .set_degraded(StatusComponent::CertificateSigner, reason.as_str(), &message);
    }

    /// Append a `Failed` condition and write it. A failed write escalates to
    /// an `UpdateFailure` degradation instead of being dropped.
    async fn record_failure(
        &self,
        request: &mut SigningRequest,
        reason: FailureReason,
        message: String,
    ) {
        let already_recorded = request.status.conditions.iter().any(|c| {
            c.type_ == ConditionType::Failed && c.reason == reason.as_str() && c.message == message
        });
        if already_recorded {
            debug!(
                "Failure {} already recorded on {}, not writing it again",
                reason,
                request.name()
            );
            return;
        }

        request.status.conditions.push(RequestCondition::new(
            ConditionType::Failed,
            reason.as_str(),
            message,
        ));

        if let Err(e) = self.requests.update_status(request).await {
            error!("Could not update CSR status for {}: {}", request.name(), e);
            self.health.set_degraded(
                StatusComponent::CertificateSigner,
                FailureReason::UpdateFailure.as_str(),
                &format!("Unable to update csr: {}", e),
            );
        }
    }
}

impl std::fmt::Debug for SignerController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerController")
            .field("signer_name", &self.signer_name)
            .field("ca", &self.ca)
            .field("validity", &self.validity)
            .finish()
    }
}
