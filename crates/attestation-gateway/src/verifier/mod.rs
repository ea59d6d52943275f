// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Matter Labs

//! Invocation of the external verification capability

mod dcap;
pub mod policy;

pub use dcap::DcapVerifier;
pub use policy::TrustPolicy;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::debug;

/// Verification error
#[derive(Error, Debug)]
pub enum VerifyError {
    /// The `report` is not valid base64, the evidence never reached a verifier
    #[error("report is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
    /// The verifier rejected the evidence
    #[error("{0}")]
    Rejected(String),
    /// The verifier did not answer in time
    #[error("verification timed out after {0:?}")]
    Timeout(Duration),
    /// The verifier could not reach a verdict, e.g. collateral was not available
    #[error("verifier unavailable: {0}")]
    Unavailable(String),
}

impl VerifyError {
    /// Create a new rejection
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    /// Create a new failure without a verdict
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    /// `true` if the evidence was appraised, `false` if no verdict was reached
    pub fn is_verdict(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Rejected(_))
    }
}

/// A verification capability, e.g. Intel DCAP quote verification.
///
/// `Ok` carries a short summary of the appraisal, `Err` the reason for a
/// rejection. Rejections are ordinary results, not system failures. Failures
/// unrelated to the evidence itself must be [`VerifyError::Unavailable`].
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Verify the decoded `evidence` against `policy`
    async fn verify(&self, evidence: &[u8], policy: &TrustPolicy) -> Result<String, VerifyError>;
}

/// Result of a completed verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// whether the evidence passed
    pub verified: bool,
    /// appraisal summary or rejection reason
    pub diagnostic: String,
}

/// Decode the base64 `report` text of an envelope.
///
/// ASCII whitespace (line wrapping) is ignored.
pub fn decode_report(report: &str) -> Result<Vec<u8>, VerifyError> {
    let compact: String = report
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    Ok(STANDARD.decode(compact)?)
}

/// Binds a [`Verifier`] to the configured [`TrustPolicy`] and reduces its
/// answer to a [`Verdict`].
#[derive(Clone)]
pub struct VerifierAdapter {
    verifier: Arc<dyn Verifier>,
    policy: Arc<TrustPolicy>,
    timeout: Option<Duration>,
}

impl VerifierAdapter {
    /// Create a new adapter
    pub fn new(verifier: Arc<dyn Verifier>, policy: TrustPolicy) -> Self {
        Self {
            verifier,
            policy: Arc::new(policy),
            timeout: None,
        }
    }

    /// Give up on verifications taking longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The trust policy evidence is checked against
    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    /// Run the verifier on decoded evidence.
    ///
    /// Timeouts and unavailability are errors, because no verdict was reached.
    pub async fn verify(&self, evidence: &[u8]) -> Result<Verdict, VerifyError> {
        let verification = self.verifier.verify(evidence, &self.policy);
        let result = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, verification)
                .await
                .map_err(|_| VerifyError::Timeout(timeout))?,
            None => verification.await,
        };

        match result {
            Ok(diagnostic) => Ok(Verdict {
                verified: true,
                diagnostic,
            }),
            Err(e) if !e.is_verdict() => Err(e),
            Err(e) => {
                debug!("evidence rejected: {e}");
                Ok(Verdict {
                    verified: false,
                    diagnostic: e.to_string(),
                })
            }
        }
    }
}

impl std::fmt::Debug for VerifierAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifierAdapter")
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
