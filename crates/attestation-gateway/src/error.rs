// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Matter Labs

//! Errors of the evidence verification pipeline

use crate::{envelope::EnvelopeError, store::StoreError, verifier::VerifyError};
use std::time::Duration;
use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a submission could not be processed.
///
/// A failed verification is not an error, see
/// [`VerificationOutcome`](crate::VerificationOutcome).
#[derive(Error, Debug)]
pub enum Error {
    /// The evidence is not parseable
    #[error("{0}")]
    Parse(String),

    /// Required envelope fields are missing or invalid
    #[error("missing or invalid field(s): {}", .fields.join(", "))]
    Validation {
        /// dotted paths of the offending fields
        fields: Vec<String>,
    },

    /// The verification store failed
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// The verifier did not reach a verdict in time
    #[error("verification timed out after {0:?}")]
    Timeout(Duration),

    /// The verifier could not reach a verdict, e.g. collateral was unavailable
    #[error("verifier failed: {0}")]
    Verifier(String),
}

impl From<VerifyError> for Error {
    fn from(value: VerifyError) -> Self {
        match value {
            VerifyError::Timeout(timeout) => Self::Timeout(timeout),
            e => Self::Verifier(e.to_string()),
        }
    }
}

impl From<EnvelopeError> for Error {
    fn from(value: EnvelopeError) -> Self {
        match value {
            EnvelopeError::Parse(reason) => Self::Parse(format!("unparseable evidence: {reason}")),
            EnvelopeError::Validation { fields } => Self::Validation { fields },
        }
    }
}

impl Error {
    /// The submission itself is at fault, resubmitting it unchanged won't help
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::Validation { .. })
    }

    /// A server side fault, the submission may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Timeout(_) | Self::Verifier(_)
        )
    }
}
