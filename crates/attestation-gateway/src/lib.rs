// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Matter Labs

//! Intake, deduplication and verification of hardware attestation evidence.
//!
//! Submitted evidence flows through [`envelope::normalize`], is keyed by its
//! [`fingerprint::Fingerprint`] and verified at most once by the
//! [`gateway::Gateway`], which records every verdict in an
//! [`store::EvidenceStore`].

#![deny(missing_docs)]
#![deny(clippy::all)]

pub mod envelope;
pub mod error;
pub mod fingerprint;
pub mod gateway;
pub mod log;
pub mod server;
pub mod store;
pub mod tcblevel;
pub mod verifier;

pub use error::{Error, Result};
pub use gateway::{Gateway, VerificationOutcome};
