// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Matter Labs

//! Persistence of verification verdicts, keyed by [`Fingerprint`]

mod file;
mod memory;
mod seal;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use seal::StoreKey;

use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// The verdict for one distinct piece of evidence.
///
/// Created once, on the first verification of its fingerprint, and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    /// unique key
    pub fingerprint: Fingerprint,
    /// the `report` text as submitted
    pub report_text: String,
    /// verdict of the verifier
    pub verified: bool,
    /// time of the first verification
    pub created_at: DateTime<Utc>,
}

impl VerificationRecord {
    /// A fresh record, stamped with the current time
    pub fn new(fingerprint: Fingerprint, report_text: impl Into<String>, verified: bool) -> Self {
        Self {
            fingerprint,
            report_text: report_text.into(),
            verified,
            created_at: Utc::now(),
        }
    }

    /// Check that the record belongs to `fingerprint` and its report still hashes to it
    pub fn check_integrity(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        if self.fingerprint != *fingerprint {
            return Err(StoreError::Integrity {
                fingerprint: *fingerprint,
                reason: format!("record claims fingerprint {}", self.fingerprint),
            });
        }
        if Fingerprint::of(&self.report_text) != *fingerprint {
            return Err(StoreError::Integrity {
                fingerprint: *fingerprint,
                reason: "stored report does not match its fingerprint".into(),
            });
        }
        Ok(())
    }
}

/// Store error
#[derive(Error, Debug)]
pub enum StoreError {
    /// A record for the fingerprint exists already
    #[error("verification record for {0} already exists")]
    Conflict(Fingerprint),
    /// The backing storage failed
    #[error("{context}")]
    Io {
        /// what was attempted
        context: String,
        /// underlying error
        source: io::Error,
    },
    /// A stored record is corrupt or was tampered with
    #[error("corrupt verification record {fingerprint}: {reason}")]
    Integrity {
        /// key of the corrupt record
        fingerprint: Fingerprint,
        /// what is wrong with it
        reason: String,
    },
    /// The store can't serve requests
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Usability trait for easy StoreError annotation
pub trait StoreContext {
    /// The Ok Type
    type Ok;
    /// The Context
    fn context<I: Into<String>>(self, msg: I) -> Result<Self::Ok, StoreError>;
}

impl<T> StoreContext for Result<T, io::Error> {
    type Ok = T;
    fn context<I: Into<String>>(self, msg: I) -> Result<T, StoreError> {
        self.map_err(|e| StoreError::Io {
            context: msg.into(),
            source: e,
        })
    }
}

/// Durable mapping from [`Fingerprint`] to [`VerificationRecord`].
///
/// Implementations must enforce fingerprint uniqueness themselves: of any
/// number of concurrent `insert` calls for the same fingerprint, exactly one
/// succeeds and all others fail with [`StoreError::Conflict`]. A record is
/// either fully written or absent.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Fetch the record for `fingerprint`, if any
    async fn lookup(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<VerificationRecord>, StoreError>;

    /// Persist the verdict for a not yet seen fingerprint
    async fn insert(
        &self,
        fingerprint: &Fingerprint,
        report_text: &str,
        verified: bool,
    ) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_check() {
        let fingerprint = Fingerprint::of("AQID");
        let mut record = VerificationRecord::new(fingerprint, "AQID", true);
        record.check_integrity(&fingerprint).unwrap();

        assert!(matches!(
            record.check_integrity(&Fingerprint::of("other")),
            Err(StoreError::Integrity { .. })
        ));

        record.report_text = "AQIE".into();
        assert!(matches!(
            record.check_integrity(&fingerprint),
            Err(StoreError::Integrity { .. })
        ));
    }

    #[test]
    fn record_layout() {
        let fingerprint = Fingerprint::of("AQID");
        let record = VerificationRecord::new(fingerprint, "AQID", false);
        let value = serde_json::to_value(&record).unwrap();
        let object = value.as_object().unwrap();
        let mut keys: Vec<_> = object.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, ["created_at", "fingerprint", "report_text", "verified"]);
        assert_eq!(object["fingerprint"], fingerprint.to_string());
    }
}
