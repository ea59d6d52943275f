// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Matter Labs

//! Authentication of stored verdicts

use super::{StoreError, VerificationRecord};
use chrono::SecondsFormat;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::str::FromStr;

type HmacSha256 = Hmac<Sha256>;

/// Secret key of the HMAC-SHA256 tag binding a verdict to its record.
///
/// Anyone able to write the store but lacking the key can't forge or flip a
/// verdict without [`StoreError::Integrity`] on the next lookup.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreKey(Vec<u8>);

impl StoreKey {
    /// Minimum key length in bytes
    pub const MIN_LEN: usize = 32;

    /// Create a key from raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, String> {
        let bytes = bytes.into();
        if bytes.len() < Self::MIN_LEN {
            return Err(format!(
                "store key too short: {} bytes, need at least {}",
                bytes.len(),
                Self::MIN_LEN
            ));
        }
        Ok(Self(bytes))
    }

    fn mac(&self, record: &VerificationRecord) -> Result<HmacSha256, StoreError> {
        let mut mac = HmacSha256::new_from_slice(&self.0)
            .map_err(|e| StoreError::Unavailable(format!("invalid store key: {e}")))?;
        mac.update(record.fingerprint.as_bytes());
        mac.update(&[u8::from(record.verified)]);
        mac.update(
            record
                .created_at
                .to_rfc3339_opts(SecondsFormat::Nanos, true)
                .as_bytes(),
        );
        Ok(mac)
    }

    /// Attach an authentication tag to `record`
    pub(super) fn seal(&self, record: VerificationRecord) -> Result<SealedRecord, StoreError> {
        let tag = hex::encode(self.mac(&record)?.finalize().into_bytes());
        Ok(SealedRecord { record, tag })
    }

    /// Check the tag of a stored record and unwrap it
    pub(super) fn open(&self, sealed: SealedRecord) -> Result<VerificationRecord, StoreError> {
        let SealedRecord { record, tag } = sealed;
        let forged = || StoreError::Integrity {
            fingerprint: record.fingerprint,
            reason: "verdict authentication failed".into(),
        };
        let tag = hex::decode(tag).map_err(|_| forged())?;
        self.mac(&record)?
            .verify_slice(&tag)
            .map_err(|_| forged())?;
        Ok(record)
    }
}

impl FromStr for StoreKey {
    type Err = String;

    /// Parse a hex encoded key
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|e| format!("invalid store key: {e}"))?;
        Self::new(bytes)
    }
}

impl std::fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StoreKey(..)")
    }
}

/// On-disk form of a [`VerificationRecord`]
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct SealedRecord {
    pub(super) record: VerificationRecord,
    /// hex encoded HMAC-SHA256 over fingerprint, verdict and creation time
    pub(super) tag: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;

    fn key(byte: u8) -> StoreKey {
        StoreKey::new(vec![byte; StoreKey::MIN_LEN]).unwrap()
    }

    #[test]
    fn parses_hex_keys() {
        let parsed: StoreKey = "07".repeat(32).parse().unwrap();
        assert_eq!(parsed, key(7));
        assert!("07".repeat(16).parse::<StoreKey>().is_err());
        assert!("zz".repeat(32).parse::<StoreKey>().is_err());
        assert_eq!(format!("{parsed:?}"), "StoreKey(..)");
    }

    #[test]
    fn tag_binds_the_verdict() {
        let record = VerificationRecord::new(Fingerprint::of("AQID"), "AQID", false);
        let sealed = key(1).seal(record.clone()).unwrap();
        assert_eq!(key(1).open(sealed).unwrap(), record);

        let mut flipped = key(1).seal(record.clone()).unwrap();
        flipped.record.verified = true;
        assert!(matches!(
            key(1).open(flipped),
            Err(StoreError::Integrity { .. })
        ));

        let mut backdated = key(1).seal(record.clone()).unwrap();
        backdated.record.created_at -= chrono::Duration::days(1);
        assert!(matches!(
            key(1).open(backdated),
            Err(StoreError::Integrity { .. })
        ));

        let other_key = key(1).seal(record).unwrap();
        assert!(matches!(
            key(2).open(other_key),
            Err(StoreError::Integrity { .. })
        ));
    }
}
