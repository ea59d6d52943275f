// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Matter Labs

//! In-memory [`EvidenceStore`]

use super::{EvidenceStore, StoreError, VerificationRecord};
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use std::{
    collections::{hash_map::Entry, HashMap},
    sync::RwLock,
};

/// Records live only as long as the process. Used for tests and ephemeral
/// deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Fingerprint, VerificationRecord>>,
}

impl MemoryStore {
    /// An empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or_default()
    }

    /// `true` if nothing was stored yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("lock poisoned".into())
}

#[async_trait]
impl EvidenceStore for MemoryStore {
    async fn lookup(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<VerificationRecord>, StoreError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(fingerprint).cloned())
    }

    async fn insert(
        &self,
        fingerprint: &Fingerprint,
        report_text: &str,
        verified: bool,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(poisoned)?;
        match records.entry(*fingerprint) {
            Entry::Occupied(_) => Err(StoreError::Conflict(*fingerprint)),
            Entry::Vacant(entry) => {
                entry.insert(VerificationRecord::new(*fingerprint, report_text, verified));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unique_fingerprints() {
        let store = MemoryStore::new();
        let fingerprint = Fingerprint::of("AQID");
        assert!(store.is_empty());

        store.insert(&fingerprint, "AQID", true).await.unwrap();
        assert!(matches!(
            store.insert(&fingerprint, "AQID", false).await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.len(), 1);
        assert!(store.lookup(&fingerprint).await.unwrap().unwrap().verified);
        assert_eq!(store.lookup(&Fingerprint::of("x")).await.unwrap(), None);
    }
}
