// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Matter Labs

//! Directory backed [`EvidenceStore`]

use super::{
    seal::SealedRecord, EvidenceStore, StoreContext as _, StoreError, StoreKey, VerificationRecord,
};
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::io::AsyncWriteExt as _;
use tracing::{debug, trace, warn};

const RECORD_EXTENSION: &str = "json";
const TEMP_PREFIX: &str = ".tmp-";

/// One JSON file per fingerprint, named `<fingerprint>.json`.
///
/// A record is written completely to a temporary file first and then
/// hard-linked to its final name. Linking never replaces an existing file, so
/// the file system enforces the uniqueness of fingerprints, also across
/// processes sharing the directory. Readers never see a partially written
/// record.
///
/// Every record carries an authentication tag made with the [`StoreKey`], so
/// records edited on disk fail the lookup.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    key: StoreKey,
}

impl FileStore {
    /// Open the store in `dir`, creating the directory if needed.
    ///
    /// Temporary files left behind by interrupted inserts are removed.
    pub async fn open(dir: impl Into<PathBuf>, key: StoreKey) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .context(format!("creating store directory {}", dir.display()))?;

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .context(format!("reading store directory {}", dir.display()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .context("reading store directory")?
        {
            if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                debug!(path = %entry.path().display(), "removing stale temporary record");
                if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                    warn!(path = %entry.path().display(), "failed to remove stale temporary record: {e}");
                }
            }
        }

        Ok(Self { dir, key })
    }

    /// The directory holding the records
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{fingerprint}.{RECORD_EXTENSION}"))
    }

    fn temp_path(&self, fingerprint: &Fingerprint) -> Result<PathBuf, StoreError> {
        let mut suffix = [0u8; 8];
        getrandom::fill(&mut suffix)
            .map_err(io::Error::from)
            .context("generating temporary file name")?;
        Ok(self.dir.join(format!(
            "{TEMP_PREFIX}{fingerprint}-{}",
            hex::encode(suffix)
        )))
    }

    async fn write_temp(&self, path: &Path, contents: &[u8]) -> Result<(), StoreError> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .context(format!("creating {}", path.display()))?;
        file.write_all(contents)
            .await
            .context(format!("writing {}", path.display()))?;
        file.sync_all()
            .await
            .context(format!("syncing {}", path.display()))
    }
}

#[async_trait]
impl EvidenceStore for FileStore {
    async fn lookup(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<VerificationRecord>, StoreError> {
        let path = self.record_path(fingerprint);
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context(format!("reading {}", path.display())),
        };

        let sealed: SealedRecord =
            serde_json::from_slice(&contents).map_err(|e| StoreError::Integrity {
                fingerprint: *fingerprint,
                reason: e.to_string(),
            })?;
        sealed.record.check_integrity(fingerprint)?;
        let record = self.key.open(sealed)?;
        trace!(%fingerprint, "found record");
        Ok(Some(record))
    }

    async fn insert(
        &self,
        fingerprint: &Fingerprint,
        report_text: &str,
        verified: bool,
    ) -> Result<(), StoreError> {
        let path = self.record_path(fingerprint);
        // cheap early exit, the link below is the authoritative check
        if tokio::fs::try_exists(&path)
            .await
            .context(format!("checking {}", path.display()))?
        {
            return Err(StoreError::Conflict(*fingerprint));
        }

        let sealed = self
            .key
            .seal(VerificationRecord::new(*fingerprint, report_text, verified))?;
        let contents = serde_json::to_vec_pretty(&sealed)
            .map_err(|e| StoreError::Unavailable(format!("serializing record: {e}")))?;

        let temp = self.temp_path(fingerprint)?;
        let result = match self.write_temp(&temp, &contents).await {
            Ok(()) => match tokio::fs::hard_link(&temp, &path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    Err(StoreError::Conflict(*fingerprint))
                }
                Err(e) => Err(e).context(format!("storing {}", path.display())),
            },
            Err(e) => Err(e),
        };
        if let Err(e) = tokio::fs::remove_file(&temp).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %temp.display(), "failed to remove temporary record: {e}");
            }
        }

        if result.is_ok() {
            sync_dir(&self.dir).await;
            debug!(%fingerprint, verified, "stored record");
        }
        result
    }
}

/// Flush the directory entry of a new record. Not every platform supports this.
async fn sync_dir(dir: &Path) {
    let result = match tokio::fs::File::open(dir).await {
        Ok(dir) => dir.sync_all().await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        trace!(dir = %dir.display(), "failed to sync store directory: {e}");
    }
}
