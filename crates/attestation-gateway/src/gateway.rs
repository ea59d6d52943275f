// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Matter Labs

//! The evidence verification pipeline

use crate::{
    envelope::{self, EvidenceEnvelope},
    error::Result,
    fingerprint::Fingerprint,
    store::{EvidenceStore, StoreError, VerificationRecord},
    verifier::{decode_report, VerifierAdapter},
};
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument, warn, Span};

/// Envelope fields echoed back to the submitter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDetails {
    #[allow(missing_docs)]
    pub source: String,
    #[allow(missing_docs)]
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub product: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub runtime: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub event_log: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub quote: Option<Value>,
}

impl From<EvidenceEnvelope> for ReportDetails {
    fn from(envelope: EvidenceEnvelope) -> Self {
        let EvidenceEnvelope {
            source,
            protocol,
            attestation,
        } = envelope;
        Self {
            source,
            protocol,
            product: attestation.product,
            data: attestation.data,
            runtime: attestation.runtime,
            event_log: attestation.event_log,
            quote: attestation.quote,
        }
    }
}

/// Answer to a processed submission
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    /// verdict, taken from the store if the evidence was seen before
    pub verified: bool,
    /// the evidence was verified by an earlier submission
    pub already_verified: bool,
    /// the verdict is persisted; `false` only if the evidence could not be decoded
    pub cached: bool,
    /// deduplication key of the evidence
    pub fingerprint: Fingerprint,
    /// verifier summary, rejection or decoding failure of this submission
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    /// echoed envelope fields
    pub report_details: ReportDetails,
}

impl VerificationOutcome {
    fn from_record(record: &VerificationRecord, envelope: EvidenceEnvelope) -> Self {
        Self {
            verified: record.verified,
            already_verified: true,
            cached: true,
            fingerprint: record.fingerprint,
            diagnostic: None,
            report_details: envelope.into(),
        }
    }
}

/// Verifies evidence at most once per [`Fingerprint`].
///
/// The [`EvidenceStore`] is the authority on which evidence was seen: of
/// racing first submissions only one store insert wins, the others pick up
/// its verdict. In addition, submissions of the same fingerprint within this
/// process wait for each other, so the verifier is not invoked twice for
/// evidence that is being verified right now.
pub struct Gateway {
    store: Arc<dyn EvidenceStore>,
    verifier: VerifierAdapter,
    inflight: Inflight,
}

impl Gateway {
    /// Create a new gateway
    pub fn new(store: Arc<dyn EvidenceStore>, verifier: VerifierAdapter) -> Self {
        Self {
            store,
            verifier,
            inflight: Inflight::default(),
        }
    }

    /// Normalize, deduplicate and, if not seen before, verify the submitted evidence.
    #[instrument(
        name = "verify_evidence",
        skip_all,
        fields(
            fingerprint = tracing::field::Empty,
            source = tracing::field::Empty,
            protocol = tracing::field::Empty
        )
    )]
    pub async fn verify_evidence(&self, raw: &[u8]) -> Result<VerificationOutcome> {
        let envelope = envelope::normalize(raw)?;
        let fingerprint = Fingerprint::of(&envelope.attestation.report);

        let span = Span::current();
        span.record("fingerprint", tracing::field::display(&fingerprint));
        span.record("source", envelope.source.as_str());
        span.record("protocol", envelope.protocol.as_str());

        let _claim = self.inflight.claim(fingerprint).await;

        if let Some(record) = self.store.lookup(&fingerprint).await? {
            debug!(verified = record.verified, "evidence seen before");
            return Ok(VerificationOutcome::from_record(&record, envelope));
        }

        let evidence = match decode_report(&envelope.attestation.report) {
            Ok(evidence) => evidence,
            Err(e) => {
                warn!("not verifying evidence: {e}");
                return Ok(VerificationOutcome {
                    verified: false,
                    already_verified: false,
                    cached: false,
                    fingerprint,
                    diagnostic: Some(e.to_string()),
                    report_details: envelope.into(),
                });
            }
        };

        let verdict = self.verifier.verify(&evidence).await?;

        match self
            .store
            .insert(&fingerprint, &envelope.attestation.report, verdict.verified)
            .await
        {
            Ok(()) => {
                info!(verified = verdict.verified, "evidence verified");
                Ok(VerificationOutcome {
                    verified: verdict.verified,
                    already_verified: false,
                    cached: true,
                    fingerprint,
                    diagnostic: Some(verdict.diagnostic),
                    report_details: envelope.into(),
                })
            }
            Err(StoreError::Conflict(_)) => {
                debug!("lost the race for the first verdict");
                let record = self.store.lookup(&fingerprint).await?.ok_or_else(|| {
                    StoreError::Unavailable(format!(
                        "conflicting record for {fingerprint} disappeared"
                    ))
                })?;
                Ok(VerificationOutcome::from_record(&record, envelope))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch the stored verdict for `fingerprint`
    pub async fn record(&self, fingerprint: &Fingerprint) -> Result<Option<VerificationRecord>> {
        Ok(self.store.lookup(fingerprint).await?)
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

type Slot = Arc<tokio::sync::Mutex<()>>;

/// Fingerprints currently being processed in this process
#[derive(Default)]
struct Inflight {
    slots: Mutex<HashMap<Fingerprint, Slot>>,
}

impl Inflight {
    /// Wait until no other submission of `fingerprint` is being processed.
    ///
    /// The [`Claim`] exists while waiting, so an abandoned wait cleans up too.
    async fn claim(&self, fingerprint: Fingerprint) -> Claim<'_> {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(fingerprint)
            .or_default()
            .clone();
        let mut claim = Claim {
            inflight: self,
            fingerprint,
            slot,
            guard: None,
        };
        // dropped before `claim` if the wait is abandoned
        let locking = claim.slot.clone().lock_owned();
        claim.guard = Some(locking.await);
        claim
    }
}

/// Exclusive right to process a fingerprint, released on drop. Without a
/// guard it is a pending wait for that right.
struct Claim<'a> {
    inflight: &'a Inflight,
    fingerprint: Fingerprint,
    slot: Slot,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut slots = self
            .inflight
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // new claims take their slot from the map under this lock:
        // map + `self.slot` means nobody else holds or waits for it
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.fingerprint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        store::MemoryStore,
        verifier::{TrustPolicy, Verifier, VerifyError},
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Verifier for Counting {
        async fn verify(&self, _: &[u8], _: &TrustPolicy) -> std::result::Result<String, VerifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("ok".into())
        }
    }

    fn gateway() -> (Gateway, Arc<Counting>) {
        let verifier = Arc::new(Counting::default());
        let gateway = Gateway::new(
            Arc::new(MemoryStore::new()),
            VerifierAdapter::new(verifier.clone(), TrustPolicy::default()),
        );
        (gateway, verifier)
    }

    #[tokio::test]
    #[traced_test]
    async fn echoes_optional_fields() {
        let (gateway, _) = gateway();
        let outcome = gateway
            .verify_evidence(
                br#"{"source":"vm1","protocol":"snp",attestation:{"report":"AQID","product":"Milan","runtime":{"k":1}}}"#,
            )
            .await
            .unwrap();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["verified"], true);
        assert_eq!(json["alreadyVerified"], false);
        assert_eq!(json["reportDetails"]["source"], "vm1");
        assert_eq!(json["reportDetails"]["protocol"], "snp");
        assert_eq!(json["reportDetails"]["product"], "Milan");
        assert_eq!(json["reportDetails"]["runtime"]["k"], 1);
        assert!(json["reportDetails"].get("report").is_none());
        assert!(json["reportDetails"].get("eventLog").is_none());
        assert!(logs_contain("evidence verified"));
    }

    #[tokio::test]
    async fn claims_are_released() {
        let (gateway, _) = gateway();
        let fingerprint = Fingerprint::of("AQID");
        {
            let _claim = gateway.inflight.claim(fingerprint).await;
            assert_eq!(gateway.inflight.slots.lock().unwrap().len(), 1);
        }
        assert!(gateway.inflight.slots.lock().unwrap().is_empty());

        gateway
            .verify_evidence(br#"{"source":"a","protocol":"b","attestation":{"report":"AQID"}}"#)
            .await
            .unwrap();
        assert!(gateway.inflight.slots.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn abandoned_submission_releases_claim() {
        let (gateway, _) = gateway();
        let fingerprint = Fingerprint::of("AQID");
        let first = gateway.inflight.claim(fingerprint).await;

        // a second submission waits behind the first one and is then dropped
        let waiting = gateway.verify_evidence(
            br#"{"source":"a","protocol":"b","attestation":{"report":"AQID"}}"#,
        );
        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(10), waiting).await;
        assert!(timed_out.is_err());

        drop(first);
        assert!(gateway.inflight.slots.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn waiter_abandoned_after_release_cleans_up() {
        let (gateway, _) = gateway();
        let fingerprint = Fingerprint::of("AQID");
        let first = gateway.inflight.claim(fingerprint).await;

        let mut waiting = Box::pin(gateway.inflight.claim(fingerprint));
        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(10), &mut waiting).await;
        assert!(timed_out.is_err());

        // the lock is handed to the waiter, which is never polled again
        drop(first);
        assert_eq!(gateway.inflight.slots.lock().unwrap().len(), 1);
        drop(waiting);
        assert!(gateway.inflight.slots.lock().unwrap().is_empty());
    }
}
