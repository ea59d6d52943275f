// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2023-2025 Matter Labs

// Parts of it are Copyright (c) 2024 Phala Network
// and copied from https://github.com/Phala-Network/dcap-qvl

//! Intel DCAP quote verification

use super::{
    policy::{Measurement, TrustPolicy},
    Verifier, VerifyError,
};
use crate::tcblevel::TcbLevel;
use async_trait::async_trait;
use dcap_qvl::{quote::Report, verify::VerifiedReport};
use std::{
    str::FromStr,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tracing::{debug, trace};

/// Verifies SGX and TDX quotes with collateral fetched from the Intel
/// Provisioning Certification Service, then applies the [`TrustPolicy`].
#[derive(Debug, Clone)]
pub struct DcapVerifier {
    collateral_timeout: Duration,
}

impl DcapVerifier {
    /// Create a new verifier, giving up on collateral downloads after `collateral_timeout`
    pub fn new(collateral_timeout: Duration) -> Self {
        Self { collateral_timeout }
    }
}

impl Default for DcapVerifier {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl Verifier for DcapVerifier {
    async fn verify(&self, quote: &[u8], policy: &TrustPolicy) -> Result<String, VerifyError> {
        debug!("Verifying quote ({} bytes)...", quote.len());

        let collateral =
            dcap_qvl::collateral::get_collateral_from_pcs(quote, self.collateral_timeout)
                .await
                .map_err(|e| VerifyError::unavailable(format!("Failed to get collateral: {e}")))?;

        let unix_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| VerifyError::unavailable(format!("Failed to get system time: {e}")))?
            .as_secs();

        let VerifiedReport {
            status,
            advisory_ids,
            report,
        } = dcap_qvl::verify::verify(quote, &collateral, unix_time)
            .map_err(|e| VerifyError::rejected(format!("Quote verification failed: {e:?}")))?;

        let tcblevel = TcbLevel::from_str(&status).map_err(VerifyError::rejected)?;
        trace!(%tcblevel, ?advisory_ids, "quote verified");

        let measurement = match &report {
            Report::SgxEnclave(body) => Measurement::Sgx {
                mr_signer: body.mr_signer.as_slice(),
                mr_enclave: body.mr_enclave.as_slice(),
            },
            Report::TD10(body) => Measurement::Tdx([
                body.mr_td.as_slice(),
                body.rt_mr0.as_slice(),
                body.rt_mr1.as_slice(),
                body.rt_mr2.as_slice(),
                body.rt_mr3.as_slice(),
            ]),
            Report::TD15(body) => Measurement::Tdx([
                body.base.mr_td.as_slice(),
                body.base.rt_mr0.as_slice(),
                body.base.rt_mr1.as_slice(),
                body.base.rt_mr2.as_slice(),
                body.base.rt_mr3.as_slice(),
            ]),
            #[allow(unreachable_patterns)]
            _ => return Err(VerifyError::rejected("Unknown quote report format")),
        };
        policy.enforce(tcblevel, &advisory_ids, measurement)?;

        Ok(format!("Quote verification result: {tcblevel}"))
    }
}
