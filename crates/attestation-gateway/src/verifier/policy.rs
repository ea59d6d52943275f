// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2023-2025 Matter Labs

//! Trust policy evidence must satisfy

use crate::{
    tcblevel::{EnumSet, TcbLevel},
    verifier::VerifyError,
};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use thiserror::Error;

/// Size of an SGX measurement (mrsigner, mrenclave)
pub const SGX_HASH_SIZE: usize = 32;
/// Size of a TDX measurement register
pub const TDX_HASH_SIZE: usize = 48;

/// Policy loading error
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("failed to read trust policy file: {0}")]
    #[allow(missing_docs)]
    Io(#[from] std::io::Error),
    #[error("failed to parse trust policy file: {0}")]
    #[allow(missing_docs)]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid measurement in trust policy: {0}")]
    #[allow(missing_docs)]
    Hex(#[from] hex::FromHexError),
}

/// Set of criteria that must be met by SGX evidence.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct SgxPolicyConfig {
    /// List of allowed hex-encoded SGX mrsigners. If absent, the mrsigner check is skipped.
    #[serde(default)]
    pub mrsigners: Option<Vec<String>>,

    /// List of allowed hex-encoded SGX mrenclaves. If absent, the mrenclave check is skipped.
    #[serde(default)]
    pub mrenclaves: Option<Vec<String>>,

    /// List of allowed SGX TCB levels. Allowed values: Ok, ConfigNeeded,
    /// ConfigAndSwHardeningNeeded, SwHardeningNeeded, OutOfDate, OutOfDateConfigNeeded.
    #[serde(default = "default_tcb_levels")]
    pub allowed_tcb_levels: EnumSet<TcbLevel>,

    /// List of allowed SGX advisories. If absent, the advisories check is skipped.
    #[serde(default)]
    pub allowed_advisory_ids: Option<Vec<String>>,
}

/// Set of criteria that must be met by TDX evidence.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct TdxPolicyConfig {
    /// List of allowed hex-encoded TDX measurement registers `[mrtd, rtmr0, rtmr1, rtmr2, rtmr3]`.
    /// If absent, the measurement check is skipped.
    #[serde(default)]
    pub mrs: Option<Vec<[String; 5]>>,

    /// List of allowed TDX TCB levels.
    #[serde(default = "default_tcb_levels")]
    pub allowed_tcb_levels: EnumSet<TcbLevel>,

    /// List of allowed TDX advisories. If absent, the advisories check is skipped.
    #[serde(default)]
    pub allowed_advisory_ids: Option<Vec<String>>,
}

/// On-disk (YAML) form of the [`TrustPolicy`]
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// SGX policy
    #[serde(default)]
    pub sgx: SgxPolicyConfig,
    /// TDX policy
    #[serde(default)]
    pub tdx: TdxPolicyConfig,
}

fn default_tcb_levels() -> EnumSet<TcbLevel> {
    let mut set = EnumSet::new();
    set.insert(TcbLevel::Ok);
    set
}

/// Measurements taken from verified evidence
#[derive(Debug, Clone, Copy)]
pub enum Measurement<'a> {
    /// SGX enclave identity
    Sgx {
        #[allow(missing_docs)]
        mr_signer: &'a [u8],
        #[allow(missing_docs)]
        mr_enclave: &'a [u8],
    },
    /// TDX measurement registers `[mrtd, rtmr0, rtmr1, rtmr2, rtmr3]`
    Tdx([&'a [u8]; 5]),
}

/// Decoded trust policy
#[derive(Debug, Clone)]
pub struct TrustPolicy {
    #[allow(missing_docs)]
    pub sgx_mrsigners: Option<Vec<Bytes>>,
    #[allow(missing_docs)]
    pub sgx_mrenclaves: Option<Vec<Bytes>>,
    #[allow(missing_docs)]
    pub sgx_allowed_tcb_levels: EnumSet<TcbLevel>,
    #[allow(missing_docs)]
    pub sgx_allowed_advisory_ids: Option<Vec<String>>,
    /// concatenated `mrtd || rtmr0 || rtmr1 || rtmr2 || rtmr3`
    pub tdx_mrs: Option<Vec<Bytes>>,
    #[allow(missing_docs)]
    pub tdx_allowed_tcb_levels: EnumSet<TcbLevel>,
    #[allow(missing_docs)]
    pub tdx_allowed_advisory_ids: Option<Vec<String>>,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            sgx_mrsigners: None,
            sgx_mrenclaves: None,
            sgx_allowed_tcb_levels: default_tcb_levels(),
            sgx_allowed_advisory_ids: None,
            tdx_mrs: None,
            tdx_allowed_tcb_levels: default_tcb_levels(),
            tdx_allowed_advisory_ids: None,
        }
    }
}

impl TryFrom<PolicyConfig> for TrustPolicy {
    type Error = PolicyError;

    fn try_from(config: PolicyConfig) -> Result<Self, Self::Error> {
        let policy = Self {
            sgx_mrsigners: decode_hex_vec_option(config.sgx.mrsigners, SGX_HASH_SIZE)?,
            sgx_mrenclaves: decode_hex_vec_option(config.sgx.mrenclaves, SGX_HASH_SIZE)?,
            sgx_allowed_tcb_levels: config.sgx.allowed_tcb_levels,
            sgx_allowed_advisory_ids: config.sgx.allowed_advisory_ids,
            tdx_mrs: decode_tdx_mrs(config.tdx.mrs, TDX_HASH_SIZE)?,
            tdx_allowed_tcb_levels: config.tdx.allowed_tcb_levels,
            tdx_allowed_advisory_ids: config.tdx.allowed_advisory_ids,
        };

        if policy.sgx_mrsigners.is_none() && policy.sgx_mrenclaves.is_none() {
            tracing::error!(
                "Neither `mrenclaves` nor `mrsigners` specified. Any code could have produced the SGX evidence."
            );
        }

        if policy.tdx_mrs.is_none() {
            tracing::error!("`mrs` not specified. Any code could have produced the TDX evidence.");
        }

        Ok(policy)
    }
}

impl TrustPolicy {
    /// Load the policy from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: PolicyConfig = serde_yaml::from_str(&content)?;
        tracing::info!("Loaded trust policy from file: {:?}", path.as_ref());
        config.try_into()
    }

    /// Check verified evidence against the policy
    pub fn enforce(
        &self,
        tcblevel: TcbLevel,
        advisories: &[String],
        measurement: Measurement<'_>,
    ) -> Result<(), VerifyError> {
        match measurement {
            Measurement::Sgx {
                mr_signer,
                mr_enclave,
            } => {
                Self::validate_tcb_level(&self.sgx_allowed_tcb_levels, tcblevel)?;
                for advisory in advisories {
                    Self::check_policy(
                        self.sgx_allowed_advisory_ids.as_deref(),
                        advisory,
                        "advisories",
                    )?;
                }
                Self::check_policy_hash(self.sgx_mrsigners.as_deref(), mr_signer, "mrsigner")?;
                Self::check_policy_hash(self.sgx_mrenclaves.as_deref(), mr_enclave, "mrenclave")
            }
            Measurement::Tdx(registers) => {
                Self::validate_tcb_level(&self.tdx_allowed_tcb_levels, tcblevel)?;
                for advisory in advisories {
                    Self::check_policy(
                        self.tdx_allowed_advisory_ids.as_deref(),
                        advisory,
                        "advisories",
                    )?;
                }
                let tdx_mr: Vec<u8> = registers.into_iter().flatten().copied().collect();
                Self::check_policy_hash(self.tdx_mrs.as_deref(), &tdx_mr, "tdxmr")
            }
        }
    }

    fn validate_tcb_level(
        allowed_levels: &EnumSet<TcbLevel>,
        actual_level: TcbLevel,
    ) -> Result<(), VerifyError> {
        if !allowed_levels.contains(actual_level) {
            return Err(VerifyError::rejected(format!(
                "TCB level mismatch (expected one of: {allowed_levels:?}, actual: {actual_level})"
            )));
        }
        Ok(())
    }

    fn check_policy(
        policy: Option<&[String]>,
        actual_value: &str,
        field_name: &str,
    ) -> Result<(), VerifyError> {
        if let Some(valid_values) = policy {
            if !valid_values.iter().any(|value| value == actual_value) {
                return Err(VerifyError::rejected(format!(
                    "{} mismatch (expected one of: [ {} ], actual: {})",
                    field_name,
                    valid_values.join(", "),
                    actual_value
                )));
            }

            tracing::debug!(field_name, actual_value, "Trust policy check passed");
        }

        Ok(())
    }

    fn check_policy_hash(
        policy: Option<&[Bytes]>,
        actual_value: &[u8],
        field_name: &str,
    ) -> Result<(), VerifyError> {
        if let Some(valid_values) = policy {
            if !valid_values.iter().any(|value| value.as_ref() == actual_value) {
                let valid_values = valid_values
                    .iter()
                    .map(hex::encode)
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(VerifyError::rejected(format!(
                    "{} mismatch (expected one of: [ {} ], actual: {})",
                    field_name,
                    valid_values,
                    hex::encode(actual_value)
                )));
            }

            tracing::debug!(
                field_name,
                actual_value = hex::encode(actual_value),
                "Trust policy check passed"
            );
        }

        Ok(())
    }
}

fn decode_hex_vec_option(
    hex_strings: Option<Vec<String>>,
    bytes_length: usize,
) -> Result<Option<Vec<Bytes>>, hex::FromHexError> {
    hex_strings
        .map(|strings| {
            strings
                .into_iter()
                .map(|s| {
                    if s.len() != bytes_length * 2 {
                        return Err(hex::FromHexError::InvalidStringLength);
                    }
                    hex::decode(s).map(Bytes::from)
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()
}

fn decode_tdx_mrs(
    tdx_mrs_opt: Option<Vec<[String; 5]>>,
    bytes_length: usize,
) -> Result<Option<Vec<Bytes>>, hex::FromHexError> {
    tdx_mrs_opt
        .map(|mrs| {
            mrs.into_iter()
                .map(|registers| {
                    let mut buffer = BytesMut::with_capacity(bytes_length * 5);
                    for s in &registers {
                        if s.len() != bytes_length * 2 {
                            return Err(hex::FromHexError::InvalidStringLength);
                        }
                        buffer.extend(hex::decode(s)?);
                    }
                    Ok(buffer.freeze())
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    const MRENCLAVE: &str = "a2caa7055e333f69c3e46ca7ba65b135a86c90adfde2afb356e05075b7818b3c";
    const TDX_MRS: [&str; 5] = [
        "2a90c8fa38672cafd791d994beb6836b99383b2563736858632284f0f760a6446efd1e7ec457cf08b629ea630f7b4525",
        "3300980705adf09d28b707b79699d9874892164280832be2c386a715b6e204e0897fb564a064f810659207ba862b304f",
        "c08ab64725566bcc8a6fb1c79e2e64744fcff1594b8f1f02d716fb66592ecd5de94933b2bc54ffbbc43a52aab7eb1146",
        "092a4866a9e6a1672d7439a5d106fbc6eb57b738d5bfea5276d41afa2551824365fdd66700c1ce9c0b20542b9f9d5945",
        "971fb52f90ec98a234301ca9b8fc30b613c33e3dd9c0cc42dcb8003d4a95d8fb218b75baf028b70a3cabcb947e1ca453",
    ];

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let mut suffix = [0u8; 8];
        getrandom::fill(&mut suffix).unwrap();
        let path = env::temp_dir().join(format!("{name}-{}.yaml", hex::encode(suffix)));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_policy_from_yaml() {
        let yaml = format!(
            r#"
sgx:
    mrenclaves:
      - {MRENCLAVE}
    allowed_tcb_levels:
      - Ok
      - SwHardeningNeeded
tdx:
    mrs:
      - - {}
        - {}
        - {}
        - {}
        - {}
"#,
            TDX_MRS[0], TDX_MRS[1], TDX_MRS[2], TDX_MRS[3], TDX_MRS[4]
        );
        let path = write_temp("trust-policy", &yaml);
        let policy = TrustPolicy::from_file(&path).unwrap();
        fs::remove_file(path).unwrap();

        assert_eq!(policy.sgx_mrsigners, None);
        assert_eq!(
            policy.sgx_mrenclaves,
            Some(vec![Bytes::from(hex::decode(MRENCLAVE).unwrap())])
        );
        assert!(policy.sgx_allowed_tcb_levels.contains(TcbLevel::Ok));
        assert!(policy
            .sgx_allowed_tcb_levels
            .contains(TcbLevel::SwHardeningNeeded));
        assert_eq!(policy.tdx_allowed_tcb_levels, default_tcb_levels());
        assert_eq!(
            policy.tdx_mrs,
            Some(vec![Bytes::from(hex::decode(TDX_MRS.concat()).unwrap())])
        );
    }

    #[test]
    fn invalid_policy_files() {
        assert!(matches!(
            TrustPolicy::from_file("/non/existent/path.yaml"),
            Err(PolicyError::Io(_))
        ));

        let path = write_temp("trust-policy-invalid", "sgx_mrsigners: 1234\ninvalid_key: x\n");
        assert!(matches!(
            TrustPolicy::from_file(&path),
            Err(PolicyError::Yaml(_))
        ));
        fs::remove_file(path).unwrap();

        let path = write_temp("trust-policy-hex", "sgx:\n  mrsigners:\n    - abcd\n");
        assert!(matches!(
            TrustPolicy::from_file(&path),
            Err(PolicyError::Hex(_))
        ));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn enforce_sgx() {
        let mrenclave = hex::decode(MRENCLAVE).unwrap();
        let policy = TrustPolicy {
            sgx_mrenclaves: Some(vec![Bytes::from(mrenclave.clone())]),
            ..Default::default()
        };
        let signer = [0u8; SGX_HASH_SIZE];
        let other = [1u8; SGX_HASH_SIZE];
        let good = Measurement::Sgx {
            mr_signer: &signer,
            mr_enclave: &mrenclave,
        };
        let bad = Measurement::Sgx {
            mr_signer: &signer,
            mr_enclave: &other,
        };

        policy.enforce(TcbLevel::Ok, &[], good).unwrap();
        assert!(policy.enforce(TcbLevel::Ok, &[], bad).is_err());
        let err = policy
            .enforce(TcbLevel::OutOfDate, &[], good)
            .unwrap_err();
        assert!(err.to_string().contains("TCB level mismatch"));
    }

    #[test]
    fn enforce_advisories() {
        let policy = TrustPolicy {
            tdx_allowed_advisory_ids: Some(vec!["INTEL-SA-00837".into()]),
            ..Default::default()
        };
        let registers = [[0u8; TDX_HASH_SIZE]; 5];
        let tdx = Measurement::Tdx(registers.each_ref().map(|r| r.as_slice()));

        policy
            .enforce(TcbLevel::Ok, &["INTEL-SA-00837".into()], tdx)
            .unwrap();
        assert!(policy
            .enforce(TcbLevel::Ok, &["INTEL-SA-00615".into()], tdx)
            .is_err());
    }

    #[test]
    fn enforce_tdx_measurements() {
        let decoded: Vec<Vec<u8>> = TDX_MRS.iter().map(|s| hex::decode(s).unwrap()).collect();
        let policy = TrustPolicy {
            tdx_mrs: Some(vec![Bytes::from(decoded.concat())]),
            ..Default::default()
        };
        let registers: Vec<&[u8]> = decoded.iter().map(Vec::as_slice).collect();
        let good = Measurement::Tdx([
            registers[0],
            registers[1],
            registers[2],
            registers[3],
            registers[4],
        ]);
        policy.enforce(TcbLevel::Ok, &[], good).unwrap();

        let zero = [0u8; TDX_HASH_SIZE];
        let bad = Measurement::Tdx([
            registers[0],
            registers[1],
            registers[2],
            registers[3],
            &zero,
        ]);
        assert!(policy.enforce(TcbLevel::Ok, &[], bad).is_err());
    }
}
