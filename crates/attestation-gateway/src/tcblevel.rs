// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2023-2025 Matter Labs

//! Intel TEE TCB level wrapper

use enumset::EnumSetType;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

pub use enumset::EnumSet;

/// TCB level
#[derive(EnumSetType, Debug, Serialize, Deserialize)]
#[enumset(serialize_repr = "list")]
#[non_exhaustive]
pub enum TcbLevel {
    /// TCB is up to date
    Ok,
    /// TCB is up to date, but the configuration is not
    ConfigNeeded,
    /// TCB is up to date, but the configuration and software hardening is not
    ConfigAndSwHardeningNeeded,
    /// TCB is up to date, but the software hardening is not
    SwHardeningNeeded,
    /// TCB is out of date
    OutOfDate,
    /// TCB is out of date and the configuration is also out of date
    OutOfDateConfigNeeded,
    /// TCB level is invalid or revoked
    Invalid,
}

impl FromStr for TcbLevel {
    type Err = String;

    /// Accepts both the short names and the status strings reported by the
    /// Intel PCS (`UpToDate`, `ConfigurationNeeded`, `Revoked`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ok" | "uptodate" => Ok(TcbLevel::Ok),
            "configneeded" | "configurationneeded" => Ok(TcbLevel::ConfigNeeded),
            "configandswhardeningneeded" | "configurationandswhardeningneeded" => {
                Ok(TcbLevel::ConfigAndSwHardeningNeeded)
            }
            "swhardeningneeded" => Ok(TcbLevel::SwHardeningNeeded),
            "outofdate" => Ok(TcbLevel::OutOfDate),
            "outofdateconfigneeded" | "outofdateconfigurationneeded" => {
                Ok(TcbLevel::OutOfDateConfigNeeded)
            }
            "invalid" | "revoked" => Ok(TcbLevel::Invalid),
            _ => Err(format!("Invalid TCB level: {s}")),
        }
    }
}

impl TcbLevel {
    /// The canonical short name, as accepted by [`FromStr`]
    pub fn name(&self) -> &'static str {
        match self {
            TcbLevel::Ok => "Ok",
            TcbLevel::ConfigNeeded => "ConfigNeeded",
            TcbLevel::ConfigAndSwHardeningNeeded => "ConfigAndSwHardeningNeeded",
            TcbLevel::SwHardeningNeeded => "SwHardeningNeeded",
            TcbLevel::OutOfDate => "OutOfDate",
            TcbLevel::OutOfDateConfigNeeded => "OutOfDateConfigNeeded",
            TcbLevel::Invalid => "Invalid",
        }
    }
}

impl Display for TcbLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse a comma-separated list of TCB levels, as given on the command line
pub fn parse_tcb_levels(s: &str) -> Result<EnumSet<TcbLevel>, String> {
    s.split(',')
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .map(TcbLevel::from_str)
        .collect()
}
