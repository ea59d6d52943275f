// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2024-2025 Matter Labs

//! Logging related stuff

use anyhow::Context;
use std::str::FromStr;
use tracing::level_filters::LevelFilter;
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

/// A log level parser for clap, with "off", "error", "warn", "info", "debug", "trace" as valid values
#[derive(Clone)]
pub struct LogLevelParser;

impl clap::builder::TypedValueParser for LogLevelParser {
    type Value = LevelFilter;

    fn parse_ref(
        &self,
        cmd: &clap::Command,
        arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        clap::builder::TypedValueParser::parse(self, cmd, arg, value.to_owned())
    }

    fn parse(
        &self,
        cmd: &clap::Command,
        arg: Option<&clap::Arg>,
        value: std::ffi::OsString,
    ) -> Result<Self::Value, clap::Error> {
        let p = clap::builder::PossibleValuesParser::new([
            "off", "error", "warn", "info", "debug", "trace",
        ]);
        let v = p.parse(cmd, arg, value)?;

        LevelFilter::from_str(&v)
            .map_err(|_| clap::Error::new(clap::error::ErrorKind::InvalidValue).with_cmd(cmd))
    }
}

/// The default filter directive: `RUST_LOG` unset, `log_level` for `crate_name` and this crate.
pub fn default_directive(crate_name: &str, log_level: &LevelFilter) -> String {
    match *log_level {
        LevelFilter::OFF => "off".to_string(),
        _ => format!("warn,{crate_name}={log_level},attestation_gateway={log_level}"),
    }
}

/// Setup standard logging and loglevel for the given crate and the `attestation_gateway` crate.
///
/// `RUST_LOG` overrides `log_level`. With `json`, every event is written as one JSON line.
pub fn setup_logging(crate_name: &str, log_level: &LevelFilter, json: bool) -> anyhow::Result<()> {
    LogTracer::init().context("Failed to set logger")?;
    let filter = EnvFilter::builder()
        .try_from_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(crate_name, log_level)));

    let fmt_layer = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_span_events(fmt::format::FmtSpan::CLOSE)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let subscriber = Registry::default().with(fmt_layer).with(filter);
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global subscriber")?;

    Ok(())
}
