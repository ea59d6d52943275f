// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2023-2025 Matter Labs

//! Server accepting attestation evidence, verifying each distinct report once.

#![deny(missing_docs)]
#![deny(clippy::all)]

use actix_web::{web::Data, App, HttpServer};
use anyhow::{Context, Result};
use attestation_gateway::{
    log::{setup_logging, LogLevelParser},
    server::{configure, new_payload_cfg, DEFAULT_MAX_PAYLOAD},
    store::{EvidenceStore, FileStore, MemoryStore, StoreKey},
    tcblevel::{parse_tcb_levels, EnumSet, TcbLevel},
    verifier::{DcapVerifier, TrustPolicy, VerifierAdapter},
    Gateway,
};
use clap::Parser;
use std::{net::IpAddr, path::PathBuf, sync::Arc, time::Duration};
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_actix_web::TracingLogger;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Arguments {
    /// port to listen on
    #[arg(long, env = "PORT", default_value = "8080")]
    port: u16,
    /// address to listen on
    #[arg(long, env = "BIND", default_value = "::")]
    bind: IpAddr,
    /// directory of the verdict store, verdicts are kept in memory if absent
    #[arg(long, env = "STORE_DIR")]
    store_dir: Option<PathBuf>,
    /// hex encoded key (at least 32 bytes) authenticating the stored verdicts
    #[arg(long, env = "STORE_KEY", hide_env_values = true)]
    store_key: Option<StoreKey>,
    /// YAML trust policy, only up to date platforms are accepted if absent
    #[arg(long, env = "POLICY_FILE")]
    policy_file: Option<PathBuf>,
    /// allowed TCB levels, comma separated, overriding those of the policy
    #[arg(long, env = "ALLOWED_TCB_LEVELS", value_parser = parse_tcb_levels)]
    allowed_tcb_levels: Option<EnumSet<TcbLevel>>,
    /// Log level for the log output.
    /// Valid values are: `off`, `error`, `warn`, `info`, `debug`, `trace`
    #[arg(long, env = "LOG_LEVEL", default_value_t = LevelFilter::INFO, value_parser = LogLevelParser)]
    log_level: LevelFilter,
    /// write log events as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
    /// maximum size of an evidence payload in bytes
    #[arg(long, env = "MAX_PAYLOAD", default_value_t = DEFAULT_MAX_PAYLOAD)]
    max_payload: usize,
    /// seconds to wait for a verdict before answering with a timeout
    #[arg(long, env = "VERIFY_TIMEOUT", default_value = "60")]
    verify_timeout: u64,
    /// seconds to wait for the collateral of a quote
    #[arg(long, env = "COLLATERAL_TIMEOUT", default_value = "30")]
    collateral_timeout: u64,
    /// number of HTTP workers, defaults to the number of CPUs
    #[arg(long, env = "WORKERS")]
    workers: Option<usize>,
}

async fn open_store(
    store_dir: Option<PathBuf>,
    store_key: Option<StoreKey>,
) -> Result<Arc<dyn EvidenceStore>> {
    match store_dir {
        Some(dir) => {
            let key = store_key.context("`--store-key` is required with `--store-dir`")?;
            let store = FileStore::open(&dir, key)
                .await
                .with_context(|| format!("Failed to open store at {}", dir.display()))?;
            info!("Storing verdicts in {}", dir.display());
            Ok(Arc::new(store))
        }
        None => {
            warn!("No store directory given, verdicts are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Arguments::parse();

    setup_logging(env!("CARGO_CRATE_NAME"), &args.log_level, args.log_json)?;

    let mut policy = match &args.policy_file {
        Some(path) => TrustPolicy::from_file(path)
            .with_context(|| format!("Failed to load policy from {}", path.display()))?,
        None => {
            warn!("No policy file given, using the default policy");
            TrustPolicy::default()
        }
    };
    if let Some(levels) = args.allowed_tcb_levels {
        info!("Allowing TCB levels {levels:?}");
        policy.sgx_allowed_tcb_levels = levels;
        policy.tdx_allowed_tcb_levels = levels;
    }

    let store = open_store(args.store_dir, args.store_key).await?;

    let verifier = DcapVerifier::new(Duration::from_secs(args.collateral_timeout));
    let adapter = VerifierAdapter::new(Arc::new(verifier), policy)
        .with_timeout(Duration::from_secs(args.verify_timeout));
    let gateway = Data::new(Gateway::new(store, adapter));

    let max_payload = args.max_payload;
    let mut server = match HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(new_payload_cfg(max_payload))
            .app_data(gateway.clone())
            .configure(configure)
    })
    .bind((args.bind, args.port))
    {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to bind to {}:{}: {e:?}", args.bind, args.port);
            return Err(e).context(format!("Failed to bind to port {}", args.port));
        }
    };

    if let Some(workers) = args.workers {
        server = server.workers(workers);
    }

    info!("Starting HTTP server at {}:{}", args.bind, args.port);
    if let Err(e) = server.run().await {
        error!("failed to start HTTP server: {e:?}");
        return Err(e).context("Failed to start HTTP server");
    }

    info!("HTTP server stopped");
    Ok(())
}
