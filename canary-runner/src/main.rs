//! The transfer canary binary.
//!
//! Drives bounded-concurrency upload/download measurements against a remote
//! HTTP endpoint and prints a throughput summary. Supports a standalone
//! mode and a same-process fan-out mode where a coordinator hands endpoint
//! addresses to worker tasks over an in-memory exchange.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;

use crate::config::Config;

mod config;
mod http;
mod observability;
mod publisher;
mod run;

/// Transfer-rate canary for remote storage endpoints.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// print the version and exit
    #[argh(switch)]
    version: bool,
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();

    if args.version {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    config.validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("canary-rt")
        .enable_all()
        .worker_threads(config.runtime.worker_threads)
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config);
    tracing::debug!(?config);

    runtime.block_on(run::run(config))
}
