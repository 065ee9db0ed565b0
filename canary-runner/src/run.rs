//! Wires configuration, transports and publisher into canary runs.

use std::sync::Arc;

use anyhow::{Context, Result};

use canary_core::metrics::MetricsPublisher;
use canary_core::{ExchangeChannel, MemoryExchange, ProcessRole, TransferCanary};

use crate::config::{Config, Measurement, RunMode};
use crate::http::HttpTransport;
use crate::publisher::ConsolePublisher;

/// Runs the configured measurement to completion.
pub async fn run(config: Config) -> Result<()> {
    let publisher: Arc<dyn MetricsPublisher> = Arc::new(ConsolePublisher::default());

    match config.mode {
        RunMode::Standalone => {
            let exchange = Arc::new(MemoryExchange::coordinator());
            let canary = build_canary(&config, publisher, ProcessRole::Standalone, exchange)?;
            drive(canary, &config).await
        }
        RunMode::FanOut => run_fan_out(&config, publisher).await,
    }
}

/// Runs a coordinator plus one worker task per transfer index, all in this
/// process, talking over a shared in-memory exchange.
async fn run_fan_out(config: &Config, publisher: Arc<dyn MetricsPublisher>) -> Result<()> {
    let exchange = MemoryExchange::coordinator();

    let workers: Vec<_> = (0..config.fan_out_workers())
        .map(|index| {
            let config = config.clone();
            let publisher = Arc::clone(&publisher);
            let worker_exchange: Arc<dyn ExchangeChannel> = Arc::new(exchange.for_worker(index));

            tokio::spawn(async move {
                let canary = build_canary(
                    &config,
                    publisher,
                    ProcessRole::Worker { index },
                    worker_exchange,
                )?;
                drive(canary, &config).await
            })
        })
        .collect();

    let coordinator = build_canary(
        config,
        publisher,
        ProcessRole::Coordinator,
        Arc::new(exchange),
    )?;
    drive(coordinator, config).await?;

    for worker in workers {
        worker.await.context("worker task panicked")??;
    }

    Ok(())
}

fn build_canary(
    config: &Config,
    publisher: Arc<dyn MetricsPublisher>,
    role: ProcessRole,
    exchange: Arc<dyn ExchangeChannel>,
) -> Result<TransferCanary> {
    let upload = HttpTransport::new(
        &config.endpoint,
        config.connect_timeout,
        config.max_connections,
    )?;
    let download = HttpTransport::new(
        &config.endpoint,
        config.connect_timeout,
        config.max_connections,
    )?;

    Ok(TransferCanary::new(
        publisher,
        Arc::new(upload),
        Arc::new(download),
        exchange,
        role,
        config.canary_options(),
    ))
}

async fn drive(mut canary: TransferCanary, config: &Config) -> Result<()> {
    match config.measurement {
        Measurement::Http => {
            let endpoint = config.http_endpoint.as_deref().unwrap_or(&config.endpoint);
            let http = HttpTransport::new(
                endpoint,
                config.connect_timeout,
                config.max_connections,
            )?;
            canary.measure_http_transfer(Arc::new(http)).await?;
        }
        Measurement::SinglePart => {
            canary.measure_single_part_object_transfer().await?;
        }
    }

    Ok(())
}
