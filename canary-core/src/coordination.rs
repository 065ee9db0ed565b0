//! Multi-process coordination of a measurement run.
//!
//! A coordinator distributes pre-resolved endpoint addresses to workers over
//! a key/value [`ExchangeChannel`] and blocks until every worker has signaled
//! completion. Workers seed their transport with the received address and
//! then behave exactly like a standalone process. The protocol assumes a 1:1
//! mapping between transfer index and worker index: the coordinator performs
//! exactly one address write and one finished-read per index, each worker
//! exactly one address read and one finished-write.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::{ExchangeError, MeasurementError};
use crate::executor::TransferExecutor;
use crate::measure::{self, MeasurementConfig};
use crate::record::TransferRecord;
use crate::transport::Transport;

/// Role of this process in a distributed run, fixed for its lifetime.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessRole {
    /// A single process doing its own preparation and transfers.
    Standalone,
    /// Distributes endpoints to workers and collects completion signals;
    /// never runs transfers itself.
    Coordinator,
    /// Executes transfers with an endpoint received from the coordinator.
    Worker {
        /// Index of this worker, equal to the transfer index it serves.
        index: u32,
    },
}

impl ProcessRole {
    /// Whether this process is a worker.
    pub fn is_worker(&self) -> bool {
        matches!(self, ProcessRole::Worker { .. })
    }

    pub(crate) fn strategy(&self) -> Box<dyn RoleStrategy> {
        match *self {
            ProcessRole::Standalone => Box::new(StandaloneStrategy),
            ProcessRole::Coordinator => Box::new(CoordinatorStrategy),
            ProcessRole::Worker { index } => Box::new(WorkerStrategy { index }),
        }
    }
}

/// Process-to-process key/value channel.
///
/// Reads block until the peer writes the requested key; there are no
/// timeouts at this layer. Each key is written by exactly one side and read
/// by the other.
#[async_trait]
pub trait ExchangeChannel: Send + Sync + fmt::Debug + 'static {
    /// Writes `value` under `key` for the worker with the given index.
    async fn write_to(&self, process_index: u32, key: &str, value: &str)
    -> Result<(), ExchangeError>;

    /// Reads the value under `key` written by the worker with the given
    /// index, waiting until it appears.
    async fn read_from(&self, process_index: u32, key: &str) -> Result<String, ExchangeError>;

    /// Writes `value` under `key` for the coordinator.
    async fn write_to_coordinator(&self, key: &str, value: &str) -> Result<(), ExchangeError>;

    /// Reads the value under `key` written by the coordinator for this
    /// worker, waiting until it appears.
    async fn read_from_coordinator(&self, key: &str) -> Result<String, ExchangeError>;
}

/// Everything a role strategy needs to run one measurement.
pub(crate) struct MeasurementRun<'a> {
    pub config: &'a MeasurementConfig,
    pub exchange: &'a dyn ExchangeChannel,
    pub transport: Option<Arc<dyn Transport>>,
    pub executor: Arc<dyn TransferExecutor>,
    pub records: &'a [Arc<TransferRecord>],
}

impl MeasurementRun<'_> {
    fn address_key(&self) -> String {
        format!("{}address", self.config.key_prefix)
    }

    fn finished_key(&self) -> String {
        format!("{}finished", self.config.key_prefix)
    }
}

/// Role-specific "prepare and run" behavior of a measurement.
#[async_trait]
pub(crate) trait RoleStrategy: Send + Sync {
    async fn run(&self, run: MeasurementRun<'_>) -> Result<(), MeasurementError>;
}

struct CoordinatorStrategy;

#[async_trait]
impl RoleStrategy for CoordinatorStrategy {
    async fn run(&self, run: MeasurementRun<'_>) -> Result<(), MeasurementError> {
        let transport = run.transport.as_ref().ok_or(MeasurementError::MissingTransport)?;

        if !run.config.flags.dont_warm_address_cache {
            transport.warm_address_cache(run.config.concurrency).await?;
        }

        let address_key = run.address_key();
        for index in 0..run.config.num_transfers {
            let address = transport.endpoint_for_transfer(index).await?;
            run.exchange.write_to(index, &address_key, &address).await?;
        }

        let finished_key = run.finished_key();
        for index in 0..run.config.num_transfers {
            run.exchange.read_from(index, &finished_key).await?;
        }

        Ok(())
    }
}

struct WorkerStrategy {
    index: u32,
}

#[async_trait]
impl RoleStrategy for WorkerStrategy {
    async fn run(&self, run: MeasurementRun<'_>) -> Result<(), MeasurementError> {
        let address = run.exchange.read_from_coordinator(&run.address_key()).await?;
        tracing::info!(%address, index = self.index, "worker received endpoint address");

        if let Some(transport) = &run.transport {
            transport.seed_address_cache(address).await?;
            transport.spawn_connection_pools().await?;
        }

        measure::run_issuance_loop(run.config, self.index, Arc::clone(&run.executor), run.records)
            .await;

        run.exchange
            .write_to_coordinator(&run.finished_key(), "done")
            .await?;

        Ok(())
    }
}

struct StandaloneStrategy;

#[async_trait]
impl RoleStrategy for StandaloneStrategy {
    async fn run(&self, run: MeasurementRun<'_>) -> Result<(), MeasurementError> {
        if let Some(transport) = &run.transport {
            if !run.config.flags.dont_warm_address_cache {
                transport.warm_address_cache(run.config.concurrency).await?;
            }
            transport.spawn_connection_pools().await?;
        }

        measure::run_issuance_loop(run.config, 0, run.executor, run.records).await;

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
enum Slot {
    /// Values written by the coordinator for a worker.
    ToWorker(u32),
    /// Values written by a worker for the coordinator.
    FromWorker(u32),
}

#[derive(Debug, Default)]
struct MemoryExchangeInner {
    values: Mutex<HashMap<(Slot, String), String>>,
    written: Notify,
}

/// In-memory exchange for tests and same-process fan-out.
///
/// All participants share one store; the coordinator handle is created with
/// [`coordinator`](Self::coordinator) and worker handles are derived from it
/// with [`for_worker`](Self::for_worker).
#[derive(Clone, Debug)]
pub struct MemoryExchange {
    inner: Arc<MemoryExchangeInner>,
    worker_index: Option<u32>,
}

impl MemoryExchange {
    /// Creates the coordinator-side handle of a fresh exchange.
    pub fn coordinator() -> Self {
        Self {
            inner: Arc::new(MemoryExchangeInner::default()),
            worker_index: None,
        }
    }

    /// Derives the handle for the worker with the given index, sharing this
    /// exchange's store.
    pub fn for_worker(&self, index: u32) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            worker_index: Some(index),
        }
    }

    async fn read(&self, slot: Slot, key: &str) -> String {
        loop {
            let notified = self.inner.written.notified();
            if let Some(value) = self.inner.values.lock().unwrap().get(&(slot, key.to_owned())) {
                return value.clone();
            }
            notified.await;
        }
    }

    fn write(&self, slot: Slot, key: &str, value: &str) {
        self.inner
            .values
            .lock()
            .unwrap()
            .insert((slot, key.to_owned()), value.to_owned());
        self.inner.written.notify_waiters();
    }
}

#[async_trait]
impl ExchangeChannel for MemoryExchange {
    async fn write_to(
        &self,
        process_index: u32,
        key: &str,
        value: &str,
    ) -> Result<(), ExchangeError> {
        self.write(Slot::ToWorker(process_index), key, value);
        Ok(())
    }

    async fn read_from(&self, process_index: u32, key: &str) -> Result<String, ExchangeError> {
        Ok(self.read(Slot::FromWorker(process_index), key).await)
    }

    async fn write_to_coordinator(&self, key: &str, value: &str) -> Result<(), ExchangeError> {
        let index = self.worker_index.ok_or(ExchangeError::NoIdentity)?;
        self.write(Slot::FromWorker(index), key, value);
        Ok(())
    }

    async fn read_from_coordinator(&self, key: &str) -> Result<String, ExchangeError> {
        let index = self.worker_index.ok_or(ExchangeError::NoIdentity)?;
        Ok(self.read(Slot::ToWorker(index), key).await)
    }
}
