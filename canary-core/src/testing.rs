//! Shared stubs for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::executor::TransferExecutor;
use crate::metrics::{Metric, MetricsPublisher};
use crate::task::TransferTask;
use crate::transport::{ByteStream, Transport};

/// In-memory transport with an explicit address pool and object store.
#[derive(Debug)]
pub(crate) struct StubTransport {
    endpoint: String,
    addresses: Mutex<Vec<String>>,
    seeded: Mutex<Vec<String>>,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    uploads: AtomicU32,
    warm_calls: AtomicU32,
    pool_calls: AtomicU32,
}

impl StubTransport {
    pub(crate) fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_owned(),
            addresses: Mutex::default(),
            seeded: Mutex::default(),
            objects: Mutex::default(),
            uploads: AtomicU32::new(0),
            warm_calls: AtomicU32::new(0),
            pool_calls: AtomicU32::new(0),
        }
    }

    /// Adds an address to the pool without going through the trait.
    pub(crate) fn seed(&self, address: &str) {
        self.addresses.lock().unwrap().push(address.to_owned());
    }

    /// Stores a downloadable object body.
    pub(crate) fn put_body(&self, key: &str, body: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_owned(), body);
    }

    /// Addresses received through [`Transport::seed_address_cache`].
    pub(crate) fn seeded_addresses(&self) -> Vec<String> {
        self.seeded.lock().unwrap().clone()
    }

    /// Size of the object uploaded under `key`, or 0.
    pub(crate) fn uploaded_bytes(&self, key: &str) -> u64 {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map_or(0, |body| body.len() as u64)
    }

    /// Number of [`Transport::put_object`] calls.
    pub(crate) fn uploads(&self) -> u32 {
        self.uploads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn warm_address_cache(&self, _concurrency: u32) -> Result<(), TransportError> {
        self.warm_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn spawn_connection_pools(&self) -> Result<(), TransportError> {
        self.pool_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn endpoint_for_transfer(&self, index: u32) -> Result<String, TransportError> {
        self.addresses
            .lock()
            .unwrap()
            .get(index as usize)
            .cloned()
            .ok_or_else(|| TransportError::Resolution(self.endpoint.clone()))
    }

    async fn seed_address_cache(&self, address: String) -> Result<(), TransportError> {
        self.seeded.lock().unwrap().push(address.clone());
        self.addresses.lock().unwrap().push(address);
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        _size_hint: u64,
        mut body: ByteStream,
    ) -> Result<(), TransportError> {
        self.uploads.fetch_add(1, Ordering::Relaxed);

        let mut stored = Vec::new();
        while let Some(chunk) = body.next().await {
            stored.extend_from_slice(&chunk?);
        }
        self.objects.lock().unwrap().insert(key.to_owned(), stored);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<ByteStream, TransportError> {
        let body = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(TransportError::BadStatus(404))?;

        let chunks: Vec<Result<Bytes, TransportError>> = body
            .chunks(1024)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Ok(futures_util::stream::iter(chunks).boxed())
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    fn resolved_address_count(&self) -> usize {
        self.addresses.lock().unwrap().len()
    }
}

/// Publisher that only counts what it is asked to do.
#[derive(Debug, Default)]
pub(crate) struct RecordingPublisher {
    metrics: Mutex<Vec<Metric>>,
    publishes: AtomicU32,
    backups: AtomicU32,
}

impl RecordingPublisher {
    pub(crate) fn data_points(&self) -> usize {
        self.metrics.lock().unwrap().len()
    }

    pub(crate) fn publishes(&self) -> u32 {
        self.publishes.load(Ordering::Relaxed)
    }

    pub(crate) fn backups(&self) -> u32 {
        self.backups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MetricsPublisher for RecordingPublisher {
    fn add_data_point(&self, metric: Metric) {
        self.metrics.lock().unwrap().push(metric);
    }

    fn schedule_publish(&self) {
        self.publishes.fetch_add(1, Ordering::Relaxed);
    }

    async fn wait_for_last_publish(&self) {}

    async fn upload_backup(&self) {
        self.backups.fetch_add(1, Ordering::Relaxed);
    }
}

/// Executor that completes every task immediately, optionally failing one
/// transfer index.
#[derive(Debug)]
pub(crate) struct CountingExecutor {
    executed: AtomicU32,
    fail_index: Option<u32>,
}

impl CountingExecutor {
    pub(crate) fn succeeding() -> Self {
        Self {
            executed: AtomicU32::new(0),
            fail_index: None,
        }
    }

    pub(crate) fn failing_at(index: u32) -> Self {
        Self {
            executed: AtomicU32::new(0),
            fail_index: Some(index),
        }
    }

    pub(crate) fn executed(&self) -> u32 {
        self.executed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TransferExecutor for CountingExecutor {
    async fn execute(&self, task: TransferTask) {
        self.executed.fetch_add(1, Ordering::Relaxed);
        if self.fail_index == Some(task.index) {
            task.complete(Err(TransportError::BadStatus(500)));
        } else {
            task.complete(Ok(()));
        }
    }
}

/// Executor that hands tasks to the test, which completes them manually.
#[derive(Debug)]
pub(crate) struct ChannelExecutor {
    tasks: mpsc::UnboundedSender<TransferTask>,
}

impl ChannelExecutor {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<TransferTask>) {
        let (tasks, receiver) = mpsc::unbounded_channel();
        (Self { tasks }, receiver)
    }
}

#[async_trait]
impl TransferExecutor for ChannelExecutor {
    async fn execute(&self, task: TransferTask) {
        let _ = self.tasks.send(task);
    }
}
