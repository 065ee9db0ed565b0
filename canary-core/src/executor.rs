//! Pluggable transfer logic.
//!
//! The issuance loop depends only on [`TransferExecutor`]; the concrete
//! executors decide whether a transfer is a raw HTTP download, an object
//! upload or an object download. All of them absorb transport failures into
//! the task's completion outcome so that nothing propagates out of the loop.

use std::pin::Pin;
use std::sync::Arc;
use std::{fmt, io, task};

use async_trait::async_trait;
use futures_util::StreamExt;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::io::ReaderStream;

use crate::error::TransportError;
use crate::record::TransferRecord;
use crate::task::TransferTask;
use crate::transport::{ByteStream, Transport};

/// Performs one transfer and redeems the task's completion ticket.
#[async_trait]
pub trait TransferExecutor: Send + Sync + fmt::Debug + 'static {
    /// Runs the transfer described by `task` to completion.
    async fn execute(&self, task: TransferTask);
}

/// Plain HTTP GET of the object key, counting bytes down.
#[derive(Debug)]
pub struct HttpDownloadExecutor {
    transport: Arc<dyn Transport>,
}

impl HttpDownloadExecutor {
    /// Creates an executor downloading through the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl TransferExecutor for HttpDownloadExecutor {
    async fn execute(&self, task: TransferTask) {
        let outcome = download(self.transport.as_ref(), &task).await;
        match &outcome {
            Ok(()) => tracing::info!(key = %task.key, "http get finished"),
            Err(error) => tracing::error!(key = %task.key, %error, "http get finished"),
        }
        task.complete(outcome);
    }
}

/// Object-store GET, counting bytes down.
#[derive(Debug)]
pub struct ObjectDownloadExecutor {
    transport: Arc<dyn Transport>,
}

impl ObjectDownloadExecutor {
    /// Creates an executor downloading through the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl TransferExecutor for ObjectDownloadExecutor {
    async fn execute(&self, task: TransferTask) {
        let outcome = download(self.transport.as_ref(), &task).await;
        task.complete(outcome);
    }
}

/// Object-store PUT of a generated payload, counting bytes up.
#[derive(Debug)]
pub struct ObjectUploadExecutor {
    transport: Arc<dyn Transport>,
}

impl ObjectUploadExecutor {
    /// Creates an executor uploading through the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl TransferExecutor for ObjectUploadExecutor {
    async fn execute(&self, task: TransferTask) {
        let payload = Payload::new(u64::from(task.index), task.object_size);
        let body = counting_body(payload, Arc::clone(&task.record));
        let outcome = self
            .transport
            .put_object(&task.key, task.object_size, body)
            .await;
        task.complete(outcome);
    }
}

async fn download(transport: &dyn Transport, task: &TransferTask) -> Result<(), TransportError> {
    let mut stream = transport.get_object(&task.key).await?;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        task.record.add_bytes_down(chunk.len() as u64);
    }
    Ok(())
}

fn counting_body(payload: Payload, record: Arc<TransferRecord>) -> ByteStream {
    ReaderStream::new(payload)
        .map(move |chunk| {
            let chunk = chunk.map_err(TransportError::from)?;
            record.add_bytes_up(chunk.len() as u64);
            Ok(chunk)
        })
        .boxed()
}

/// Deterministic pseudo-random upload body.
///
/// The same seed produces the same byte sequence, so a payload can be
/// regenerated for verification without buffering it.
#[derive(Clone, Debug)]
pub struct Payload {
    len: u64,
    rng: SmallRng,
}

impl Payload {
    /// Creates a payload of `len` bytes derived from `seed`.
    pub fn new(seed: u64, len: u64) -> Self {
        Self {
            len,
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl AsyncRead for Payload {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> task::Poll<io::Result<()>> {
        let len_to_fill = (buf.remaining() as u64).min(self.len) as usize;

        let fill_buf = buf.initialize_unfilled_to(len_to_fill);
        self.rng.fill_bytes(fill_buf);

        self.len -= len_to_fill as u64;
        buf.advance(len_to_fill);

        task::Poll::Ready(Ok(()))
    }
}
