//! Interface to the client layer performing individual transfers.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::error::TransportError;

/// Byte stream used for upload bodies and download responses.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Client layer that moves object data to and from one endpoint.
///
/// Implementations own connection pooling, address resolution and request
/// construction; the orchestrator only drives them through this interface.
/// Retry behavior inside a single transfer is the implementation's business,
/// the orchestrator never retries.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug + 'static {
    /// Resolves the endpoint repeatedly to fill the address cache.
    ///
    /// `concurrency` hints how many distinct addresses the run can use.
    async fn warm_address_cache(&self, concurrency: u32) -> Result<(), TransportError>;

    /// Creates the connection pools used by subsequent transfers.
    async fn spawn_connection_pools(&self) -> Result<(), TransportError>;

    /// Resolved address assigned to the transfer with the given index.
    async fn endpoint_for_transfer(&self, index: u32) -> Result<String, TransportError>;

    /// Seeds the address cache with a pre-resolved address.
    async fn seed_address_cache(&self, address: String) -> Result<(), TransportError>;

    /// Uploads `body` under `key`.
    async fn put_object(
        &self,
        key: &str,
        size_hint: u64,
        body: ByteStream,
    ) -> Result<(), TransportError>;

    /// Downloads the object under `key` as a stream of chunks.
    async fn get_object(&self, key: &str) -> Result<ByteStream, TransportError>;

    /// The configured endpoint.
    fn endpoint(&self) -> String;

    /// Number of resolved addresses currently cached for the endpoint.
    fn resolved_address_count(&self) -> usize;
}
