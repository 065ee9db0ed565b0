//! Error types shared across the canary.

use thiserror::Error;

/// Errors surfaced by an individual [`Transport`](crate::transport::Transport)
/// operation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote answered with a non-success status code.
    #[error("unexpected response status {0}")]
    BadStatus(u16),

    /// Endpoint resolution failed or the address cache is empty.
    #[error("no resolved address for endpoint {0}")]
    Resolution(String),

    /// An I/O error from the underlying connection.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other failure reported by the client implementation.
    #[error("client error: {0}")]
    Client(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Wraps an arbitrary client-side error.
    pub fn client(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Client(Box::new(err))
    }
}

/// Errors from the process-to-process exchange channel.
///
/// These are fatal for the run; the protocol performs no retries.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The peer side of the channel is gone.
    #[error("exchange peer {0} is gone")]
    PeerGone(u32),

    /// The channel endpoint is not bound to a worker identity.
    #[error("channel endpoint has no worker identity")]
    NoIdentity,

    /// A value was present but could not be interpreted.
    #[error("malformed value for key {key:?}: {message}")]
    Malformed {
        /// The exchange key that was read.
        key: String,
        /// Why the value was rejected.
        message: String,
    },
}

/// Fatal errors of a measurement run.
///
/// Individual transfer failures are *not* represented here; they are logged,
/// recorded on the [`TransferRecord`](crate::record::TransferRecord), and the
/// run proceeds. This type only covers failures of run preparation and of the
/// coordination protocol.
#[derive(Debug, Error)]
pub enum MeasurementError {
    /// The exchange channel failed.
    #[error("exchange channel failure: {0}")]
    Exchange(#[from] ExchangeError),

    /// Preparing the transport (warm-up, seeding, pools) failed.
    #[error("transport preparation failed: {0}")]
    Transport(#[from] TransportError),

    /// The coordinator role needs a transport to distribute endpoints.
    #[error("coordinator requires a transport to distribute endpoints")]
    MissingTransport,
}
