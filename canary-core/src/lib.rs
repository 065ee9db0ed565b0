//! Bounded-concurrency transfer benchmarking engine.
//!
//! The canary issues a stream of upload/download transfers against a remote
//! endpoint, caps how many are in flight at once, tracks per-transfer
//! completion and byte counts, and periodically samples live transport state
//! into a metrics publisher while a run is active.
//!
//! In distributed runs, a *coordinator* process distributes pre-resolved
//! endpoint addresses to *worker* processes over a key/value
//! [`ExchangeChannel`] and waits for their completion signals; workers seed
//! their transport's address cache with the received address and then run
//! the issuance loop exactly like a standalone process.
//!
//! The transport and metrics layers are external collaborators, consumed
//! only through the [`Transport`](transport::Transport) and
//! [`MetricsPublisher`](metrics::MetricsPublisher) traits.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod coordination;
pub mod error;
pub mod executor;
pub mod gate;
pub mod measure;
pub mod metrics;
pub mod pulse;
pub mod record;
pub mod task;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::coordination::{ExchangeChannel, MemoryExchange, ProcessRole};
pub use crate::error::{ExchangeError, MeasurementError, TransportError};
pub use crate::gate::CompletionGate;
pub use crate::measure::{
    CanaryOptions, MeasurementConfig, MeasurementFlags, TransferCanary, perform_measurement,
};
pub use crate::record::{TransferRecord, TransferStatus};
