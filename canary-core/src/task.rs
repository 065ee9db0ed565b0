//! The unit of work handed to a transfer executor.

use std::sync::Arc;

use crate::error::TransportError;
use crate::gate::CompletionTicket;
use crate::record::TransferRecord;

/// Everything an executor needs to perform one transfer.
///
/// The task owns its completion ticket; [`complete`](Self::complete) must be
/// called exactly once with the transfer's outcome. Progress is reported by
/// writing to [`record`](Self::record) while the transfer runs.
#[derive(Debug)]
pub struct TransferTask {
    /// Ordinal of the transfer within the run.
    pub index: u32,
    /// Object key to upload to or download from.
    pub key: String,
    /// Declared size of the object.
    pub object_size: u64,
    /// The record tracking this transfer's bytes and final status.
    pub record: Arc<TransferRecord>,
    ticket: CompletionTicket,
}

impl TransferTask {
    pub(crate) fn new(
        index: u32,
        key: String,
        object_size: u64,
        record: Arc<TransferRecord>,
        ticket: CompletionTicket,
    ) -> Self {
        Self {
            index,
            key,
            object_size,
            record,
            ticket,
        }
    }

    /// Finalizes the record and releases the gate slot.
    pub fn complete(self, outcome: Result<(), TransportError>) {
        self.record.finish(outcome.is_ok());
        self.ticket.complete(outcome);
    }
}
