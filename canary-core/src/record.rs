//! Per-transfer bookkeeping shared with completion callbacks.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Tri-state completion status of a transfer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransferStatus {
    /// The transfer has not completed yet.
    Pending,
    /// The transfer completed without error.
    Success,
    /// The transfer completed with an error.
    Failed,
}

/// Mutable state of one logical transfer.
///
/// Byte counters are written by the transfer's own progress callbacks, which
/// may run on a different task than the issuing loop. The loop reads them
/// only after the transfer's completion has been observed through the gate,
/// so relaxed atomics are sufficient. The success flag is set exactly once,
/// at completion.
#[derive(Debug)]
pub struct TransferRecord {
    index: u32,
    part_count: u32,
    object_size: u64,
    bytes_up: AtomicU64,
    bytes_down: AtomicU64,
    success: OnceLock<bool>,
}

impl TransferRecord {
    /// Creates a pending record for the transfer with the given index.
    pub fn new(index: u32, part_count: u32, object_size: u64) -> Self {
        Self {
            index,
            part_count,
            object_size,
            bytes_up: AtomicU64::new(0),
            bytes_down: AtomicU64::new(0),
            success: OnceLock::new(),
        }
    }

    /// Ordinal of this transfer within the run.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Number of parts the object is transferred in.
    pub fn part_count(&self) -> u32 {
        self.part_count
    }

    /// Declared size of the object being transferred.
    pub fn object_size(&self) -> u64 {
        self.object_size
    }

    /// Adds to the cumulative upload byte count.
    pub fn add_bytes_up(&self, bytes: u64) {
        self.bytes_up.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Adds to the cumulative download byte count.
    pub fn add_bytes_down(&self, bytes: u64) {
        self.bytes_down.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Cumulative bytes uploaded so far.
    pub fn bytes_up(&self) -> u64 {
        self.bytes_up.load(Ordering::Relaxed)
    }

    /// Cumulative bytes downloaded so far.
    pub fn bytes_down(&self) -> u64 {
        self.bytes_down.load(Ordering::Relaxed)
    }

    /// Marks the transfer as finished. The first call wins.
    pub(crate) fn finish(&self, success: bool) {
        let _ = self.success.set(success);
    }

    /// The current completion status.
    pub fn status(&self) -> TransferStatus {
        match self.success.get() {
            None => TransferStatus::Pending,
            Some(true) => TransferStatus::Success,
            Some(false) => TransferStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_pending_and_finishes_once() {
        let record = TransferRecord::new(3, 1, 1024);
        assert_eq!(record.index(), 3);
        assert_eq!(record.status(), TransferStatus::Pending);

        record.finish(true);
        assert_eq!(record.status(), TransferStatus::Success);

        // A second finish does not overwrite the first.
        record.finish(false);
        assert_eq!(record.status(), TransferStatus::Success);
    }

    #[test]
    fn byte_counters_accumulate() {
        let record = TransferRecord::new(0, 1, 64);
        record.add_bytes_down(16);
        record.add_bytes_down(48);
        record.add_bytes_up(8);

        assert_eq!(record.bytes_down(), 64);
        assert_eq!(record.bytes_up(), 8);
    }
}
