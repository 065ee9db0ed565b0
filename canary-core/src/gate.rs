//! Concurrency gate for in-flight transfers.
//!
//! [`CompletionGate`] bounds the number of in-flight transfers and lets the
//! issuing loop block until a slot frees up or until every transfer of a run
//! has completed. Completions arrive through one-shot [`CompletionTicket`]s
//! which may be redeemed from any task.

use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::error::TransportError;

#[derive(Debug, Default)]
struct Counts {
    in_flight: u32,
    completed: u32,
    failed: u32,
}

/// Tracks in-flight and completed transfer counts.
///
/// The issuing loop calls [`issue`](Self::issue) before handing a transfer
/// to its executor and then parks in [`wait_for_slot`](Self::wait_for_slot).
/// The gate itself never fails; if a transfer never redeems its ticket,
/// [`wait_for_all`](Self::wait_for_all) blocks forever. That liveness
/// dependency on the transport is deliberate.
#[derive(Clone, Debug, Default)]
pub struct CompletionGate {
    counts: Arc<Mutex<Counts>>,
    changed: Arc<Notify>,
}

impl CompletionGate {
    /// Creates a gate with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts for a transfer that is about to be issued.
    ///
    /// Increments the in-flight count and returns the ticket that the
    /// transfer must redeem exactly once on completion.
    pub fn issue(&self) -> CompletionTicket {
        self.counts.lock().unwrap().in_flight += 1;
        CompletionTicket { gate: self.clone() }
    }

    /// Number of transfers currently in flight.
    pub fn in_flight(&self) -> u32 {
        self.counts.lock().unwrap().in_flight
    }

    /// Number of transfers that have completed, successfully or not.
    pub fn completed(&self) -> u32 {
        self.counts.lock().unwrap().completed
    }

    /// Number of transfers that completed with an error.
    pub fn failed(&self) -> u32 {
        self.counts.lock().unwrap().failed
    }

    /// Waits until fewer than `cap` transfers are in flight.
    pub async fn wait_for_slot(&self, cap: u32) {
        loop {
            let notified = self.changed.notified();
            if self.counts.lock().unwrap().in_flight < cap {
                return;
            }
            notified.await;
        }
    }

    /// Waits until at least `total` transfers have completed.
    pub async fn wait_for_all(&self, total: u32) {
        loop {
            let notified = self.changed.notified();
            if self.counts.lock().unwrap().completed >= total {
                return;
            }
            notified.await;
        }
    }

    fn complete(&self, success: bool) {
        let mut counts = self.counts.lock().unwrap();
        counts.in_flight -= 1;
        counts.completed += 1;
        if !success {
            counts.failed += 1;
        }
        drop(counts);
        self.changed.notify_waiters();
    }
}

/// One-shot completion handle for a single transfer.
///
/// Dropping the ticket without redeeming it leaves the transfer in flight
/// forever and stalls the run.
#[derive(Debug)]
pub struct CompletionTicket {
    gate: CompletionGate,
}

impl CompletionTicket {
    /// Redeems the ticket with the transfer's outcome.
    ///
    /// Non-success outcomes are logged; they never abort the run.
    pub fn complete(self, outcome: Result<(), TransportError>) {
        if let Err(error) = &outcome {
            tracing::info!(%error, "transfer finished with error");
        }
        self.gate.complete(outcome.is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_complete_update_counts() {
        let gate = CompletionGate::new();
        assert_eq!(gate.in_flight(), 0);

        let t1 = gate.issue();
        let t2 = gate.issue();
        assert_eq!(gate.in_flight(), 2);
        assert_eq!(gate.completed(), 0);

        t1.complete(Ok(()));
        assert_eq!(gate.in_flight(), 1);
        assert_eq!(gate.completed(), 1);
        assert_eq!(gate.failed(), 0);

        t2.complete(Err(TransportError::BadStatus(500)));
        assert_eq!(gate.in_flight(), 0);
        assert_eq!(gate.completed(), 2);
        assert_eq!(gate.failed(), 1);
    }

    #[tokio::test]
    async fn wait_for_slot_blocks_at_cap() {
        let gate = CompletionGate::new();
        let t1 = gate.issue();
        let _t2 = gate.issue();

        let mut wait = Box::pin(gate.wait_for_slot(2));
        assert!(futures::poll!(&mut wait).is_pending());

        t1.complete(Ok(()));
        assert!(futures::poll!(&mut wait).is_ready());
    }

    #[tokio::test]
    async fn wait_for_all_resolves_after_last_completion() {
        let gate = CompletionGate::new();
        let t1 = gate.issue();
        let t2 = gate.issue();

        let mut wait = Box::pin(gate.wait_for_all(2));
        assert!(futures::poll!(&mut wait).is_pending());

        t1.complete(Ok(()));
        assert!(futures::poll!(&mut wait).is_pending());

        t2.complete(Ok(()));
        assert!(futures::poll!(&mut wait).is_ready());
    }

    #[tokio::test]
    async fn completions_from_concurrent_tasks() {
        let gate = CompletionGate::new();
        let tickets: Vec<_> = (0..16).map(|_| gate.issue()).collect();

        for ticket in tickets {
            tokio::spawn(async move { ticket.complete(Ok(())) });
        }

        gate.wait_for_all(16).await;
        assert_eq!(gate.in_flight(), 0);
        assert_eq!(gate.completed(), 16);
    }
}
