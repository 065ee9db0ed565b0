//! Periodic sampling of live transport state.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::metrics::{Metric, MetricName, MetricUnit, MetricsPublisher};
use crate::transport::Transport;

/// Interval between two pulses.
pub const PULSE_INTERVAL: Duration = Duration::from_millis(5000);

/// Handle to the self-rescheduling metrics pulse task.
///
/// Every [`PULSE_INTERVAL`] the task samples the resolved-address pool of
/// each transport and forwards one data point per transport. At most one
/// pulse is pending at a time; the interval is constant for the life of a
/// run. A cancelled task performs no further sampling, even if it was
/// already due to fire.
#[derive(Debug)]
pub struct MetricsPulse {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl MetricsPulse {
    /// Spawns the pulse task on the current runtime.
    pub fn start(
        publisher: Arc<dyn MetricsPublisher>,
        transports: Vec<(MetricName, Arc<dyn Transport>)>,
    ) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(run(publisher, transports, token.clone()));
        Self { token, handle }
    }

    /// Stops the pulse. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancels the pulse and waits for the task to wind down.
    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

async fn run(
    publisher: Arc<dyn MetricsPublisher>,
    transports: Vec<(MetricName, Arc<dyn Transport>)>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(PULSE_INTERVAL) => {}
        }

        // The token may have been cancelled between the timer firing and
        // this invocation running; such a pulse must not sample.
        if token.is_cancelled() {
            return;
        }

        for (name, transport) in &transports {
            let count = transport.resolved_address_count();
            tracing::info!(endpoint = %transport.endpoint(), count, "resolved address pool size");
            publisher.add_data_point(Metric::now(*name, MetricUnit::Count, count as f64));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingPublisher, StubTransport};

    fn pulse_setup() -> (Arc<RecordingPublisher>, MetricsPulse) {
        let publisher = Arc::new(RecordingPublisher::default());
        let transport = Arc::new(StubTransport::new("store.example:443"));
        let pulse = MetricsPulse::start(
            publisher.clone(),
            vec![(MetricName::UploadAddressCount, transport)],
        );
        (publisher, pulse)
    }

    #[tokio::test(start_paused = true)]
    async fn samples_every_interval_until_cancelled() {
        let (publisher, pulse) = pulse_setup();

        tokio::time::sleep(PULSE_INTERVAL + Duration::from_millis(10)).await;
        assert_eq!(publisher.data_points(), 1);

        tokio::time::sleep(PULSE_INTERVAL).await;
        assert_eq!(publisher.data_points(), 2);

        pulse.shutdown().await;
        tokio::time::sleep(PULSE_INTERVAL * 3).await;
        assert_eq!(publisher.data_points(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_first_fire_prevents_sampling() {
        let (publisher, pulse) = pulse_setup();

        pulse.cancel();
        tokio::time::sleep(PULSE_INTERVAL * 2).await;
        assert_eq!(publisher.data_points(), 0);

        pulse.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent() {
        let (publisher, pulse) = pulse_setup();

        tokio::time::sleep(PULSE_INTERVAL + Duration::from_millis(10)).await;
        assert_eq!(publisher.data_points(), 1);

        pulse.cancel();
        pulse.cancel();
        tokio::time::sleep(PULSE_INTERVAL * 2).await;
        assert_eq!(publisher.data_points(), 1);

        pulse.shutdown().await;
    }
}
