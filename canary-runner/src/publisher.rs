//! Console metrics publisher.
//!
//! Aggregates data points into DDSketches and prints a summary to stdout
//! when the backup is requested. There is no remote metrics pipeline here,
//! so scheduled publishes are a no-op beyond a log line.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use bytesize::ByteSize;
use sketches_ddsketch::DDSketch;
use yansi::Paint;

use canary_core::metrics::{Metric, MetricName, MetricUnit, MetricsPublisher};

/// Order in which metrics appear in the summary.
const SUMMARY_ORDER: [MetricName; 5] = [
    MetricName::BytesUp,
    MetricName::BytesDown,
    MetricName::TransferSuccess,
    MetricName::UploadAddressCount,
    MetricName::DownloadAddressCount,
];

/// [`MetricsPublisher`] printing aggregates to the console.
#[derive(Default)]
pub struct ConsolePublisher {
    sketches: Mutex<HashMap<MetricName, (MetricUnit, DDSketch)>>,
}

impl fmt::Debug for ConsolePublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsolePublisher").finish_non_exhaustive()
    }
}

#[async_trait]
impl MetricsPublisher for ConsolePublisher {
    fn add_data_point(&self, metric: Metric) {
        let mut sketches = self.sketches.lock().unwrap();
        let (_, sketch) = sketches
            .entry(metric.name)
            .or_insert_with(|| (metric.unit, DDSketch::default()));
        sketch.add(metric.value);
    }

    fn schedule_publish(&self) {
        tracing::info!("publish scheduled");
    }

    async fn wait_for_last_publish(&self) {
        // Aggregation happens synchronously in `add_data_point`, so there is
        // never an in-flight publish to wait for.
    }

    async fn upload_backup(&self) {
        let sketches = self.sketches.lock().unwrap();

        for name in SUMMARY_ORDER {
            let Some((unit, sketch)) = sketches.get(&name) else {
                continue;
            };
            if sketch.count() == 0 {
                continue;
            }

            println!(
                "{} ({} samples)",
                format!("{name}:").bold().blue(),
                sketch.count().bold()
            );

            let avg = sketch.sum().unwrap_or(0.0) / sketch.count() as f64;
            let p50 = quantile(sketch, 0.5);
            let p90 = quantile(sketch, 0.9);
            let p99 = quantile(sketch, 0.99);

            match unit {
                MetricUnit::Bytes => {
                    let avg = ByteSize::b(avg as u64);
                    let p50 = ByteSize::b(p50 as u64);
                    let p90 = ByteSize::b(p90 as u64);
                    let p99 = ByteSize::b(p99 as u64);
                    println!(
                        "  avg: {}; p50: {p50:.2}; p90: {p90:.2}; p99: {p99:.2}",
                        avg.bold()
                    );
                }
                MetricUnit::Count => {
                    println!(
                        "  avg: {:.2}; p50: {p50:.2}; p90: {p90:.2}; p99: {p99:.2}",
                        avg.bold()
                    );
                }
            }
        }
    }
}

fn quantile(sketch: &DDSketch, q: f64) -> f64 {
    sketch.quantile(q).ok().flatten().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn aggregates_and_summarizes() {
        let publisher = ConsolePublisher::default();

        for value in [1024.0, 2048.0, 4096.0] {
            publisher.add_data_point(Metric::now(
                MetricName::BytesDown,
                MetricUnit::Bytes,
                value,
            ));
        }
        publisher.add_data_point(Metric::now(
            MetricName::TransferSuccess,
            MetricUnit::Count,
            1.0,
        ));

        publisher.schedule_publish();
        publisher.wait_for_last_publish().await;
        publisher.upload_backup().await;

        let sketches = publisher.sketches.lock().unwrap();
        assert_eq!(sketches.get(&MetricName::BytesDown).unwrap().1.count(), 3);
        assert_eq!(
            sketches.get(&MetricName::TransferSuccess).unwrap().1.count(),
            1
        );
    }
}
