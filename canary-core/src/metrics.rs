//! Interface to the metrics pipeline.
//!
//! Aggregation, serialization and upload are entirely the publisher's
//! concern; the canary only pushes data points and sequences flushes.

use std::fmt;
use std::time::SystemTime;

use async_trait::async_trait;

/// Names of the data points emitted by the canary.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MetricName {
    /// Cumulative bytes uploaded by one transfer.
    BytesUp,
    /// Cumulative bytes downloaded by one transfer.
    BytesDown,
    /// Whether a transfer completed successfully (1) or not (0).
    TransferSuccess,
    /// Size of the resolved-address pool of the upload transport.
    UploadAddressCount,
    /// Size of the resolved-address pool of the download transport.
    DownloadAddressCount,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricName::BytesUp => "bytes_up",
            MetricName::BytesDown => "bytes_down",
            MetricName::TransferSuccess => "transfer_success",
            MetricName::UploadAddressCount => "upload_address_count",
            MetricName::DownloadAddressCount => "download_address_count",
        };
        f.write_str(name)
    }
}

/// Unit of a data point.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricUnit {
    /// A number of bytes.
    Bytes,
    /// A plain count.
    Count,
}

/// A single measurement sample.
#[derive(Clone, Debug)]
pub struct Metric {
    /// What is being measured.
    pub name: MetricName,
    /// Unit of the value.
    pub unit: MetricUnit,
    /// The sampled value.
    pub value: f64,
    /// When the sample was taken.
    pub timestamp: SystemTime,
}

impl Metric {
    /// Creates a sample stamped with the current wall clock.
    pub fn now(name: MetricName, unit: MetricUnit, value: f64) -> Self {
        Self {
            name,
            unit,
            value,
            timestamp: SystemTime::now(),
        }
    }
}

/// Consumer of canary data points.
#[async_trait]
pub trait MetricsPublisher: Send + Sync + fmt::Debug + 'static {
    /// Buffers one data point.
    fn add_data_point(&self, metric: Metric);

    /// Kicks off an asynchronous publish of everything buffered so far.
    fn schedule_publish(&self);

    /// Waits until the most recently scheduled publish has gone out.
    async fn wait_for_last_publish(&self);

    /// Uploads a backup of all data points collected during the run.
    async fn upload_backup(&self);
}
