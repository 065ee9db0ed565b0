//! The measurement engine: issuance loop and full canary flows.

use std::sync::Arc;

use tracing::info;

use crate::coordination::{ExchangeChannel, MeasurementRun, ProcessRole};
use crate::error::MeasurementError;
use crate::executor::{
    HttpDownloadExecutor, ObjectDownloadExecutor, ObjectUploadExecutor, TransferExecutor,
};
use crate::gate::CompletionGate;
use crate::metrics::{Metric, MetricName, MetricUnit, MetricsPublisher};
use crate::pulse::MetricsPulse;
use crate::record::{TransferRecord, TransferStatus};
use crate::task::TransferTask;
use crate::transport::Transport;

/// Declared size of single-part canary objects.
pub const SINGLE_PART_OBJECT_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Boolean switches modifying a measurement run. Both default to off.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MeasurementFlags {
    /// Skip warming the transport's address cache before the run.
    pub dont_warm_address_cache: bool,
    /// Use the key prefix verbatim instead of appending a numeric suffix.
    pub no_key_suffix: bool,
}

/// Immutable description of one measurement run.
///
/// The caller is responsible for validity: `concurrency` must be at least 1.
#[derive(Clone, Debug)]
pub struct MeasurementConfig {
    /// Prefix of object keys; used verbatim with
    /// [`no_key_suffix`](MeasurementFlags::no_key_suffix).
    pub filename_prefix: String,
    /// Prefix of the exchange-channel keys of this run.
    pub key_prefix: String,
    /// Number of transfers to perform.
    pub num_transfers: u32,
    /// Concurrency cap: the maximum number of in-flight transfers.
    pub concurrency: u32,
    /// Declared object size of each transfer.
    pub object_size: u64,
    /// Behavior switches.
    pub flags: MeasurementFlags,
}

/// Sequence of numeric key suffixes shared across cooperating processes.
///
/// The counter starts at `max - process_index` and counts down; instead of
/// reaching zero it wraps back to `max`. Distinct process indices therefore
/// produce interleaved, non-colliding suffixes as long as the keyspace is
/// large relative to the transfer count. That is carried-over policy, not a
/// proven guarantee.
#[derive(Clone, Debug)]
pub struct SuffixSequence {
    counter: u64,
    max: u64,
}

impl SuffixSequence {
    /// Creates the production sequence over the full `i64` keyspace.
    pub fn new(process_index: u32) -> Self {
        Self::with_max(process_index, i64::MAX as u64)
    }

    /// Same as [`new`](Self::new) with an explicit wrap point.
    pub fn with_max(process_index: u32, max: u64) -> Self {
        Self {
            counter: max - u64::from(process_index),
            max,
        }
    }

    /// Returns the next suffix in the sequence.
    pub fn next_suffix(&mut self) -> u64 {
        if self.counter == 0 {
            self.counter = self.max;
        }
        let value = self.counter;
        self.counter -= 1;
        value
    }
}

/// Issues all transfers of a run, bounded by the concurrency cap.
///
/// Transfers are issued in ascending index order; completion order is
/// unconstrained. Transfer failures are absorbed into the records and never
/// abort the loop.
pub(crate) async fn run_issuance_loop(
    config: &MeasurementConfig,
    process_index: u32,
    executor: Arc<dyn TransferExecutor>,
    records: &[Arc<TransferRecord>],
) {
    info!("starting performance measurement");

    let gate = CompletionGate::new();
    let mut suffixes = SuffixSequence::new(process_index);

    for index in 0..config.num_transfers {
        let key = if config.flags.no_key_suffix {
            config.filename_prefix.clone()
        } else {
            format!("{}{}", config.filename_prefix, suffixes.next_suffix())
        };

        let ticket = gate.issue();
        info!(
            index,
            in_flight = gate.in_flight(),
            cap = config.concurrency,
            completed = gate.completed(),
            total = config.num_transfers,
            "beginning transfer"
        );

        let task = TransferTask::new(
            index,
            key,
            config.object_size,
            Arc::clone(&records[index as usize]),
            ticket,
        );
        let executor = Arc::clone(&executor);
        tokio::spawn(async move { executor.execute(task).await });

        gate.wait_for_slot(config.concurrency).await;
    }

    gate.wait_for_all(config.num_transfers).await;
}

/// Runs one measurement, handling role-specific preparation and signaling.
///
/// Standalone processes warm their address cache (unless flagged off), spawn
/// connection pools and run the issuance loop. Coordinators only exchange
/// addresses and completion signals; workers receive their address, seed the
/// transport, run the loop and signal completion. `transport` may be `None`
/// when the executor brings its own client and no preparation is needed.
pub async fn perform_measurement(
    config: &MeasurementConfig,
    role: &ProcessRole,
    exchange: &dyn ExchangeChannel,
    transport: Option<Arc<dyn Transport>>,
    executor: Arc<dyn TransferExecutor>,
    records: &[Arc<TransferRecord>],
) -> Result<(), MeasurementError> {
    let run = MeasurementRun {
        config,
        exchange,
        transport,
        executor,
        records,
    };
    role.strategy().run(run).await
}

/// Run-level options of the canary flows.
#[derive(Clone, Debug)]
pub struct CanaryOptions {
    /// Number of upload transfers.
    pub num_up_transfers: u32,
    /// Concurrency cap for uploads.
    pub num_up_concurrent: u32,
    /// Number of download transfers.
    pub num_down_transfers: u32,
    /// Concurrency cap for downloads.
    pub num_down_concurrent: u32,
    /// Key of the pre-existing object downloaded by download measurements.
    pub download_object_name: String,
    /// Skip the upload measurement entirely.
    pub download_only: bool,
    /// Declared size of canary objects.
    pub object_size: u64,
}

impl Default for CanaryOptions {
    fn default() -> Self {
        Self {
            num_up_transfers: 1,
            num_up_concurrent: 1,
            num_down_transfers: 1,
            num_down_concurrent: 1,
            download_object_name: "canary-obj-single-part".into(),
            download_only: false,
            object_size: SINGLE_PART_OBJECT_SIZE,
        }
    }
}

/// Top-level canary driving complete measurement flows.
///
/// Owns the metrics publisher, the upload/download transports, the process
/// role and the metrics pulse. The pulse is started on construction for
/// every role except workers and cancelled when a flow finishes.
#[derive(Debug)]
pub struct TransferCanary {
    publisher: Arc<dyn MetricsPublisher>,
    upload_transport: Arc<dyn Transport>,
    download_transport: Arc<dyn Transport>,
    exchange: Arc<dyn ExchangeChannel>,
    role: ProcessRole,
    options: CanaryOptions,
    pulse: Option<MetricsPulse>,
}

impl TransferCanary {
    /// Creates the canary and starts the metrics pulse unless this process
    /// is a worker.
    pub fn new(
        publisher: Arc<dyn MetricsPublisher>,
        upload_transport: Arc<dyn Transport>,
        download_transport: Arc<dyn Transport>,
        exchange: Arc<dyn ExchangeChannel>,
        role: ProcessRole,
        options: CanaryOptions,
    ) -> Self {
        let pulse = (!role.is_worker()).then(|| {
            MetricsPulse::start(
                Arc::clone(&publisher),
                vec![
                    (MetricName::UploadAddressCount, Arc::clone(&upload_transport)),
                    (
                        MetricName::DownloadAddressCount,
                        Arc::clone(&download_transport),
                    ),
                ],
            )
        });

        Self {
            publisher,
            upload_transport,
            download_transport,
            exchange,
            role,
            options,
            pulse,
        }
    }

    /// Measures raw HTTP download throughput against the given transport.
    ///
    /// Uses the download object name verbatim as the request path and skips
    /// address-cache warm-up; the transport is expected to be ready.
    pub async fn measure_http_transfer(
        &mut self,
        http: Arc<dyn Transport>,
    ) -> Result<(), MeasurementError> {
        let config = MeasurementConfig {
            filename_prefix: self.options.download_object_name.clone(),
            key_prefix: "httpTransferDown-".into(),
            num_transfers: self.options.num_down_transfers,
            concurrency: self.options.num_down_concurrent,
            object_size: self.options.object_size,
            flags: MeasurementFlags {
                dont_warm_address_cache: true,
                no_key_suffix: true,
            },
        };

        let records = make_records(config.num_transfers, config.object_size);
        let executor = Arc::new(HttpDownloadExecutor::new(http));
        perform_measurement(
            &config,
            &self.role,
            self.exchange.as_ref(),
            None,
            executor,
            &records,
        )
        .await?;

        self.flush_down_metrics(&records);
        self.publish_and_backup().await;
        Ok(())
    }

    /// Measures single-part object upload and download throughput.
    ///
    /// Runs the upload measurement first (unless `download_only`), flushes
    /// and publishes its metrics, then runs the download measurement against
    /// the configured download object.
    pub async fn measure_single_part_object_transfer(&mut self) -> Result<(), MeasurementError> {
        info!(
            up = self.options.num_up_transfers,
            up_concurrent = self.options.num_up_concurrent,
            down = self.options.num_down_transfers,
            down_concurrent = self.options.num_down_concurrent,
            "measurements"
        );

        if !self.options.download_only {
            let config = MeasurementConfig {
                filename_prefix: "canary-obj-single-part".into(),
                key_prefix: "singlePartObjectUp-".into(),
                num_transfers: self.options.num_up_transfers,
                concurrency: self.options.num_up_concurrent,
                object_size: self.options.object_size,
                flags: MeasurementFlags::default(),
            };

            let records = make_records(config.num_transfers, config.object_size);
            let executor = Arc::new(ObjectUploadExecutor::new(Arc::clone(&self.upload_transport)));
            perform_measurement(
                &config,
                &self.role,
                self.exchange.as_ref(),
                Some(Arc::clone(&self.upload_transport)),
                executor,
                &records,
            )
            .await?;

            self.flush_up_metrics(&records);
            info!("flushing metrics");
            self.publisher.schedule_publish();
            self.publisher.wait_for_last_publish().await;
            info!("metrics flushed");
        }

        let config = MeasurementConfig {
            filename_prefix: self.options.download_object_name.clone(),
            key_prefix: "singlePartObjectDown-".into(),
            num_transfers: self.options.num_down_transfers,
            concurrency: self.options.num_down_concurrent,
            object_size: self.options.object_size,
            flags: MeasurementFlags {
                dont_warm_address_cache: false,
                no_key_suffix: true,
            },
        };

        let records = make_records(config.num_transfers, config.object_size);
        let executor = Arc::new(ObjectDownloadExecutor::new(Arc::clone(
            &self.download_transport,
        )));
        perform_measurement(
            &config,
            &self.role,
            self.exchange.as_ref(),
            Some(Arc::clone(&self.download_transport)),
            executor,
            &records,
        )
        .await?;

        self.flush_down_metrics(&records);
        self.publish_and_backup().await;
        Ok(())
    }

    fn flush_up_metrics(&self, records: &[Arc<TransferRecord>]) {
        for record in records {
            self.publisher.add_data_point(Metric::now(
                MetricName::BytesUp,
                MetricUnit::Bytes,
                record.bytes_up() as f64,
            ));
            self.flush_success(record);
        }
    }

    fn flush_down_metrics(&self, records: &[Arc<TransferRecord>]) {
        for record in records {
            self.publisher.add_data_point(Metric::now(
                MetricName::BytesDown,
                MetricUnit::Bytes,
                record.bytes_down() as f64,
            ));
            self.flush_success(record);
        }
    }

    fn flush_success(&self, record: &TransferRecord) {
        let success = record.status() == TransferStatus::Success;
        self.publisher.add_data_point(Metric::now(
            MetricName::TransferSuccess,
            MetricUnit::Count,
            f64::from(u8::from(success)),
        ));
    }

    async fn publish_and_backup(&mut self) {
        if let Some(pulse) = self.pulse.take() {
            pulse.shutdown().await;
        }

        info!("flushing metrics");
        self.publisher.schedule_publish();
        self.publisher.wait_for_last_publish().await;
        info!("metrics flushed");

        info!("uploading backup");
        self.publisher.upload_backup().await;
        info!("backup uploaded");
    }
}

fn make_records(num_transfers: u32, object_size: u64) -> Vec<Arc<TransferRecord>> {
    (0..num_transfers)
        .map(|index| Arc::new(TransferRecord::new(index, 1, object_size)))
        .collect()
}
