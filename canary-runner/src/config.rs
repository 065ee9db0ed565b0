//! Configuration for the canary binary.
//!
//! Configuration is merged from three sources, later ones overriding
//! earlier ones:
//!
//! 1. Defaults
//! 2. YAML configuration file (`-c` flag)
//! 3. Environment variables prefixed with `CANARY__`, with `__` denoting
//!    nesting (e.g. `CANARY__TRANSFERS__UP__COUNT=8`)

use std::path::Path;
use std::thread::available_parallelism;
use std::time::Duration;

use anyhow::{Result, bail};
use bytesize::ByteSize;
use canary_core::CanaryOptions;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "CANARY__";

/// Which measurement flow to run.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    /// Raw HTTP download throughput against `http_endpoint`.
    Http,
    /// Single-part object uploads and downloads against `endpoint`.
    SinglePart,
}

/// How this invocation participates in a run.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunMode {
    /// One process doing its own preparation and transfers.
    Standalone,
    /// A coordinator plus one worker task per transfer index, exchanging
    /// addresses over an in-memory channel.
    FanOut,
}

/// Count and concurrency cap of one transfer direction.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct TransferSettings {
    /// Number of transfers to perform.
    pub count: u32,
    /// Maximum number of in-flight transfers.
    pub concurrency: u32,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            count: 1,
            concurrency: 1,
        }
    }
}

/// Transfer settings per direction.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Transfers {
    /// Upload settings.
    pub up: TransferSettings,
    /// Download settings.
    pub down: TransferSettings,
}

/// Runtime configuration for the Tokio async runtime.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of worker threads; defaults to the number of CPU cores.
    pub worker_threads: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            worker_threads: available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

/// Logging configuration. Logs are always written to stderr.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output; `RUST_LOG` overrides this entirely.
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
        }
    }
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Main configuration of the canary binary.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the storage endpoint under test.
    pub endpoint: String,

    /// Endpoint for the raw HTTP measurement; defaults to `endpoint`.
    pub http_endpoint: Option<String>,

    /// Which measurement flow to run.
    pub measurement: Measurement,

    /// How this invocation participates in a run.
    pub mode: RunMode,

    /// Transfer counts and concurrency caps.
    pub transfers: Transfers,

    /// Declared size of uploaded canary objects.
    pub object_size: ByteSize,

    /// Key of the pre-existing object used by download measurements.
    pub download_object_name: String,

    /// Skip the upload measurement entirely.
    pub download_only: bool,

    /// Connection timeout applied to the HTTP connection pools.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Upper bound on pooled connections per host.
    pub max_connections: usize,

    /// Async runtime configuration.
    pub runtime: Runtime,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8888".into(),
            http_endpoint: None,
            measurement: Measurement::SinglePart,
            mode: RunMode::Standalone,
            transfers: Transfers::default(),
            object_size: ByteSize::gib(5),
            download_object_name: "canary-obj-single-part".into(),
            download_only: false,
            connect_timeout: Duration::from_secs(3),
            max_connections: 5000,
            runtime: Runtime::default(),
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file and the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Rejects configurations the orchestrator assumes away.
    pub fn validate(&self) -> Result<()> {
        if self.transfers.up.concurrency == 0 || self.transfers.down.concurrency == 0 {
            bail!("transfer concurrency must be at least 1");
        }

        if let RunMode::FanOut = self.mode {
            if matches!(self.measurement, Measurement::Http) {
                bail!("the http measurement does not support fan-out");
            }
            if !self.download_only && self.transfers.up.count != self.transfers.down.count {
                bail!("fan-out requires equal upload and download transfer counts");
            }
        }

        Ok(())
    }

    /// Number of worker tasks in fan-out mode, one per transfer index.
    pub fn fan_out_workers(&self) -> u32 {
        self.transfers.down.count
    }

    /// The run-level options handed to the canary engine.
    pub fn canary_options(&self) -> CanaryOptions {
        CanaryOptions {
            num_up_transfers: self.transfers.up.count,
            num_up_concurrent: self.transfers.up.concurrency,
            num_down_transfers: self.transfers.down.count,
            num_down_concurrent: self.transfers.down.concurrency,
            download_object_name: self.download_object_name.clone(),
            download_only: self.download_only,
            object_size: self.object_size.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("CANARY__ENDPOINT", "http://storage.internal:9000");
            jail.set_env("CANARY__TRANSFERS__UP__COUNT", "8");
            jail.set_env("CANARY__TRANSFERS__UP__CONCURRENCY", "4");
            jail.set_env("CANARY__DOWNLOAD_ONLY", "true");
            jail.set_env("CANARY__OBJECT_SIZE", "64MiB");

            let config = Config::load(None).unwrap();

            assert_eq!(config.endpoint, "http://storage.internal:9000");
            assert_eq!(config.transfers.up.count, 8);
            assert_eq!(config.transfers.up.concurrency, 4);
            assert!(config.download_only);
            assert_eq!(config.object_size, ByteSize::mib(64));

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            endpoint: http://storage.internal:9000
            measurement: http
            http_endpoint: http://frontend.internal:5001
            mode:
                type: fan_out
            transfers:
                down:
                    count: 16
                    concurrency: 8
            connect_timeout: 5s
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path())).unwrap();

            assert!(matches!(config.measurement, Measurement::Http));
            assert!(matches!(config.mode, RunMode::FanOut));
            assert_eq!(
                config.http_endpoint.as_deref(),
                Some("http://frontend.internal:5001")
            );
            assert_eq!(config.transfers.down.count, 16);
            assert_eq!(config.transfers.down.concurrency, 8);
            assert_eq!(config.connect_timeout, Duration::from_secs(5));
            // Unset sections keep their defaults.
            assert_eq!(config.transfers.up.count, 1);
            assert_eq!(config.max_connections, 5000);

            Ok(())
        });
    }

    #[test]
    fn env_overrides_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(b"endpoint: http://storage.internal:9000\n")
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("CANARY__ENDPOINT", "http://other.internal:9001");

            let config = Config::load(Some(tempfile.path())).unwrap();
            assert_eq!(config.endpoint, "http://other.internal:9001");

            Ok(())
        });
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut config = Config::default();
        config.transfers.up.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_http_fan_out() {
        let mut config = Config::default();
        config.mode = RunMode::FanOut;
        config.measurement = Measurement::Http;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unbalanced_fan_out() {
        let mut config = Config::default();
        config.mode = RunMode::FanOut;
        config.transfers.up.count = 2;
        config.transfers.down.count = 3;
        assert!(config.validate().is_err());

        config.download_only = true;
        assert!(config.validate().is_ok());
    }
}
