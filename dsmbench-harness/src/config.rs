//! Configuration for the benchmark.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Command line arguments (node count, read ratio, thread count, `--verify`, `--duration`)
//! 2. Environment variables (prefixed with `DSMBENCH__`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! See [`Config`] for a description of all configuration fields and their defaults.
//!
//! # Environment Variables
//!
//! Environment variables use `DSMBENCH__` as a prefix and double underscores (`__`) to denote
//! nested configuration structures. For example:
//!
//! - `DSMBENCH__KEY_SPACE=1048576` shrinks the key space to 1 Mi keys
//! - `DSMBENCH__ZIPF_THETA=0.99` selects a heavily skewed workload
//! - `DSMBENCH__LOGGING__LEVEL=debug` raises log verbosity
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! key_space: 1048576
//! zipf_theta: 0.99
//!
//! logging:
//!   level: debug
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use dsmbench_workload::ZipfGenerator;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::error::ConfigError;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "DSMBENCH__";

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
///
/// Parsing ignores case, and an empty string selects [`LogFormat::Auto`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2025-03-04T12:10:32.112Z  INFO dsmbench_harness::coordinator: warm-up finished node=0
    /// ```
    Simplified,

    /// Dump out JSON lines.
    Json,
}

/// The logging format parse error.
#[derive(Clone, Debug)]
pub struct FormatParseError(String);

impl fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as format: expected one of "auto", "pretty", "simplified", "json""#,
            self.0
        )
    }
}

impl std::str::FromStr for LogFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "" => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("auto") => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            s if s.eq_ignore_ascii_case("simplified") => LogFormat::Simplified,
            s if s.eq_ignore_ascii_case("json") => LogFormat::Json,
            s => return Err(FormatParseError(s.into())),
        };

        Ok(result)
    }
}

impl std::error::Error for FormatParseError {}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Auto => "auto",
            LogFormat::Pretty => "pretty",
            LogFormat::Simplified => "simplified",
            LogFormat::Json => "json",
        })
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

/// Logging configuration.
///
/// Logs are always written to stderr. Benchmark results go to stdout and are not affected by
/// this configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// Valid levels in increasing severity: TRACE, DEBUG, INFO, WARN, ERROR, OFF. A `RUST_LOG`
    /// environment variable takes precedence if set.
    ///
    /// # Default
    ///
    /// `INFO`
    ///
    /// # Environment Variable
    ///
    /// `DSMBENCH__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format. See [`LogFormat`] for available options.
    ///
    /// # Default
    ///
    /// `Auto` (pretty for TTY, simplified otherwise)
    ///
    /// # Environment Variable
    ///
    /// `DSMBENCH__LOGGING__FORMAT`
    #[serde(with = "display_fromstr")]
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for the benchmark.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Number of nodes in the cluster.
    ///
    /// All nodes run in-process and share one index.
    ///
    /// # Default
    ///
    /// `1`
    pub node_count: usize,

    /// Number of worker threads per node.
    ///
    /// # Default
    ///
    /// `1`
    pub thread_count: usize,

    /// Percentage of measured requests that are reads; the rest are writes.
    ///
    /// # Default
    ///
    /// `50`
    pub read_ratio: u8,

    /// Number of distinct keys requests are spread over.
    ///
    /// This is also the size of the Zipf universe, so every worker pays a one-time normalization
    /// pass proportional to it before its first request.
    ///
    /// # Default
    ///
    /// `67108864` (64 Mi)
    pub key_space: u64,

    /// Fraction of the key space inserted during warm-up.
    ///
    /// # Default
    ///
    /// `0.8`
    pub warmup_ratio: f64,

    /// Skew of the key distribution.
    ///
    /// `0` is uniform, values towards `1` concentrate requests on few hot keys. `-1` iterates
    /// over all keys in order and values of `40` and above only ever request the hottest key.
    ///
    /// # Default
    ///
    /// `0.0`
    ///
    /// # Environment Variable
    ///
    /// `DSMBENCH__ZIPF_THETA`
    pub zipf_theta: f64,

    /// Number of keys node 0 loads before the benchmark starts.
    ///
    /// # Default
    ///
    /// `1024000`
    pub preload_keys: u64,

    /// Preload keys drawn at random from `1..=preload_keys` instead of every key in order.
    ///
    /// Random draws repeat some keys and miss others, so fewer than `preload_keys` distinct keys
    /// end up in the index. This turns the preload into a bulk write load with duplicates.
    ///
    /// # Default
    ///
    /// `false`
    pub preload_random: bool,

    /// Interval at which throughput is sampled and reported.
    ///
    /// # Default
    ///
    /// `2s`
    #[serde(with = "humantime_serde")]
    pub report_interval: Duration,

    /// Latency percentiles are reported every this many intervals.
    ///
    /// # Default
    ///
    /// `3`
    pub latency_report_every: u32,

    /// Number of 100ns latency buckets per worker. Slower requests end up in the last bucket.
    ///
    /// # Default
    ///
    /// `1000000` (100ms)
    pub latency_buckets: usize,

    /// Pin each worker thread to its own core.
    ///
    /// # Default
    ///
    /// `true`
    pub pin_threads: bool,

    /// Give up on a cluster collective after this long.
    ///
    /// Without a timeout, a node that never arrives at a barrier hangs the cluster.
    ///
    /// # Default
    ///
    /// None (wait forever)
    #[serde(default, with = "humantime_serde")]
    pub barrier_timeout: Option<Duration>,

    /// Stop measuring after this long.
    ///
    /// The run is rounded up to whole report intervals so that all nodes stop after the same
    /// number of samples.
    ///
    /// # Default
    ///
    /// None (run until killed)
    #[serde(default, with = "humantime_serde")]
    pub duration: Option<Duration>,

    /// Check the index for correctness on node 0 before the benchmark.
    ///
    /// # Default
    ///
    /// `false`
    pub verify: bool,

    /// Number of keys the verification pass writes.
    ///
    /// # Default
    ///
    /// `10240`
    pub verify_keys: u64,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_count: 1,
            thread_count: 1,
            read_ratio: 50,
            key_space: 64 * 1024 * 1024,
            warmup_ratio: 0.8,
            zipf_theta: 0.0,
            preload_keys: 1_024_000,
            preload_random: false,
            report_interval: Duration::from_secs(2),
            latency_report_every: 3,
            latency_buckets: 1_000_000,
            pin_threads: true,
            barrier_timeout: None,
            duration: None,
            verify: false,
            verify_keys: 10_240,
            logging: Logging::default(),
        }
    }
}

/// Values given on the command line, which override all other sources.
#[derive(Debug, Default, Serialize)]
pub struct Overrides {
    /// Number of nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_count: Option<usize>,
    /// Read percentage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_ratio: Option<u8>,
    /// Threads per node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_count: Option<usize>,
    /// Enables the verification pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<bool>,
    /// Bounds the measurement phase.
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "humantime_serde"
    )]
    pub duration: Option<Duration>,
}

impl Config {
    /// Loads configuration from the provided arguments.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided)
    /// 3. Environment variables (prefixed with `DSMBENCH__`)
    /// 4. Command line overrides
    ///
    /// The result is not validated, see [`Config::validate`].
    pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides))
            .extract()?;

        Ok(config)
    }

    /// Checks the configuration for values the benchmark cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_count == 0 {
            return Err(ConfigError::NoNodes);
        }
        if self.thread_count == 0 {
            return Err(ConfigError::NoThreads);
        }
        if self.read_ratio > 100 {
            return Err(ConfigError::ReadRatio(self.read_ratio));
        }
        if !(0.0..=1.0).contains(&self.warmup_ratio) {
            return Err(ConfigError::WarmupRatio(self.warmup_ratio));
        }
        if self.key_space == 0 {
            return Err(ConfigError::EmptyKeySpace);
        }
        if self.latency_buckets == 0 {
            return Err(ConfigError::NoLatencyBuckets);
        }
        if self.report_interval.is_zero() {
            return Err(ConfigError::ReportInterval);
        }
        if self.latency_report_every == 0 {
            return Err(ConfigError::LatencyReportEvery);
        }

        // Normalization is lazy, so this only checks the parameters.
        ZipfGenerator::new(self.key_space, self.zipf_theta, 0)?;

        Ok(())
    }

    /// Total number of worker threads across the cluster.
    pub fn total_threads(&self) -> usize {
        self.node_count * self.thread_count
    }

    /// Exclusive upper bound of the sequence numbers inserted during warm-up.
    pub fn warmup_end(&self) -> u64 {
        (self.warmup_ratio * self.key_space as f64) as u64
    }

    /// Number of report intervals after which the run stops, if bounded.
    pub fn intervals(&self) -> Option<u64> {
        let duration = self.duration?;
        let interval = self.report_interval.as_nanos().max(1);
        let count = duration.as_nanos().div_ceil(interval).max(1);
        Some(u64::try_from(count).unwrap_or(u64::MAX))
    }
}
