//! Producer configuration.
//!
//! Settings come from a YAML file (every section optional), then environment
//! variables, which take precedence. [`Config::load`] does all three steps:
//! read, override, validate.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use txn_core::{Compression, ReferencePaths, SinkKind};

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// An environment override could not be parsed.
    #[error("Invalid value '{value}' for {var}: {reason}")]
    InvalidOverride {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which file sinks the `output.format` selector allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    #[default]
    Parquet,
    Both,
}

impl OutputFormat {
    pub fn includes_csv(&self) -> bool {
        matches!(self, OutputFormat::Csv | OutputFormat::Both)
    }

    pub fn includes_parquet(&self) -> bool {
        matches!(self, OutputFormat::Parquet | OutputFormat::Both)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Csv => write!(f, "csv"),
            OutputFormat::Parquet => write!(f, "parquet"),
            OutputFormat::Both => write!(f, "both"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "parquet" => Ok(OutputFormat::Parquet),
            "both" => Ok(OutputFormat::Both),
            _ => Err(format!("Unknown output format: {s} (expected csv, parquet or both)")),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub producer: ProducerConfig,
    pub output: OutputConfig,
    pub kafka: KafkaConfig,
    pub data: DataConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Records to generate; 0 runs until cancelled.
    pub message_count: u64,
    pub workers: usize,
    /// Capacity of each sink's input queue.
    pub buffer_size: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            message_count: 0,
            workers: 4,
            buffer_size: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub directory: PathBuf,
    pub csv: CsvConfig,
    pub parquet: ParquetConfig,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            directory: PathBuf::from("/app/output"),
            csv: CsvConfig::default(),
            parquet: ParquetConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    pub enabled: bool,
    pub filename: String,
    pub buffer_size: usize,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filename: "transactions.csv".to_string(),
            buffer_size: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParquetConfig {
    pub enabled: bool,
    pub filename: String,
    pub row_group_size: usize,
    pub compression: Compression,
}

impl Default for ParquetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filename: "transactions.parquet".to_string(),
            row_group_size: 50_000,
            compression: Compression::Snappy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub enabled: bool,
    pub brokers: Vec<String>,
    pub topic: String,
    pub compression: Compression,
    pub batch_size: usize,
    /// Maximum batching delay in milliseconds.
    pub flush_frequency: u64,
    #[serde(rename = "async")]
    pub async_delivery: bool,
}

impl KafkaConfig {
    pub fn flush_frequency(&self) -> Duration {
        Duration::from_millis(self.flush_frequency)
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            brokers: vec!["localhost:9092".to_string()],
            topic: "transactions".to_string(),
            compression: Compression::Snappy,
            batch_size: 5000,
            flush_frequency: 100,
            async_delivery: true,
        }
    }
}

/// Reference table file locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub currency_rates: PathBuf,
    pub agents: PathBuf,
    pub game_categories: PathBuf,
    pub currencies: PathBuf,
}

impl DataConfig {
    pub fn reference_paths(&self) -> ReferencePaths {
        ReferencePaths {
            currencies: self.currencies.clone(),
            currency_rates: self.currency_rates.clone(),
            agents: self.agents.clone(),
            game_categories: self.game_categories.clone(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        let defaults = ReferencePaths::in_dir("/app/data");
        Self {
            currency_rates: defaults.currency_rates,
            agents: defaults.agents,
            game_categories: defaults.game_categories,
            currencies: defaults.currencies,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between periodic reports.
    pub interval: u64,
    pub detailed: bool,
}

impl MetricsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval: 5,
            detailed: true,
        }
    }
}

impl Config {
    /// Load from `path`, apply environment overrides and validate.
    ///
    /// A missing file is not an error: built-in defaults are used instead.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            warn!(
                config_path = %path.display(),
                "Config file not found, using defaults with environment overrides"
            );
            Config::default()
        };

        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document without overrides or validation.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    ///
    /// Unset and empty variables leave the current value in place.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PRODUCER_MESSAGE_COUNT") {
            self.producer.message_count = parse_var("PRODUCER_MESSAGE_COUNT", &v)?;
        }
        if let Some(v) = get("PRODUCER_WORKERS") {
            self.producer.workers = parse_var("PRODUCER_WORKERS", &v)?;
        }
        if let Some(v) = get("PRODUCER_BUFFER_SIZE") {
            self.producer.buffer_size = parse_var("PRODUCER_BUFFER_SIZE", &v)?;
        }

        if let Some(v) = get("OUTPUT_FORMAT") {
            self.output.format = parse_var("OUTPUT_FORMAT", &v)?;
        }
        if let Some(v) = get("OUTPUT_DIRECTORY") {
            self.output.directory = PathBuf::from(v);
        }

        if let Some(v) = get("CSV_ENABLED") {
            self.output.csv.enabled = parse_bool("CSV_ENABLED", &v)?;
        }
        if let Some(v) = get("CSV_FILENAME") {
            self.output.csv.filename = v;
        }
        if let Some(v) = get("CSV_BUFFER_SIZE") {
            self.output.csv.buffer_size = parse_var("CSV_BUFFER_SIZE", &v)?;
        }

        if let Some(v) = get("PARQUET_ENABLED") {
            self.output.parquet.enabled = parse_bool("PARQUET_ENABLED", &v)?;
        }
        if let Some(v) = get("PARQUET_FILENAME") {
            self.output.parquet.filename = v;
        }
        if let Some(v) = get("PARQUET_ROW_GROUP_SIZE") {
            self.output.parquet.row_group_size = parse_var("PARQUET_ROW_GROUP_SIZE", &v)?;
        }
        if let Some(v) = get("PARQUET_COMPRESSION") {
            self.output.parquet.compression = parse_var("PARQUET_COMPRESSION", &v)?;
        }

        if let Some(v) = get("KAFKA_ENABLED") {
            self.kafka.enabled = parse_bool("KAFKA_ENABLED", &v)?;
        }
        if let Some(v) = get("KAFKA_BROKERS") {
            self.kafka.brokers = v
                .split(',')
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = get("KAFKA_TOPIC") {
            self.kafka.topic = v;
        }
        if let Some(v) = get("KAFKA_COMPRESSION") {
            self.kafka.compression = parse_var("KAFKA_COMPRESSION", &v)?;
        }
        if let Some(v) = get("KAFKA_BATCH_SIZE") {
            self.kafka.batch_size = parse_var("KAFKA_BATCH_SIZE", &v)?;
        }
        if let Some(v) = get("KAFKA_FLUSH_FREQUENCY") {
            self.kafka.flush_frequency = parse_var("KAFKA_FLUSH_FREQUENCY", &v)?;
        }
        if let Some(v) = get("KAFKA_ASYNC") {
            self.kafka.async_delivery = parse_bool("KAFKA_ASYNC", &v)?;
        }

        if let Some(v) = get("DATA_CURRENCY_RATES") {
            self.data.currency_rates = PathBuf::from(v);
        }
        if let Some(v) = get("DATA_AGENTS") {
            self.data.agents = PathBuf::from(v);
        }
        if let Some(v) = get("DATA_GAME_CATEGORIES") {
            self.data.game_categories = PathBuf::from(v);
        }
        if let Some(v) = get("DATA_CURRENCIES") {
            self.data.currencies = PathBuf::from(v);
        }

        if let Some(v) = get("METRICS_INTERVAL") {
            self.metrics.interval = parse_var("METRICS_INTERVAL", &v)?;
        }
        if let Some(v) = get("METRICS_DETAILED") {
            self.metrics.detailed = parse_bool("METRICS_DETAILED", &v)?;
        }

        Ok(())
    }

    /// Check ranges and cross-field requirements.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.producer.workers == 0 {
            return invalid("producer.workers must be positive");
        }
        if self.producer.buffer_size == 0 {
            return invalid("producer.buffer_size must be positive");
        }
        if self.output.csv.buffer_size == 0 {
            return invalid("output.csv.buffer_size must be positive");
        }
        if self.output.parquet.row_group_size == 0 {
            return invalid("output.parquet.row_group_size must be positive");
        }
        if self.metrics.interval == 0 {
            return invalid("metrics.interval must be positive");
        }
        if self.kafka.enabled {
            if self.kafka.brokers.iter().all(|b| b.trim().is_empty()) {
                return invalid("kafka.brokers cannot be empty when kafka is enabled");
            }
            if self.kafka.topic.trim().is_empty() {
                return invalid("kafka.topic cannot be empty when kafka is enabled");
            }
            if self.kafka.batch_size == 0 {
                return invalid("kafka.batch_size must be positive");
            }
        }
        if self.active_sinks().is_empty() {
            return invalid(
                "no sink is active: enable csv or parquet matching output.format, or enable kafka",
            );
        }
        Ok(())
    }

    /// Sinks this configuration enables, in construction order.
    pub fn active_sinks(&self) -> Vec<SinkKind> {
        let mut sinks = Vec::new();
        if self.output.csv.enabled && self.output.format.includes_csv() {
            sinks.push(SinkKind::Csv);
        }
        if self.output.parquet.enabled && self.output.format.includes_parquet() {
            sinks.push(SinkKind::Parquet);
        }
        if self.kafka.enabled {
            sinks.push(SinkKind::Kafka);
        }
        sinks
    }

    /// True when generation runs until cancelled.
    pub fn is_continuous(&self) -> bool {
        self.producer.message_count == 0
    }
}

fn parse_var<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidOverride {
            var,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidOverride {
            var,
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}
