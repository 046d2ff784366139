use std::env;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tally_log::{LogConfig, LogLevel};
use tally_metrics::{AggregatorServiceConfig, PercentileSpec};

/// Defines the source of a config error
#[derive(Debug)]
enum ConfigErrorSource {
    /// An error occurring independently.
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error in a specific field, either from the file or from an override.
    Field(&'static str),
}

/// Indicates config related errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, thiserror::Error)]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Failed to serialize the configuration.
    #[error("could not write config file")]
    CouldNotWriteFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing JSON failed.
    #[error("could not parse json config file")]
    BadJson,
    /// Invalid config value
    #[error("invalid config value")]
    InvalidValue,
}

/// A configuration error with its origin.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    cause: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            source: ConfigErrorSource::None,
            kind,
            cause: None,
        }
    }

    #[inline]
    fn wrap<E>(cause: E, kind: ConfigErrorKind) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            cause: Some(Box::new(cause)),
            ..Self::new(kind)
        }
    }

    #[inline]
    fn for_field<E>(cause: E, field: &'static str) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::wrap(cause, ConfigErrorKind::InvalidValue).field(field)
    }

    #[inline]
    fn file<P: AsRef<Path>>(mut self, p: P) -> Self {
        self.source = ConfigErrorSource::File(p.as_ref().to_path_buf());
        self
    }

    #[inline]
    fn field(mut self, name: &'static str) -> Self {
        self.source = ConfigErrorSource::Field(name);
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            ConfigErrorSource::None => self.kind.fmt(f),
            ConfigErrorSource::File(file_name) => {
                write!(f, "{} (file {})", self.kind, file_name.display())
            }
            ConfigErrorSource::Field(name) => write!(f, "{} (field {})", self.kind, name),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}

/// Error for a boolean override that is neither `true` nor `false`.
#[derive(Debug, thiserror::Error)]
#[error("expected a boolean, got {0:?}")]
struct ParseBoolError(String);

fn parse_bool(value: &str) -> Result<bool, ParseBoolError> {
    match value.to_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" | "" => Ok(false),
        _ => Err(ParseBoolError(value.to_owned())),
    }
}

/// Expands an address without host, such as `:8125`, to all interfaces.
fn normalize_address(address: String) -> String {
    if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address
    }
}

trait ConfigObject: DeserializeOwned + Serialize {
    /// The basename of the config file.
    fn name() -> &'static str;

    /// The full filename of the config file, including the file extension.
    fn path(base: &Path) -> PathBuf {
        base.join(format!("{}.yml", Self::name()))
    }

    /// Loads the config file from a file within the given directory location.
    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(base);

        let f = fs::File::open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&path))?;

        serde_yaml::from_reader(io::BufReader::new(f))
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(&path))
    }
}

/// Structure used to hold information about configuration overrides via
/// CLI parameters or environment variables
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The UDP address to receive samples on.
    pub address: Option<String>,
    /// The Graphite collector address.
    pub graphite: Option<String>,
    /// The flush interval in seconds.
    pub flush_interval: Option<String>,
    /// "true" if debug mode is enabled, "false" otherwise.
    pub debug: Option<String>,
    /// Number of flushes that report idle counters.
    pub persist_count_keys: Option<String>,
    /// Percentile thresholds for timers. Replaces the configured thresholds if not empty.
    pub percent_thresholds: Vec<String>,
    /// The log level.
    pub log_level: Option<String>,
}

/// Receiving samples.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Listener {
    /// The UDP address to bind to.
    pub address: String,
    /// Receive buffer per datagram. Longer datagrams are truncated.
    pub max_datagram_size: usize,
    /// Number of receive tasks sharing the socket.
    pub listeners: usize,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8125".to_owned(),
            max_datagram_size: 512,
            listeners: 1,
        }
    }
}

/// The downstream Graphite collector.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Collector {
    /// The `host:port` of the Graphite plaintext endpoint.
    pub address: String,
}

impl Default for Collector {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:2003".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct ConfigValues {
    listener: Listener,
    collector: Collector,
    aggregator: AggregatorServiceConfig,
    logging: LogConfig,
}

impl ConfigObject for ConfigValues {
    fn name() -> &'static str {
        "config"
    }
}

impl ConfigValues {
    fn normalize(&mut self) {
        let address = std::mem::take(&mut self.listener.address);
        self.listener.address = normalize_address(address);
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str| {
            Err(ConfigError::new(ConfigErrorKind::InvalidValue).field(field))
        };

        if self.listener.max_datagram_size == 0 {
            return invalid("listener.max_datagram_size");
        }
        if self.listener.listeners == 0 {
            return invalid("listener.listeners");
        }
        if self.aggregator.flush_interval == 0 {
            return invalid("aggregator.flush_interval");
        }
        if self.aggregator.persist_count_keys == 0 {
            return invalid("aggregator.persist_count_keys");
        }
        if self.aggregator.queue_size == 0 {
            return invalid("aggregator.queue_size");
        }

        let thresholds = &self.aggregator.percent_thresholds;
        if thresholds.iter().any(|p| !(0.0..=100.0).contains(&p.ratio)) {
            return invalid("aggregator.percent_thresholds");
        }

        Ok(())
    }
}

/// Config struct.
#[derive(Clone, Debug)]
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl Config {
    /// Loads a config from a given config folder.
    ///
    /// A missing `config.yml` is not an error, in which case all defaults apply.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = env::current_dir()
            .map(|x| x.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        let mut values = if Self::config_exists(&path) {
            ConfigValues::load(&path)?
        } else {
            ConfigValues::default()
        };

        values.normalize();
        values
            .validate()
            .map_err(|e| e.file(ConfigValues::path(&path)))?;

        Ok(Config { values, path })
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        let mut values: ConfigValues = serde_json::from_value(value)
            .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?;

        values.normalize();
        values.validate()?;

        Ok(Config {
            values,
            path: PathBuf::new(),
        })
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters)
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        if let Some(address) = overrides.address {
            self.values.listener.address = normalize_address(address);
        }

        if let Some(graphite) = overrides.graphite {
            self.values.collector.address = graphite;
        }

        let aggregator = &mut self.values.aggregator;

        if let Some(flush_interval) = overrides.flush_interval {
            aggregator.flush_interval = flush_interval
                .parse()
                .map_err(|err| ConfigError::for_field(err, "flush_interval"))?;
        }

        if let Some(debug) = overrides.debug {
            aggregator.debug =
                parse_bool(&debug).map_err(|err| ConfigError::for_field(err, "debug"))?;
        }

        if let Some(persist_count_keys) = overrides.persist_count_keys {
            aggregator.persist_count_keys = persist_count_keys
                .parse()
                .map_err(|err| ConfigError::for_field(err, "persist_count_keys"))?;
        }

        if !overrides.percent_thresholds.is_empty() {
            aggregator.percent_thresholds = overrides
                .percent_thresholds
                .iter()
                .map(|p| p.parse::<PercentileSpec>())
                .collect::<Result<_, _>>()
                .map_err(|err| ConfigError::for_field(err, "percent_threshold"))?;
        }

        if let Some(log_level) = overrides.log_level {
            self.values.logging.level = log_level
                .parse::<LogLevel>()
                .map_err(|err| ConfigError::for_field(err, "log_level"))?;
        }

        self.values.validate()?;
        Ok(self)
    }

    /// Checks if the config is already initialized.
    pub fn config_exists<P: AsRef<Path>>(path: P) -> bool {
        fs::metadata(ConfigValues::path(path.as_ref())).is_ok()
    }

    /// Returns the path of the config folder.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dumps out a YAML string of the values.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile))
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the UDP address to receive samples on.
    pub fn listen_addr(&self) -> &str {
        &self.values.listener.address
    }

    /// Returns the number of UDP sockets to bind.
    pub fn listener_count(&self) -> usize {
        self.values.listener.listeners
    }

    /// Returns the size of the receive buffer for a single datagram.
    pub fn max_datagram_size(&self) -> usize {
        self.values.listener.max_datagram_size
    }

    /// Returns the address of the Graphite collector.
    pub fn collector_addr(&self) -> &str {
        &self.values.collector.address
    }

    /// Returns the configuration of the metrics aggregator.
    pub fn aggregator_config(&self) -> &AggregatorServiceConfig {
        &self.values.aggregator
    }

    /// Returns the interval between two flushes.
    pub fn flush_interval(&self) -> Duration {
        self.values.aggregator.flush_interval()
    }

    /// Returns `true` if flushed lines are logged and failed flushes still reset state.
    pub fn debug(&self) -> bool {
        self.values.aggregator.debug
    }
}
