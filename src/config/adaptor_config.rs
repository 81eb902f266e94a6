use crate::adaptor::{DEFAULT_INTERVAL_MS, INTERVAL_RANGE_MS};
use crate::enabler::DEFAULT_BUFFER_LENGTH;
use crate::errors::{ConfigError, ConfigResult};
use crate::kinds::{ConversionPolicy, PolicyTable, SensorKind};
use crate::locator::IIO_SYSFS_BASE;
use crate::sink::DEFAULT_RING_CAPACITY;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::PathBuf;

/// Root configuration, one `[[sensor]]` section per adaptor
#[derive(Debug, Deserialize)]
pub struct AdaptorConfig {
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,
    #[serde(default = "default_buffer_length")]
    pub buffer_length: usize,
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,
    #[serde(rename = "sensor", default)]
    pub sensors: Vec<SensorEntry>,
    /// Conversion policy overrides keyed by kind or kernel type name
    #[serde(default)]
    pub policy: BTreeMap<String, ConversionPolicy>,
}

/// One sensor entry, matching each `[[sensor]]` section
#[derive(Debug, Deserialize)]
pub struct SensorEntry {
    pub id: String,
    /// Explicit kind; derived from `id` when absent
    pub kind: Option<String>,
    pub interval_ms: Option<u64>,
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from(IIO_SYSFS_BASE)
}

fn default_buffer_length() -> usize {
    DEFAULT_BUFFER_LENGTH
}

fn default_ring_capacity() -> usize {
    DEFAULT_RING_CAPACITY
}

impl SensorEntry {
    pub fn sensor_kind(&self) -> ConfigResult<SensorKind> {
        SensorKind::from_identifier(self.kind.as_deref().unwrap_or(&self.id))
    }

    pub fn interval(&self) -> u64 {
        self.interval_ms.unwrap_or(DEFAULT_INTERVAL_MS)
    }
}

impl AdaptorConfig {
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let parsed: AdaptorConfig = toml::from_str(content)?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn policy_table(&self) -> ConfigResult<PolicyTable> {
        self.policy.iter().try_fold(PolicyTable::default(), |table, (key, policy)| {
            Ok(table.with_override(SensorKind::from_identifier(key)?, *policy))
        })
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.buffer_length == 0 {
            return Err(invalid("buffer_length", "must be greater than zero"));
        }

        let mut ids = HashSet::new();
        for sensor in &self.sensors {
            if !ids.insert(sensor.id.as_str()) {
                return Err(invalid("sensor.id", &format!("duplicate id '{}'", sensor.id)));
            }
            sensor.sensor_kind()?;
            if !INTERVAL_RANGE_MS.contains(&sensor.interval()) {
                return Err(invalid(
                    "sensor.interval_ms",
                    &format!("{} is outside the supported range", sensor.interval()),
                ));
            }
        }

        for (key, policy) in &self.policy {
            SensorKind::from_identifier(key)?;
            if !policy.unit_factor.is_finite() || policy.unit_factor == 0.0 {
                return Err(invalid("policy.unit_factor", &format!("unusable value for '{}'", key)));
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Loads config from TOML file
pub fn load_adaptor_config(path: &str) -> ConfigResult<AdaptorConfig> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::LoadError {
        path: path.to_string(),
        source,
    })?;
    AdaptorConfig::from_toml(&content)
}
