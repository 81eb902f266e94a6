use crate::errors::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sensor classes this adaptor knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
    Magnetometer,
    AmbientLight,
}

/// Shape of the samples a kind produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleShape {
    Xyz,
    Magnetic,
    Scalar,
}

impl SensorKind {
    pub const ALL: [SensorKind; 4] = [
        SensorKind::Accelerometer,
        SensorKind::Gyroscope,
        SensorKind::Magnetometer,
        SensorKind::AmbientLight,
    ];

    /// Resolve a kind from an adaptor id or kernel type name.
    ///
    /// Matching is by prefix so that ids like `accelerometer` and kernel
    /// names like `accel_3d` both select the accelerometer.
    pub fn from_identifier(id: &str) -> ConfigResult<Self> {
        let lowered = id.trim().to_ascii_lowercase();
        let kind = if lowered.starts_with("accel") {
            SensorKind::Accelerometer
        } else if lowered.starts_with("gyro") {
            SensorKind::Gyroscope
        } else if lowered.starts_with("mag") {
            SensorKind::Magnetometer
        } else if lowered.starts_with("als") || lowered.starts_with("light") {
            SensorKind::AmbientLight
        } else {
            return Err(ConfigError::UnknownSensorKind { id: id.to_string() });
        };
        Ok(kind)
    }

    /// Type name the kernel declares in the device's `name` attribute
    pub fn kernel_name(self) -> &'static str {
        match self {
            SensorKind::Accelerometer => "accel_3d",
            SensorKind::Gyroscope => "gyro_3d",
            SensorKind::Magnetometer => "magn_3d",
            SensorKind::AmbientLight => "als",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Gyroscope => "gyroscope",
            SensorKind::Magnetometer => "magnetometer",
            SensorKind::AmbientLight => "ambient light sensor",
        }
    }

    pub fn shape(self) -> SampleShape {
        match self {
            SensorKind::Accelerometer | SensorKind::Gyroscope => SampleShape::Xyz,
            SensorKind::Magnetometer => SampleShape::Magnetic,
            SensorKind::AmbientLight => SampleShape::Scalar,
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kernel_name())
    }
}

/// Output slot a channel's value lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputField {
    X,
    Y,
    Z,
    Scalar,
}

impl OutputField {
    /// Field for a channel index; `None` for channels this adaptor does not consume.
    pub fn for_channel(shape: SampleShape, channel: usize) -> Option<Self> {
        match (shape, channel) {
            (SampleShape::Scalar, 0) => Some(OutputField::Scalar),
            (SampleShape::Scalar, _) => None,
            (_, 0) => Some(OutputField::X),
            (_, 1) => Some(OutputField::Y),
            (_, 2) => Some(OutputField::Z),
            _ => None,
        }
    }

    /// Slot of the field in a three-value sample
    pub(crate) fn axis(self) -> usize {
        match self {
            OutputField::X | OutputField::Scalar => 0,
            OutputField::Y => 1,
            OutputField::Z => 2,
        }
    }
}

/// Raw-to-physical conversion rule for one sensor kind
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ConversionPolicy {
    pub unit_factor: f64,
    #[serde(default)]
    pub negate: [bool; 3],
}

impl ConversionPolicy {
    pub fn default_for(kind: SensorKind) -> Self {
        match kind.shape() {
            SampleShape::Xyz | SampleShape::Magnetic => Self {
                unit_factor: 100.0,
                negate: [true, true, true],
            },
            SampleShape::Scalar => Self {
                unit_factor: 1.0,
                negate: [false; 3],
            },
        }
    }

    pub fn apply(&self, field: OutputField, calibrated: f64) -> f64 {
        let value = calibrated * self.unit_factor;
        if self.negate[field.axis()] {
            -value
        } else {
            value
        }
    }
}

/// Per-kind conversion policies, defaults overridable from configuration
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    overrides: HashMap<SensorKind, ConversionPolicy>,
}

impl PolicyTable {
    pub fn with_override(mut self, kind: SensorKind, policy: ConversionPolicy) -> Self {
        self.overrides.insert(kind, policy);
        self
    }

    pub fn policy(&self, kind: SensorKind) -> ConversionPolicy {
        self.overrides
            .get(&kind)
            .copied()
            .unwrap_or_else(|| ConversionPolicy::default_for(kind))
    }
}
