use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Instant;

static CLOCK_EPOCH: OnceLock<Instant> = OnceLock::new();

/// Anchor the sample clock. Called at startup; later calls keep the first epoch.
pub fn start_clock() {
    CLOCK_EPOCH.get_or_init(Instant::now);
}

/// Microseconds on a monotonic clock shared by the whole process.
/// Never returns 0, which marks an unset timestamp.
pub fn monotonic_micros() -> u64 {
    let elapsed = CLOCK_EPOCH.get_or_init(Instant::now).elapsed().as_micros() as u64;
    elapsed.max(1)
}

/// Three-axis vector sample (acceleration, angular rate)
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct XyzSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Monotonic capture time in microseconds
    pub timestamp_us: u64,
}

/// Magnetic field sample
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct MagneticSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp_us: u64,
}

/// Single-value sample (illuminance)
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct ScalarSample {
    pub value: f64,
    pub timestamp_us: u64,
}

/// One completed capture cycle
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub enum Sample {
    Xyz(XyzSample),
    Magnetic(MagneticSample),
    Scalar(ScalarSample),
}

impl Sample {
    pub fn timestamp_us(&self) -> u64 {
        match self {
            Sample::Xyz(s) => s.timestamp_us,
            Sample::Magnetic(s) => s.timestamp_us,
            Sample::Scalar(s) => s.timestamp_us,
        }
    }

    /// Serialize to JSON for debugging
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
