//! Conversion of raw channel reads into physical samples.
//!
//! Channel files are read one at a time, so a cycle is not a hardware
//! snapshot. A sample is assembled from the reads of channels
//! `0..channel_count` and published when the last one arrives.

use crate::enabler::{ChannelBindings, ChannelKey};
use crate::kinds::{ConversionPolicy, OutputField, SampleShape, SensorKind};
use crate::locator::CalibrationConstants;
use crate::samples::{monotonic_micros, MagneticSample, Sample, ScalarSample, XyzSample};
use tracing::{trace, warn};

type Assemble = fn([f64; 3], u64) -> Sample;

fn assemble_xyz(v: [f64; 3], timestamp_us: u64) -> Sample {
    Sample::Xyz(XyzSample { x: v[0], y: v[1], z: v[2], timestamp_us })
}

fn assemble_magnetic(v: [f64; 3], timestamp_us: u64) -> Sample {
    Sample::Magnetic(MagneticSample { x: v[0], y: v[1], z: v[2], timestamp_us })
}

fn assemble_scalar(v: [f64; 3], timestamp_us: u64) -> Sample {
    Sample::Scalar(ScalarSample { value: v[0], timestamp_us })
}

/// Sample being filled during the current cycle
#[derive(Debug, Clone)]
struct Cycle {
    values: [f64; 3],
    seen: Vec<bool>,
}

impl Cycle {
    fn new(channel_count: usize) -> Self {
        Self {
            values: [0.0; 3],
            seen: vec![false; channel_count],
        }
    }

    fn reset(&mut self) {
        self.values = [0.0; 3];
        self.seen.iter_mut().for_each(|s| *s = false);
    }

    fn is_empty(&self) -> bool {
        !self.seen.iter().any(|s| *s)
    }

    fn is_complete(&self) -> bool {
        self.seen.iter().all(|s| *s)
    }
}

/// Per-device decoder state
pub struct SampleDecoder {
    device: u32,
    calibration: CalibrationConstants,
    policy: ConversionPolicy,
    bindings: ChannelBindings,
    channel_count: usize,
    assemble: Assemble,
    cycle: Cycle,
}

impl SampleDecoder {
    pub fn new(
        kind: SensorKind,
        policy: ConversionPolicy,
        calibration: CalibrationConstants,
        device: u32,
        channel_count: usize,
        bindings: ChannelBindings,
    ) -> Self {
        let assemble: Assemble = match kind.shape() {
            SampleShape::Xyz => assemble_xyz,
            SampleShape::Magnetic => assemble_magnetic,
            SampleShape::Scalar => assemble_scalar,
        };
        Self {
            device,
            calibration,
            policy,
            bindings,
            channel_count,
            assemble,
            cycle: Cycle::new(channel_count),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Physical value of a raw reading routed to `field`.
    pub fn convert(&self, field: OutputField, raw: i64) -> f64 {
        let calibrated = (raw as f64 + self.calibration.offset) * self.calibration.scale;
        self.policy.apply(field, calibrated)
    }

    /// Feed one read of channel `channel`. Returns the completed sample
    /// when `channel` is the last channel of the cycle.
    pub fn decode(&mut self, channel: usize, raw_line: &[u8]) -> Option<Sample> {
        if channel >= self.channel_count {
            trace!("[decoder] ignoring channel {} of device {}", channel, self.device);
            return None;
        }

        let text = String::from_utf8_lossy(raw_line);
        let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        if text.is_empty() {
            warn!(
                "[decoder] empty read on device {} channel {}, dropping cycle",
                self.device, channel
            );
            self.cycle.reset();
            return None;
        }

        if self.cycle.seen[channel] {
            warn!(
                "[decoder] channel {} of device {} repeated before cycle end, dropping partial sample",
                channel, self.device
            );
            self.cycle.reset();
        }
        self.cycle.seen[channel] = true;

        match text.parse::<i64>() {
            Ok(raw) => self.store(channel, raw),
            Err(_) => warn!(
                "[decoder] cannot parse '{}' from device {} channel {}",
                text, self.device, channel
            ),
        }

        if channel + 1 < self.channel_count {
            return None;
        }

        let complete = self.cycle.is_complete();
        let values = self.cycle.values;
        self.cycle.reset();
        if !complete {
            warn!("[decoder] incomplete cycle on device {}, not publishing", self.device);
            return None;
        }
        Some((self.assemble)(values, monotonic_micros()))
    }

    fn store(&mut self, channel: usize, raw: i64) {
        let Some(binding) = self.bindings.get(ChannelKey::new(self.device, channel)).copied() else {
            return;
        };
        if binding.is_excluded() {
            return;
        }
        self.cycle.values[binding.field.axis()] = self.convert(binding.field, raw);
    }

    /// Drop whatever the current cycle has collected.
    pub fn discard(&mut self) {
        if !self.cycle.is_empty() {
            trace!("[decoder] discarding in-progress sample of device {}", self.device);
        }
        self.cycle.reset();
    }

    pub fn has_partial_sample(&self) -> bool {
        !self.cycle.is_empty()
    }
}
