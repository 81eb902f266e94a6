//! Per-sensor lifecycle: locate, configure channels, decode and publish.

use crate::decoder::SampleDecoder;
use crate::enabler::{ChannelBindings, ChannelEnabler, ChannelKey};
use crate::errors::{AdaptorError, AdaptorResult, ConfigError, ConfigResult};
use crate::kinds::{ConversionPolicy, SensorKind};
use crate::locator::{DeviceDescriptor, DeviceLocator};
use crate::samples::Sample;
use crate::sink::SampleSink;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Polling intervals the adaptor accepts, in milliseconds
pub const INTERVAL_RANGE_MS: RangeInclusive<u64> = 10..=586;
pub const DEFAULT_INTERVAL_MS: u64 = 10;

/// Host side of channel readiness: the adaptor registers the files it
/// wants read, the host calls back into [`SensorAdaptor::process_sample`].
pub trait ChannelRegistrar {
    fn register_readable(&mut self, path: &Path, key: ChannelKey);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptorState {
    Uninitialized,
    Located,
    Enabled,
    Disabled,
}

impl AdaptorState {
    fn as_str(self) -> &'static str {
        match self {
            AdaptorState::Uninitialized => "uninitialized",
            AdaptorState::Located => "located",
            AdaptorState::Enabled => "enabled",
            AdaptorState::Disabled => "disabled",
        }
    }
}

/// Range of values a sensor can report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataRange {
    pub min: f64,
    pub max: f64,
    pub resolution: f64,
}

pub const AVAILABLE_DATA_RANGE: DataRange = DataRange {
    min: 0.0,
    max: 65535.0,
    resolution: 1.0,
};

pub struct SensorAdaptor {
    id: String,
    kind: SensorKind,
    policy: ConversionPolicy,
    locator: Arc<DeviceLocator>,
    enabler: ChannelEnabler,
    sink: Arc<dyn SampleSink>,
    state: AdaptorState,
    setup_attempted: bool,
    device: Option<DeviceDescriptor>,
    decoder: Option<SampleDecoder>,
    description: Option<String>,
    interval_ms: u64,
}

impl SensorAdaptor {
    pub fn new(
        id: impl Into<String>,
        kind: SensorKind,
        policy: ConversionPolicy,
        locator: Arc<DeviceLocator>,
        enabler: ChannelEnabler,
        sink: Arc<dyn SampleSink>,
    ) -> Self {
        let id = id.into();
        debug!("[adaptor:{}] created for {}", id, kind);
        Self {
            id,
            kind,
            policy,
            locator,
            enabler,
            sink,
            state: AdaptorState::Uninitialized,
            setup_attempted: false,
            device: None,
            decoder: None,
            description: None,
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn state(&self) -> AdaptorState {
        self.state
    }

    pub fn device(&self) -> Option<&DeviceDescriptor> {
        self.device.as_ref()
    }

    /// Human readable description, available once a device was located
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn available_data_range(&self) -> DataRange {
        AVAILABLE_DATA_RANGE
    }

    pub fn interval(&self) -> u64 {
        self.interval_ms
    }

    pub fn set_interval(&mut self, interval_ms: u64) -> ConfigResult<()> {
        if !INTERVAL_RANGE_MS.contains(&interval_ms) {
            return Err(ConfigError::InvalidValue {
                field: "interval_ms".to_string(),
                reason: format!(
                    "{} outside {}..={}",
                    interval_ms,
                    INTERVAL_RANGE_MS.start(),
                    INTERVAL_RANGE_MS.end()
                ),
            });
        }
        self.interval_ms = interval_ms;
        Ok(())
    }

    /// Locate the device and reset its channel configuration.
    ///
    /// A failed locate leaves the adaptor uninitialized for good; build a
    /// new adaptor to try again. Calling this on a disabled adaptor redoes
    /// the channel reset on the device found earlier.
    pub fn setup(&mut self) -> AdaptorResult<()> {
        match self.state {
            AdaptorState::Uninitialized if self.setup_attempted => {
                return Err(self.invalid("retry setup"));
            }
            AdaptorState::Enabled => return Err(self.invalid("set up")),
            _ => {}
        }

        if self.device.is_none() {
            self.setup_attempted = true;
            let device = self.locator.locate(self.kind.kernel_name()).map_err(|e| {
                error!("[adaptor:{}] {}", self.id, e);
                AdaptorError::from(e)
            })?;
            self.description = Some(format!(
                "Industrial I/O {} ({})",
                self.kind.label(),
                device.kernel_name
            ));
            info!(
                "[adaptor:{}] {} found",
                self.id,
                self.description.as_deref().unwrap_or_default()
            );
            self.device = Some(device);
        }
        self.state = AdaptorState::Located;

        // Disable first so the device accepts the new channel settings
        self.toggle_channels(false)?;
        self.toggle_channels(true)?;
        self.state = AdaptorState::Enabled;
        Ok(())
    }

    /// Re-enable capture and register every channel file with the host.
    pub fn start(&mut self, host: &mut dyn ChannelRegistrar) -> AdaptorResult<()> {
        if self.device.is_none() {
            return Err(self.invalid("start"));
        }
        self.toggle_channels(true)?;

        if let Some(device) = &self.device {
            for (channel, path) in device.channel_paths.iter().enumerate() {
                host.register_readable(path, ChannelKey::new(device.index, channel));
            }
            info!(
                "[adaptor:{}] started, {} channel(s) at {} ms",
                self.id,
                device.channel_count(),
                self.interval_ms
            );
        }
        self.state = AdaptorState::Enabled;
        Ok(())
    }

    /// Disable capture. Safe at any point; a partially read sample is dropped.
    pub fn stop(&mut self) -> AdaptorResult<()> {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.discard();
        }
        if self.device.is_none() {
            return Ok(());
        }
        self.state = AdaptorState::Disabled;
        self.toggle_channels(false)?;
        info!("[adaptor:{}] stopped", self.id);
        Ok(())
    }

    /// Handle one read of a registered channel file. Returns the sample
    /// published when this read completed a cycle.
    pub fn process_sample(&mut self, key: ChannelKey, raw: &[u8]) -> Option<Sample> {
        if self.state != AdaptorState::Enabled {
            return None;
        }
        if self.device.as_ref().map(|d| d.index) != Some(key.device) {
            warn!("[adaptor:{}] read for foreign device {}", self.id, key.device);
            return None;
        }

        let sample = self.decoder.as_mut()?.decode(key.channel, raw)?;
        self.sink.publish(sample);
        Some(sample)
    }

    fn toggle_channels(&mut self, turn_on: bool) -> AdaptorResult<()> {
        let Some(device) = self.device.as_mut() else {
            return Err(AdaptorError::InvalidState {
                state: self.state.as_str(),
                operation: "toggle channels",
            });
        };

        if let Err(e) = self.enabler.enable(device, turn_on) {
            error!("[adaptor:{}] {}", self.id, e);
            return Err(e.into());
        }

        if turn_on {
            let bindings = ChannelBindings::build(device, self.kind.shape());
            self.decoder = Some(SampleDecoder::new(
                self.kind,
                self.policy,
                device.calibration,
                device.index,
                device.channel_count(),
                bindings,
            ));
        }
        Ok(())
    }

    fn invalid(&self, operation: &'static str) -> AdaptorError {
        AdaptorError::InvalidState {
            state: self.state.as_str(),
            operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LocateError;
    use crate::sink::RingBufferSink;
    use crate::test_utils::FakeIioTree;
    use std::path::PathBuf;

    #[derive(Default)]
    struct RecordingHost {
        channels: Vec<(PathBuf, ChannelKey)>,
    }

    impl ChannelRegistrar for RecordingHost {
        fn register_readable(&mut self, path: &Path, key: ChannelKey) {
            self.channels.push((path.to_path_buf(), key));
        }
    }

    fn adaptor(tree: &FakeIioTree, kind: SensorKind) -> (SensorAdaptor, Arc<RingBufferSink>) {
        let sink = Arc::new(RingBufferSink::new(kind, 8));
        let adaptor = SensorAdaptor::new(
            kind.label(),
            kind,
            ConversionPolicy::default_for(kind),
            Arc::new(DeviceLocator::new(Box::new(tree.registry()))),
            ChannelEnabler::default(),
            sink.clone(),
        );
        (adaptor, sink)
    }

    #[test]
    fn test_setup_reaches_enabled() {
        let tree = FakeIioTree::new();
        let fake = tree.accelerometer(0, "0.001");
        let (mut adaptor, _) = adaptor(&tree, SensorKind::Accelerometer);

        adaptor.setup().unwrap();

        assert_eq!(adaptor.state(), AdaptorState::Enabled);
        assert_eq!(
            adaptor.description(),
            Some("Industrial I/O accelerometer (accel_3d)")
        );
        assert_eq!(adaptor.device().unwrap().channel_byte_width.len(), 4);
        assert_eq!(fake.read("buffer/enable"), "1");
    }

    #[test]
    fn test_setup_without_device_stays_uninitialized() {
        let tree = FakeIioTree::new();
        tree.accelerometer(0, "0.001");
        let (mut adaptor, _) = adaptor(&tree, SensorKind::Gyroscope);

        assert!(matches!(
            adaptor.setup(),
            Err(AdaptorError::Locate(LocateError::NoSuchDevice { .. }))
        ));
        assert_eq!(adaptor.state(), AdaptorState::Uninitialized);

        // the device appearing later does not revive this instance
        tree.vector_device(1, "gyro_3d", "anglvel", "0.01");
        assert!(matches!(adaptor.setup(), Err(AdaptorError::InvalidState { .. })));
        assert_eq!(adaptor.state(), AdaptorState::Uninitialized);
    }

    #[test]
    fn test_missing_scale_never_enables() {
        let tree = FakeIioTree::new();
        tree.device(0, "accel_3d").attr("in_accel_x_raw", "1");
        let (mut adaptor, sink) = adaptor(&tree, SensorKind::Accelerometer);

        assert!(matches!(
            adaptor.setup(),
            Err(AdaptorError::Locate(LocateError::Calibration(ConfigError::MissingScale { .. })))
        ));
        assert_ne!(adaptor.state(), AdaptorState::Enabled);
        assert!(adaptor.process_sample(ChannelKey::new(0, 0), b"1").is_none());
        assert_eq!(sink.published(), 0);
    }

    #[test]
    fn test_full_cycle_publishes_once() {
        let tree = FakeIioTree::new();
        tree.accelerometer(0, "0.001");
        let (mut adaptor, sink) = adaptor(&tree, SensorKind::Accelerometer);
        let mut rx = sink.subscribe();
        adaptor.setup().unwrap();

        let mut host = RecordingHost::default();
        adaptor.start(&mut host).unwrap();
        assert_eq!(host.channels.len(), 3);
        assert_eq!(host.channels[1].1, ChannelKey::new(0, 1));

        assert!(adaptor.process_sample(ChannelKey::new(0, 0), b"100\n").is_none());
        assert!(adaptor.process_sample(ChannelKey::new(0, 1), b"-200\n").is_none());
        let published = adaptor.process_sample(ChannelKey::new(0, 2), b"300\n");

        let first = published.expect("complete cycle publishes").timestamp_us();
        assert!(first > 0);
        assert_eq!(sink.published(), 1);
        match rx.try_recv().unwrap() {
            Sample::Xyz(s) => {
                assert!((s.x + 10.0).abs() < 1e-9);
                assert!((s.y - 20.0).abs() < 1e-9);
                assert!((s.z + 30.0).abs() < 1e-9);
            }
            other => panic!("unexpected sample {:?}", other),
        }

        adaptor.process_sample(ChannelKey::new(0, 0), b"1");
        adaptor.process_sample(ChannelKey::new(0, 1), b"1");
        let second = adaptor.process_sample(ChannelKey::new(0, 2), b"1").unwrap();
        assert!(second.timestamp_us() >= first);
        assert_eq!(sink.published(), 2);
    }

    #[test]
    fn test_stop_mid_cycle_discards_partial_sample() {
        let tree = FakeIioTree::new();
        let fake = tree.accelerometer(0, "1");
        let (mut adaptor, sink) = adaptor(&tree, SensorKind::Accelerometer);
        adaptor.setup().unwrap();

        adaptor.process_sample(ChannelKey::new(0, 0), b"1");
        adaptor.process_sample(ChannelKey::new(0, 1), b"2");
        adaptor.stop().unwrap();
        assert_eq!(adaptor.state(), AdaptorState::Disabled);
        assert_eq!(fake.read("buffer/enable"), "0");

        assert!(adaptor.process_sample(ChannelKey::new(0, 2), b"3").is_none());

        let mut host = RecordingHost::default();
        adaptor.start(&mut host).unwrap();
        assert!(adaptor.process_sample(ChannelKey::new(0, 2), b"3").is_none());
        assert_eq!(sink.published(), 0);
    }

    #[test]
    fn test_stop_before_setup_is_harmless() {
        let tree = FakeIioTree::new();
        let (mut adaptor, _) = adaptor(&tree, SensorKind::Magnetometer);
        adaptor.stop().unwrap();
        assert_eq!(adaptor.state(), AdaptorState::Uninitialized);
        assert!(matches!(
            adaptor.start(&mut RecordingHost::default()),
            Err(AdaptorError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_setup_again_after_stop() {
        let tree = FakeIioTree::new();
        tree.accelerometer(0, "1");
        let (mut adaptor, _) = adaptor(&tree, SensorKind::Accelerometer);
        adaptor.setup().unwrap();
        assert!(matches!(adaptor.setup(), Err(AdaptorError::InvalidState { .. })));

        adaptor.stop().unwrap();
        adaptor.setup().unwrap();
        assert_eq!(adaptor.state(), AdaptorState::Enabled);
    }

    #[test]
    fn test_foreign_device_reads_are_ignored() {
        let tree = FakeIioTree::new();
        tree.accelerometer(4, "1");
        let (mut adaptor, _) = adaptor(&tree, SensorKind::Accelerometer);
        adaptor.setup().unwrap();

        adaptor.process_sample(ChannelKey::new(4, 0), b"1");
        adaptor.process_sample(ChannelKey::new(4, 1), b"1");
        assert!(adaptor.process_sample(ChannelKey::new(0, 2), b"1").is_none());
        assert!(adaptor.process_sample(ChannelKey::new(4, 2), b"1").is_some());
    }

    #[test]
    fn test_interval_bounds() {
        let tree = FakeIioTree::new();
        let (mut adaptor, _) = adaptor(&tree, SensorKind::AmbientLight);
        assert_eq!(adaptor.interval(), DEFAULT_INTERVAL_MS);

        adaptor.set_interval(100).unwrap();
        assert_eq!(adaptor.interval(), 100);
        assert!(adaptor.set_interval(5).is_err());
        assert!(adaptor.set_interval(1000).is_err());
        assert_eq!(adaptor.interval(), 100);
        assert_eq!(adaptor.available_data_range().max, 65535.0);
    }
}
