use crate::adaptor::SensorAdaptor;
use crate::config::AdaptorConfig;
use crate::enabler::ChannelEnabler;
use crate::errors::ConfigResult;
use crate::locator::DeviceLocator;
use crate::sink::RingBufferSink;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// An adaptor together with the ring its samples land in
pub struct RegisteredAdaptor {
    pub adaptor: Arc<Mutex<SensorAdaptor>>,
    pub sink: Arc<RingBufferSink>,
}

/// Build and set up one adaptor per configured sensor.
///
/// Configuration mistakes are returned as errors. Setup failures (no such
/// device, unusable calibration) are only logged: the adaptor stays in the
/// list, uninitialized, and never publishes.
pub async fn init_all(
    config: &AdaptorConfig,
    locator: Arc<DeviceLocator>,
) -> ConfigResult<Vec<RegisteredAdaptor>> {
    let policies = config.policy_table()?;
    let mut registered = Vec::new();

    info!("[registry] initializing {} adaptor(s)...", config.sensors.len());
    for entry in &config.sensors {
        let kind = entry.sensor_kind()?;
        let sink = Arc::new(RingBufferSink::new(kind, config.ring_capacity));
        let mut adaptor = SensorAdaptor::new(
            entry.id.clone(),
            kind,
            policies.policy(kind),
            locator.clone(),
            ChannelEnabler::new(config.buffer_length),
            sink.clone(),
        );
        adaptor.set_interval(entry.interval())?;

        match adaptor.setup() {
            Ok(()) => info!("[registry] adaptor {} ready for {}", entry.id, kind),
            Err(e) => warn!("[registry] adaptor {} unavailable: {}", entry.id, e),
        }

        registered.push(RegisteredAdaptor {
            adaptor: Arc::new(Mutex::new(adaptor)),
            sink,
        });
    }

    Ok(registered)
}
