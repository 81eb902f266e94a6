// Public modules
pub mod adaptor;
pub mod attributes;
pub mod config;
pub mod decoder;
pub mod enabler;
pub mod errors;
pub mod kinds;
pub mod locator;
pub mod registry;
pub mod samples;
pub mod scheduler;
pub mod sink;
pub mod sysfs;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use adaptor::{AdaptorState, ChannelRegistrar, SensorAdaptor};
pub use config::{load_adaptor_config, AdaptorConfig};
pub use errors::{AdaptorError, AdaptorResult};
pub use kinds::SensorKind;
pub use locator::{DeviceLocator, SysfsRegistry};
pub use registry::init_all;
pub use samples::Sample;
pub use scheduler::spawn_adaptor_tasks;

use tokio::sync::watch;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Initialize tracing with default configuration
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}

/// Run all configured adaptors until Ctrl-C
pub async fn run_adaptors(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!("[IioSensorAdaptor] starting up...");

    let config_file = format!("{}/adaptors.toml", config_path);
    let config = load_adaptor_config(&config_file)?;
    info!("[config] loaded {} sensor(s)", config.sensors.len());

    let locator = DeviceLocator::install(Box::new(SysfsRegistry::new(&config.sysfs_root)));
    let registered = init_all(&config, locator).await?;

    // Log every published sample at debug level
    for entry in &registered {
        let mut samples = Box::pin(entry.sink.stream());
        let kind = entry.sink.kind();
        tokio::spawn(async move {
            while let Some(sample) = samples.next().await {
                match sample.to_json() {
                    Ok(json) => debug!("[{}] {}", kind, json),
                    Err(e) => warn!("[{}] cannot serialize sample: {}", kind, e),
                }
            }
        });
    }

    let adaptors: Vec<_> = registered.iter().map(|r| r.adaptor.clone()).collect();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = spawn_adaptor_tasks(&adaptors, shutdown_rx).await;
    info!("[main] {} adaptor task(s) launched", handles.len());

    tokio::signal::ctrl_c().await?;
    info!("[main] shutting down");

    let _ = shutdown_tx.send(true);
    for handle in handles {
        if let Err(e) = handle.await {
            warn!("[main] polling task ended abnormally: {}", e);
        }
    }
    for adaptor in &adaptors {
        let mut adaptor = adaptor.lock().await;
        if let Err(e) = adaptor.stop() {
            warn!("[{}] stop failed: {}", adaptor.id(), e);
        }
    }
    DeviceLocator::teardown();

    Ok(())
}
