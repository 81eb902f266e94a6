use iio_sensor_adaptor::{init_tracing, run_adaptors};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=debug prints every published sample
    init_tracing();

    // Load configuration from CONFIG_PATH or default
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string());
    tracing::info!("[main] configuration path: {}", config_path);

    run_adaptors(&config_path).await
}
