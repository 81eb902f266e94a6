pub mod adaptor_config;

pub use adaptor_config::{load_adaptor_config, AdaptorConfig, SensorEntry};
