//! Ecopod Capture - sensor registry and adapters
//!
//! The configured `sensor_type` string selects an implementation from a
//! closed set; there is no reflective lookup, and an unrecognised name is
//! an explicit error rather than a fallback. Each implementation
//! deserialises its own options from the sensor section of the device
//! configuration.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use ecopod_core::config::SensorConfig;
use ecopod_core::ports::capture::ICaptureSensor;

pub mod i2s_mic;

pub use i2s_mic::I2sMic;

/// Errors from sensor selection and configuration
#[derive(Debug, Error)]
pub enum SensorError {
    /// The configured type names no known sensor implementation
    #[error("unknown sensor type: {0}")]
    UnknownType(String),

    /// The sensor section could not be deserialised for the selected type
    #[error("invalid sensor options")]
    InvalidOptions(#[source] serde_json::Error),
}

/// Builds the sensor selected by `config.sensor_type`.
pub fn build_sensor(config: &SensorConfig) -> Result<Arc<dyn ICaptureSensor>, SensorError> {
    match config.sensor_type.as_str() {
        I2sMic::TYPE_NAME => {
            info!(sensor_type = %config.sensor_type, "Configuring sensor");
            Ok(Arc::new(I2sMic::from_options(&config.options)?))
        }
        other => Err(SensorError::UnknownType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use ecopod_core::config::ConfigBuilder;

    use super::*;

    #[test]
    fn registry_builds_i2s_mic() {
        let config = ConfigBuilder::new().sensor_type("I2SMic").build();
        let sensor = build_sensor(&config.sensor).unwrap();
        assert_eq!(sensor.sync_interval().as_secs(), 1200);
    }

    #[test]
    fn registry_rejects_unknown_type() {
        let config = ConfigBuilder::new().sensor_type("Seismometer").build();
        let err = build_sensor(&config.sensor).err().unwrap();
        assert!(matches!(err, SensorError::UnknownType(name) if name == "Seismometer"));
    }

    #[test]
    fn registry_rejects_bad_options() {
        let config = ConfigBuilder::new()
            .sensor_type("I2SMic")
            .sensor_option("record_length", serde_json::json!("not a number"))
            .build();
        assert!(matches!(
            build_sensor(&config.sensor),
            Err(SensorError::InvalidOptions(_))
        ));
    }
}
