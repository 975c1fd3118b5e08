//! Configuration module for ecopod.
//!
//! Typed view of the device's `config.json`, with loading, defaults,
//! validation and a builder for programmatic use. The file is carried to
//! the pod on its removable storage; at boot a validated copy is persisted
//! locally so a later run can fall back to it if the card is absent.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// T041: Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for one pod.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    /// Mobile network profile; absent on wifi-only or offline deployments.
    #[serde(default)]
    pub mobile_network: Option<MobileNetworkConfig>,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Device identity and cloud destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Project this pod reports into (scopes the upload tree).
    pub project_id: String,
    /// Revision id of this configuration (scopes the upload tree).
    pub config_id: String,
    /// Destination bucket for uploads.
    pub gcs_bucket_name: String,
    /// Service-account key file for the upload client. Defaults to the
    /// config file itself, which doubles as the key file in the field.
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
}

/// Sensor selection plus its type-specific options.
///
/// `sensor_type` selects an implementation from the closed registry in
/// `ecopod-capture`; the remaining keys are deserialised by the selected
/// implementation, so unknown sensor options fail there, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    pub sensor_type: String,
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// GSM profile installed into the connection manager at config install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileNetworkConfig {
    pub username: String,
    pub password: String,
    /// APN hostname.
    pub hostname: String,
}

/// Timing knobs for boot, maintenance reboot and failure recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Reachability probe attempts before giving up at boot and at the
    /// start of each sync cycle.
    #[serde(default = "default_boot_connect_retries")]
    pub boot_connect_retries: u32,
    /// UTC hour of the daily maintenance reboot.
    #[serde(default = "default_reboot_hour_utc")]
    pub reboot_hour_utc: u32,
    /// How long the watchdog signals distress before rebooting. `null`
    /// disables the reboot tier: the pod blinks until someone comes.
    #[serde(default = "default_error_recovery_secs")]
    pub error_recovery_secs: Option<u64>,
}

fn default_boot_connect_retries() -> u32 {
    30
}

fn default_reboot_hour_utc() -> u32 {
    2
}

fn default_error_recovery_secs() -> Option<u64> {
    Some(300)
}

// ---------------------------------------------------------------------------
// T042: Defaults
// ---------------------------------------------------------------------------

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            project_id: "na".to_string(),
            config_id: "na".to_string(),
            gcs_bucket_name: String::new(),
            credentials_file: None,
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            sensor_type: "I2SMic".to_string(),
            options: serde_json::Map::new(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            boot_connect_retries: default_boot_connect_retries(),
            reboot_hour_utc: default_reboot_hour_utc(),
            error_recovery_secs: default_error_recovery_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// T043: Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// The built-in configuration used when no file exists anywhere: an
    /// I2S microphone with default settings, placeholder ids, no sync
    /// destination. Only valid for an offline run.
    #[must_use]
    pub fn fallback() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// T044: Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"schedule.reboot_hour_utc"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- device ---
        for (field, value) in [
            ("device.project_id", &self.device.project_id),
            ("device.config_id", &self.device.config_id),
        ] {
            if value.is_empty() || value.contains('/') || value.contains("..") {
                errors.push(ValidationError {
                    field: field.into(),
                    message: format!("invalid identifier '{value}'"),
                });
            }
        }

        // --- sensor ---
        if self.sensor.sensor_type.is_empty() {
            errors.push(ValidationError {
                field: "sensor.sensor_type".into(),
                message: "must not be empty".into(),
            });
        }

        // --- schedule ---
        if self.schedule.boot_connect_retries == 0 {
            errors.push(ValidationError {
                field: "schedule.boot_connect_retries".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.schedule.reboot_hour_utc > 23 {
            errors.push(ValidationError {
                field: "schedule.reboot_hour_utc".into(),
                message: "must be in range 0..=23".into(),
            });
        }
        if self.schedule.error_recovery_secs == Some(0) {
            errors.push(ValidationError {
                field: "schedule.error_recovery_secs".into(),
                message: "must be greater than 0 (or null to disable)".into(),
            });
        }

        // --- mobile_network ---
        if let Some(profile) = &self.mobile_network {
            if profile.hostname.trim().is_empty() {
                errors.push(ValidationError {
                    field: "mobile_network.hostname".into(),
                    message: "must not be empty".into(),
                });
            }
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// T045: ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- device ---

    pub fn project_id(mut self, id: impl Into<String>) -> Self {
        self.config.device.project_id = id.into();
        self
    }

    pub fn config_id(mut self, id: impl Into<String>) -> Self {
        self.config.device.config_id = id.into();
        self
    }

    pub fn gcs_bucket_name(mut self, bucket: impl Into<String>) -> Self {
        self.config.device.gcs_bucket_name = bucket.into();
        self
    }

    pub fn credentials_file(mut self, path: PathBuf) -> Self {
        self.config.device.credentials_file = Some(path);
        self
    }

    // --- sensor ---

    pub fn sensor_type(mut self, sensor_type: impl Into<String>) -> Self {
        self.config.sensor.sensor_type = sensor_type.into();
        self
    }

    pub fn sensor_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.sensor.options.insert(key.into(), value);
        self
    }

    // --- mobile_network ---

    pub fn mobile_network(mut self, profile: MobileNetworkConfig) -> Self {
        self.config.mobile_network = Some(profile);
        self
    }

    // --- schedule ---

    pub fn boot_connect_retries(mut self, retries: u32) -> Self {
        self.config.schedule.boot_connect_retries = retries;
        self
    }

    pub fn reboot_hour_utc(mut self, hour: u32) -> Self {
        self.config.schedule.reboot_hour_utc = hour;
        self
    }

    pub fn error_recovery_secs(mut self, secs: Option<u64>) -> Self {
        self.config.schedule.error_recovery_secs = secs;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// T046: Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.device.project_id, "na");
        assert_eq!(cfg.device.config_id, "na");
        assert!(cfg.device.gcs_bucket_name.is_empty());
        assert!(cfg.device.credentials_file.is_none());
        assert_eq!(cfg.sensor.sensor_type, "I2SMic");
        assert!(cfg.sensor.options.is_empty());
        assert!(cfg.mobile_network.is_none());
        assert_eq!(cfg.schedule.boot_connect_retries, 30);
        assert_eq!(cfg.schedule.reboot_hour_utc, 2);
        assert_eq!(cfg.schedule.error_recovery_secs, Some(300));
    }

    #[test]
    fn default_config_passes_validation() {
        let errors = Config::default().validate();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
    }

    // -- Loading --

    #[test]
    fn load_from_json_file() {
        let json = r#"{
            "device": {
                "project_id": "rainforest-2024",
                "config_id": "cfg-07",
                "gcs_bucket_name": "eco-uploads"
            },
            "sensor": {
                "sensor_type": "I2SMic",
                "record_length": 600,
                "compress_data": false
            },
            "mobile_network": {
                "username": "user",
                "password": "pass",
                "hostname": "apn.example.net"
            },
            "schedule": {
                "boot_connect_retries": 10,
                "reboot_hour_utc": 4,
                "error_recovery_secs": 120
            }
        }"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(json.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.device.project_id, "rainforest-2024");
        assert_eq!(cfg.device.config_id, "cfg-07");
        assert_eq!(cfg.device.gcs_bucket_name, "eco-uploads");
        assert_eq!(cfg.sensor.sensor_type, "I2SMic");
        assert_eq!(
            cfg.sensor.options.get("record_length"),
            Some(&serde_json::json!(600))
        );
        assert_eq!(
            cfg.mobile_network.as_ref().map(|m| m.hostname.as_str()),
            Some("apn.example.net")
        );
        assert_eq!(cfg.schedule.boot_connect_retries, 10);
        assert_eq!(cfg.schedule.reboot_hour_utc, 4);
        assert_eq!(cfg.schedule.error_recovery_secs, Some(120));
    }

    #[test]
    fn load_applies_section_defaults() {
        let json = r#"{
            "device": {
                "project_id": "p",
                "config_id": "c",
                "gcs_bucket_name": "b"
            },
            "sensor": { "sensor_type": "I2SMic" }
        }"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(json.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.schedule.boot_connect_retries, 30);
        assert!(cfg.mobile_network.is_none());
    }

    #[test]
    fn load_returns_error_on_invalid_json() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"{ not json").unwrap();
        tmp.flush().unwrap();

        assert!(Config::load(tmp.path()).is_err());
    }

    #[test]
    fn load_returns_error_on_missing_file() {
        assert!(Config::load(Path::new("/nonexistent/config.json")).is_err());
    }

    // -- Validation --

    #[test]
    fn validate_catches_bad_identifiers() {
        let cfg = ConfigBuilder::new().project_id("a/b").build();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "device.project_id"));
    }

    #[test]
    fn validate_catches_empty_sensor_type() {
        let cfg = ConfigBuilder::new().sensor_type("").build();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "sensor.sensor_type"));
    }

    #[test]
    fn validate_catches_zero_boot_retries() {
        let cfg = ConfigBuilder::new().boot_connect_retries(0).build();
        let errors = cfg.validate();
        assert!(errors
            .iter()
            .any(|e| e.field == "schedule.boot_connect_retries"));
    }

    #[test]
    fn validate_catches_out_of_range_reboot_hour() {
        let cfg = ConfigBuilder::new().reboot_hour_utc(24).build();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "schedule.reboot_hour_utc"));
    }

    #[test]
    fn validate_catches_zero_recovery_duration() {
        let cfg = ConfigBuilder::new().error_recovery_secs(Some(0)).build();
        let errors = cfg.validate();
        assert!(errors
            .iter()
            .any(|e| e.field == "schedule.error_recovery_secs"));
    }

    #[test]
    fn validate_accepts_disabled_recovery() {
        let cfg = ConfigBuilder::new().error_recovery_secs(None).build();
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn validate_catches_empty_apn_hostname() {
        let cfg = ConfigBuilder::new()
            .mobile_network(MobileNetworkConfig {
                username: String::new(),
                password: String::new(),
                hostname: "  ".to_string(),
            })
            .build();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "mobile_network.hostname"));
    }

    // -- Builder --

    #[test]
    fn builder_starts_from_defaults() {
        let cfg = ConfigBuilder::new().build();
        assert_eq!(cfg.schedule.reboot_hour_utc, 2);
        assert_eq!(cfg.sensor.sensor_type, "I2SMic");
    }

    #[test]
    fn builder_overrides_fields() {
        let cfg = ConfigBuilder::new()
            .project_id("p9")
            .config_id("c9")
            .gcs_bucket_name("bucket-9")
            .credentials_file(PathBuf::from("/etc/ecopod/key.json"))
            .sensor_type("I2SMic")
            .sensor_option("record_length", serde_json::json!(300))
            .boot_connect_retries(5)
            .reboot_hour_utc(3)
            .error_recovery_secs(None)
            .build();

        assert_eq!(cfg.device.project_id, "p9");
        assert_eq!(cfg.device.config_id, "c9");
        assert_eq!(cfg.device.gcs_bucket_name, "bucket-9");
        assert_eq!(
            cfg.device.credentials_file,
            Some(PathBuf::from("/etc/ecopod/key.json"))
        );
        assert_eq!(
            cfg.sensor.options.get("record_length"),
            Some(&serde_json::json!(300))
        );
        assert_eq!(cfg.schedule.boot_connect_retries, 5);
        assert_eq!(cfg.schedule.reboot_hour_utc, 3);
        assert_eq!(cfg.schedule.error_recovery_secs, None);
    }

    #[test]
    fn builder_build_validated_fails_for_invalid_config() {
        let result = ConfigBuilder::new()
            .boot_connect_retries(0)
            .reboot_hour_utc(99)
            .build_validated();
        let errors = result.unwrap_err();
        assert!(errors.len() >= 2);
    }

    // -- ValidationError Display --

    #[test]
    fn validation_error_display() {
        let err = ValidationError {
            field: "schedule.reboot_hour_utc".into(),
            message: "must be in range 0..=23".into(),
        };
        assert_eq!(
            err.to_string(),
            "schedule.reboot_hour_utc: must be in range 0..=23"
        );
    }
}
