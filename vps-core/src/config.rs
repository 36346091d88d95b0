//! Configuration for the VPS relay.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::command;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Device slot settings.
    pub device: DeviceConfig,
    /// Persisted artifact locations.
    pub storage: StorageConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP port the client listener binds.
    pub listen_port: u16,
    /// Host the device sockets are reached at.
    pub device_host: String,
    /// Base port for device control sockets (`base + device`).
    pub control_base_port: u16,
    /// Base port for device mirroring sockets (`base + device`).
    pub mirroring_base_port: u16,
}

/// Device slot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Number of device slots (device numbers `1..=max_devices`).
    pub max_devices: u8,
    /// Initial mirroring image quality.
    pub default_quality: u8,
    /// Initial recording framerate.
    pub default_framerate: u8,
}

/// Persisted artifact locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory tree for captured stills and composed animations,
    /// one subdirectory per device number.
    pub shared_directory: PathBuf,
    /// Staging tree for animation event frames awaiting composition.
    pub image_directory: PathBuf,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter ("trace" … "error").
    pub level: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_port: 10001,
            device_host: "127.0.0.1".to_string(),
            control_base_port: 11000,
            mirroring_base_port: 12000,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            max_devices: command::MAX_DEVICES,
            default_quality: command::DEFAULT_QUALITY,
            default_framerate: command::DEFAULT_FRAMERATE,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            shared_directory: PathBuf::from("shared"),
            image_directory: PathBuf::from("images"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a TOML file, falling back to defaults
    /// when the file does not exist.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match toml::from_str(&text) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "bad config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Control socket port for one device slot.
    pub fn control_port(&self, device: u8) -> u16 {
        self.network.control_base_port + device as u16
    }

    /// Mirroring socket port for one device slot.
    pub fn mirroring_port(&self, device: u8) -> u16 {
        self.network.mirroring_base_port + device as u16
    }

    /// Control socket address for one device slot.
    pub fn control_addr(&self, device: u8) -> String {
        format!("{}:{}", self.network.device_host, self.control_port(device))
    }

    /// Mirroring socket address for one device slot.
    pub fn mirroring_addr(&self, device: u8) -> String {
        format!("{}:{}", self.network.device_host, self.mirroring_port(device))
    }

    /// Per-device directory for captured artifacts.
    pub fn shared_dir(&self, device: u8) -> PathBuf {
        self.storage.shared_directory.join(device.to_string())
    }

    /// Per-device staging directory for animation frames.
    pub fn image_dir(&self, device: u8) -> PathBuf {
        self.storage.image_directory.join(device.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RelayConfig::default();
        assert_eq!(config.network.listen_port, 10001);
        assert_eq!(config.device.max_devices, 10);
        assert_eq!(config.device.default_quality, 70);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn per_device_ports_offset_by_number() {
        let config = RelayConfig::default();
        assert_eq!(config.control_port(3), config.network.control_base_port + 3);
        assert_eq!(
            config.mirroring_port(3),
            config.network.mirroring_base_port + 3
        );
        assert_eq!(config.control_addr(3), "127.0.0.1:11003");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: RelayConfig = toml::from_str(
            r#"
            [network]
            listen_port = 9000
            "#,
        )
        .unwrap();
        assert_eq!(config.network.listen_port, 9000);
        assert_eq!(config.network.control_base_port, 11000);
        assert_eq!(config.device.max_devices, 10);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = RelayConfig::load(Path::new("/nonexistent/relay.toml"));
        assert_eq!(config.network.listen_port, 10001);
    }

    #[test]
    fn roundtrips_through_toml() {
        let config = RelayConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: RelayConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.network.listen_port, config.network.listen_port);
        assert_eq!(back.storage.shared_directory, config.storage.shared_directory);
    }
}
