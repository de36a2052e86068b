// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Configuration module
//!
//! Two layers: application [`Settings`] (TOML, device identity and paths) and
//! the rule configuration [`ConfigStore`] (flat `key = value` file with a JSON
//! interchange form).

pub mod ini;
pub mod record;
pub mod store;

pub use record::{coerce, field, ConfigRecord, ConfigValue, FieldSpec, ValueKind, FIELDS, SECTION};
pub use store::ConfigStore;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, Level};

use crate::device::DeviceIdent;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log level used when neither `--debug` nor `--trace` is given
    pub log_level: String,

    /// Use the in-memory serial device instead of real hardware
    pub demo_mode: bool,

    /// Rule configuration file
    pub rules_path: PathBuf,

    /// Serial device identity
    pub device: DeviceSettings,

    /// Recorded detection traces
    pub trace: TraceSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            demo_mode: false,
            rules_path: Self::config_dir().join("config.ini"),
            device: DeviceSettings::default(),
            trace: TraceSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Load or create default settings
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let settings = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            settings.save(path)?;
            Ok(settings)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("detectlink"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default settings path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("settings.toml")
    }

    /// Parsed `log_level`, `None` when it names no level
    pub fn level(&self) -> Option<Level> {
        self.log_level.parse().ok()
    }
}

/// Serial device identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// USB vendor id
    pub vendor_id: u16,

    /// USB product id
    pub product_id: u16,

    /// Baud rate
    pub baud_rate: u32,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        let ident = DeviceIdent::default();
        Self {
            vendor_id: ident.vendor_id,
            product_id: ident.product_id,
            baud_rate: ident.baud_rate,
        }
    }
}

impl DeviceSettings {
    /// Identity used for port discovery
    pub fn ident(&self) -> DeviceIdent {
        DeviceIdent {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            baud_rate: self.baud_rate,
        }
    }
}

/// Recorded detection traces used in place of a live camera and model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceSettings {
    /// JSON-lines frame trace
    pub frames: Option<PathBuf>,

    /// Replay rate in frames per second
    pub fps: f64,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            frames: None,
            fps: 10.0,
        }
    }
}

impl TraceSettings {
    /// Delay between replayed frames. A rate of zero replays unpaced; negative,
    /// NaN or vanishingly small rates yield `None`.
    pub fn interval(&self) -> Option<Duration> {
        if self.fps == 0.0 {
            return Some(Duration::ZERO);
        }
        Duration::try_from_secs_f64(1.0 / self.fps).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.device.vendor_id, 3368);
        assert_eq!(settings.device.product_id, 516);
        assert_eq!(settings.device.baud_rate, 115200);
    }

    #[test]
    fn test_load_or_create_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");

        let mut created = Settings::load_or_create(&path).unwrap();
        assert!(path.exists());

        created.demo_mode = true;
        created.device.baud_rate = 9600;
        created.save(&path).unwrap();

        let loaded = Settings::load_or_create(&path).unwrap();
        assert!(loaded.demo_mode);
        assert_eq!(loaded.device.baud_rate, 9600);
    }

    #[test]
    fn test_trace_interval() {
        let mut trace = TraceSettings::default();
        assert_eq!(trace.interval(), Some(Duration::from_millis(100)));

        trace.fps = 0.0;
        assert_eq!(trace.interval(), Some(Duration::ZERO));

        for fps in [1e-30, -5.0, f64::NAN] {
            trace.fps = fps;
            assert_eq!(trace.interval(), None, "fps {}", fps);
        }
    }

    #[test]
    fn test_log_level_setting() {
        let mut settings = Settings::default();
        assert_eq!(settings.level(), Some(Level::INFO));

        settings.log_level = "DEBUG".to_string();
        assert_eq!(settings.level(), Some(Level::DEBUG));

        settings.log_level = "loud".to_string();
        assert_eq!(settings.level(), None);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: Settings = toml::from_str("demo_mode = true\n").unwrap();
        assert!(settings.demo_mode);
        assert_eq!(settings.device.product_id, 516);
    }
}
