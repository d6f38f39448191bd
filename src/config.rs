// config.rs

use crate::error::{Result, SyncError};
use crate::service::DeviceSelections;
use crate::video::DEFAULT_DRIFT_THRESHOLD;
use config::{Config, Environment, File, FileFormat};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "SYNTHWAVE";

/// Persisted settings. Missing keys fall back to [`Settings::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub service_url: String,
    pub service_timeout_ms: u64,
    pub midi_input_port: Option<String>,
    /// Output device id
    pub midi_output_device: Option<String>,
    pub video_device_index: u32,
    pub audio_device_index: Option<u32>,
    pub drift_threshold: f64,
    pub frame_interval_ms: u64,
    pub midi_thru: bool,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            service_url: "http://localhost:8000".to_string(),
            service_timeout_ms: 5000,
            midi_input_port: None,
            midi_output_device: None,
            video_device_index: 0,
            audio_device_index: None,
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
            frame_interval_ms: 16,
            midi_thru: false,
            log_level: "debug".to_string(),
        }
    }
}

impl Settings {
    /// `$HOME/.config/synthwave/settings.toml`
    pub fn default_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| SyncError::Config("HOME environment variable not set".to_string()))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("synthwave")
            .join("settings.toml"))
    }

    /// Layers the TOML file at `path` (optional) under `SYNTHWAVE_*`
    /// environment variables.
    pub fn load(path: &Path) -> Result<Settings> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(path: &Path, env: Environment) -> Result<Settings> {
        debug!("Loading settings from {}", path.display());
        let settings: Settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(env)
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        info!("Settings saved to {}", path.display());
        Ok(())
    }

    pub fn device_selections(&self) -> DeviceSelections {
        DeviceSelections {
            video_device_index: self.video_device_index,
            audio_device_index: self.audio_device_index,
            midi_port_name: self.midi_input_port.clone(),
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_millis(self.service_timeout_ms)
    }
}
