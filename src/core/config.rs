use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::power::{default_schemes, PowerScheme};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// How long a sensor snapshot stays fresh
    pub sensor_snapshot_ttl_ms: u64,
    /// How long a per-process counter instance list is reused
    pub instance_cache_ttl_ms: u64,
    /// Gap between the two GPU node samples of one pass
    pub gpu_sample_interval_ms: u64,
    /// Per-process counters idle this long are evicted
    pub counter_idle_eviction_secs: u64,
    /// Overrides the registry/WMI VRAM capacity lookup
    pub vram_capacity_override_mb: Option<f64>,
    pub power: PowerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    /// A ryzenadj.exe file or a directory containing it
    pub ryzenadj_path: Option<String>,
    pub polling_interval_ms: u64,
    pub cli_timeout_ms: u64,
    pub schemes: Vec<PowerScheme>,
}

pub const GPU_SAMPLE_INTERVAL_MIN_MS: u64 = 100;
pub const GPU_SAMPLE_INTERVAL_MAX_MS: u64 = 250;

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sensor_snapshot_ttl_ms: 1000,
            instance_cache_ttl_ms: 5000,
            gpu_sample_interval_ms: 200,
            counter_idle_eviction_secs: 60,
            vram_capacity_override_mb: None,
            power: PowerConfig::default(),
        }
    }
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            ryzenadj_path: None,
            polling_interval_ms: 3000,
            cli_timeout_ms: 3000,
            schemes: default_schemes(),
        }
    }
}

impl MonitorConfig {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Missing or empty file yields defaults; so does a file that no longer parses.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let data = fs::read(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        if data.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Self::default());
        }

        let mut config = match serde_json::from_slice::<MonitorConfig>(&data) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring unreadable config {:?}: {}", path, e);
                Self::default()
            }
        };
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let data =
            serde_json::to_vec_pretty(self).with_context(|| "Failed to serialize config")?;

        fs::write(path, data)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().with_context(|| "Could not determine config directory")?;

        Ok(config_dir.join("xhmonitor").join("config.json"))
    }

    fn normalize(&mut self) {
        if self.power.schemes.is_empty() {
            self.power.schemes = default_schemes();
        }
    }

    pub fn sensor_snapshot_ttl(&self) -> Duration {
        Duration::from_millis(self.sensor_snapshot_ttl_ms)
    }

    pub fn instance_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.instance_cache_ttl_ms)
    }

    pub fn gpu_sample_interval(&self) -> Duration {
        Duration::from_millis(
            self.gpu_sample_interval_ms
                .clamp(GPU_SAMPLE_INTERVAL_MIN_MS, GPU_SAMPLE_INTERVAL_MAX_MS),
        )
    }

    pub fn counter_idle_eviction(&self) -> Duration {
        Duration::from_secs(self.counter_idle_eviction_secs)
    }
}

impl PowerConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn cli_timeout(&self) -> Duration {
        Duration::from_millis(self.cli_timeout_ms)
    }
}
