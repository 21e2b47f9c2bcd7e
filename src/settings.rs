use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Playback pace. Governs perceived frame rate only.
    pub tick_interval_ms: u64,
    pub connect_delay_ms: u64,
    pub buffer_capacity: usize,
    pub log_capacity: usize,
    pub default_noise_intensity: f64,
    pub alert_drift_threshold: f64,
    /// Chance that a tick over the drift threshold raises a log entry.
    pub alert_probability: f64,
    pub stress_intensity: f64,
    pub stress_duration_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            connect_delay_ms: 0,
            buffer_capacity: 200,
            log_capacity: 10,
            default_noise_intensity: 1.5,
            alert_drift_threshold: 2.5,
            alert_probability: 0.15,
            stress_intensity: 5.0,
            stress_duration_ms: 3000,
        }
    }
}

impl EngineSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_delay_ms)
    }

    pub fn stress_duration(&self) -> Duration {
        Duration::from_millis(self.stress_duration_ms)
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<EngineSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring malformed settings in {}: {err}", path.display());
                EngineSettings::default()
            })
        } else {
            EngineSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn engine(&self) -> EngineSettings {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn update_engine(&self, settings: EngineSettings) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &EngineSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
