use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::gateway::Light;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlcEndpoint {
    pub address: String,
    pub port: u16,
}

impl Default for PlcEndpoint {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".into(),
            port: 6000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub device_index: u32,
    pub image_dir: PathBuf,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device_index: 0,
            image_dir: PathBuf::from("images"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    pub interval_ms: u64,
    /// Upper bound on one poll; a tick that overruns is treated as disconnected.
    pub timeout_ms: u64,
    pub notify_camera_transitions: bool,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            timeout_ms: 2_000,
            notify_camera_transitions: false,
        }
    }
}

impl PollingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub settle_delay_ms: u64,
    /// One entry per step, each a run of light initials such as `"T"` or `"TB"`.
    pub patterns: Vec<String>,
    pub image_extension: String,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: 150,
            patterns: ["T", "R", "B", "L"].iter().map(|p| p.to_string()).collect(),
            image_extension: "bmp".into(),
        }
    }
}

impl ScanSettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// PLC output device driving each light.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LightWiring {
    pub top: String,
    pub right: String,
    pub bottom: String,
    pub left: String,
}

impl Default for LightWiring {
    fn default() -> Self {
        Self {
            top: "Y1".into(),
            right: "Y3".into(),
            bottom: "Y4".into(),
            left: "Y5".into(),
        }
    }
}

impl LightWiring {
    pub fn device_for(&self, light: Light) -> &str {
        match light {
            Light::Top => &self.top,
            Light::Right => &self.right,
            Light::Bottom => &self.bottom,
            Light::Left => &self.left,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StationSettings {
    pub plc: PlcEndpoint,
    pub camera: CameraSettings,
    pub polling: PollingSettings,
    pub scan: ScanSettings,
    pub lights: LightWiring,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<StationSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse settings in {}", path.display()))?
        } else {
            StationSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn snapshot(&self) -> StationSettings {
        self.read().clone()
    }

    pub fn plc_endpoint(&self) -> PlcEndpoint {
        self.read().plc.clone()
    }

    pub fn update_plc_endpoint(&self, address: &str, port: u16) -> Result<()> {
        let address = address.trim();
        if address.is_empty() {
            bail!("PLC address must not be empty");
        }
        if port == 0 {
            bail!("PLC port must be between 1 and 65535");
        }

        let mut guard = self.write();
        let mut updated = guard.clone();
        updated.plc = PlcEndpoint {
            address: address.to_string(),
            port,
        };
        self.persist(&updated)?;
        *guard = updated;
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let guard = self.read();
        self.persist(&guard)
    }

    /// Re-reads the file, replacing in-memory values wholesale.
    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: StationSettings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", self.path.display()))?;
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &StationSettings) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, StationSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StationSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
