use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub socket_path: String,
    pub bluetooth: BluetoothConfig,
    pub audio: AudioConfig,
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BluetoothConfig {
    pub ctl_binary: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AudioConfig {
    pub pactl_binary: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanConfig {
    pub timeout_binary: String,
    pub duration_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: "/run/bluedeck/bluedeck.sock".to_string(),
            bluetooth: BluetoothConfig::default(),
            audio: AudioConfig::default(),
            scan: ScanConfig::default(),
        }
    }
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            ctl_binary: "bluetoothctl".to_string(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            pactl_binary: "pactl".to_string(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_binary: "timeout".to_string(),
            duration_secs: 20,
        }
    }
}

impl ScanConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

impl DaemonConfig {
    /// `timeout 0` disables the bound, so a zero scan duration falls back to the default.
    fn bounded(mut self) -> Self {
        if self.scan.duration_secs == 0 {
            let fallback = ScanConfig::default().duration_secs;
            tracing::warn!("scan.duration_secs = 0 would never stop discovery, using {}", fallback);
            self.scan.duration_secs = fallback;
        }
        self
    }

    pub fn load(path: &str) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str::<Self>(&content)?.bounded()),
            Err(_) => {
                // Fall back to defaults and try to leave a template behind
                let config = Self::default();
                if let Err(e) = fs::write(path, toml::to_string_pretty(&config)?) {
                    tracing::debug!("Could not write default config to {}: {}", path, e);
                }
                Ok(config)
            }
        }
    }
}
