/*!
 * Device Aggregator
 * Merges Bluetooth and audio-server state into one record per device
 */

use std::sync::Arc;

use crate::config::DaemonConfig;
use crate::device::{Address, Device};
use crate::error::Result;
use crate::naming::{find_card_block, find_sink_block};
use crate::process::{args, CommandRunner};
use crate::scanner::{self, DISCOVERING};

pub struct DeviceAggregator {
    runner: Arc<dyn CommandRunner>,
    bluetoothctl: String,
    pactl: String,
}

impl DeviceAggregator {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &DaemonConfig) -> Self {
        Self {
            runner,
            bluetoothctl: config.bluetooth.ctl_binary.clone(),
            pactl: config.audio.pactl_binary.clone(),
        }
    }

    /// Builds a fresh snapshot of every device the controller knows.
    ///
    /// Only a failure to run the Bluetooth tool for the listing itself is
    /// an error; per-device and per-field problems degrade to defaults.
    pub async fn snapshot(&self) -> Result<Vec<Device>> {
        let listing = self.bluetooth(&["devices"]).await?;
        let listed = scanner::parse_device_list(&listing);
        tracing::debug!("Controller lists {} devices", listed.len());

        let mut devices = Vec::with_capacity(listed.len());
        for (mac, name) in listed {
            devices.push(self.device(mac, name).await);
        }
        Ok(devices)
    }

    /// Assembles a single record. Never fails.
    pub async fn device(&self, mac: Address, name: String) -> Device {
        let info_text = match self.bluetooth(&["info", mac.as_str()]).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("No info for {}: {}", mac, e);
                String::new()
            }
        };
        let info = scanner::parse_device_info(&info_text);

        // The A2DP sink only exists while the link is up
        let volume = if info.connected {
            self.sink_volume(&mac).await
        } else {
            None
        };
        let battery = self.battery(&mac).await;

        Device {
            mac,
            name,
            connected: info.connected,
            paired: info.paired,
            trusted: info.trusted,
            rssi: info.rssi,
            device_type: info.device_type,
            a2dp: info.a2dp,
            volume,
            battery,
        }
    }

    /// Whether the controller is currently discovering.
    pub async fn is_scanning(&self) -> Result<bool> {
        let status = self.bluetooth(&["show"]).await?;
        Ok(DISCOVERING.is_present(&status))
    }

    pub async fn sink_volume(&self, mac: &Address) -> Option<u8> {
        let listing = self.audio_listing("sinks").await?;
        let volume = find_sink_block(&listing, mac).and_then(scanner::parse_volume);
        if volume.is_none() {
            tracing::debug!("No sink volume for {}", mac);
        }
        volume
    }

    pub async fn battery(&self, mac: &Address) -> Option<u8> {
        let listing = self.audio_listing("cards").await?;
        find_card_block(&listing, mac).and_then(scanner::parse_battery)
    }

    /// Runs the Bluetooth tool in batch mode and returns its text whatever
    /// the exit status.
    async fn bluetooth(&self, command: &[&str]) -> Result<String> {
        let mut argv = args(["--"]);
        argv.extend(args(command));
        let output = self.runner.run(&self.bluetoothctl, &argv).await?;
        Ok(output.text)
    }

    /// `pactl list <kind>`; a failed or unstartable listing means "unknown".
    async fn audio_listing(&self, kind: &str) -> Option<String> {
        match self.runner.run(&self.pactl, &args(["list", kind])).await {
            Ok(output) if output.success => Some(output.text),
            Ok(_) => {
                tracing::debug!("{} list {} exited non-zero", self.pactl, kind);
                None
            }
            Err(e) => {
                tracing::warn!("Audio server unavailable: {}", e);
                None
            }
        }
    }
}
