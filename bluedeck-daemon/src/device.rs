/*!
 * Device Model
 * Per-device state assembled fresh for every snapshot
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BluedeckError;

/// Bluetooth hardware address, normalised to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = BluedeckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let groups: Vec<&str> = s.split(':').collect();
        let well_formed = groups.len() == 6
            && groups
                .iter()
                .all(|g| g.len() == 2 && g.chars().all(|c| c.is_ascii_hexdigit()));

        if well_formed {
            Ok(Self(s.to_ascii_uppercase()))
        } else {
            Err(BluedeckError::Validation(format!(
                "not a Bluetooth address: {:?}",
                s
            )))
        }
    }
}

impl TryFrom<String> for Address {
    type Error = BluedeckError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coarse category derived from the device's icon hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Headset,
    Speaker,
    Phone,
    #[default]
    Other,
}

/// One entry of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub mac: Address,
    pub name: String,
    pub connected: bool,
    pub paired: bool,
    pub trusted: bool,
    pub rssi: Option<i32>,
    pub device_type: DeviceType,
    pub a2dp: bool,
    /// Only ever set while `connected` is true.
    pub volume: Option<u8>,
    pub battery: Option<u8>,
}
