/*!
 * Text Scanner
 * Pattern-based extraction of typed fields from free-text tool output
 */

use once_cell::sync::Lazy;
use regex::Regex;

use crate::device::{Address, DeviceType};

/// A rule that pulls one optional value out of a text block.
///
/// Absence of the pattern is `None`, never an error.
pub trait Extract {
    type Output;

    fn extract(&self, block: &str) -> Option<Self::Output>;
}

/// Verbatim marker such as `Connected: yes`.
#[derive(Debug, Clone, Copy)]
pub struct Marker(pub &'static str);

impl Marker {
    pub fn is_present(&self, block: &str) -> bool {
        block.contains(self.0)
    }
}

impl Extract for Marker {
    type Output = bool;

    fn extract(&self, block: &str) -> Option<bool> {
        Some(self.is_present(block))
    }
}

/// First match of a regex whose first capture group is a signed integer.
#[derive(Debug)]
pub struct Labelled(Regex);

impl Labelled {
    /// Patterns are compile-time constants; an invalid one is a programming error.
    pub fn new(pattern: &str) -> Self {
        Self(Regex::new(pattern).expect("static pattern"))
    }
}

impl Extract for Labelled {
    type Output = i64;

    fn extract(&self, block: &str) -> Option<i64> {
        let caps = self.0.captures(block)?;
        caps.get(1)?.as_str().parse().ok()
    }
}

/// Like [`Labelled`], but the capture may carry a trailing `%`.
#[derive(Debug)]
pub struct Percent(Regex);

impl Percent {
    pub fn new(pattern: &str) -> Self {
        Self(Regex::new(pattern).expect("static pattern"))
    }
}

impl Extract for Percent {
    type Output = u8;

    fn extract(&self, block: &str) -> Option<u8> {
        let caps = self.0.captures(block)?;
        parse_percent(caps.get(1)?.as_str())
    }
}

/// Tries each extractor in order; the first hit wins.
pub struct FirstOf<E>(pub Vec<E>);

impl<E: Extract> Extract for FirstOf<E> {
    type Output = E::Output;

    fn extract(&self, block: &str) -> Option<E::Output> {
        self.0.iter().find_map(|e| e.extract(block))
    }
}

/// Ordered substring rules; the first matching rule decides the category.
pub struct Classifier<C: Copy + 'static> {
    rules: &'static [(&'static str, C)],
    fallback: C,
}

impl<C: Copy + 'static> Classifier<C> {
    pub const fn new(rules: &'static [(&'static str, C)], fallback: C) -> Self {
        Self { rules, fallback }
    }

    pub fn classify(&self, block: &str) -> C {
        self.rules
            .iter()
            .find(|(needle, _)| block.contains(needle))
            .map(|(_, category)| *category)
            .unwrap_or(self.fallback)
    }
}

/// Strips an optional trailing `%` and clamps the value to [0,100].
pub fn parse_percent(raw: &str) -> Option<u8> {
    let digits = raw.trim().trim_end_matches('%').trim_end();
    let value: u64 = digits.parse().ok()?;
    Some(value.min(100) as u8)
}

/// Splits a bulk listing into per-record blocks on `delimiter`.
///
/// Text preceding the first delimiter belongs to no record and is dropped.
pub fn split_blocks<'a>(listing: &'a str, delimiter: &'a str) -> impl Iterator<Item = &'a str> {
    listing.split(delimiter).skip(1)
}

pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

// Bluetooth control tool vocabulary

pub const CONNECTED: Marker = Marker("Connected: yes");
pub const PAIRED: Marker = Marker("Paired: yes");
pub const TRUSTED: Marker = Marker("Trusted: yes");
pub const DISCOVERING: Marker = Marker("Discovering: yes");
pub const AUDIO_SINK_UUID: Marker = Marker("UUID: Audio Sink");

/// Accepts both `RSSI: -42` and the newer `RSSI: 0xffffffd6 (-42)`.
/// A bare hex value carries no decimal reading and yields nothing.
static RSSI: Lazy<Labelled> =
    Lazy::new(|| Labelled::new(r"RSSI:\s*(?:0x[0-9a-fA-F]+\s*\()?(-?\d+)\b"));

static DEVICE_TYPES: Classifier<DeviceType> = Classifier::new(
    &[
        ("Icon: audio-headset", DeviceType::Headset),
        ("Icon: audio-card", DeviceType::Headset),
        ("Icon: audio-speakers", DeviceType::Speaker),
        ("Icon: phone", DeviceType::Phone),
    ],
    DeviceType::Other,
);

// Audio server vocabulary

pub const SINK_DELIMITER: &str = "Sink #";
pub const CARD_DELIMITER: &str = "Card #";

static VOLUME: Lazy<Percent> = Lazy::new(|| Percent::new(r"Volume:.*?(\d+%)"));

/// Battery encodings in priority order.
static BATTERY: Lazy<FirstOf<Percent>> = Lazy::new(|| {
    FirstOf(vec![
        Percent::new(r#"(?i)bluetooth\.battery\s*=\s*"?(\d+%)"#),
        Percent::new(r"(?i)battery\.level\s*=\s*(\d+)"),
        Percent::new(r"(?i)Battery Level:\s*(\d+%)"),
    ])
});

/// Fields scraped from one `info <mac>` block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub connected: bool,
    pub paired: bool,
    pub trusted: bool,
    pub rssi: Option<i32>,
    pub device_type: DeviceType,
    pub a2dp: bool,
}

pub fn parse_device_info(block: &str) -> DeviceInfo {
    DeviceInfo {
        connected: CONNECTED.is_present(block),
        paired: PAIRED.is_present(block),
        trusted: TRUSTED.is_present(block),
        rssi: RSSI.extract(block).and_then(|v| i32::try_from(v).ok()),
        device_type: DEVICE_TYPES.classify(block),
        a2dp: AUDIO_SINK_UUID.is_present(block) || contains_ignore_case(block, "a2dp"),
    }
}

/// Parses `Device <MAC> <name...>` lines, skipping anything else.
pub fn parse_device_list(listing: &str) -> Vec<(Address, String)> {
    let mut devices: Vec<(Address, String)> = Vec::new();

    for line in listing.lines() {
        let mut parts = line.split_whitespace();
        if parts.next() != Some("Device") {
            continue;
        }
        let (Some(raw_mac), Some(first)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(mac) = raw_mac.parse::<Address>() else {
            tracing::debug!("skipping device line with malformed address: {}", line);
            continue;
        };
        if devices.iter().any(|(seen, _)| *seen == mac) {
            continue;
        }

        let name = std::iter::once(first).chain(parts).collect::<Vec<_>>().join(" ");
        devices.push((mac, name));
    }

    devices
}

pub fn parse_volume(block: &str) -> Option<u8> {
    VOLUME.extract(block)
}

pub fn parse_battery(block: &str) -> Option<u8> {
    BATTERY.extract(block)
}
