/*!
 * Identifier Mapper
 * Correlates Bluetooth addresses with audio-server sinks and cards
 */

use crate::device::Address;
use crate::scanner::{contains_ignore_case, split_blocks, CARD_DELIMITER, SINK_DELIMITER};

const SINK_PREFIX: &str = "bluez_sink.";
const SINK_SUFFIX: &str = ".a2dp_sink";

/// Name the audio server gives the A2DP sink of a connected device,
/// e.g. `bluez_sink.AA_BB_CC_DD_EE_FF.a2dp_sink`.
pub fn sink_name(mac: &Address) -> String {
    format!("{}{}{}", SINK_PREFIX, mac.as_str().replace(':', "_"), SINK_SUFFIX)
}

/// Property line that ties a card block to its Bluetooth device.
pub fn card_key(mac: &Address) -> String {
    format!("device.string = \"{}\"", mac)
}

/// First block of a `list sinks` output that mentions the device's sink.
pub fn find_sink_block<'a>(listing: &'a str, mac: &Address) -> Option<&'a str> {
    find_block(listing, SINK_DELIMITER, &sink_name(mac))
}

/// First block of a `list cards` output that belongs to the device.
pub fn find_card_block<'a>(listing: &'a str, mac: &Address) -> Option<&'a str> {
    find_block(listing, CARD_DELIMITER, &card_key(mac))
}

fn find_block<'a>(listing: &'a str, delimiter: &'a str, key: &str) -> Option<&'a str> {
    split_blocks(listing, delimiter).find(|block| contains_ignore_case(block, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn sink_name_follows_bluez_convention() {
        assert_eq!(
            sink_name(&addr("AA:BB:CC:DD:EE:FF")),
            "bluez_sink.AA_BB_CC_DD_EE_FF.a2dp_sink"
        );
    }

    #[test]
    fn sink_name_is_deterministic_and_injective() {
        let macs = [
            "00:00:00:00:00:00",
            "00:00:00:00:00:01",
            "10:00:00:00:00:00",
            "AA:BB:CC:DD:EE:FF",
            "FF:EE:DD:CC:BB:AA",
            "01:23:45:67:89:AB",
        ];
        let names: HashSet<String> = macs.iter().map(|m| sink_name(&addr(m))).collect();
        assert_eq!(names.len(), macs.len());

        for m in macs {
            assert_eq!(sink_name(&addr(m)), sink_name(&addr(m)));
        }
    }

    #[test]
    fn lowercase_input_maps_to_same_sink() {
        assert_eq!(
            sink_name(&addr("aa:bb:cc:dd:ee:ff")),
            sink_name(&addr("AA:BB:CC:DD:EE:FF"))
        );
    }

    #[test]
    fn card_lookup_is_case_insensitive() {
        let listing = "\
Card #0
\tName: alsa_card.pci
\tProperties:
\t\tdevice.string = \"front:0\"
Card #3
\tName: bluez_card.AA_BB_CC_DD_EE_FF
\tProperties:
\t\tdevice.string = \"aa:bb:cc:dd:ee:ff\"
\t\tbluetooth.battery = \"80%\"
";
        let block = find_card_block(listing, &addr("AA:BB:CC:DD:EE:FF")).unwrap();
        assert!(block.contains("bluez_card"));
        assert!(find_card_block(listing, &addr("11:22:33:44:55:66")).is_none());
    }

    #[test]
    fn sink_lookup_misses_silently() {
        let listing = "Sink #0\n\tName: alsa_output.pci.analog-stereo\n";
        assert!(find_sink_block(listing, &addr("AA:BB:CC:DD:EE:FF")).is_none());
    }
}
