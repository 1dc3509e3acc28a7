//! Input device record and device-hash id ("dhid") generation.
//!
//! # What is a dhid? (for beginners)
//!
//! The enumeration index the OS gives an input device changes every time it is
//! re-plugged.  Cooperation needs an identifier that stays the same across
//! re-plugs and process restarts, so each device gets a *device hash id*:
//!
//! - **Local devices**: `"Input_"` + hex SHA-256 over a descriptor string
//!   built from vendor, product, unique id, physical path and name.
//! - **Remote virtual devices** (created for a peer's migrated-in devices):
//!   their name carries the `"DistributedInput "` marker and their `phys`
//!   string is `"<prefix>|<networkId>|<dhid>"`, so they self-report both the
//!   owning peer and the stable descriptor without a separate registry.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::identity::{Dhid, NetworkId};

/// Name marker carried by virtual devices that mirror a peer's device.
pub const REMOTE_DEVICE_NAME_MARKER: &str = "DistributedInput ";
/// Prefix of every locally generated dhid.
pub const DHID_PREFIX: &str = "Input_";
/// Separator used inside the `phys` string of a remote virtual device.
const PHYS_SPLIT_SYMBOL: char = '|';
/// Number of `phys` parts of a well-formed remote virtual device.
const REMOTE_PHYS_PARTS: usize = 3;

/// Keyboard classification reported by the input subsystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum KeyboardType {
    #[default]
    None = 0,
    Unknown = 1,
    AlphabeticKeyboard = 2,
    DigitalKeyboard = 3,
    HandwritingPen = 4,
    RemoteControl = 5,
}

impl KeyboardType {
    /// Maps a wire value back to a keyboard type; out-of-range values become
    /// [`KeyboardType::Unknown`].
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => KeyboardType::None,
            2 => KeyboardType::AlphabeticKeyboard,
            3 => KeyboardType::DigitalKeyboard,
            4 => KeyboardType::HandwritingPen,
            5 => KeyboardType::RemoteControl,
            _ => KeyboardType::Unknown,
        }
    }
}

/// Snapshot of one attached input device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDevice {
    pub id: i32,
    pub dev_path: String,
    pub sys_path: String,
    pub bus: i32,
    pub vendor: i32,
    pub product: i32,
    pub version: i32,
    pub name: String,
    pub phys: String,
    pub uniq: String,
    pub is_pointer: bool,
    pub is_keyboard: bool,
    pub keyboard_type: KeyboardType,
}

impl InputDevice {
    /// Returns `true` for virtual devices that mirror a peer's device.
    pub fn is_remote(&self) -> bool {
        self.name.contains(REMOTE_DEVICE_NAME_MARKER)
    }

    pub fn is_alphabetic_keyboard(&self) -> bool {
        self.is_keyboard && self.keyboard_type == KeyboardType::AlphabeticKeyboard
    }

    /// Returns the network id of the peer owning this device.
    ///
    /// Local devices (and malformed remote ones) return the empty id.
    pub fn network_id(&self) -> NetworkId {
        if !self.is_remote() {
            return NetworkId::empty();
        }
        remote_phys_parts(&self.phys)
            .map(|parts| NetworkId::new(parts[1]))
            .unwrap_or_default()
    }

    /// Computes the stable device-hash id.
    ///
    /// Deterministic: two devices with identical vendor, product, unique id,
    /// physical path and name always yield the same value.  A remote device
    /// whose `phys` is not a three-part string yields an empty dhid.
    pub fn dhid(&self) -> Dhid {
        if self.is_remote() && !self.phys.is_empty() {
            return remote_phys_parts(&self.phys)
                .map(|parts| Dhid::new(parts[2]))
                .unwrap_or_default();
        }
        Dhid::new(format!("{DHID_PREFIX}{}", sha256_hex(&self.raw_descriptor())))
    }

    /// Builds the descriptor string hashed into a local dhid.
    fn raw_descriptor(&self) -> String {
        let mut raw = format!(":{:04x}:{:04x}:", self.vendor, self.product);
        if !self.uniq.is_empty() {
            raw.push_str("uniqueId:");
            raw.push_str(&self.uniq);
        }
        if !self.phys.is_empty() {
            raw.push_str("physicalPath:");
            raw.push_str(&self.phys);
        }
        if !self.name.is_empty() {
            raw.push_str("name:");
            raw.extend(self.name.chars().filter(|c| *c != ' '));
        }
        raw
    }
}

fn remote_phys_parts(phys: &str) -> Option<Vec<&str>> {
    let parts: Vec<&str> = phys.split(PHYS_SPLIT_SYMBOL).collect();
    (parts.len() == REMOTE_PHYS_PARTS).then_some(parts)
}

fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        // Writing to a String cannot fail.
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_mouse() -> InputDevice {
        InputDevice {
            id: 5,
            vendor: 0x046d,
            product: 0xc077,
            name: "Logitech USB Optical Mouse".to_string(),
            phys: "usb-0000:00:14.0-1/input0".to_string(),
            uniq: String::new(),
            is_pointer: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_local_dhid_is_prefixed_sha256_hex() {
        // Act
        let dhid = local_mouse().dhid();

        // Assert
        assert!(dhid.as_str().starts_with(DHID_PREFIX));
        assert_eq!(dhid.as_str().len(), DHID_PREFIX.len() + 64);
        assert!(dhid.as_str()[DHID_PREFIX.len()..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_dhid_is_deterministic_for_identical_descriptors() {
        // Arrange
        let a = local_mouse();
        let mut b = local_mouse();
        b.id = 42;
        b.dev_path = "/dev/input/event9".to_string();

        // Act / Assert
        assert_eq!(a.dhid(), b.dhid());
        assert_eq!(a.dhid(), a.dhid());
    }

    #[test]
    fn test_dhid_ignores_spaces_in_name() {
        let a = local_mouse();
        let mut b = local_mouse();
        b.name = "LogitechUSBOpticalMouse".to_string();
        assert_eq!(a.dhid(), b.dhid());
    }

    #[test]
    fn test_dhid_changes_with_physical_path() {
        let a = local_mouse();
        let mut b = local_mouse();
        b.phys = "usb-0000:00:14.0-2/input0".to_string();
        assert_ne!(a.dhid(), b.dhid());
    }

    #[test]
    fn test_raw_descriptor_layout() {
        // Arrange
        let mut dev = local_mouse();
        dev.uniq = "SN01".to_string();

        // Act
        let raw = dev.raw_descriptor();

        // Assert
        assert_eq!(
            raw,
            ":046d:c077:uniqueId:SN01physicalPath:usb-0000:00:14.0-1/input0name:LogitechUSBOpticalMouse"
        );
    }

    #[test]
    fn test_remote_device_reports_network_id_and_descriptor_from_phys() {
        // Arrange
        let dev = InputDevice {
            name: "DistributedInput Mouse".to_string(),
            phys: "virtual|peer-network-b|Input_remote01".to_string(),
            is_pointer: true,
            ..Default::default()
        };

        // Assert
        assert!(dev.is_remote());
        assert_eq!(dev.network_id(), NetworkId::from("peer-network-b"));
        assert_eq!(dev.dhid(), Dhid::from("Input_remote01"));
    }

    #[test]
    fn test_malformed_remote_phys_yields_empty_identifiers() {
        let dev = InputDevice {
            name: "DistributedInput Keyboard".to_string(),
            phys: "virtual|only-two".to_string(),
            ..Default::default()
        };
        assert!(dev.network_id().is_empty());
        assert!(dev.dhid().is_empty());
    }

    #[test]
    fn test_local_device_has_empty_network_id() {
        assert!(local_mouse().network_id().is_empty());
    }

    #[test]
    fn test_keyboard_type_from_unknown_value() {
        assert_eq!(KeyboardType::from_i32(2), KeyboardType::AlphabeticKeyboard);
        assert_eq!(KeyboardType::from_i32(99), KeyboardType::Unknown);
    }
}
