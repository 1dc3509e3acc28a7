//! Opaque identifier newtypes.
//!
//! Peers and input devices are both identified by strings on the wire.  Using
//! separate newtypes makes it impossible to pass a device hash where a peer id
//! is expected (or vice versa) without an explicit conversion.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of leading and trailing characters kept by [`NetworkId::anonymized`].
const ANONYMIZE_KEEP: usize = 5;

/// Identifies a paired peer device on the device-to-device transport.
///
/// An empty `NetworkId` is the "no peer" sentinel used by the cooperate
/// context; check it with [`NetworkId::is_empty`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkId(String);

impl NetworkId {
    /// Wraps a raw network id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the "no peer" sentinel.
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Returns `true` for the "no peer" sentinel.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a form of the id that is safe to write to logs.
    ///
    /// Keeps the first and last five characters and masks the middle, e.g.
    /// `"abcde**vwxyz"`.  Short ids are fully masked.
    pub fn anonymized(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.is_empty() {
            return String::from("<none>");
        }
        if chars.len() <= ANONYMIZE_KEEP * 2 {
            return String::from("**");
        }
        let head: String = chars[..ANONYMIZE_KEEP].iter().collect();
        let tail: String = chars[chars.len() - ANONYMIZE_KEEP..].iter().collect();
        format!("{head}**{tail}")
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetworkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NetworkId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Device hash id: the stable identifier of an input device.
///
/// See [`crate::domain::device::InputDevice::dhid`] for how it is derived.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dhid(String);

impl Dhid {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Dhid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Dhid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Dhid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_network_id_is_no_peer_sentinel() {
        assert!(NetworkId::empty().is_empty());
        assert!(NetworkId::default().is_empty());
        assert!(!NetworkId::from("peer").is_empty());
    }

    #[test]
    fn test_anonymized_keeps_head_and_tail() {
        // Arrange
        let id = NetworkId::from("0123456789abcdefghij");

        // Act
        let masked = id.anonymized();

        // Assert
        assert_eq!(masked, "01234**fghij");
    }

    #[test]
    fn test_anonymized_masks_short_ids_completely() {
        assert_eq!(NetworkId::from("short").anonymized(), "**");
        assert_eq!(NetworkId::empty().anonymized(), "<none>");
    }

    #[test]
    fn test_network_id_and_dhid_display_raw_value() {
        assert_eq!(NetworkId::from("net-a").to_string(), "net-a");
        assert_eq!(Dhid::from("Input_ab").to_string(), "Input_ab");
    }
}
