//! Colon-separated MAC address formatting and validation.
//!
//! Addresses are typed by hand into free-text fields, so formatting is applied
//! incrementally on every keystroke and must be idempotent. Validation is a
//! separate, strict check performed before anything is sent to a device.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Length of a fully formatted address: 6 octets plus 5 colons.
pub const MAC_TEXT_LEN: usize = 17;

/// Re-insert colons after every two characters and truncate to 17 characters.
///
/// Existing colons are stripped first, so feeding the output back in returns it
/// unchanged.
///
/// ```
/// use periconf::mac::format_as_typed;
///
/// assert_eq!(format_as_typed("aabbcc"), "aa:bb:cc");
/// assert_eq!(format_as_typed("aa:bb:c"), "aa:bb:c");
/// ```
#[must_use]
pub fn format_as_typed(current: &str) -> String {
    let raw: Vec<char> = current.chars().filter(|c| *c != ':').collect();
    let mut out = String::with_capacity(MAC_TEXT_LEN);
    for (i, pair) in raw.chunks(2).enumerate() {
        if i > 0 {
            out.push(':');
        }
        out.extend(pair);
    }
    out.chars().take(MAC_TEXT_LEN).collect()
}

/// Check that `address` is six colon-separated groups of two hex digits.
///
/// Case is not normalized; `aa:BB:cc:DD:ee:FF` is valid.
#[must_use]
pub fn validate(address: &str) -> bool {
    let groups: Vec<&str> = address.split(':').collect();
    groups.len() == 6
        && groups
            .iter()
            .all(|g| g.len() == 2 && g.chars().all(|c| c.is_ascii_hexdigit()))
}

/// A validated MAC address, kept exactly as the user typed it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MacAddress(String);

impl MacAddress {
    /// Validate and wrap an address. Surrounding whitespace is ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if validate(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(Error::InvalidFormat(format!(
                "'{trimmed}' is not a MAC address (expected AA:BB:CC:DD:EE:FF)"
            )))
        }
    }

    /// The address text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The six octets.
    #[must_use]
    pub fn octets(&self) -> [u8; 6] {
        let mut out = [0u8; 6];
        for (slot, group) in out.iter_mut().zip(self.0.split(':')) {
            *slot = u8::from_str_radix(group, 16).unwrap_or_default();
        }
        out
    }
}

impl FromStr for MacAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
