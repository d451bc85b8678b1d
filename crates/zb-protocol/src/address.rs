//! 64-bit long addresses
//!
//! Long addresses are the globally unique identity of a device. On the wire
//! they are always 8 bytes, big-endian.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// Width of a long address on the wire
pub const LONG_ADDRESS_LEN: usize = 8;

/// Globally unique 64-bit device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct LongAddress(pub u64);

impl LongAddress {
    /// Get the raw address value
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Big-endian wire representation
    pub fn to_bytes(&self) -> [u8; LONG_ADDRESS_LEN] {
        self.0.to_be_bytes()
    }

    /// Read an address from the first 8 bytes of `data`
    pub fn from_slice(data: &[u8]) -> Result<Self, ParseError> {
        let bytes: [u8; LONG_ADDRESS_LEN] = data
            .get(..LONG_ADDRESS_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or(ParseError::Incomplete {
                needed: LONG_ADDRESS_LEN.saturating_sub(data.len()),
            })?;
        Ok(Self(u64::from_be_bytes(bytes)))
    }
}

impl From<u64> for LongAddress {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for LongAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

/// Parses hex with or without a `0x` prefix, e.g. `0x0000000000000005` or `5`
impl FromStr for LongAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        u64::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| ParseError::InvalidAddress(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice_is_big_endian() {
        let addr = LongAddress::from_slice(&[0, 0, 0, 0, 0, 0, 0x12, 0x34, 0xFF]).unwrap();
        assert_eq!(addr, LongAddress(0x1234));
    }

    #[test]
    fn test_from_slice_short_input() {
        assert_eq!(
            LongAddress::from_slice(&[0x01, 0x02, 0x03]),
            Err(ParseError::Incomplete { needed: 5 })
        );
    }

    #[test]
    fn test_display_and_parse() {
        let addr = LongAddress(0xDEAD_BEEF);
        assert_eq!(addr.to_string(), "0x00000000DEADBEEF");
        assert_eq!("0x00000000DEADBEEF".parse::<LongAddress>().unwrap(), addr);
        assert_eq!("deadbeef".parse::<LongAddress>().unwrap(), addr);
        assert!("not-hex".parse::<LongAddress>().is_err());
    }
}
