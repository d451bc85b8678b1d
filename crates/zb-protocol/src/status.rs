//! Reply status bytes

use std::fmt;

use crate::error::ParseError;

/// First byte of (almost) every reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StatusCode {
    /// Request executed
    Success = 0x00,
    /// Malformed or mis-sized parameters; nothing was changed
    InvalidParameters = 0x01,
    /// The addressed node is not in the network
    NodeNotFound = 0x02,
    /// Opcode is not part of the command table
    CommandNotSupported = 0x03,
    /// Unexpected internal fault while handling the request
    NetworkError = 0x04,
    /// Reserved; no handler currently emits it
    DeviceBusy = 0x05,
}

impl StatusCode {
    /// Wire value of this status
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// A reply consisting of this status byte alone
    pub fn reply(&self) -> Vec<u8> {
        vec![self.as_u8()]
    }

    /// Returns a human-readable name for the status
    pub fn name(&self) -> &'static str {
        match self {
            StatusCode::Success => "Success",
            StatusCode::InvalidParameters => "InvalidParameters",
            StatusCode::NodeNotFound => "NodeNotFound",
            StatusCode::CommandNotSupported => "CommandNotSupported",
            StatusCode::NetworkError => "NetworkError",
            StatusCode::DeviceBusy => "DeviceBusy",
        }
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Success),
            0x01 => Ok(Self::InvalidParameters),
            0x02 => Ok(Self::NodeNotFound),
            0x03 => Ok(Self::CommandNotSupported),
            0x04 => Ok(Self::NetworkError),
            0x05 => Ok(Self::DeviceBusy),
            other => Err(ParseError::UnknownStatus(other)),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.as_u8())
    }
}
