//! Command opcodes
//!
//! The coordinator answers a fixed table of opcodes. Each opcode declares the
//! parameter length it accepts; requests outside that rule are answered with
//! [`StatusCode::InvalidParameters`](crate::StatusCode::InvalidParameters)
//! before any state is touched.

use std::fmt;

use crate::address::LONG_ADDRESS_LEN;
use crate::error::ParseError;

/// Opcodes of the coordinator command table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Opcode {
    /// Open a session (also sent unsolicited on accept)
    OpenSession = 0x00,
    /// Change a node's long address: old(8) + new(8)
    SetMacAddress = 0x01,
    /// Remove a node: addr(8)
    RemoveNode = 0x05,
    /// Reboot a node: addr(8)
    RebootNode = 0x06,
    /// List nodes currently online
    GetActiveNodes = 0x07,
    /// Allow or deny new devices: flag(1)
    SetPermitJoining = 0x08,
    /// Channel, PAN id, extended PAN id and permit-joining
    GetNetworkInfo = 0x09,
    /// Re-form the network on a random channel and PAN id
    RecreateNetworkRandom = 0x0B,
    /// List every known node with a presence byte
    GetAllNodes = 0x0C,
    /// Firmware version string of a node: addr(8)
    GetFirmwareVersion = 0x19,
    /// Stage a firmware image on the coordinator: blob
    UploadFirmware = 0x1A,
    /// Push firmware to a node: addr(8) + blob
    SendFirmware = 0x1B,
    /// Re-form the network on a chosen channel: channel(1)
    RecreateNetworkChannel = 0x23,
    /// Read meter telemetry: addr(8) + request blob
    SendMeterRequest = 0xAB,
    /// Enable debug output on a node: addr(8) + type(1) + level(1)
    SetDebugMode = 0xDB,
    /// Close the session
    CloseSession = 0xFF,
}

/// Accepted parameter length for an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRule {
    /// Exactly this many bytes (zero for parameterless commands)
    Exact(usize),
    /// At least this many bytes
    AtLeast(usize),
    /// Any length, including none
    Any,
}

impl ParamRule {
    /// Check a parameter length against this rule
    pub fn accepts(&self, len: usize) -> bool {
        match *self {
            ParamRule::Exact(n) => len == n,
            ParamRule::AtLeast(n) => len >= n,
            ParamRule::Any => true,
        }
    }
}

impl fmt::Display for ParamRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamRule::Exact(n) => write!(f, "{n}"),
            ParamRule::AtLeast(n) => write!(f, "{n} or more"),
            ParamRule::Any => f.write_str("any"),
        }
    }
}

impl Opcode {
    /// All opcodes, in table order
    pub const ALL: [Opcode; 16] = [
        Opcode::OpenSession,
        Opcode::SetMacAddress,
        Opcode::RemoveNode,
        Opcode::RebootNode,
        Opcode::GetActiveNodes,
        Opcode::SetPermitJoining,
        Opcode::GetNetworkInfo,
        Opcode::RecreateNetworkRandom,
        Opcode::GetAllNodes,
        Opcode::GetFirmwareVersion,
        Opcode::UploadFirmware,
        Opcode::SendFirmware,
        Opcode::RecreateNetworkChannel,
        Opcode::SendMeterRequest,
        Opcode::SetDebugMode,
        Opcode::CloseSession,
    ];

    /// Wire value of this opcode
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Returns a human-readable name for the opcode
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::OpenSession => "OpenSession",
            Opcode::SetMacAddress => "SetMacAddress",
            Opcode::RemoveNode => "RemoveNode",
            Opcode::RebootNode => "RebootNode",
            Opcode::GetActiveNodes => "GetActiveNodes",
            Opcode::SetPermitJoining => "SetPermitJoining",
            Opcode::GetNetworkInfo => "GetNetworkInfo",
            Opcode::RecreateNetworkRandom => "RecreateNetworkRandom",
            Opcode::GetAllNodes => "GetAllNodes",
            Opcode::GetFirmwareVersion => "GetFirmwareVersion",
            Opcode::UploadFirmware => "UploadFirmware",
            Opcode::SendFirmware => "SendFirmware",
            Opcode::RecreateNetworkChannel => "RecreateNetworkChannel",
            Opcode::SendMeterRequest => "SendMeterRequest",
            Opcode::SetDebugMode => "SetDebugMode",
            Opcode::CloseSession => "CloseSession",
        }
    }

    /// Parameter length accepted by this opcode
    pub fn param_rule(&self) -> ParamRule {
        match self {
            Opcode::OpenSession
            | Opcode::GetActiveNodes
            | Opcode::GetNetworkInfo
            | Opcode::RecreateNetworkRandom
            | Opcode::GetAllNodes
            | Opcode::CloseSession => ParamRule::Exact(0),
            Opcode::SetMacAddress => ParamRule::Exact(2 * LONG_ADDRESS_LEN),
            Opcode::RemoveNode | Opcode::RebootNode | Opcode::GetFirmwareVersion => {
                ParamRule::Exact(LONG_ADDRESS_LEN)
            }
            Opcode::SetPermitJoining | Opcode::RecreateNetworkChannel => ParamRule::Exact(1),
            Opcode::UploadFirmware => ParamRule::Any,
            // Address plus at least one byte of image
            Opcode::SendFirmware => ParamRule::AtLeast(LONG_ADDRESS_LEN + 1),
            Opcode::SendMeterRequest => ParamRule::AtLeast(LONG_ADDRESS_LEN),
            Opcode::SetDebugMode => ParamRule::Exact(LONG_ADDRESS_LEN + 2),
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::OpenSession),
            0x01 => Ok(Self::SetMacAddress),
            0x05 => Ok(Self::RemoveNode),
            0x06 => Ok(Self::RebootNode),
            0x07 => Ok(Self::GetActiveNodes),
            0x08 => Ok(Self::SetPermitJoining),
            0x09 => Ok(Self::GetNetworkInfo),
            0x0B => Ok(Self::RecreateNetworkRandom),
            0x0C => Ok(Self::GetAllNodes),
            0x19 => Ok(Self::GetFirmwareVersion),
            0x1A => Ok(Self::UploadFirmware),
            0x1B => Ok(Self::SendFirmware),
            0x23 => Ok(Self::RecreateNetworkChannel),
            0xAB => Ok(Self::SendMeterRequest),
            0xDB => Ok(Self::SetDebugMode),
            0xFF => Ok(Self::CloseSession),
            other => Err(ParseError::UnknownOpcode(other)),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.as_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip_through_u8() {
        for opcode in Opcode::ALL {
            assert_eq!(Opcode::try_from(opcode.as_u8()), Ok(opcode));
        }
    }

    #[test]
    fn test_unassigned_opcodes_rejected() {
        for byte in [0x02u8, 0x03, 0x04, 0x0A, 0x10, 0x24, 0xAA, 0xFE] {
            assert_eq!(Opcode::try_from(byte), Err(ParseError::UnknownOpcode(byte)));
        }
    }

    #[test]
    fn test_param_rules() {
        assert!(Opcode::GetAllNodes.param_rule().accepts(0));
        assert!(!Opcode::GetAllNodes.param_rule().accepts(1));
        assert!(Opcode::SetMacAddress.param_rule().accepts(16));
        assert!(!Opcode::SetMacAddress.param_rule().accepts(15));
        assert!(!Opcode::SendFirmware.param_rule().accepts(8));
        assert!(Opcode::SendFirmware.param_rule().accepts(9));
        assert!(Opcode::SendMeterRequest.param_rule().accepts(8));
        assert!(Opcode::UploadFirmware.param_rule().accepts(0));
        assert!(Opcode::SetDebugMode.param_rule().accepts(10));
    }
}
