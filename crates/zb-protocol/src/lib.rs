//! Coordinator Gateway Protocol Library
//!
//! This crate provides parsing and encoding for the vendor-specific binary
//! command protocol spoken by the radio-mesh network coordinator gateway.
//!
//! # Wire Format
//!
//! Requests are framed as:
//!
//! ```text
//! [opcode:1] [param_len:1] [params:param_len]
//! ```
//!
//! Replies carry no framing at all: they are the raw bytes produced by the
//! handler, almost always starting with a [`StatusCode`] byte. Every reply
//! layout is therefore either fixed-size or enumerable from context (see the
//! [`reply`] module). Multi-byte fields are big-endian.
//!
//! # Example
//!
//! ```rust
//! use zb_protocol::{FrameCodec, Opcode};
//!
//! let mut codec = FrameCodec::new();
//! // A GetFirmwareVersion request split across two transport chunks
//! codec.push_bytes(&[0x19, 0x08, 0x00, 0x00]);
//! assert!(codec.next_frame().is_none());
//! codec.push_bytes(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x02]);
//!
//! let frame = codec.next_frame().unwrap();
//! assert_eq!(frame.opcode(), Some(Opcode::GetFirmwareVersion));
//! assert_eq!(frame.params.len(), 8);
//! ```

pub mod address;
pub mod error;
pub mod frame;
pub mod opcode;
pub mod reply;
pub mod status;

pub use address::LongAddress;
pub use error::ParseError;
pub use frame::{encode_request, FrameCodec, RequestFrame, FRAME_HEADER_LEN};
pub use opcode::{Opcode, ParamRule};
pub use reply::{
    ActiveNodeEntry, ActiveNodesReply, AllNodesReply, EncodeReply, FirmwareVersionReply,
    KnownNodeEntry, MeterReading, NetworkInfoReply, FIRMWARE_FIELD_LEN,
};
pub use status::StatusCode;

/// Role of a device in the mesh, as reported in `GetActiveNodes` entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum NodeType {
    /// The network coordinator itself
    Coordinator = 0x00,
    /// Mains-powered routing node
    Router = 0x01,
    /// Leaf device that stays awake
    EndDevice = 0x02,
    /// Leaf device that polls its parent between sleep periods
    SleepyEndDevice = 0x03,
}

impl NodeType {
    /// Returns a human-readable name for the node type
    pub fn name(&self) -> &'static str {
        match self {
            NodeType::Coordinator => "COORDINATOR",
            NodeType::Router => "ROUTER",
            NodeType::EndDevice => "END_DEVICE",
            NodeType::SleepyEndDevice => "SLEEPY_END_DEVICE",
        }
    }

    /// Wire value of this node type
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for NodeType {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Coordinator),
            0x01 => Ok(Self::Router),
            0x02 => Ok(Self::EndDevice),
            0x03 => Ok(Self::SleepyEndDevice),
            other => Err(ParseError::InvalidNodeType(other)),
        }
    }
}
