//! Error types for coordinator protocol parsing

use thiserror::Error;

/// Errors that can occur while parsing protocol data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Buffer is incomplete - need more data
    #[error("incomplete data: need {needed} more bytes")]
    Incomplete { needed: usize },

    /// Unknown or unsupported opcode
    #[error("unknown opcode: 0x{0:02X}")]
    UnknownOpcode(u8),

    /// Reply status byte outside the defined taxonomy
    #[error("unknown status byte: 0x{0:02X}")]
    UnknownStatus(u8),

    /// Node type byte outside the defined range
    #[error("invalid node type: 0x{0:02X}")]
    InvalidNodeType(u8),

    /// Textual address could not be parsed
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Reply length does not match any valid layout for the opcode
    #[error("invalid reply length {len} for {what}")]
    InvalidLength { what: &'static str, len: usize },

    /// Reply carried a non-success status where a payload was expected
    #[error("reply status: {0}")]
    Status(crate::StatusCode),
}
