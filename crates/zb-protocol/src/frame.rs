//! Request framing
//!
//! # Frame Format
//! ```text
//! [opcode] [param_len] [params...]
//! ```
//!
//! - `opcode`: one byte, see [`Opcode`]
//! - `param_len`: number of parameter bytes that follow (0-255)
//! - `params`: exactly `param_len` raw bytes
//!
//! The parameter bytes may arrive split across any number of transport
//! chunks; [`FrameCodec`] buffers until the frame is complete. Replies are not
//! framed, so there is no reply-side codec here.

use crate::error::ParseError;
use crate::opcode::Opcode;

/// Opcode byte plus length byte
pub const FRAME_HEADER_LEN: usize = 2;

/// Largest parameter block a single frame can carry
pub const MAX_PARAMS_LEN: usize = u8::MAX as usize;

/// One decoded request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    /// Raw opcode byte (may not be a known [`Opcode`])
    pub opcode: u8,
    /// Parameter bytes, exactly as many as the length byte announced
    pub params: Vec<u8>,
}

impl RequestFrame {
    /// Create a frame for a known opcode
    pub fn new(opcode: Opcode, params: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode: opcode.as_u8(),
            params: params.into(),
        }
    }

    /// The opcode, if it is part of the command table
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::try_from(self.opcode).ok()
    }

    /// Encode this frame to its wire format
    pub fn encode(&self) -> Result<Vec<u8>, ParseError> {
        encode_request(self.opcode, &self.params)
    }
}

/// Encode a request frame from a raw opcode byte and parameters
pub fn encode_request(opcode: u8, params: &[u8]) -> Result<Vec<u8>, ParseError> {
    let len = u8::try_from(params.len()).map_err(|_| ParseError::InvalidLength {
        what: "request parameters",
        len: params.len(),
    })?;
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + params.len());
    out.push(opcode);
    out.push(len);
    out.extend_from_slice(params);
    Ok(out)
}

/// Streaming request decoder
#[derive(Debug, Default)]
pub struct FrameCodec {
    buffer: Vec<u8>,
}

impl FrameCodec {
    /// Create a new frame codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(FRAME_HEADER_LEN + MAX_PARAMS_LEN),
        }
    }

    /// Push raw bytes into the codec's buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract the next complete frame from the buffer
    pub fn next_frame(&mut self) -> Option<RequestFrame> {
        if self.missing() > 0 || self.buffer.is_empty() {
            return None;
        }

        let total = FRAME_HEADER_LEN + self.buffer[1] as usize;
        let bytes: Vec<u8> = self.buffer.drain(..total).collect();
        tracing::trace!(
            "Decoded frame 0x{:02X} with {} param bytes, {} bytes still buffered",
            bytes[0],
            total - FRAME_HEADER_LEN,
            self.buffer.len()
        );

        Some(RequestFrame {
            opcode: bytes[0],
            params: bytes[FRAME_HEADER_LEN..].to_vec(),
        })
    }

    /// Bytes still needed to complete the frame at the head of the buffer
    ///
    /// Zero when the buffer is empty or already holds a complete frame.
    pub fn missing(&self) -> usize {
        match self.buffer.len() {
            0 => 0,
            1 => 1,
            len => (FRAME_HEADER_LEN + self.buffer[1] as usize).saturating_sub(len),
        }
    }

    /// True when a partial frame is buffered
    pub fn has_partial(&self) -> bool {
        self.missing() > 0
    }

    /// Number of buffered bytes
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
