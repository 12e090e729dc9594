//! Frame codec
//!
//! Stateless conversion between a byte stream and discrete payloads.
//!
//! ## Wire Format
//!
//! ```text
//! ┌──────────────┬─────────────────────────────┐
//! │  Len (4, LE) │       Payload (Len bytes)   │
//! └──────────────┴─────────────────────────────┘
//! ```
//!
//! No checksum, version byte or compression.

use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{BenchError, Result};

/// Length prefix size in bytes
pub const HEADER_SIZE: usize = 4;

/// Default maximum payload size (128 KB)
pub const DEFAULT_MAX_MSG_LEN: usize = 128 * 1024;

/// Outcome of a decode attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<'a> {
    /// More bytes are needed. `frame_len` is the full frame size once the
    /// prefix is readable, `None` before that. Nothing may be consumed.
    Incomplete { frame_len: Option<usize> },

    /// A complete frame; the caller consumes exactly `consumed` bytes
    Frame { payload: &'a [u8], consumed: usize },
}

impl<'a> Decoded<'a> {
    pub fn payload(&self) -> Option<&'a [u8]> {
        match *self {
            Decoded::Frame { payload, .. } => Some(payload),
            Decoded::Incomplete { .. } => None,
        }
    }
}

/// Length-prefixed frame codec
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_msg_len: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MSG_LEN)
    }
}

impl FrameCodec {
    pub fn new(max_msg_len: usize) -> Self {
        Self { max_msg_len }
    }

    pub fn max_msg_len(&self) -> usize {
        self.max_msg_len
    }

    /// Largest frame this codec accepts, prefix included
    pub fn max_frame_len(&self) -> usize {
        HEADER_SIZE + self.max_msg_len
    }

    /// Decode the frame at the start of `bytes`
    ///
    /// Insufficient data is never an error. A declared length above the
    /// maximum is rejected as soon as the prefix is readable, so an
    /// oversized frame is never buffered.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Decoded<'a>> {
        if bytes.len() < HEADER_SIZE {
            return Ok(Decoded::Incomplete { frame_len: None });
        }

        let payload_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if payload_len > self.max_msg_len {
            return Err(BenchError::OversizedFrame {
                len: payload_len,
                max: self.max_msg_len,
            });
        }

        let total_len = HEADER_SIZE + payload_len;
        if bytes.len() < total_len {
            return Ok(Decoded::Incomplete {
                frame_len: Some(total_len),
            });
        }

        Ok(Decoded::Frame {
            payload: &bytes[HEADER_SIZE..total_len],
            consumed: total_len,
        })
    }

    /// Encode a payload into a frame
    ///
    /// The output buffer is sized to `4 + len` up front.
    pub fn encode(&self, payload: &[u8]) -> Result<Bytes> {
        let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        self.encode_into(payload, &mut frame)?;
        Ok(frame.freeze())
    }

    /// Append the frame for `payload` to `dst`
    pub fn encode_into(&self, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
        let len = self.checked_len(payload)?;
        dst.reserve(HEADER_SIZE + payload.len());
        dst.put_u32_le(len);
        dst.put_slice(payload);
        Ok(())
    }

    /// Encode and write one frame, flushing the writer
    pub fn write_frame<W: Write>(&self, writer: &mut W, payload: &[u8]) -> Result<usize> {
        let frame = self.encode(payload)?;
        writer.write_all(&frame)?;
        writer.flush()?;
        Ok(frame.len())
    }

    fn checked_len(&self, payload: &[u8]) -> Result<u32> {
        if payload.len() > self.max_msg_len {
            return Err(BenchError::MalformedPayload(format!(
                "payload of {} bytes exceeds maximum {}",
                payload.len(),
                self.max_msg_len
            )));
        }
        u32::try_from(payload.len()).map_err(|_| {
            BenchError::MalformedPayload(format!(
                "payload of {} bytes does not fit a 4-byte length prefix",
                payload.len()
            ))
        })
    }
}

/// Decode with the default maximum length
pub fn decode_frame(bytes: &[u8]) -> Result<Decoded<'_>> {
    FrameCodec::default().decode(bytes)
}

/// Encode with the default maximum length
pub fn encode_frame(payload: &[u8]) -> Result<Bytes> {
    FrameCodec::default().encode(payload)
}
