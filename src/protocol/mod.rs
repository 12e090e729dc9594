//! Protocol Module
//!
//! Length-prefixed framing for opaque payloads.
//!
//! ## Frame Format
//! ```text
//! ┌──────────────┬─────────────────────────────┐
//! │  Len (4, LE) │         Payload             │
//! └──────────────┴─────────────────────────────┘
//! ```
//!
//! The codec never interprets the payload. A frame is never split into
//! more than one payload and two payloads are never merged.

mod buffer;
mod codec;

pub use buffer::ReceiveBuffer;
pub use codec::{
    decode_frame, encode_frame, Decoded, FrameCodec, DEFAULT_MAX_MSG_LEN, HEADER_SIZE,
};
