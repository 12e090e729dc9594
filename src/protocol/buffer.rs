//! Receive buffer
//!
//! Accumulates stream bytes until they resolve into whole frames.

use std::io::{self, Read};

use bytes::{Buf, Bytes, BytesMut};

use super::codec::{Decoded, FrameCodec, HEADER_SIZE};
use crate::error::Result;

/// Upper bound on a single read into the buffer
const READ_CHUNK: usize = 64 * 1024;

/// Per-session buffer of bytes not yet resolved into a frame
///
/// Holds at most one maximal frame (`4 + max_msg_len` bytes). Every frame
/// the codec accepts fits in that bound, so a full buffer always contains a
/// complete frame and reading can never stall on a lack of space.
#[derive(Debug)]
pub struct ReceiveBuffer {
    buf: BytesMut,
    codec: FrameCodec,
}

impl ReceiveBuffer {
    pub fn new(codec: FrameCodec) -> Self {
        Self {
            buf: BytesMut::with_capacity(READ_CHUNK.min(codec.max_frame_len())),
            codec,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes that may still be appended before the buffer is full
    pub fn remaining(&self) -> usize {
        self.codec.max_frame_len().saturating_sub(self.buf.len())
    }

    /// Append bytes directly, up to the remaining capacity
    ///
    /// Returns how many bytes were taken.
    pub fn extend(&mut self, data: &[u8]) -> usize {
        let take = data.len().min(self.remaining());
        self.buf.extend_from_slice(&data[..take]);
        take
    }

    /// Perform one read from `reader` into the buffer
    ///
    /// Returns the number of bytes read; `0` means end of stream.
    pub fn fill_from<R: Read>(&mut self, reader: &mut R) -> io::Result<usize> {
        let want = self.remaining().min(READ_CHUNK);
        if want == 0 {
            return Ok(0);
        }

        let start = self.buf.len();
        self.buf.resize(start + want, 0);
        match reader.read(&mut self.buf[start..]) {
            Ok(n) => {
                self.buf.truncate(start + n);
                Ok(n)
            }
            Err(e) => {
                self.buf.truncate(start);
                Err(e)
            }
        }
    }

    /// Split off the next complete payload, if any
    ///
    /// The buffer is only advanced on success, and then by exactly the
    /// frame's size.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        let consumed = match self.codec.decode(&self.buf)? {
            Decoded::Incomplete { .. } => return Ok(None),
            Decoded::Frame { consumed, .. } => consumed,
        };

        let mut frame = self.buf.split_to(consumed);
        frame.advance(HEADER_SIZE);
        Ok(Some(frame.freeze()))
    }
}
