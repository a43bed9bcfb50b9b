//! length-prefixed, checksummed framing over a raw byte stream
//!
//! Wire format: `[len: u8][checksum: u32 LE][payload: len bytes]` with
//! `len` in `1..=240`. The deframer scans a bounded append buffer for the
//! next offset that validates, so a corrupted byte costs at most one frame
//! and never desynchronizes the stream.

use bytes::{Buf, BytesMut};
use thiserror::Error;

/// Largest payload the radio accepts in one frame.
pub const MAX_FRAME_PAYLOAD: usize = 240;

/// Length byte plus little-endian CRC-32 of the payload.
pub const FRAME_OVERHEAD: usize = 5;

/// Four frames of headroom before the oldest bytes are dropped.
const DEFAULT_BUFFER_CAP: usize = 4 * (FRAME_OVERHEAD + MAX_FRAME_PAYLOAD);

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame payload is empty")]
    EmptyPayload,

    #[error("frame payload of {0} bytes exceeds the {MAX_FRAME_PAYLOAD} byte maximum")]
    PayloadTooLarge(usize),
}

/// Payload checksum used by the frame layer.
pub fn checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// Wraps a logical packet into one wire frame.
pub fn wrap(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.is_empty() {
        return Err(FrameError::EmptyPayload);
    }
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(FrameError::PayloadTooLarge(payload.len()));
    }
    let mut frame = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    frame.push(payload.len() as u8);
    frame.extend_from_slice(&checksum(payload).to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Incremental frame scanner over a bounded append buffer.
///
/// Bytes that fail to validate are retained until the buffer is full, at
/// which point the oldest are dropped; a frame may therefore start at any
/// offset of the retained tail.
pub struct Deframer {
    buf: BytesMut,
    cap: usize,
    discarded: u64,
}

impl Default for Deframer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deframer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAP)
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(cap.max(FRAME_OVERHEAD + MAX_FRAME_PAYLOAD)),
            cap: cap.max(FRAME_OVERHEAD + MAX_FRAME_PAYLOAD),
            discarded: 0,
        }
    }

    /// Appends raw bytes from the transport, dropping the oldest bytes if
    /// the buffer would overflow.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > self.cap {
            let excess = self.buf.len() - self.cap;
            self.buf.advance(excess);
            self.discarded += excess as u64;
        }
    }

    /// Yields the next validated payload, consuming it and any noise in
    /// front of it. Returns `None` once no complete frame remains.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        for offset in 0..self.buf.len() {
            let len = self.buf[offset] as usize;
            if len == 0 || len > MAX_FRAME_PAYLOAD {
                continue;
            }
            let end = offset + FRAME_OVERHEAD + len;
            if end > self.buf.len() {
                // a shorter candidate further in may still fit
                continue;
            }
            let stored = u32::from_le_bytes([
                self.buf[offset + 1],
                self.buf[offset + 2],
                self.buf[offset + 3],
                self.buf[offset + 4],
            ]);
            let payload = &self.buf[offset + FRAME_OVERHEAD..end];
            if checksum(payload) == stored {
                let payload = payload.to_vec();
                self.discarded += offset as u64;
                self.buf.advance(end);
                return Some(payload);
            }
        }
        None
    }

    /// Drops all retained bytes, e.g. after a mode switch destroyed any
    /// partial frame in flight.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Total bytes skipped during resynchronization or dropped on overflow.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}
