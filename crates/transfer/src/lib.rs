//! file transfer pipelines for Skylink
//!
//! A sender compresses and hashes a file, then streams an endless
//! sequence of erasure-coded blocks plus periodic metadata frames; any
//! receiver that joins the channel eventually collects enough blocks to
//! recover, decompress and verify the file.

use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use skylink_core::framing::MAX_FRAME_PAYLOAD;
use skylink_core::manifest::ManifestError;
use skylink_radio::RadioError;

pub mod compress;
pub mod decoder;
pub mod encoder;
pub mod fec;
pub mod session;

pub use decoder::{TransferDecoder, TransferEvent, TransferState};
pub use encoder::TransferEncoder;
pub use session::{BroadcastReceiver, BroadcastSender};

/// One byte of every data frame is the truncated block id; the rest is
/// the erasure-coded block.
pub const BLOCK_BYTES: usize = MAX_FRAME_PAYLOAD - 1;

/// Data frames always carry a full-size block, so their shape is fixed.
pub const DATA_FRAME_BYTES: usize = MAX_FRAME_PAYLOAD;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("compression failed: {0}")]
    Compress(String),

    #[error("decompression failed: {0}")]
    Decompress(String),

    #[error("decompressed length {actual} does not match the declared {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("payload of {0} bytes exceeds the block engine's address space")]
    PayloadTooLarge(usize),

    #[error("block id space exhausted")]
    BlockIdExhausted,

    #[error("block of {0} bytes does not match the engine block size")]
    BadBlockLength(usize),

    #[error("content hash mismatch: declared {declared:#010x}, computed {computed:#010x}")]
    HashMismatch { declared: u32, computed: u32 },

    #[error(transparent)]
    Radio(#[from] RadioError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Zstd level; low favors speed because the link, not the CPU, is the
    /// bottleneck.
    pub compress_level: i32,
    /// Pacing between transmitted frames.
    pub send_interval: Duration,
    /// A metadata frame is emitted every this many frames.
    pub metadata_interval: u32,
    /// Receiver discards in-flight state after this long without a frame.
    pub receive_timeout: Duration,
    /// Blocks buffered while the manifest is still unknown.
    pub buffered_block_cap: usize,
    /// Cooperative yield between worker loop iterations.
    pub poll_sleep: Duration,
    /// Idle receivers rescan ambient noise this often.
    pub idle_scan_interval: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            compress_level: 1,
            send_interval: Duration::from_millis(100),
            metadata_interval: 32,
            receive_timeout: Duration::from_secs(20),
            buffered_block_cap: 128,
            poll_sleep: Duration::from_millis(4),
            idle_scan_interval: Duration::from_secs(30),
        }
    }
}
