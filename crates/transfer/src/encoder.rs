//! sender-side transfer pipeline

use log::info;

use skylink_core::manifest::{self, FileManifest};

use crate::fec::{self, BlockEncoder};
use crate::{compress, TransferConfig, TransferError, BLOCK_BYTES};

/// Turns one file into an endless stream of frames.
///
/// The canonical payload (filename header plus file bytes) is hashed,
/// compressed and padded to whole blocks, then the block engine serves an
/// unbounded id sequence: every `metadata_interval`-th frame is the
/// 16-byte manifest, everything else is a data frame tagged with the
/// truncated block id.
pub struct TransferEncoder {
    compressed_len: u32,
    content_hash: u32,
    decompressed_len: u32,
    fec: BlockEncoder,
    next_block_id: u32,
    frames_emitted: u64,
    metadata_interval: u64,
}

impl TransferEncoder {
    pub fn new(
        filename: &str,
        file_bytes: &[u8],
        cfg: &TransferConfig,
    ) -> Result<Self, TransferError> {
        let canonical = manifest::encode_canonical(filename, file_bytes)?;
        let content_hash = manifest::content_hash(&canonical);
        let decompressed_len = u32::try_from(canonical.len())
            .map_err(|_| TransferError::PayloadTooLarge(canonical.len()))?;

        let mut padded = compress::compress(&canonical, cfg.compress_level)?;
        let compressed_len = u32::try_from(padded.len())
            .map_err(|_| TransferError::PayloadTooLarge(padded.len()))?;
        // The block engine refuses fewer than two blocks, so small
        // payloads are zero-padded; the manifest carries the real length
        // and the receiver strips the pad after recovery.
        padded.resize(fec::padded_len(padded.len(), BLOCK_BYTES), 0);
        let fec = BlockEncoder::new(&padded, BLOCK_BYTES)?;

        info!(
            "compressed {} from {} to {} bytes ({} blocks)",
            filename,
            file_bytes.len(),
            compressed_len,
            fec.source_blocks()
        );
        Ok(Self {
            compressed_len,
            content_hash,
            decompressed_len,
            fec,
            next_block_id: 0,
            frames_emitted: 0,
            metadata_interval: cfg.metadata_interval.max(2) as u64,
        })
    }

    /// Manifest as it would go out right now; the anchor follows the
    /// block counter so late joiners can resynchronize their ids.
    pub fn manifest(&self) -> FileManifest {
        FileManifest {
            compressed_len: self.compressed_len,
            content_hash: self.content_hash,
            block_id_anchor: self.next_block_id,
            decompressed_len: self.decompressed_len,
        }
    }

    /// Next frame payload to transmit.
    ///
    /// Fails only when the block id space is exhausted, which aborts the
    /// session: the stream cannot continue past the engine's addressable
    /// range.
    pub fn next_frame(&mut self) -> Result<Vec<u8>, TransferError> {
        let frame = if self.frames_emitted % self.metadata_interval == 0 {
            self.manifest().encode().to_vec()
        } else {
            let id = self.next_block_id;
            let block = self.fec.block(id)?;
            let mut frame = Vec::with_capacity(1 + block.len());
            frame.push(id as u8);
            frame.extend_from_slice(&block);
            self.next_block_id += 1;
            frame
        };
        self.frames_emitted += 1;
        Ok(frame)
    }

    pub fn blocks_emitted(&self) -> u32 {
        self.next_block_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylink_core::manifest::METADATA_FRAME_BYTES;
    use crate::DATA_FRAME_BYTES;

    #[test]
    fn interleaves_metadata_with_full_size_data_frames() {
        let cfg = TransferConfig {
            metadata_interval: 4,
            ..TransferConfig::default()
        };
        let mut encoder = TransferEncoder::new("hello.txt", b"hi", &cfg).unwrap();
        assert_eq!(encoder.manifest().decompressed_len, 13);

        let first = encoder.next_frame().unwrap();
        assert_eq!(first.len(), METADATA_FRAME_BYTES);

        for expected_id in 0u8..3 {
            let frame = encoder.next_frame().unwrap();
            assert_eq!(frame.len(), DATA_FRAME_BYTES);
            assert_eq!(frame[0], expected_id);
        }

        let fifth = encoder.next_frame().unwrap();
        assert_eq!(fifth.len(), METADATA_FRAME_BYTES);
        let manifest = FileManifest::decode(&fifth).unwrap();
        assert_eq!(manifest.block_id_anchor, 3);
        assert_eq!(encoder.blocks_emitted(), 3);
    }

    #[test]
    fn rejects_unusable_filenames() {
        let cfg = TransferConfig::default();
        assert!(TransferEncoder::new("", b"data", &cfg).is_err());
    }
}
