//! receiver-side transfer pipeline

use std::collections::VecDeque;

use log::{debug, info, warn};
use tokio::time::Instant;

use skylink_core::counter;
use skylink_core::manifest::{self, FileManifest, METADATA_FRAME_BYTES};

use crate::fec::{BlockDecoder, DecodeOutcome};
use crate::{compress, TransferConfig, TransferError, BLOCK_BYTES, DATA_FRAME_BYTES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// No manifest seen and nothing buffered.
    Idle,
    /// Blocks arriving but the manifest is still unknown.
    Buffering,
    /// Manifest known, block engine being fed.
    Decoding,
    /// File recovered, verified and reported.
    Complete,
    /// Recovery or verification failed; state was discarded.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    None,
    Progress(f32),
    Completed { filename: String, contents: Vec<u8> },
    Failed,
}

/// Reassembles one broadcast file at a time from inbound frame payloads.
///
/// Frames are classified by shape: 16 bytes is a manifest, a full frame
/// is a data block, anything else is channel noise. A change in manifest
/// identity discards the transfer in flight; so does going
/// `receive_timeout` without any recognizable frame.
pub struct TransferDecoder {
    cfg: TransferConfig,
    state: TransferState,
    manifest: Option<FileManifest>,
    fec: Option<BlockDecoder>,
    last_block_id: u32,
    needed_blocks: u32,
    pending: VecDeque<(u8, Vec<u8>)>,
    last_frame_at: Option<Instant>,
    completed: bool,
}

impl TransferDecoder {
    pub fn new(cfg: TransferConfig) -> Self {
        Self {
            cfg,
            state: TransferState::Idle,
            manifest: None,
            fec: None,
            last_block_id: 0,
            needed_blocks: 0,
            pending: VecDeque::new(),
            last_frame_at: None,
            completed: false,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn blocks_received(&self) -> u32 {
        self.fec.as_ref().map(|f| f.blocks_received()).unwrap_or(0)
    }

    pub fn buffered_blocks(&self) -> usize {
        self.pending.len()
    }

    /// Fraction of the minimum block count received so far.
    pub fn progress(&self) -> f32 {
        if self.state == TransferState::Complete {
            return 1.0;
        }
        if self.needed_blocks == 0 {
            return 0.0;
        }
        (self.blocks_received() as f32 / self.needed_blocks as f32).min(1.0)
    }

    /// Handles one frame payload delivered by the link.
    pub fn on_frame(&mut self, payload: &[u8]) -> TransferEvent {
        match payload.len() {
            METADATA_FRAME_BYTES => self.on_metadata(payload),
            DATA_FRAME_BYTES => self.on_block(payload),
            n => {
                debug!("ignoring {n}-byte frame of unknown shape");
                TransferEvent::None
            }
        }
    }

    /// Discards in-flight state if nothing has arrived for the configured
    /// window; returns whether a reset happened.
    pub fn poll_timeout(&mut self) -> bool {
        let Some(at) = self.last_frame_at else {
            return false;
        };
        if at.elapsed() < self.cfg.receive_timeout {
            return false;
        }
        self.last_frame_at = None;
        if self.state != TransferState::Idle {
            info!("receive timeout, discarding transfer state");
            self.reset();
            return true;
        }
        false
    }

    fn on_metadata(&mut self, payload: &[u8]) -> TransferEvent {
        let incoming = match FileManifest::decode(payload) {
            Ok(m) => m,
            Err(e) => {
                debug!("ignoring malformed metadata frame: {e}");
                return TransferEvent::None;
            }
        };
        self.last_frame_at = Some(Instant::now());

        if let Some(current) = self.manifest {
            if current.same_transfer(&incoming) {
                // same file; the fresher anchor just resynchronizes ids
                self.last_block_id = incoming.block_id_anchor;
                self.manifest = Some(incoming);
                return TransferEvent::None;
            }
            info!("differing manifest mid-session, treating as a new file");
            self.reset();
        }
        self.begin_transfer(incoming)
    }

    fn begin_transfer(&mut self, incoming: FileManifest) -> TransferEvent {
        let fec = match BlockDecoder::new(incoming.compressed_len as usize, BLOCK_BYTES) {
            Ok(d) => d,
            Err(e) => {
                warn!("cannot start transfer: {e}");
                self.reset();
                return TransferEvent::None;
            }
        };
        self.manifest = Some(incoming);
        self.fec = Some(fec);
        self.needed_blocks = (incoming.compressed_len as usize)
            .div_ceil(BLOCK_BYTES)
            .max(1) as u32;
        self.last_block_id = incoming.block_id_anchor;
        self.completed = false;
        self.state = TransferState::Decoding;

        // replay whatever arrived before the manifest, oldest first
        let pending: Vec<(u8, Vec<u8>)> = self.pending.drain(..).collect();
        let mut event = TransferEvent::None;
        for (truncated, block) in pending {
            event = self.feed_block(truncated, &block);
            if !matches!(event, TransferEvent::None | TransferEvent::Progress(_)) {
                return event;
            }
        }
        event
    }

    fn on_block(&mut self, payload: &[u8]) -> TransferEvent {
        self.last_frame_at = Some(Instant::now());
        let truncated = payload[0];
        let block = &payload[1..];

        if self.manifest.is_none() {
            if matches!(self.state, TransferState::Idle | TransferState::Failed) {
                self.state = TransferState::Buffering;
            }
            if self.pending.len() == self.cfg.buffered_block_cap {
                self.pending.pop_front();
            }
            self.pending.push_back((truncated, block.to_vec()));
            return TransferEvent::None;
        }
        self.feed_block(truncated, block)
    }

    fn feed_block(&mut self, truncated: u8, block: &[u8]) -> TransferEvent {
        if self.completed {
            return TransferEvent::None;
        }
        let block_id = counter::expand(self.last_block_id, truncated);
        self.last_block_id = block_id;

        let Some(fec) = self.fec.as_mut() else {
            return TransferEvent::None;
        };
        match fec.absorb(block_id, block) {
            Ok(DecodeOutcome::NeedMore) => TransferEvent::Progress(self.progress()),
            Ok(DecodeOutcome::Complete(padded)) => self.finish(padded),
            Err(e) => {
                warn!("block engine rejected block {block_id}: {e}");
                self.fail()
            }
        }
    }

    fn finish(&mut self, padded: Vec<u8>) -> TransferEvent {
        let Some(m) = self.manifest else {
            return self.fail();
        };
        let mut compressed = padded;
        compressed.truncate(m.compressed_len as usize);

        let canonical = match compress::decompress(&compressed, m.decompressed_len as usize) {
            Ok(c) => c,
            Err(e) => {
                warn!("transfer failed: {e}");
                return self.fail();
            }
        };
        let computed = manifest::content_hash(&canonical);
        if computed != m.content_hash {
            let e = TransferError::HashMismatch {
                declared: m.content_hash,
                computed,
            };
            warn!("transfer failed: {e}");
            return self.fail();
        }
        let (filename, contents) = match manifest::decode_canonical(&canonical) {
            Ok(split) => split,
            Err(e) => {
                warn!("transfer failed: {e}");
                return self.fail();
            }
        };

        info!("transfer complete: {} ({} bytes)", filename, contents.len());
        self.completed = true;
        self.state = TransferState::Complete;
        self.fec = None;
        TransferEvent::Completed { filename, contents }
    }

    fn fail(&mut self) -> TransferEvent {
        self.reset();
        self.state = TransferState::Failed;
        TransferEvent::Failed
    }

    fn reset(&mut self) {
        self.state = TransferState::Idle;
        self.manifest = None;
        self.fec = None;
        self.last_block_id = 0;
        self.needed_blocks = 0;
        self.pending.clear();
        self.completed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::TransferEncoder;
    use rand::RngCore;

    fn fast_cfg() -> TransferConfig {
        TransferConfig {
            metadata_interval: 8,
            ..TransferConfig::default()
        }
    }

    fn random_bytes(len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        rand::rng().fill_bytes(&mut data);
        data
    }

    fn run_to_completion(
        encoder: &mut TransferEncoder,
        decoder: &mut TransferDecoder,
        max_frames: usize,
    ) -> Option<(String, Vec<u8>)> {
        for _ in 0..max_frames {
            let frame = encoder.next_frame().unwrap();
            if let TransferEvent::Completed { filename, contents } = decoder.on_frame(&frame) {
                return Some((filename, contents));
            }
        }
        None
    }

    #[test]
    fn small_file_end_to_end() {
        let cfg = fast_cfg();
        let mut encoder = TransferEncoder::new("hello.txt", b"hi", &cfg).unwrap();
        let mut decoder = TransferDecoder::new(cfg);

        let (filename, contents) =
            run_to_completion(&mut encoder, &mut decoder, 64).expect("transfer never completed");
        assert_eq!(filename, "hello.txt");
        assert_eq!(contents, b"hi");
        assert_eq!(decoder.state(), TransferState::Complete);
    }

    #[test]
    fn completion_is_reported_exactly_once() {
        let cfg = fast_cfg();
        let mut encoder = TransferEncoder::new("once.bin", b"payload", &cfg).unwrap();
        let mut decoder = TransferDecoder::new(cfg);

        assert!(run_to_completion(&mut encoder, &mut decoder, 64).is_some());
        for _ in 0..32 {
            let frame = encoder.next_frame().unwrap();
            assert!(!matches!(
                decoder.on_frame(&frame),
                TransferEvent::Completed { .. }
            ));
        }
        assert_eq!(decoder.state(), TransferState::Complete);
    }

    #[test]
    fn blocks_before_the_manifest_are_buffered_and_replayed() {
        let cfg = fast_cfg();
        // incompressible payload, so plenty of blocks are needed
        let file = random_bytes(50_000);
        let mut encoder = TransferEncoder::new("big.bin", &file, &cfg).unwrap();
        let mut decoder = TransferDecoder::new(cfg);

        let manifest_frame = encoder.manifest().encode().to_vec();
        let mut fed = 0;
        while fed < 50 {
            let frame = encoder.next_frame().unwrap();
            if frame.len() != DATA_FRAME_BYTES {
                continue;
            }
            assert_eq!(decoder.on_frame(&frame), TransferEvent::None);
            fed += 1;
        }
        assert_eq!(decoder.state(), TransferState::Buffering);
        assert_eq!(decoder.buffered_blocks(), 50);

        decoder.on_frame(&manifest_frame);
        assert_eq!(decoder.state(), TransferState::Decoding);
        assert_eq!(decoder.blocks_received(), 50);
        assert_eq!(decoder.buffered_blocks(), 0);
    }

    #[test]
    fn replaying_the_same_manifest_does_not_reset_state() {
        let cfg = fast_cfg();
        let file = random_bytes(20_000);
        let mut encoder = TransferEncoder::new("again.bin", &file, &cfg).unwrap();
        let mut decoder = TransferDecoder::new(cfg);

        let manifest_frame = encoder.manifest().encode().to_vec();
        decoder.on_frame(&manifest_frame);
        let mut fed = 0;
        while fed < 5 {
            let frame = encoder.next_frame().unwrap();
            if frame.len() != DATA_FRAME_BYTES {
                continue;
            }
            decoder.on_frame(&frame);
            fed += 1;
        }
        assert_eq!(decoder.blocks_received(), 5);

        assert_eq!(decoder.on_frame(&manifest_frame), TransferEvent::None);
        assert_eq!(decoder.state(), TransferState::Decoding);
        assert_eq!(decoder.blocks_received(), 5);
    }

    #[test]
    fn differing_manifest_discards_the_transfer_in_flight() {
        let cfg = fast_cfg();
        let file_a = random_bytes(20_000);
        let file_b = random_bytes(20_000);
        let mut encoder_a = TransferEncoder::new("a.bin", &file_a, &cfg).unwrap();
        let mut encoder_b = TransferEncoder::new("b.bin", &file_b, &cfg).unwrap();
        let mut decoder = TransferDecoder::new(cfg);

        decoder.on_frame(&encoder_a.manifest().encode());
        for _ in 0..12 {
            let frame = encoder_a.next_frame().unwrap();
            decoder.on_frame(&frame);
        }
        assert!(decoder.blocks_received() > 0);

        decoder.on_frame(&encoder_b.manifest().encode());
        assert_eq!(decoder.state(), TransferState::Decoding);
        assert_eq!(decoder.blocks_received(), 0);

        let (filename, contents) =
            run_to_completion(&mut encoder_b, &mut decoder, 256).expect("second transfer stuck");
        assert_eq!(filename, "b.bin");
        assert_eq!(contents, file_b);
    }

    #[test]
    fn corrupt_declared_hash_fails_the_transfer() {
        let cfg = fast_cfg();
        let mut encoder = TransferEncoder::new("sum.txt", b"check me twice", &cfg).unwrap();
        let mut decoder = TransferDecoder::new(cfg);

        let mut manifest = encoder.manifest();
        manifest.content_hash ^= 1;
        decoder.on_frame(&manifest.encode());

        let mut saw_failure = false;
        for _ in 0..64 {
            let frame = encoder.next_frame().unwrap();
            if frame.len() != DATA_FRAME_BYTES {
                continue;
            }
            if decoder.on_frame(&frame) == TransferEvent::Failed {
                saw_failure = true;
                break;
            }
        }
        assert!(saw_failure);
        assert_eq!(decoder.state(), TransferState::Failed);
        assert_eq!(decoder.buffered_blocks(), 0);
    }

    #[test]
    fn unknown_frame_shapes_are_ignored() {
        let mut decoder = TransferDecoder::new(fast_cfg());
        assert_eq!(decoder.on_frame(&[0u8; 7]), TransferEvent::None);
        assert_eq!(decoder.state(), TransferState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn receive_timeout_returns_to_idle() {
        let cfg = fast_cfg();
        let file = random_bytes(20_000);
        let mut encoder = TransferEncoder::new("stale.bin", &file, &cfg).unwrap();
        let mut decoder = TransferDecoder::new(cfg.clone());

        for _ in 0..4 {
            let frame = encoder.next_frame().unwrap();
            decoder.on_frame(&frame);
        }
        assert_ne!(decoder.state(), TransferState::Idle);

        tokio::time::advance(cfg.receive_timeout / 2).await;
        assert!(!decoder.poll_timeout());

        tokio::time::advance(cfg.receive_timeout).await;
        assert!(decoder.poll_timeout());
        assert_eq!(decoder.state(), TransferState::Idle);
        assert_eq!(decoder.buffered_blocks(), 0);
        assert_eq!(decoder.blocks_received(), 0);
    }
}
