//! fountain-code block engine collaborator
//!
//! Wraps a single-source-block raptorq codec behind the id-driven
//! interface the transfer pipelines speak: the sender asks for block `n`,
//! the receiver feeds whichever blocks survive the channel, and the
//! engine recovers once any sufficiently large subset has arrived.

use raptorq::{
    EncodingPacket, ObjectTransmissionInformation, PayloadId, SourceBlockDecoder,
    SourceBlockEncoder,
};

use crate::TransferError;

/// Largest source symbol count a single raptorq source block supports.
const MAX_SOURCE_SYMBOLS: usize = 56_403;

/// Symbol ids on the wire are 24 bits; stop well short of the top so the
/// repair id mapping can never overflow it.
pub const MAX_BLOCK_ID: u32 = (1 << 24) - (MAX_SOURCE_SYMBOLS as u32) - 1;

/// Whole-block length the compressed payload is padded to. The engine
/// needs at least two blocks, so tiny payloads are padded up.
pub fn padded_len(payload_len: usize, block_bytes: usize) -> usize {
    payload_len.div_ceil(block_bytes).max(2) * block_bytes
}

fn transmission_info(padded: usize, block_bytes: usize) -> ObjectTransmissionInformation {
    ObjectTransmissionInformation::new(padded as u64, block_bytes as u16, 1, 1, 1)
}

pub struct BlockEncoder {
    inner: SourceBlockEncoder,
    source: Vec<EncodingPacket>,
    source_blocks: u32,
}

impl BlockEncoder {
    /// `padded` must already be a whole number of blocks; see
    /// [`padded_len`].
    pub fn new(padded: &[u8], block_bytes: usize) -> Result<Self, TransferError> {
        debug_assert_eq!(padded.len() % block_bytes, 0);
        let blocks = padded.len() / block_bytes;
        if blocks > MAX_SOURCE_SYMBOLS {
            return Err(TransferError::PayloadTooLarge(padded.len()));
        }
        let info = transmission_info(padded.len(), block_bytes);
        let inner = SourceBlockEncoder::new2(0, &info, padded);
        let source = inner.source_packets();
        Ok(Self {
            inner,
            source,
            source_blocks: blocks as u32,
        })
    }

    pub fn source_blocks(&self) -> u32 {
        self.source_blocks
    }

    /// Block `block_id`: the original payload blocks for ids below the
    /// source count, freshly generated repair blocks above it.
    pub fn block(&self, block_id: u32) -> Result<Vec<u8>, TransferError> {
        if block_id > MAX_BLOCK_ID {
            return Err(TransferError::BlockIdExhausted);
        }
        if block_id < self.source_blocks {
            return Ok(self.source[block_id as usize].data().to_vec());
        }
        let repair = self.inner.repair_packets(block_id - self.source_blocks, 1);
        match repair.into_iter().next() {
            Some(packet) => Ok(packet.data().to_vec()),
            None => Err(TransferError::BlockIdExhausted),
        }
    }
}

pub enum DecodeOutcome {
    NeedMore,
    Complete(Vec<u8>),
}

pub struct BlockDecoder {
    inner: SourceBlockDecoder,
    block_bytes: usize,
    source_blocks: u32,
    /// Symbol id the engine assigns to the first repair block; source ids
    /// map straight through, repair ids are offset past this.
    first_repair_id: u32,
    received: u32,
    recovered: Option<Vec<u8>>,
}

impl BlockDecoder {
    pub fn new(payload_len: usize, block_bytes: usize) -> Result<Self, TransferError> {
        let padded = padded_len(payload_len, block_bytes);
        let blocks = padded / block_bytes;
        if blocks > MAX_SOURCE_SYMBOLS {
            return Err(TransferError::PayloadTooLarge(payload_len));
        }
        let info = transmission_info(padded, block_bytes);
        // Probe one throwaway encoder to learn where this block count's
        // repair ids start; the mapping must match the sender exactly.
        let probe = SourceBlockEncoder::new2(0, &info, &vec![0u8; padded]);
        let first_repair_id = match probe.repair_packets(0, 1).first() {
            Some(packet) => packet.payload_id().encoding_symbol_id(),
            None => return Err(TransferError::PayloadTooLarge(payload_len)),
        };
        Ok(Self {
            inner: SourceBlockDecoder::new2(0, &info, padded as u64),
            block_bytes,
            source_blocks: blocks as u32,
            first_repair_id,
            received: 0,
            recovered: None,
        })
    }

    pub fn source_blocks(&self) -> u32 {
        self.source_blocks
    }

    pub fn blocks_received(&self) -> u32 {
        self.received
    }

    /// Feeds one block; returns the recovered padded payload once enough
    /// blocks have arrived.
    pub fn absorb(&mut self, block_id: u32, block: &[u8]) -> Result<DecodeOutcome, TransferError> {
        if block.len() != self.block_bytes {
            return Err(TransferError::BadBlockLength(block.len()));
        }
        if let Some(recovered) = &self.recovered {
            return Ok(DecodeOutcome::Complete(recovered.clone()));
        }
        let symbol_id = if block_id < self.source_blocks {
            block_id
        } else {
            self.first_repair_id + (block_id - self.source_blocks)
        };
        let packet = EncodingPacket::new(PayloadId::new(0, symbol_id), block.to_vec());
        self.received += 1;
        match self.inner.decode(std::iter::once(packet)) {
            Some(recovered) => {
                self.recovered = Some(recovered.clone());
                Ok(DecodeOutcome::Complete(recovered))
            }
            None => Ok(DecodeOutcome::NeedMore),
        }
    }
}
