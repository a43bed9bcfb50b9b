//! file manifest and canonical payload encoding
//!
//! The manifest travels as a fixed 16-byte metadata frame:
//! `[compressed_len: u32 LE][content_hash: u32 LE][block_id_anchor: u32 LE]
//! [decompressed_len: u32 LE]`. The canonical payload it describes is
//! `[filename_len: u8][filename][0x00][file bytes]`.

use thiserror::Error;

/// Exact wire size of a metadata frame.
pub const METADATA_FRAME_BYTES: usize = 16;

/// Filenames travel with a single length byte.
pub const MAX_FILENAME_BYTES: usize = 255;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("filename must be 1..={MAX_FILENAME_BYTES} bytes, got {0}")]
    FilenameLength(usize),

    #[error("metadata frame must be exactly {METADATA_FRAME_BYTES} bytes, got {0}")]
    BadFrameLength(usize),

    #[error("metadata frame declares a zero-length payload")]
    EmptyTransfer,

    #[error("canonical payload is malformed")]
    MalformedPayload,

    #[error("filename is not valid utf-8")]
    FilenameEncoding,
}

/// Out-of-band description of the file being transferred.
///
/// Created once per session by the sender; the receiver treats any change
/// in `compressed_len`, `content_hash` or `decompressed_len` as a new
/// file. The `block_id_anchor` is a resynchronization hint only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileManifest {
    pub compressed_len: u32,
    pub content_hash: u32,
    pub block_id_anchor: u32,
    pub decompressed_len: u32,
}

impl FileManifest {
    pub fn encode(&self) -> [u8; METADATA_FRAME_BYTES] {
        let mut frame = [0u8; METADATA_FRAME_BYTES];
        frame[0..4].copy_from_slice(&self.compressed_len.to_le_bytes());
        frame[4..8].copy_from_slice(&self.content_hash.to_le_bytes());
        frame[8..12].copy_from_slice(&self.block_id_anchor.to_le_bytes());
        frame[12..16].copy_from_slice(&self.decompressed_len.to_le_bytes());
        frame
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ManifestError> {
        if frame.len() != METADATA_FRAME_BYTES {
            return Err(ManifestError::BadFrameLength(frame.len()));
        }
        let field = |i: usize| u32::from_le_bytes([frame[i], frame[i + 1], frame[i + 2], frame[i + 3]]);
        let manifest = Self {
            compressed_len: field(0),
            content_hash: field(4),
            block_id_anchor: field(8),
            decompressed_len: field(12),
        };
        if manifest.compressed_len == 0 || manifest.decompressed_len == 0 {
            return Err(ManifestError::EmptyTransfer);
        }
        Ok(manifest)
    }

    /// Whether `other` describes the same file as `self`, ignoring the
    /// anchor.
    pub fn same_transfer(&self, other: &FileManifest) -> bool {
        self.compressed_len == other.compressed_len
            && self.content_hash == other.content_hash
            && self.decompressed_len == other.decompressed_len
    }
}

/// Hash declared by the manifest, computed over the canonical payload.
pub fn content_hash(canonical: &[u8]) -> u32 {
    crc32fast::hash(canonical)
}

/// Builds the canonical payload the sender compresses and hashes.
pub fn encode_canonical(filename: &str, file_bytes: &[u8]) -> Result<Vec<u8>, ManifestError> {
    let name = filename.as_bytes();
    if name.is_empty() || name.len() > MAX_FILENAME_BYTES {
        return Err(ManifestError::FilenameLength(name.len()));
    }
    let mut payload = Vec::with_capacity(2 + name.len() + file_bytes.len());
    payload.push(name.len() as u8);
    payload.extend_from_slice(name);
    payload.push(0);
    payload.extend_from_slice(file_bytes);
    Ok(payload)
}

/// Splits a recovered canonical payload into filename and file contents.
pub fn decode_canonical(payload: &[u8]) -> Result<(String, Vec<u8>), ManifestError> {
    let name_len = *payload.first().ok_or(ManifestError::MalformedPayload)? as usize;
    if name_len == 0 || payload.len() < 1 + name_len + 1 {
        return Err(ManifestError::MalformedPayload);
    }
    if payload[1 + name_len] != 0 {
        return Err(ManifestError::MalformedPayload);
    }
    let name = std::str::from_utf8(&payload[1..1 + name_len])
        .map_err(|_| ManifestError::FilenameEncoding)?;
    Ok((name.to_owned(), payload[1 + name_len + 1..].to_vec()))
}
