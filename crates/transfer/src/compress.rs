//! lossless byte compressor collaborator

use crate::TransferError;

pub fn compress(data: &[u8], level: i32) -> Result<Vec<u8>, TransferError> {
    zstd::bulk::compress(data, level).map_err(|e| TransferError::Compress(e.to_string()))
}

/// Decompresses `data`, requiring the output to be exactly
/// `expected_len` bytes.
pub fn decompress(data: &[u8], expected_len: usize) -> Result<Vec<u8>, TransferError> {
    let out = zstd::bulk::decompress(data, expected_len)
        .map_err(|e| TransferError::Decompress(e.to_string()))?;
    if out.len() != expected_len {
        return Err(TransferError::LengthMismatch {
            expected: expected_len,
            actual: out.len(),
        });
    }
    Ok(out)
}
