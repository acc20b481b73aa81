//! Lossless compression applied between archiving and sealing.

use crate::types::SesameError;

/// Compress `data` with zstd at `level`.
pub fn compress(data: &[u8], level: i32) -> Result<Vec<u8>, SesameError> {
    Ok(zstd::encode_all(data, level)?)
}

/// Reverse [`compress`].
///
/// Input that is not a complete zstd stream is a corrupt archive.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, SesameError> {
    if data.is_empty() {
        return Err(SesameError::CorruptArchive("payload is empty"));
    }
    zstd::decode_all(data).map_err(|_| SesameError::CorruptArchive("payload failed to decompress"))
}
