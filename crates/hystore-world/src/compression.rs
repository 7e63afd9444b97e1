//! Blob compression.
//!
//! Chunk blobs are Zstandard frames. The uncompressed length is stored next to
//! every blob, so decompression knows the exact output size up front.

use crate::error::{Result, StorageError};

/// Compression level used when none is configured.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Compress raw chunk bytes.
pub fn compress(data: &[u8], level: i32) -> Result<Vec<u8>> {
    zstd::bulk::compress(data, level)
        .map_err(|e| StorageError::Corruption(format!("compression failed: {e}")))
}

/// Decompress a blob whose uncompressed length is known.
///
/// Fails with [`StorageError::Corruption`] unless the frame decodes to exactly
/// `expected_len` bytes.
pub fn decompress(data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    // One spare byte lets an oversized frame be detected instead of truncated.
    let output = zstd::bulk::decompress(data, expected_len + 1)
        .map_err(|e| StorageError::Corruption(format!("decompression failed: {e}")))?;
    if output.len() != expected_len {
        return Err(StorageError::Corruption(format!(
            "decompressed length {} does not match stored length {expected_len}",
            output.len()
        )));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let data = b"Hello, region! This is a test of zstd compression.".repeat(20);
        let compressed = compress(&data, DEFAULT_COMPRESSION_LEVEL).unwrap();
        assert!(compressed.len() < data.len());
        let decompressed = decompress(&compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn empty() {
        let compressed = compress(b"", DEFAULT_COMPRESSION_LEVEL).unwrap();
        let decompressed = decompress(&compressed, 0).unwrap();
        assert!(decompressed.is_empty());
    }

    #[test]
    fn expected_length_too_small() {
        let data = vec![7u8; 5000];
        let compressed = compress(&data, DEFAULT_COMPRESSION_LEVEL).unwrap();
        let err = decompress(&compressed, 4999).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn expected_length_too_large() {
        let data = vec![7u8; 5000];
        let compressed = compress(&data, DEFAULT_COMPRESSION_LEVEL).unwrap();
        let err = decompress(&compressed, 5001).unwrap_err();
        assert!(matches!(err, StorageError::Corruption(_)));
    }

    #[test]
    fn garbage_input() {
        let err = decompress(&[0xDE, 0xAD, 0xBE, 0xEF, 0x00], 16).unwrap_err();
        assert!(err.is_corruption());
    }
}
