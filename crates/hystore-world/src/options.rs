use serde::Deserialize;

use crate::compression::DEFAULT_COMPRESSION_LEVEL;

/// Layout and compression settings for newly created region files.
///
/// Existing files are always read with the values from their own header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RegionOptions {
    /// Zstd level used when writing blobs.
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
    /// Index table entries; 1024 for a 32x32 region.
    #[serde(default = "default_blob_count")]
    pub blob_count: usize,
    #[serde(default = "default_segment_size")]
    pub segment_size: usize,
}

fn default_compression_level() -> i32 {
    DEFAULT_COMPRESSION_LEVEL
}

fn default_blob_count() -> usize {
    1024
}

fn default_segment_size() -> usize {
    4096
}

impl Default for RegionOptions {
    fn default() -> Self {
        Self {
            compression_level: default_compression_level(),
            blob_count: default_blob_count(),
            segment_size: default_segment_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = RegionOptions::default();
        assert_eq!(options.compression_level, 3);
        assert_eq!(options.blob_count, 1024);
        assert_eq!(options.segment_size, 4096);
    }

    #[test]
    fn partial_toml() {
        let options: RegionOptions = toml::from_str("compression_level = 9").unwrap();
        assert_eq!(options.compression_level, 9);
        assert_eq!(options.segment_size, 4096);
    }
}
