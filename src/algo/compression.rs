//! Built-in compression providers: Zstandard and LZ4.

use crate::error::{Error, Result};

use super::{CompressionProvider, COMPRESSION_LZ4, COMPRESSION_ZSTD};

/// Default Zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

pub struct ZstdProvider;

impl CompressionProvider for ZstdProvider {
    fn numeric_id(&self) -> u8 {
        COMPRESSION_ZSTD
    }

    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>> {
        zstd::encode_all(data, level).map_err(|e| Error::CompressionFailed(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::decode_all(data).map_err(|e| Error::CompressionFailed(e.to_string()))
    }
}

/// LZ4 with the decompressed size prepended, so decompression needs no
/// out-of-band length.
pub struct Lz4Provider;

impl CompressionProvider for Lz4Provider {
    fn numeric_id(&self) -> u8 {
        COMPRESSION_LZ4
    }

    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress(&self, data: &[u8], _level: i32) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(data))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4_flex::decompress_size_prepended(data)
            .map_err(|e| Error::CompressionFailed(e.to_string()))
    }
}
