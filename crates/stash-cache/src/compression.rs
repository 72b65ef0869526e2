//! Body compression for persisted snapshots.

use crate::types::CompressionType;
use stash_core::{Error, Result};
use std::io::{Read, Write};

const ZSTD_LEVEL: i32 = 3;

/// Compress a response body with the given algorithm.
pub fn compress(body: &[u8], algorithm: CompressionType) -> Result<Vec<u8>> {
    match algorithm {
        CompressionType::None => Ok(body.to_vec()),
        CompressionType::Zstd => {
            zstd::stream::encode_all(body, ZSTD_LEVEL).map_err(|e| codec_error("zstd", e))
        }
        CompressionType::Gzip => {
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(body).map_err(|e| codec_error("gzip", e))?;
            encoder.finish().map_err(|e| codec_error("gzip", e))
        }
        CompressionType::Lz4 => Ok(lz4_flex::compress_prepend_size(body)),
    }
}

/// Reverse [`compress`].
pub fn decompress(stored: &[u8], algorithm: CompressionType) -> Result<Vec<u8>> {
    match algorithm {
        CompressionType::None => Ok(stored.to_vec()),
        CompressionType::Zstd => {
            zstd::stream::decode_all(stored).map_err(|e| codec_error("zstd", e))
        }
        CompressionType::Gzip => {
            let mut body = Vec::new();
            flate2::read::GzDecoder::new(stored)
                .read_to_end(&mut body)
                .map_err(|e| codec_error("gzip", e))?;
            Ok(body)
        }
        CompressionType::Lz4 => {
            lz4_flex::decompress_size_prepended(stored).map_err(|e| codec_error("lz4", e))
        }
    }
}

fn codec_error(name: &str, err: impl std::fmt::Display) -> Error {
    Error::Compression(format!("{}: {}", name, err))
}
