//! zlib handling for compressed frames.
//!
//! The fifth byte of every frame is a compression flag:
//!
//! - `0x00`: payload follows uncompressed
//! - `0x01`: payload is a zlib stream
//!
//! The relay decides per message whether to compress; the client only has to
//! inflate.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};

use super::error::DecodeError;

/// Flag byte for an uncompressed payload.
const FLAG_NONE: u8 = 0x00;

/// Flag byte for a zlib payload.
const FLAG_ZLIB: u8 = 0x01;

/// Payload compression announced by the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Plain payload.
    None,
    /// zlib stream.
    Zlib,
}

impl Compression {
    /// Interpret the header flag byte.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnsupportedCompression`] for any other flag.
    pub fn from_flag(flag: u8) -> Result<Self, DecodeError> {
        match flag {
            FLAG_NONE => Ok(Self::None),
            FLAG_ZLIB => Ok(Self::Zlib),
            other => Err(DecodeError::UnsupportedCompression(other)),
        }
    }

    /// The header flag byte.
    pub fn flag(self) -> u8 {
        match self {
            Self::None => FLAG_NONE,
            Self::Zlib => FLAG_ZLIB,
        }
    }
}

/// Inflate a zlib payload of at most `limit` bytes.
///
/// # Errors
///
/// Returns [`DecodeError::Decompression`] if the stream is corrupt or
/// truncated, or if it inflates past `limit`.
pub fn inflate(data: &[u8], limit: usize) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = ZlibDecoder::new(data).take((limit as u64).saturating_add(1));
    let mut out = Vec::with_capacity(data.len().saturating_mul(4).min(limit));
    decoder
        .read_to_end(&mut out)
        .map_err(|e| DecodeError::Decompression(format!("zlib inflate failed: {e}")))?;
    if out.len() > limit {
        return Err(DecodeError::Decompression(format!(
            "inflated payload exceeds {limit} bytes"
        )));
    }
    Ok(out)
}

/// Deflate a payload into a zlib stream.
///
/// The client never compresses what it sends; this exists for building
/// relay-side frames (fake relays, fixtures).
///
/// # Errors
///
/// Returns an I/O error if the encoder fails.
pub fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len()), flate2::Compression::fast());
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_round_trip() {
        assert_eq!(Compression::from_flag(0), Ok(Compression::None));
        assert_eq!(Compression::from_flag(1), Ok(Compression::Zlib));
        assert_eq!(Compression::Zlib.flag(), 1);
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert_eq!(
            Compression::from_flag(2),
            Err(DecodeError::UnsupportedCompression(2))
        );
    }

    #[test]
    fn test_inflate_restores_payload() {
        let data: Vec<u8> = (0..10000).map(|i| (i % 256) as u8).collect();
        let compressed = deflate(&data).expect("deflate");
        assert!(compressed.len() < data.len());
        assert_eq!(inflate(&compressed, data.len()).expect("inflate"), data);
    }

    #[test]
    fn test_inflate_rejects_garbage() {
        let result = inflate(b"definitely not zlib", 1024);
        assert!(matches!(result, Err(DecodeError::Decompression(_))));
    }

    #[test]
    fn test_inflate_stops_at_limit() {
        let data = vec![0u8; 1024 * 1024];
        let compressed = deflate(&data).expect("deflate");
        assert!(compressed.len() < 16 * 1024);

        let result = inflate(&compressed, 64 * 1024);
        assert!(matches!(result, Err(DecodeError::Decompression(_))));
        assert_eq!(inflate(&compressed, data.len()).expect("inflate").len(), data.len());
    }
}
