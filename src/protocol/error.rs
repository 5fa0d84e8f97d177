//! Decoder errors.

use super::object::ObjectType;

/// Errors produced while decoding one frame.
///
/// All of them are recoverable: the frame is dropped and the caller keeps
/// reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes remain than a fixed-size step needs.
    Truncated {
        /// What was being read.
        context: &'static str,
        /// Bytes the step needs.
        needed: usize,
        /// Bytes left in the buffer.
        available: usize,
    },
    /// A three-byte type tag that is not part of the protocol.
    UnknownTypeTag(String),
    /// A declared length or count that is negative, breaks the null-length
    /// rules, or runs past the end of the buffer.
    InvalidLength {
        /// What was being read.
        context: &'static str,
        /// Declared length.
        length: i64,
    },
    /// Compression flag other than none (0) or zlib (1).
    UnsupportedCompression(u8),
    /// zlib inflate failed.
    Decompression(String),
    /// Hashtable declared with a key type that cannot be hashed.
    UnsupportedKeyType(ObjectType),
    /// Hdata key schema that is not a list of `name:type` pairs.
    MalformedHdataKeys(String),
    /// Objects nested deeper than the configured limit.
    NestingTooDeep(usize),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated {
                context,
                needed,
                available,
            } => write!(
                f,
                "Truncated {context}: need {needed} bytes, {available} available"
            ),
            Self::UnknownTypeTag(tag) => write!(f, "Unknown object type tag: {tag:?}"),
            Self::InvalidLength { context, length } => {
                write!(f, "Invalid {context} length: {length}")
            }
            Self::UnsupportedCompression(flag) => {
                write!(f, "Unsupported compression flag: {flag}")
            }
            Self::Decompression(msg) => write!(f, "Decompression failed: {msg}"),
            Self::UnsupportedKeyType(kind) => write!(f, "Unsupported hashtable key type: {kind}"),
            Self::MalformedHdataKeys(keys) => write!(f, "Malformed hdata keys: {keys:?}"),
            Self::NestingTooDeep(depth) => write!(f, "Objects nested deeper than {depth}"),
        }
    }
}

impl std::error::Error for DecodeError {}
