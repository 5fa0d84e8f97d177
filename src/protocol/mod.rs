//! Relay wire protocol: object model and frame decoder.
//!
//! # Architecture
//!
//! ```text
//! frame bytes ──► Decoder::decode ──► Message { identifier, object }
//!                    │
//!                    ├── compression (zlib inflate)
//!                    └── object grammar (recursive, depth-bounded)
//! ```
//!
//! The decoder is transport-agnostic: both transports hand it a complete
//! frame including the 4-byte length prefix.

pub mod compression;
pub mod decoder;
pub mod error;
pub mod message;
pub mod object;

#[cfg(test)]
pub(crate) mod testing;

pub use compression::Compression;
pub use decoder::{Decoder, DecoderConfig};
pub use error::DecodeError;
pub use message::Message;
pub use object::{
    Array, FieldMap, HashKey, HashTable, Hdata, HdataKey, HdataRow, Info, InfoList, ObjectType,
    ValueError, WireValue,
};
