//! A decoded relay message.

use super::object::{ObjectType, WireValue};

/// One decoded frame: identifier plus its single top-level object.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Frame length from the header, including the 4-byte length field.
    pub total_size: u32,
    /// Whether the payload was zlib-compressed on the wire.
    pub compressed: bool,
    /// Payload size after decompression (identifier + object + any trailer).
    pub payload_size: usize,
    /// Message identifier; empty when the relay sent a null id.
    pub identifier: String,
    /// Top-level object.
    pub object: WireValue,
}

impl Message {
    /// Type of the top-level object.
    pub fn object_type(&self) -> ObjectType {
        self.object.kind()
    }

    /// Whether the relay sent this as a live notification (`_`-prefixed id)
    /// rather than as a reply to one of our commands.
    pub fn is_event(&self) -> bool {
        self.identifier.starts_with('_')
    }
}
