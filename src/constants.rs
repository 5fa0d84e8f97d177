//! Protocol and session constants.
//!
//! Centralizes the magic numbers of the relay wire format and the defaults
//! used by [`crate::config::Config`].
//!
//! # Categories
//!
//! - **Wire format**: header layout and message identifiers
//! - **Limits**: guards against hostile or corrupt frames
//! - **Defaults**: session configuration defaults

use std::time::Duration;

// ============================================================================
// Wire format
// ============================================================================

/// Size of the big-endian frame length field. The length counts itself.
pub const LENGTH_FIELD_LEN: usize = 4;

/// Length field plus the one-byte compression flag.
pub const FRAME_HEADER_LEN: usize = LENGTH_FIELD_LEN + 1;

/// Size of an object type tag (`str`, `hda`, ...).
pub const TYPE_TAG_LEN: usize = 3;

/// Message identifiers routed by the dispatcher.
pub mod message_id {
    /// Response to the startup buffer listing.
    pub const LIST_BUFFERS: &str = "listbuffers";
    /// Response to the startup history backfill.
    pub const LIST_LINES: &str = "listlines";
    /// Response to a `nicklist` request.
    pub const NICKLIST: &str = "nicklist";
    /// Live notification: a buffer was opened.
    pub const BUFFER_OPENED: &str = "_buffer_opened";
    /// Live notification: a line was printed in a buffer.
    pub const BUFFER_LINE_ADDED: &str = "_buffer_line_added";
    /// Live notification: full nicklist of a buffer.
    pub const NICKLIST_SYNC: &str = "_nicklist";
}

// ============================================================================
// Limits
// ============================================================================

/// Largest frame the byte-stream transport will buffer (64 MB).
///
/// The relay caps its own messages well below this; anything larger means
/// the stream is out of sync.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Deepest object nesting the decoder follows.
///
/// Real relay messages nest three or four levels (hdata → hashtable → str).
pub const MAX_NESTING_DEPTH: usize = 32;

// ============================================================================
// Defaults
// ============================================================================

/// Default relay port used when the configured address has none.
pub const DEFAULT_RELAY_PORT: u16 = 9001;

/// Default path of the relay WebSocket endpoint.
pub const DEFAULT_WEBSOCKET_PATH: &str = "/weechat";

/// History lines requested per buffer at startup.
pub const DEFAULT_HISTORY_LINES: u32 = 15;

/// Capacity of the event channel between the reader task and the consumer.
///
/// The channel blocks when full so no chat line is ever dropped.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Timeout for the TCP dial or WebSocket handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        assert_eq!(FRAME_HEADER_LEN, 5);
        assert_eq!(TYPE_TAG_LEN, 3);
    }

    #[test]
    fn test_limits_are_reasonable() {
        assert!(MAX_FRAME_SIZE > 1024 * 1024);
        assert!(MAX_NESTING_DEPTH >= 8);
        assert!(DEFAULT_EVENT_CAPACITY > 0);
        assert!(CONNECT_TIMEOUT >= Duration::from_secs(1));
    }
}
