//! Transport abstraction for relay connections.
//!
//! The relay speaks the same framed protocol over two carriers. This module
//! provides a unified [`Transport`] trait that normalizes both into
//! "read one complete frame" and "write raw command text".
//!
//! # Architecture
//!
//! ```text
//! Transport (trait)
//!     │
//!     ├── RelayTransport (TCP byte stream)
//!     │   └── Reassembles frames from the 4-byte length prefix
//!     │
//!     └── WebSocketTransport (message-oriented)
//!         └── One binary message is one frame
//! ```
//!
//! After [`Transport::connect`], a session calls [`Transport::into_split`]
//! so the reader task owns a [`FrameReader`] and the writer task owns a
//! [`CommandWriter`].
//!
//! # Framing
//!
//! Every frame handed upward starts with the 4-byte big-endian length that
//! counts itself, so the decoder never needs to know which carrier it came
//! from. Nothing is added on write: commands are newline-terminated text.
//!
//! Rust guideline compliant 2025-01

pub mod relay;
pub mod websocket;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::constants::DEFAULT_RELAY_PORT;

pub use relay::RelayTransport;
pub use websocket::WebSocketTransport;

/// Which carrier to use for the relay connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Raw TCP socket to the relay port.
    #[default]
    Relay,
    /// WebSocket, usually behind a reverse proxy.
    WebSocket,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relay => write!(f, "relay"),
            Self::WebSocket => write!(f, "websocket"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "relay" | "tcp" => Ok(Self::Relay),
            "websocket" | "ws" => Ok(Self::WebSocket),
            other => Err(format!("unknown transport: {other}")),
        }
    }
}

/// Errors while establishing a connection. Fatal to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Dial failed or timed out.
    Refused(String),
    /// Connected, but the WebSocket handshake failed.
    HandshakeFailed(String),
    /// The configured address or URL cannot be used.
    InvalidAddress(String),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refused(msg) => write!(f, "Connection refused: {msg}"),
            Self::HandshakeFailed(msg) => write!(f, "Handshake failed: {msg}"),
            Self::InvalidAddress(msg) => write!(f, "Invalid address: {msg}"),
        }
    }
}

impl std::error::Error for ConnectionError {}

/// Errors while reading or writing frames on an open connection.
#[derive(Debug)]
pub enum TransportError {
    /// Used before [`Transport::connect`] succeeded, or after a split.
    NotConnected,
    /// Peer closed the connection cleanly between frames.
    Closed,
    /// Stream ended inside a frame.
    ShortRead {
        /// Bytes the frame declared (length prefix included).
        expected: usize,
        /// Bytes actually received before end of stream.
        received: usize,
    },
    /// Declared frame length smaller than the frame header.
    InvalidFrameLength(usize),
    /// Declared frame length above the configured maximum.
    FrameTooLarge {
        /// Declared length.
        length: usize,
        /// Configured maximum.
        max: usize,
    },
    /// A message the carrier cannot treat as a frame (WebSocket text).
    UnexpectedMessage(String),
    /// No frame arrived within the read deadline.
    TimedOut,
    /// Underlying I/O failure.
    Io(std::io::Error),
}

impl TransportError {
    /// Whether the reader must give up on the connection.
    ///
    /// Only a stray WebSocket text message is dropped and skipped. On a byte
    /// stream, any framing error leaves the reader out of sync.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::UnexpectedMessage(_))
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "Transport not connected"),
            Self::Closed => write!(f, "Connection closed"),
            Self::ShortRead { expected, received } => {
                write!(f, "Short read: expected {expected} bytes, received {received}")
            }
            Self::InvalidFrameLength(length) => write!(f, "Invalid frame length: {length}"),
            Self::FrameTooLarge { length, max } => {
                write!(f, "Frame too large: {length} bytes (max {max})")
            }
            Self::UnexpectedMessage(kind) => write!(f, "Unexpected message: {kind}"),
            Self::TimedOut => write!(f, "Read timed out"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Read half of a split transport.
#[async_trait]
pub trait FrameReader: Send {
    /// Wait for the next complete frame, length prefix included.
    async fn read_frame(&mut self) -> Result<Bytes, TransportError>;
}

/// Write half of a split transport.
#[async_trait]
pub trait CommandWriter: Send {
    /// Send raw command bytes verbatim.
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Flush and close the write side.
    async fn close(&mut self);
}

/// A connection to the relay.
///
/// Implementors own the carrier; framing differences stay inside them.
#[async_trait]
pub trait Transport: Send {
    /// Open the connection (TCP dial, or WebSocket handshake).
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectionError`] if the address is unusable, the dial
    /// fails or times out, or the handshake is rejected.
    async fn connect(&mut self) -> Result<(), ConnectionError>;

    /// Wait for the next complete frame, length prefix included.
    async fn read_frame(&mut self) -> Result<Bytes, TransportError>;

    /// Send raw command bytes verbatim.
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Close the connection. Safe to call when not connected.
    async fn close(&mut self);

    /// Split a connected transport into independently owned halves.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] if called before a
    /// successful [`Transport::connect`].
    fn into_split(
        self: Box<Self>,
    ) -> Result<(Box<dyn FrameReader>, Box<dyn CommandWriter>), TransportError>;
}

/// Build the transport selected by the configuration.
pub fn build(config: &Config) -> Box<dyn Transport> {
    match config.transport {
        TransportKind::Relay => Box::new(RelayTransport::new(
            config.relay.clone(),
            config.max_frame_size,
        )),
        TransportKind::WebSocket => Box::new(WebSocketTransport::new(
            &config.relay,
            &config.websocket_path,
            config.tls,
        )),
    }
}

/// Resolve `host`, `host:port`, `[v6]` or `[v6]:port` to a dialable
/// `host:port`, filling in the default relay port.
///
/// # Errors
///
/// Returns [`ConnectionError::InvalidAddress`] for an empty address or an
/// unparsable port.
pub fn with_default_port(address: &str) -> Result<String, ConnectionError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ConnectionError::InvalidAddress("empty relay address".into()));
    }

    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| ConnectionError::InvalidAddress(address.to_string()))?;
        return match tail.strip_prefix(':') {
            Some(port) => parse_port(port, address).map(|port| format!("[{host}]:{port}")),
            None if tail.is_empty() => Ok(format!("[{host}]:{DEFAULT_RELAY_PORT}")),
            None => Err(ConnectionError::InvalidAddress(address.to_string())),
        };
    }

    match address.split_once(':') {
        None => Ok(format!("{address}:{DEFAULT_RELAY_PORT}")),
        // Bare IPv6 literal
        Some((_, rest)) if rest.contains(':') => Ok(format!("[{address}]:{DEFAULT_RELAY_PORT}")),
        Some((host, port)) => parse_port(port, address).map(|port| format!("{host}:{port}")),
    }
}

fn parse_port(port: &str, address: &str) -> Result<u16, ConnectionError> {
    port.parse::<u16>()
        .map_err(|e| ConnectionError::InvalidAddress(format!("{address}: {e}")))
}
