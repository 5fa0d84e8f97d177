//! weeclient - client core for the WeeChat relay protocol.
//!
//! This crate connects to a relay, decodes its binary frames and turns them
//! into typed chat events. Presentation is left to the consumer.
//!
//! # Architecture
//!
//! ```text
//! Transport::read_frame ──► Decoder::decode ──► Dispatcher::dispatch ──► Handler
//!        ▲                                                                  │
//!        └──────────── Transport::write ◄── Command queue        Session events
//! ```
//!
//! # Modules
//!
//! - [`transport`] - TCP and WebSocket carriers behind one trait
//! - [`protocol`] - object model, frame decoder, zlib
//! - [`dispatch`] - identifier routing and the [`Handler`] contract
//! - [`domain`] - buffers, lines and nicks
//! - [`commands`] - outbound command text
//! - [`session`] - reader and writer tasks with an event channel
//! - [`config`] - configuration loading/saving

pub mod commands;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod domain;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use commands::Command;
pub use config::Config;
pub use dispatch::{DispatchConfig, DispatchError, Dispatcher, Handler, LineOrder};
pub use domain::{Buffer, Line, Nick, Nicklist};
pub use protocol::{DecodeError, Decoder, DecoderConfig, Message, WireValue};
pub use session::{Event, Session, SessionConfig, SessionHandle};
pub use transport::{ConnectionError, Transport, TransportError, TransportKind};
