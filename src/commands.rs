//! Outbound command text.
//!
//! The relay reads commands as newline-terminated lines. A command may be
//! prefixed with `(id)`; the reply then carries that identifier, which is
//! how the dispatcher recognizes `listbuffers`, `listlines` and `nicklist`.
//!
//! # Usage
//!
//! ```ignore
//! use weeclient::commands::Command;
//!
//! handle.send(Command::Input {
//!     buffer: "irc.libera.#rust".into(),
//!     text: "hello".into(),
//! })?;
//! ```

use std::fmt;

use crate::config::Config;
use crate::constants::message_id;
use crate::protocol::Compression;

/// A command the client sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Authenticate. Must be the first command after connecting.
    Init {
        /// Relay password; commas are escaped on render.
        password: String,
        /// Compression to request, if any.
        compression: Option<Compression>,
    },
    /// Request every buffer with the fields a [`crate::domain::Buffer`] needs.
    ListBuffers,
    /// Request the last `count` lines of every buffer, newest first.
    ListLines {
        /// Lines per buffer.
        count: u32,
    },
    /// Subscribe to live notifications for all buffers.
    Sync,
    /// Request the nicklist of one buffer (all buffers when empty).
    Nicklist {
        /// Buffer full name or pointer.
        buffer: String,
    },
    /// Send text to a buffer as if typed there.
    Input {
        /// Buffer full name or pointer.
        buffer: String,
        /// Text to send; line breaks become spaces.
        text: String,
    },
    /// Close the relay connection.
    Quit,
}

impl Command {
    /// Rendered command as bytes, ready for the transport.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Single-line rendering safe to log: the password is masked.
    pub fn redacted(&self) -> String {
        match self {
            Self::Init { .. } => "init password=***".to_string(),
            other => other.to_string().trim_end().to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init {
                password,
                compression,
            } => {
                write!(f, "init password={}", escape_option(password))?;
                match compression {
                    Some(Compression::Zlib) => f.write_str(",compression=zlib")?,
                    Some(Compression::None) => f.write_str(",compression=off")?,
                    None => {}
                }
                f.write_str("\n")
            }
            Self::ListBuffers => writeln!(
                f,
                "({}) hdata buffer:gui_buffers(*) \
                 number,full_name,short_name,type,nicklist,title,local_variables,",
                message_id::LIST_BUFFERS
            ),
            Self::ListLines { count } => writeln!(
                f,
                "({}) hdata buffer:gui_buffers(*)/own_lines/last_line(-{count})/data \
                 date,displayed,prefix,message,buffer",
                message_id::LIST_LINES
            ),
            Self::Sync => f.write_str("sync\n"),
            Self::Nicklist { buffer } => {
                let buffer = single_line(buffer);
                let buffer = buffer.trim();
                if buffer.is_empty() {
                    writeln!(f, "({}) nicklist", message_id::NICKLIST)
                } else {
                    writeln!(f, "({}) nicklist {buffer}", message_id::NICKLIST)
                }
            }
            Self::Input { buffer, text } => {
                writeln!(f, "input {} {}", single_line(buffer), single_line(text))
            }
            Self::Quit => f.write_str("quit\n"),
        }
    }
}

/// Commands sent right after connecting: authenticate, list buffers,
/// backfill history, then subscribe to live updates.
pub fn startup_commands(config: &Config) -> Vec<Command> {
    vec![
        Command::Init {
            password: config.password.clone(),
            compression: Some(if config.compression {
                Compression::Zlib
            } else {
                Compression::None
            }),
        },
        Command::ListBuffers,
        Command::ListLines {
            count: config.history_lines,
        },
        Command::Sync,
    ]
}

/// `init` options are comma-separated, so a literal comma is sent as `\,`.
fn escape_option(value: &str) -> String {
    single_line(value).replace(',', "\\,")
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}
