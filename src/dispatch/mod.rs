//! Routes decoded messages to typed domain events.
//!
//! # Routing
//!
//! | Identifier                          | Object | Handler call                 |
//! |-------------------------------------|--------|------------------------------|
//! | `listbuffers`, `_buffer_opened`     | hdata  | `on_buffers` once            |
//! | `_buffer_line_added`                | hdata  | `on_line` per row, live order |
//! | `listlines`                         | hdata  | `on_line` per row, history order |
//! | `nicklist`, `_nicklist`             | hdata  | `on_nicklist` per buffer     |
//! | anything else                       | any    | `on_unhandled`               |
//!
//! Every row of a message is converted before the first handler call, so a
//! malformed row delivers nothing for that message.
//!
//! # Line order
//!
//! The relay answers a history request newest first. With the default
//! [`DispatchConfig`], history is reversed so the consumer sees lines oldest
//! first, while live lines are delivered as received.

mod handler;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::message_id;
use crate::domain::{Buffer, Line, Nick, Nicklist};
use crate::protocol::{Decoder, Hdata, Message, ObjectType, ValueError};

pub use handler::Handler;

/// Order in which the rows of a line message reach [`Handler::on_line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineOrder {
    /// Wire order.
    AsReceived,
    /// Last row first.
    Reversed,
}

impl LineOrder {
    fn apply(self, mut lines: Vec<Line>) -> Vec<Line> {
        if self == Self::Reversed {
            lines.reverse();
        }
        lines
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Order for `_buffer_line_added` rows.
    pub live_order: LineOrder,
    /// Order for `listlines` rows.
    pub history_order: LineOrder,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            live_order: LineOrder::AsReceived,
            history_order: LineOrder::Reversed,
        }
    }
}

/// A decoded message whose shape does not fit its identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The identifier requires an hdata object.
    NotHdata {
        /// Message identifier.
        identifier: String,
        /// Object type actually received.
        actual: ObjectType,
    },
    /// A required row field is absent.
    MissingField(&'static str),
    /// A row field has the wrong wire type.
    FieldType {
        /// Field name.
        field: &'static str,
        /// Expected versus actual type.
        source: ValueError,
    },
    /// A `date` field that is not a unix timestamp.
    InvalidTimestamp(String),
    /// A row without the pointer path its identity comes from.
    MissingPointerPath,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotHdata { identifier, actual } => {
                write!(f, "Message {identifier:?} must carry hdata, got {actual}")
            }
            Self::MissingField(field) => write!(f, "Missing field: {field}"),
            Self::FieldType { field, source } => write!(f, "Field {field}: {source}"),
            Self::InvalidTimestamp(text) => write!(f, "Invalid timestamp: {text:?}"),
            Self::MissingPointerPath => write!(f, "Row has no pointer path"),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::FieldType { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Turns messages into [`Handler`] calls.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    config: DispatchConfig,
}

impl Dispatcher {
    /// Create a dispatcher with the given settings.
    pub fn new(config: DispatchConfig) -> Self {
        Self { config }
    }

    /// Route one message.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] if the object does not have the shape its
    /// identifier requires. No handler method is called in that case.
    pub fn dispatch<H>(&self, message: Message, handler: &mut H) -> Result<(), DispatchError>
    where
        H: Handler + ?Sized,
    {
        match message.identifier.as_str() {
            message_id::LIST_BUFFERS | message_id::BUFFER_OPENED => {
                let hdata = expect_hdata(message)?;
                let buffers = hdata
                    .rows
                    .iter()
                    .map(|row| Buffer::from_row(row).map(|b| (b.identity.clone(), b)))
                    .collect::<Result<HashMap<_, _>, _>>()?;
                handler.on_buffers(buffers);
            }
            message_id::BUFFER_LINE_ADDED => {
                deliver_lines(&expect_hdata(message)?, self.config.live_order, handler)?;
            }
            message_id::LIST_LINES => {
                deliver_lines(&expect_hdata(message)?, self.config.history_order, handler)?;
            }
            message_id::NICKLIST | message_id::NICKLIST_SYNC => {
                for nicklist in group_nicks(&expect_hdata(message)?)? {
                    handler.on_nicklist(nicklist);
                }
            }
            _ => handler.on_unhandled(message),
        }
        Ok(())
    }

    /// Decode and dispatch one frame, reporting failures to the handler's
    /// error hooks instead of returning them.
    pub fn handle_frame<H>(&self, decoder: &Decoder, frame: &[u8], handler: &mut H)
    where
        H: Handler + ?Sized,
    {
        let message = match decoder.decode(frame) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("[Dispatch] Dropping undecodable frame ({} bytes): {e}", frame.len());
                handler.on_decode_error(&e);
                return;
            }
        };

        let identifier = message.identifier.clone();
        if let Err(e) = self.dispatch(message, handler) {
            log::warn!("[Dispatch] {identifier:?}: {e}");
            handler.on_dispatch_error(&e);
        }
    }
}

fn deliver_lines<H>(hdata: &Hdata, order: LineOrder, handler: &mut H) -> Result<(), DispatchError>
where
    H: Handler + ?Sized,
{
    let lines = hdata
        .rows
        .iter()
        .map(Line::from_row)
        .collect::<Result<Vec<_>, _>>()?;
    for line in order.apply(lines) {
        handler.on_line(line);
    }
    Ok(())
}

fn expect_hdata(message: Message) -> Result<Hdata, DispatchError> {
    let Message {
        identifier, object, ..
    } = message;
    object
        .into_hdata()
        .map_err(|e| DispatchError::NotHdata {
            identifier,
            actual: e.actual,
        })
}

/// Group nick rows by owning buffer (first pointer), in order of first
/// appearance.
fn group_nicks(hdata: &Hdata) -> Result<Vec<Nicklist>, DispatchError> {
    let mut lists: Vec<Nicklist> = Vec::new();
    for row in &hdata.rows {
        let buffer = row
            .pointers
            .first()
            .ok_or(DispatchError::MissingPointerPath)?;
        let nick = Nick::from_row(row)?;
        match lists.iter_mut().find(|list| &list.buffer == buffer) {
            Some(list) => list.nicks.push(nick),
            None => lists.push(Nicklist {
                buffer: buffer.clone(),
                nicks: vec![nick],
            }),
        }
    }
    Ok(lists)
}
