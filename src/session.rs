//! Live relay session.
//!
//! A session owns two tasks over a split [`Transport`]:
//!
//! - Read task: `read_frame` → decode → dispatch → [`Event`]s on a bounded
//!   channel. Sending blocks when the channel is full, so a slow consumer
//!   slows the reader down instead of losing lines.
//! - Write task: drains the FIFO command queue and writes each command in
//!   enqueue order. It closes the write side once the queue is closed and
//!   empty.
//!
//! The tasks share no state; the reader hands every event to the consumer
//! by value.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::commands::Command;
use crate::constants::DEFAULT_EVENT_CAPACITY;
use crate::dispatch::{DispatchConfig, DispatchError, Dispatcher, Handler};
use crate::domain::{Buffer, Line, Nick};
use crate::protocol::{DecodeError, Decoder, DecoderConfig, Message};
use crate::transport::{
    CommandWriter, ConnectionError, FrameReader, Transport, TransportError,
};

/// Settings for [`Session::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Decoder settings.
    pub decoder: DecoderConfig,
    /// Dispatcher settings.
    pub dispatch: DispatchConfig,
    /// Capacity of the event channel (at least 1).
    pub event_capacity: usize,
    /// Give up when no frame arrives for this long.
    pub read_timeout: Option<Duration>,
    /// Commands queued before the session is returned.
    pub startup: Vec<Command>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            decoder: DecoderConfig::default(),
            dispatch: DispatchConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            read_timeout: None,
            startup: Vec::new(),
        }
    }
}

/// Something the consumer needs to know about.
#[derive(Debug)]
pub enum Event {
    /// Buffers from a listing or a buffer-opened notification.
    Buffers(HashMap<String, Buffer>),
    /// One chat line.
    Line(Line),
    /// Users of one buffer's nicklist.
    Nicks {
        /// Buffer identity.
        buffer: String,
        /// Users, group headers excluded.
        nicks: Vec<Nick>,
    },
    /// Message with no dedicated route.
    Unhandled(Message),
    /// A frame was dropped because it could not be decoded.
    DecodeError(DecodeError),
    /// A message was dropped because its shape did not fit its identifier.
    DispatchError(DispatchError),
    /// The reader gave up. Sent once; no events follow.
    ConnectionLost {
        /// Why the connection was considered lost.
        reason: String,
    },
}

/// [`Handler`] that buffers events until the reader forwards them.
#[derive(Debug, Default)]
struct EventCollector {
    events: Vec<Event>,
}

impl Handler for EventCollector {
    fn on_buffers(&mut self, buffers: HashMap<String, Buffer>) {
        self.events.push(Event::Buffers(buffers));
    }

    fn on_line(&mut self, line: Line) {
        self.events.push(Event::Line(line));
    }

    fn on_nicks(&mut self, buffer: &str, nicks: Vec<Nick>) {
        self.events.push(Event::Nicks {
            buffer: buffer.to_string(),
            nicks,
        });
    }

    fn on_unhandled(&mut self, message: Message) {
        self.events.push(Event::Unhandled(message));
    }

    fn on_decode_error(&mut self, error: &DecodeError) {
        self.events.push(Event::DecodeError(error.clone()));
    }

    fn on_dispatch_error(&mut self, error: &DispatchError) {
        self.events.push(Event::DispatchError(error.clone()));
    }
}

/// A connected session: a command handle plus the event stream.
#[derive(Debug)]
pub struct Session {
    handle: SessionHandle,
    events: mpsc::Receiver<Event>,
}

impl Session {
    /// Connect, queue the startup commands, and spawn the reader and
    /// writer tasks.
    ///
    /// # Errors
    ///
    /// Returns the transport's [`ConnectionError`] if connecting fails.
    pub async fn start(
        mut transport: Box<dyn Transport>,
        config: &SessionConfig,
    ) -> Result<Self, ConnectionError> {
        transport.connect().await?;
        let (reader, writer) = transport
            .into_split()
            .map_err(|e| ConnectionError::Refused(e.to_string()))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        for command in &config.startup {
            if let Err(e) = command_tx.send(command.clone()) {
                log::debug!("[Session] Startup command not queued: {}", e.0.redacted());
            }
        }

        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));

        let write_handle = tokio::spawn(write_loop(writer, command_rx));
        let read_handle = tokio::spawn(read_loop(
            reader,
            Decoder::new(config.decoder),
            Dispatcher::new(config.dispatch),
            event_tx,
            config.read_timeout,
        ));

        log::info!(
            "[Session] Started ({} startup commands queued)",
            config.startup.len()
        );
        Ok(Self {
            handle: SessionHandle {
                command_tx,
                read_handle,
                write_handle,
            },
            events: event_rx,
        })
    }

    /// Wait for the next event; `None` once the reader has stopped and every
    /// event has been received.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Command handle.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Separate the command handle from the event stream.
    pub fn into_parts(self) -> (SessionHandle, mpsc::Receiver<Event>) {
        (self.handle, self.events)
    }

    /// Close the command queue, wait for it to drain, stop the reader.
    pub async fn shutdown(self) {
        self.handle.shutdown().await;
    }
}

/// Sends commands to a running session.
pub struct SessionHandle {
    command_tx: UnboundedSender<Command>,
    read_handle: JoinHandle<()>,
    write_handle: JoinHandle<()>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("closed", &self.command_tx.is_closed())
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    /// Queue a command.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the write task has stopped.
    pub fn send(&self, command: Command) -> Result<(), TransportError> {
        self.command_tx
            .send(command)
            .map_err(|_| TransportError::Closed)
    }

    /// Queue chat input for a buffer.
    pub fn send_input(
        &self,
        buffer: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), TransportError> {
        self.send(Command::Input {
            buffer: buffer.into(),
            text: text.into(),
        })
    }

    /// Queue a nicklist request for a buffer.
    pub fn request_nicklist(&self, buffer: impl Into<String>) -> Result<(), TransportError> {
        self.send(Command::Nicklist {
            buffer: buffer.into(),
        })
    }

    /// Close the command queue, wait for the writer to drain it, then stop
    /// the reader.
    pub async fn shutdown(self) {
        let Self {
            command_tx,
            read_handle,
            write_handle,
        } = self;
        drop(command_tx);
        if let Err(e) = write_handle.await {
            log::warn!("[Session] Write task failed: {e}");
        }
        read_handle.abort();
        log::info!("[Session] Shut down");
    }
}

async fn next_frame(
    reader: &mut dyn FrameReader,
    deadline: Option<Duration>,
) -> Result<Bytes, TransportError> {
    match deadline {
        None => reader.read_frame().await,
        Some(deadline) => match tokio::time::timeout(deadline, reader.read_frame()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::TimedOut),
        },
    }
}

/// Read loop: frames → events, until the connection or the consumer is gone.
async fn read_loop(
    mut reader: Box<dyn FrameReader>,
    decoder: Decoder,
    dispatcher: Dispatcher,
    events: mpsc::Sender<Event>,
    deadline: Option<Duration>,
) {
    let mut collector = EventCollector::default();

    loop {
        let frame = match next_frame(reader.as_mut(), deadline).await {
            Ok(frame) => frame,
            Err(e) if !e.is_fatal() => {
                log::warn!("[Session] Dropping message: {e}");
                continue;
            }
            Err(e) => {
                match e {
                    TransportError::Closed => log::info!("[Session] Relay closed the connection"),
                    ref other => log::error!("[Session] Read error: {other}"),
                }
                let lost = Event::ConnectionLost {
                    reason: e.to_string(),
                };
                if events.send(lost).await.is_err() {
                    log::debug!("[Session] Event receiver dropped before connection loss");
                }
                return;
            }
        };

        dispatcher.handle_frame(&decoder, &frame, &mut collector);
        for event in collector.events.drain(..) {
            if events.send(event).await.is_err() {
                log::debug!("[Session] Event receiver dropped, stopping reader");
                return;
            }
        }
    }
}

/// Write loop: drains queued commands to the transport in order.
async fn write_loop(mut writer: Box<dyn CommandWriter>, mut commands: UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        log::debug!("[Session] -> {}", command.redacted());
        if let Err(e) = writer.write(&command.to_bytes()).await {
            log::error!("[Session] Write error: {e}");
            break;
        }
    }
    writer.close().await;
}
