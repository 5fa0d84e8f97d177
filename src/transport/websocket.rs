//! WebSocket transport.
//!
//! Thin wrapper around `tokio-tungstenite` providing type-isolated
//! reader/writer halves. The relay sends every frame as one binary message,
//! already carrying the same length-plus-flag header as on TCP, so no
//! reassembly is needed here.
//!
//! # Architecture
//!
//! [`WebSocketTransport::connect`] builds the request from scheme, host and
//! path, then performs the handshake. The stream is split into a
//! [`WsWriter`] and [`WsReader`] so the session's writer and reader tasks
//! can own one each.

// Rust guideline compliant 2026-02

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

use super::{CommandWriter, ConnectionError, FrameReader, Transport, TransportError};
use crate::constants::CONNECT_TIMEOUT;

/// Concrete WebSocket stream type (avoids repeating the generic everywhere).
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// WebSocket connection to the relay.
#[derive(Debug)]
pub struct WebSocketTransport {
    url: String,
    writer: Option<WsWriter>,
    reader: Option<WsReader>,
}

impl WebSocketTransport {
    /// Create an unconnected transport for `host` and `path`.
    ///
    /// `tls` selects `wss://` over `ws://`.
    pub fn new(host: &str, path: &str, tls: bool) -> Self {
        Self {
            url: websocket_url(host, path, tls),
            writer: None,
            reader: None,
        }
    }

    /// The URL the handshake goes to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&mut self) -> Result<(), ConnectionError> {
        use tungstenite::client::IntoClientRequest;

        let request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ConnectionError::InvalidAddress(format!("{}: {e}", self.url)))?;

        log::debug!("[WebSocket] Connecting to {}", self.url);
        let ws_stream =
            match tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(request))
                .await
            {
                Ok(Ok((stream, _response))) => stream,
                Ok(Err(tungstenite::Error::Io(e))) => {
                    return Err(ConnectionError::Refused(format!("{}: {e}", self.url)))
                }
                Ok(Err(tungstenite::Error::Url(e))) => {
                    return Err(ConnectionError::InvalidAddress(format!("{}: {e}", self.url)))
                }
                Ok(Err(e)) => {
                    return Err(ConnectionError::HandshakeFailed(format!("{}: {e}", self.url)))
                }
                Err(_) => {
                    return Err(ConnectionError::Refused(format!(
                        "{}: timed out after {}s",
                        self.url,
                        CONNECT_TIMEOUT.as_secs()
                    )))
                }
            };

        let (sink, stream) = ws_stream.split();
        self.writer = Some(WsWriter { sink });
        self.reader = Some(WsReader { stream });
        log::info!("[WebSocket] Connected to {}", self.url);
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Bytes, TransportError> {
        self.reader
            .as_mut()
            .ok_or(TransportError::NotConnected)?
            .read_frame()
            .await
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.writer
            .as_mut()
            .ok_or(TransportError::NotConnected)?
            .write(data)
            .await
    }

    async fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            writer.close().await;
        }
        self.reader = None;
    }

    fn into_split(
        mut self: Box<Self>,
    ) -> Result<(Box<dyn FrameReader>, Box<dyn CommandWriter>), TransportError> {
        match (self.reader.take(), self.writer.take()) {
            (Some(reader), Some(writer)) => Ok((Box::new(reader), Box::new(writer))),
            _ => Err(TransportError::NotConnected),
        }
    }
}

/// Write half of a WebSocket connection.
#[derive(Debug)]
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

#[async_trait]
impl CommandWriter for WsWriter {
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.sink
            .send(tungstenite::Message::Binary(data.to_vec().into()))
            .await
            .map_err(ws_error)
    }

    async fn close(&mut self) {
        if let Err(e) = self.sink.send(tungstenite::Message::Close(None)).await {
            log::debug!("[WebSocket] Close frame not sent: {e}");
        }
        if let Err(e) = self.sink.close().await {
            log::debug!("[WebSocket] Close failed: {e}");
        }
    }
}

/// Read half of a WebSocket connection.
#[derive(Debug)]
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

#[async_trait]
impl FrameReader for WsReader {
    /// Next binary message. Ping, pong and raw frames are skipped.
    async fn read_frame(&mut self) -> Result<Bytes, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(tungstenite::Message::Binary(data))) => return Ok(Bytes::from(data)),
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return Err(TransportError::UnexpectedMessage(format!(
                        "text message of {} bytes",
                        text.len()
                    )));
                }
                Some(Ok(
                    tungstenite::Message::Ping(_)
                    | tungstenite::Message::Pong(_)
                    | tungstenite::Message::Frame(_),
                )) => continue,
                Some(Ok(tungstenite::Message::Close(close_frame))) => {
                    if let Some(cf) = close_frame {
                        log::debug!(
                            "[WebSocket] Closed by peer: {} {}",
                            u16::from(cf.code),
                            cf.reason
                        );
                    }
                    return Err(TransportError::Closed);
                }
                Some(Err(e)) => return Err(ws_error(e)),
                None => return Err(TransportError::Closed),
            }
        }
    }
}

fn ws_error(e: tungstenite::Error) -> TransportError {
    match e {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        tungstenite::Error::Io(e) => TransportError::Io(e),
        other => TransportError::Io(std::io::Error::other(other)),
    }
}

/// Build the relay WebSocket URL.
///
/// A host that already carries a `ws://` or `wss://` scheme is used as is,
/// and `path` is still appended when the host has none.
pub fn websocket_url(host: &str, path: &str, tls: bool) -> String {
    let host = host.trim().trim_end_matches('/');
    let (scheme, host) = if let Some(rest) = host.strip_prefix("wss://") {
        ("wss", rest)
    } else if let Some(rest) = host.strip_prefix("ws://") {
        ("ws", rest)
    } else if tls {
        ("wss", host)
    } else {
        ("ws", host)
    };

    if host.contains('/') {
        return format!("{scheme}://{host}");
    }
    let path = path.trim();
    if path.is_empty() {
        format!("{scheme}://{host}/")
    } else if path.starts_with('/') {
        format!("{scheme}://{host}{path}")
    } else {
        format!("{scheme}://{host}/{path}")
    }
}
