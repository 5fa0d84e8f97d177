//! Raw TCP transport.
//!
//! The relay's byte stream carries back-to-back frames:
//!
//! ```text
//! [u32 BE length, counts itself] [u8 compression flag] [payload: length-5 bytes]
//! ```
//!
//! A frame is reassembled with two sequential reads: the 4-byte length, then
//! exactly `length - 4` more bytes. The returned buffer re-includes the
//! length prefix.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use super::{
    with_default_port, CommandWriter, ConnectionError, FrameReader, Transport, TransportError,
};
use crate::constants::{CONNECT_TIMEOUT, FRAME_HEADER_LEN, LENGTH_FIELD_LEN};

/// TCP connection to the relay port.
#[derive(Debug)]
pub struct RelayTransport {
    address: String,
    max_frame_size: usize,
    stream: Option<TcpStream>,
}

impl RelayTransport {
    /// Create an unconnected transport for `address` (`host[:port]`).
    pub fn new(address: impl Into<String>, max_frame_size: usize) -> Self {
        Self {
            address: address.into(),
            max_frame_size,
            stream: None,
        }
    }

    fn stream(&mut self) -> Result<&mut TcpStream, TransportError> {
        self.stream.as_mut().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl Transport for RelayTransport {
    async fn connect(&mut self) -> Result<(), ConnectionError> {
        let address = with_default_port(&self.address)?;
        log::debug!("[Relay] Connecting to {address}");

        let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&address)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ConnectionError::Refused(format!("{address}: {e}"))),
            Err(_) => {
                return Err(ConnectionError::Refused(format!(
                    "{address}: timed out after {}s",
                    CONNECT_TIMEOUT.as_secs()
                )))
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("[Relay] Could not set TCP_NODELAY: {e}");
        }

        log::info!("[Relay] Connected to {address}");
        self.stream = Some(stream);
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Bytes, TransportError> {
        let max = self.max_frame_size;
        read_frame_from(self.stream()?, max).await
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream()?;
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                log::debug!("[Relay] Shutdown error: {e}");
            }
        }
    }

    fn into_split(
        mut self: Box<Self>,
    ) -> Result<(Box<dyn FrameReader>, Box<dyn CommandWriter>), TransportError> {
        let stream = self.stream.take().ok_or(TransportError::NotConnected)?;
        let (reader, writer) = stream.into_split();
        Ok((
            Box::new(RelayReader {
                reader,
                max_frame_size: self.max_frame_size,
            }),
            Box::new(RelayWriter { writer }),
        ))
    }
}

/// Read half of a split [`RelayTransport`].
#[derive(Debug)]
pub struct RelayReader {
    reader: OwnedReadHalf,
    max_frame_size: usize,
}

#[async_trait]
impl FrameReader for RelayReader {
    async fn read_frame(&mut self) -> Result<Bytes, TransportError> {
        read_frame_from(&mut self.reader, self.max_frame_size).await
    }
}

/// Write half of a split [`RelayTransport`].
#[derive(Debug)]
pub struct RelayWriter {
    writer: OwnedWriteHalf,
}

#[async_trait]
impl CommandWriter for RelayWriter {
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.writer.write_all(data).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.writer.shutdown().await {
            log::debug!("[Relay] Shutdown error: {e}");
        }
    }
}

/// Read one complete frame from a byte stream.
///
/// # Errors
///
/// - [`TransportError::Closed`] on end of stream before the first byte
/// - [`TransportError::ShortRead`] on end of stream inside a frame
/// - [`TransportError::InvalidFrameLength`] for a length below the header size
/// - [`TransportError::FrameTooLarge`] for a length above `max_frame_size`
pub async fn read_frame_from<R>(reader: &mut R, max_frame_size: usize) -> Result<Bytes, TransportError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; LENGTH_FIELD_LEN];
    match read_full(reader, &mut prefix).await? {
        0 => return Err(TransportError::Closed),
        n if n < LENGTH_FIELD_LEN => {
            return Err(TransportError::ShortRead {
                expected: LENGTH_FIELD_LEN,
                received: n,
            })
        }
        _ => {}
    }

    let length = u32::from_be_bytes(prefix) as usize;
    if length < FRAME_HEADER_LEN {
        return Err(TransportError::InvalidFrameLength(length));
    }
    if length > max_frame_size {
        return Err(TransportError::FrameTooLarge {
            length,
            max: max_frame_size,
        });
    }

    let mut frame = BytesMut::with_capacity(length);
    frame.extend_from_slice(&prefix);
    frame.resize(length, 0);
    let received = read_full(reader, &mut frame[LENGTH_FIELD_LEN..]).await?;
    if received < length - LENGTH_FIELD_LEN {
        return Err(TransportError::ShortRead {
            expected: length,
            received: LENGTH_FIELD_LEN + received,
        });
    }

    log::trace!("[Relay] Read frame of {length} bytes");
    Ok(frame.freeze())
}

/// Fill `buf` unless the stream ends first; returns the bytes read.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, TransportError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
