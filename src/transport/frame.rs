//! Length-prefixed JSON frames over a byte stream.
//!
//! Wire format: all integers big-endian.
//! Frame format: len:u32 | payload (UTF-8 JSON document, `len` bytes)

use super::{Inbound, Subscription, Transport, TransportFault};
use crate::dump::DumpRequest;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Maximum frame size (64MB) - prevents OOM from corrupted length prefixes
pub const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Encode a JSON document as a complete frame.
pub fn encode_frame<T: Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    let payload = serde_json::to_vec(value).context("Failed to encode frame payload")?;
    if payload.len() > MAX_FRAME_SIZE as usize {
        anyhow::bail!(
            "Frame size {} exceeds maximum allowed size {}",
            payload.len(),
            MAX_FRAME_SIZE
        );
    }

    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(&payload);
    Ok(buf.freeze())
}

/// Read a single frame payload from the stream.
/// Returns `None` when the stream ends cleanly before a new frame. A stream
/// that ends partway through the length header is an error.
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> Result<Option<Bytes>> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        let n = r
            .read(&mut header[filled..])
            .await
            .context("Failed to read frame length")?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            anyhow::bail!(
                "Connection closed inside frame header ({} of {} bytes)",
                filled,
                header.len()
            );
        }
        filled += n;
    }
    let len = u32::from_be_bytes(header);

    if len > MAX_FRAME_SIZE {
        anyhow::bail!(
            "Frame size {} exceeds maximum allowed size {}",
            len,
            MAX_FRAME_SIZE
        );
    }

    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload)
        .await
        .context("Failed to read frame payload")?;

    Ok(Some(Bytes::from(payload)))
}

/// Write a pre-encoded frame to the stream.
pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, frame: &Bytes) -> Result<()> {
    w.write_all(frame).await.context("Failed to write frame")?;
    Ok(())
}

/// Dump subscription carried over a framed byte stream.
pub struct FrameTransport<R, W> {
    reader: Option<R>,
    writer: Option<W>,
}

impl FrameTransport<OwnedReadHalf, OwnedWriteHalf> {
    /// Connect to a gateway over TCP.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("Failed to connect to {}:{}", host, port))?;
        stream.set_nodelay(true)?;
        tracing::debug!(host, port, "connected");

        let (reader, writer) = stream.into_split();
        Ok(Self::new(reader, writer))
    }
}

impl<R, W> FrameTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Some(reader),
            writer: Some(writer),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }
}

impl<R, W> Subscription for FrameTransport<R, W> {
    fn close(&mut self) {
        // Dropping both halves shuts the connection down.
        if self.reader.take().is_some() {
            tracing::debug!("subscription closed");
        }
        self.writer = None;
    }
}

#[async_trait]
impl<R, W> Transport for FrameTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn subscribe(&mut self, request: &DumpRequest) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .context("Cannot subscribe on a closed connection")?;

        let frame = encode_frame(request)?;
        write_frame(writer, &frame).await?;
        writer.flush().await.context("Failed to flush request")?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Inbound> {
        let reader = self.reader.as_mut()?;
        match read_frame(reader).await {
            Ok(Some(payload)) => match serde_json::from_slice(&payload) {
                Ok(value) => Some(Inbound::Payload(value)),
                Err(e) => Some(Inbound::Fault(TransportFault::new(format!(
                    "Malformed frame payload: {}",
                    e
                )))),
            },
            Ok(None) => None,
            Err(e) => Some(Inbound::Fault(TransportFault::new(format!("{:#}", e)))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::duplex;

    #[test]
    fn test_encode_frame_layout() {
        let frame = encode_frame(&json!({"a": 1})).unwrap();
        assert_eq!(&frame[..4], &7u32.to_be_bytes());
        assert_eq!(&frame[4..], br#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_read_frame_clean_eof() {
        let mut empty: &[u8] = &[];
        assert!(read_frame(&mut empty).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_truncated_header() {
        let mut input: &[u8] = &[0, 0];
        let err = read_frame(&mut input).await.unwrap_err();
        assert!(err.to_string().contains("inside frame header (2 of 4 bytes)"));
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversized() {
        let header = (MAX_FRAME_SIZE + 1).to_be_bytes();
        let mut input: &[u8] = &header;
        let err = read_frame(&mut input).await.unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[tokio::test]
    async fn test_subscribe_and_receive() {
        let (client, mut server) = duplex(4096);
        let (reader, writer) = tokio::io::split(client);
        let mut transport = FrameTransport::new(reader, writer);

        let request = DumpRequest::new("Default", Some(100));
        transport.subscribe(&request).await.unwrap();

        let sent = read_frame(&mut server).await.unwrap().unwrap();
        let sent: serde_json::Value = serde_json::from_slice(&sent).unwrap();
        assert_eq!(sent["type"], "dump");
        assert_eq!(sent["dataset"], "Default");
        assert_eq!(sent["body"]["messagesPerSecond"], 100);

        let frame = encode_frame(&json!({"type": "dump.start", "dataset": "Default"})).unwrap();
        write_frame(&mut server, &frame).await.unwrap();
        server.write_all(&[0, 0, 0, 3, b'{', b'{', b'{']).await.unwrap();
        drop(server);

        match transport.recv().await {
            Some(Inbound::Payload(v)) => assert_eq!(v["type"], "dump.start"),
            other => panic!("Expected payload, got {:?}", other),
        }
        match transport.recv().await {
            Some(Inbound::Fault(fault)) => assert!(fault.description.contains("Malformed")),
            other => panic!("Expected fault, got {:?}", other),
        }
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client, _server) = duplex(64);
        let (reader, writer) = tokio::io::split(client);
        let mut transport = FrameTransport::new(reader, writer);

        transport.close();
        transport.close();
        assert!(transport.is_closed());
        assert!(transport.recv().await.is_none());
        assert!(transport
            .subscribe(&DumpRequest::new("Default", None))
            .await
            .is_err());
    }
}
