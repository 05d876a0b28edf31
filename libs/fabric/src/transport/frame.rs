use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tracing::warn;

use crate::error::{Error, Result};
use crate::transport::MAX_FRAME_LEN;

/// Length-prefixed framing over a split byte stream
///
/// Messages are sent with a 4-byte big-endian length prefix. Reader and
/// writer halves sit behind separate locks so a receive loop never blocks a
/// send; `close` interrupts a pending receive through the `closed` signal.
///
/// A receive cut short by its timeout or by `close` keeps whatever part of
/// the frame it already read, and the next receive carries on from there. A
/// send cut short by its timeout may leave half a frame on the wire, so the
/// writer is dropped and later sends fail.
pub(crate) struct FramedStream<R, W> {
    reader: Mutex<Option<FrameReader<R>>>,
    writer: Mutex<Option<W>>,
    open: AtomicBool,
    closed: watch::Sender<bool>,
    send_timeout: Option<Duration>,
    receive_timeout: Option<Duration>,
}

impl<R, W> FramedStream<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub(crate) fn new(send_timeout: Option<Duration>, receive_timeout: Option<Duration>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            open: AtomicBool::new(false),
            closed,
            send_timeout,
            receive_timeout,
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    pub(crate) async fn attach(&self, reader: R, writer: W) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        *self.reader.lock().await = Some(FrameReader::new(reader));
        *self.writer.lock().await = Some(writer);
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    pub(crate) async fn send(&self, bytes: &[u8]) -> Result<()> {
        let len = frame_len(bytes.len())?;
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| Error::NotOpen("stream has no writer".to_string()))?;

        let send_op = async {
            // Write length prefix (4 bytes, big-endian)
            writer.write_u32(len).await?;

            // Write data
            writer.write_all(bytes).await?;
            writer.flush().await?;

            Ok::<(), Error>(())
        };

        let Some(timeout) = self.send_timeout else {
            return send_op.await;
        };
        let outcome = tokio::time::timeout(timeout, send_op).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(?timeout, "send timed out mid-frame; dropping the writer");
                guard.take();
                self.open.store(false, Ordering::Release);
                Err(Error::timeout("send", timeout))
            }
        }
    }

    pub(crate) async fn receive(&self) -> Result<Vec<u8>> {
        let mut closed = self.closed.subscribe();
        let mut guard = self.reader.lock().await;
        let reader = guard
            .as_mut()
            .ok_or_else(|| Error::NotOpen("stream has no reader".to_string()))?;

        let bounded = async {
            if let Some(timeout) = self.receive_timeout {
                tokio::time::timeout(timeout, reader.next_frame())
                    .await
                    .map_err(|_| Error::timeout("receive", timeout))?
            } else {
                reader.next_frame().await
            }
        };

        let result = tokio::select! {
            result = bounded => result,
            _ = closed.wait_for(|closed| *closed) => Err(Error::ConnectionClosed),
        };

        if matches!(result, Err(Error::ConnectionClosed)) {
            self.open.store(false, Ordering::Release);
        }
        result
    }

    pub(crate) async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::Release);
        if self.closed.send_replace(true) {
            return Ok(());
        }
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            writer.shutdown().await?;
        }
        Ok(())
    }
}

fn frame_len(len: usize) -> Result<u32> {
    if len > MAX_FRAME_LEN {
        return Err(Error::InvalidFrame(format!("Message too large: {len} bytes")));
    }
    u32::try_from(len).map_err(|_| Error::InvalidFrame(format!("Message too large: {len} bytes")))
}

/// Read side of the stream plus the frame currently being assembled
///
/// Only cancel-safe reads are used, so dropping `next_frame` at any await
/// point loses nothing.
struct FrameReader<R> {
    reader: R,
    header: [u8; 4],
    header_read: usize,
    body: Option<Vec<u8>>,
    body_read: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            header: [0; 4],
            header_read: 0,
            body: None,
            body_read: 0,
        }
    }

    async fn next_frame(&mut self) -> Result<Vec<u8>> {
        let Self {
            reader,
            header,
            header_read,
            body,
            body_read,
        } = self;

        // Read length prefix
        while *header_read < header.len() {
            let n = reader.read(&mut header[*header_read..]).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            *header_read += n;
        }

        if body.is_none() {
            let len = u32::from_be_bytes(*header) as usize;
            if len > MAX_FRAME_LEN {
                return Err(Error::InvalidFrame(format!("Message too large: {len} bytes")));
            }
            *body = Some(vec![0u8; len]);
            *body_read = 0;
        }

        // Read data
        if let Some(buf) = body.as_mut() {
            while *body_read < buf.len() {
                let n = reader.read(&mut buf[*body_read..]).await?;
                if n == 0 {
                    return Err(Error::ConnectionClosed);
                }
                *body_read += n;
            }
        }

        *header_read = 0;
        *body_read = 0;
        Ok(body.take().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_length_is_checked_before_writing() {
        assert_eq!(frame_len(5).unwrap(), 5);
        assert_eq!(frame_len(MAX_FRAME_LEN).unwrap(), MAX_FRAME_LEN as u32);
        assert!(matches!(
            frame_len(MAX_FRAME_LEN + 1),
            Err(Error::InvalidFrame(msg)) if msg.contains("too large")
        ));
    }

    #[tokio::test]
    async fn frame_survives_a_cancelled_read() {
        let (mut peer, local) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(local);

        peer.write_u32(6).await.unwrap();
        peer.write_all(b"hel").await.unwrap();
        let first =
            tokio::time::timeout(Duration::from_millis(50), reader.next_frame()).await;
        assert!(first.is_err());

        peer.write_all(b"lo!").await.unwrap();
        peer.write_u32(0).await.unwrap();
        assert_eq!(reader.next_frame().await.unwrap(), b"hello!");
        assert!(reader.next_frame().await.unwrap().is_empty());

        drop(peer);
        assert!(matches!(reader.next_frame().await, Err(Error::ConnectionClosed)));
    }
}
