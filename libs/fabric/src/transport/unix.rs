use std::path::{Path, PathBuf};
use std::time::Duration;

use courier_core::config::SocketSettings;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tracing::debug;

use crate::error::{Error, Result};
use crate::transport::frame::FramedStream;
use crate::transport::{Transport, TransportListener};

/// Unix domain socket transport with length-prefix framing
///
/// Messages are sent with a 4-byte big-endian length prefix
pub struct UnixTransport {
    path: Option<PathBuf>,
    connect_timeout: Option<Duration>,
    stream: FramedStream<OwnedReadHalf, OwnedWriteHalf>,
}

impl UnixTransport {
    /// Connect to a Unix socket with no timeouts
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::builder().path(path).connect().await
    }

    /// Create a builder for configuring the transport
    pub fn builder() -> UnixTransportBuilder {
        UnixTransportBuilder::new()
    }

    /// Create from an existing, connected UnixStream
    pub async fn from_stream(stream: UnixStream) -> Result<Self> {
        let transport = Self {
            path: None,
            connect_timeout: None,
            stream: FramedStream::new(None, None),
        };
        let (reader, writer) = stream.into_split();
        transport.stream.attach(reader, writer).await?;
        Ok(transport)
    }
}

#[async_trait::async_trait]
impl Transport for UnixTransport {
    async fn open(&self) -> Result<()> {
        if self.stream.is_open() {
            return Ok(());
        }
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| Error::Custom("unix transport has no socket path".into()))?;

        debug!(path = %path.display(), "connecting unix transport");
        let connect_op = UnixStream::connect(path);
        let stream = if let Some(timeout) = self.connect_timeout {
            tokio::time::timeout(timeout, connect_op)
                .await
                .map_err(|_| Error::timeout("connect", timeout))??
        } else {
            connect_op.await?
        };

        let (reader, writer) = stream.into_split();
        self.stream.attach(reader, writer).await
    }

    async fn send(&self, bytes: &[u8]) -> Result<()> {
        self.stream.send(bytes).await
    }

    async fn receive(&self) -> Result<Vec<u8>> {
        self.stream.receive().await
    }

    async fn close(&self) -> Result<()> {
        self.stream.close().await
    }

    fn is_open(&self) -> bool {
        self.stream.is_open()
    }
}

/// Unix socket listener for accepting incoming connections
pub struct UnixTransportListener {
    listener: UnixListener,
    path: PathBuf,
}

impl UnixTransportListener {
    /// Bind to a Unix socket path
    pub async fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Remove existing socket file if it exists
        if path.exists() {
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path)?;
        Ok(Self { listener, path })
    }

    /// Accept an incoming connection
    pub async fn accept(&self) -> Result<UnixTransport> {
        let (stream, _) = self.listener.accept().await?;
        UnixTransport::from_stream(stream).await
    }

    /// Get the path this listener is bound to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the listener and remove the socket file
    pub async fn close(&mut self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

impl Drop for UnixTransportListener {
    fn drop(&mut self) {
        // Clean up socket file on drop
        let _ = std::fs::remove_file(&self.path);
    }
}

#[async_trait::async_trait]
impl TransportListener for UnixTransportListener {
    type Transport = UnixTransport;

    async fn accept(&self) -> Result<Self::Transport> {
        let (stream, _) = self.listener.accept().await?;
        UnixTransport::from_stream(stream).await
    }

    async fn close(&mut self) -> Result<()> {
        UnixTransportListener::close(self).await
    }
}

/// Builder for configuring Unix socket transport
#[derive(Default)]
pub struct UnixTransportBuilder {
    path: Option<PathBuf>,
    connect_timeout: Option<Duration>,
    send_timeout: Option<Duration>,
    receive_timeout: Option<Duration>,
}

impl UnixTransportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the path to connect to
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = Some(timeout);
        self
    }

    /// Take every timeout from `settings`, clearing the ones it leaves unset
    pub fn settings(mut self, settings: &SocketSettings) -> Self {
        self.connect_timeout = settings.connect_timeout();
        self.send_timeout = settings.send_timeout();
        self.receive_timeout = settings.receive_timeout();
        self
    }

    /// Build an unopened transport
    pub fn build(self) -> Result<UnixTransport> {
        if self.path.is_none() {
            return Err(Error::Custom("unix transport has no socket path".into()));
        }
        Ok(UnixTransport {
            path: self.path,
            connect_timeout: self.connect_timeout,
            stream: FramedStream::new(self.send_timeout, self.receive_timeout),
        })
    }

    /// Build and open in one step
    pub async fn connect(self) -> Result<UnixTransport> {
        let transport = self.build()?;
        transport.open().await?;
        Ok(transport)
    }
}
