use std::net::SocketAddr;
use std::time::Duration;

use courier_core::config::SocketSettings;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use crate::error::{Error, Result};
use crate::transport::frame::FramedStream;
use crate::transport::{Transport, TransportListener};

/// TCP transport with length-prefix framing
///
/// Messages are sent with a 4-byte big-endian length prefix
pub struct TcpTransport {
    address: Option<String>,
    connect_timeout: Option<Duration>,
    stream: FramedStream<OwnedReadHalf, OwnedWriteHalf>,
}

impl TcpTransport {
    /// Connect to a remote TCP address with no timeouts
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::builder().address(addr.to_string()).connect().await
    }

    /// Create a builder for configuring the transport
    pub fn builder() -> TcpTransportBuilder {
        TcpTransportBuilder::new()
    }

    /// Create from an existing, connected TcpStream
    pub async fn from_stream(stream: TcpStream) -> Result<Self> {
        let transport = Self {
            address: None,
            connect_timeout: None,
            stream: FramedStream::new(None, None),
        };
        let (reader, writer) = stream.into_split();
        transport.stream.attach(reader, writer).await?;
        Ok(transport)
    }

    /// Address this transport dials on `open`, if it is the connecting side
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn open(&self) -> Result<()> {
        if self.stream.is_open() {
            return Ok(());
        }
        let address = self
            .address
            .as_deref()
            .ok_or_else(|| Error::Custom("tcp transport has no address to dial".into()))?;

        debug!(address, "connecting tcp transport");
        let connect_op = TcpStream::connect(address);
        let stream = if let Some(timeout) = self.connect_timeout {
            tokio::time::timeout(timeout, connect_op)
                .await
                .map_err(|_| Error::timeout("connect", timeout))??
        } else {
            connect_op.await?
        };
        stream.set_nodelay(true)?;

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

/// TCP listener for accepting incoming connections
pub struct TcpTransportListener {
    listener: TcpListener,
}

impl TcpTransportListener {
    /// Bind to a local address
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Accept an incoming connection
    pub async fn accept(&self) -> Result<(TcpTransport, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await?;
        Ok((TcpTransport::from_stream(stream).await?, addr))
    }

    /// Get the local address this listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }
}

#[async_trait::async_trait]
impl TransportListener for TcpTransportListener {
    type Transport = TcpTransport;

    async fn accept(&self) -> Result<Self::Transport> {
        let (stream, _) = self.listener.accept().await?;
        TcpTransport::from_stream(stream).await
    }

    async fn close(&mut self) -> Result<()> {
        // TcpListener cleanup happens on drop
        Ok(())
    }
}

/// Builder for configuring TCP transport
#[derive(Default)]
pub struct TcpTransportBuilder {
    address: Option<String>,
    connect_timeout: Option<Duration>,
    send_timeout: Option<Duration>,
    receive_timeout: Option<Duration>,
}

impl TcpTransportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `host:port` to connect to; host names are resolved on open
    pub fn address(mut self, addr: impl Into<String>) -> Self {
        self.address = Some(addr.into());
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
    pub fn build(self) -> Result<TcpTransport> {
        if self.address.is_none() {
            return Err(Error::Custom("tcp transport has no address to dial".into()));
        }
        Ok(TcpTransport {
            address: self.address,
            connect_timeout: self.connect_timeout,
            stream: FramedStream::new(self.send_timeout, self.receive_timeout),
        })
    }

    /// Build and open in one step
    pub async fn connect(self) -> Result<TcpTransport> {
        let transport = self.build()?;
        transport.open().await?;
        Ok(transport)
    }
}
