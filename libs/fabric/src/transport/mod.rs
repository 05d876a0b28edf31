use crate::error::Result;

mod frame;
pub mod mem;
pub mod tcp;
pub mod unix;

pub use self::mem::{MemHub, MemTransport};
pub use self::tcp::{TcpTransport, TcpTransportBuilder, TcpTransportListener};
pub use self::unix::{UnixTransport, UnixTransportBuilder, UnixTransportListener};

/// Maximum accepted frame length (100 MiB)
pub const MAX_FRAME_LEN: usize = 100 * 1024 * 1024;

/// Transport trait for sending and receiving raw bytes
///
/// Each transport instance represents a single connection, built unopened by
/// a provider. `open` connects it, `close` is terminal. All methods take
/// `&self` so that sends and a receive loop can run concurrently.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Establish the connection; a no-op when already open
    async fn open(&self) -> Result<()>;

    /// Send bytes over the transport
    async fn send(&self, bytes: &[u8]) -> Result<()>;

    /// Receive bytes from the transport
    async fn receive(&self) -> Result<Vec<u8>>;

    /// Close the transport connection
    async fn close(&self) -> Result<()>;

    /// Live status; turns false on close or when the peer goes away
    fn is_open(&self) -> bool;
}

/// Accepting side of a socket transport
#[async_trait::async_trait]
pub trait TransportListener: Send + Sync {
    type Transport: Transport;

    /// Accept an incoming connection, already open
    async fn accept(&self) -> Result<Self::Transport>;

    /// Stop listening
    async fn close(&mut self) -> Result<()>;
}
