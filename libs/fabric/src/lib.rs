//! Courier Fabric - transports, codecs and typed channels
//!
//! Provides transport abstractions (in-process, TCP, Unix sockets), codec
//! support (raw bytes, JSON, bincode), the typed [`Channel`] built on top of
//! them, the [`ChannelProvider`](provider::ChannelProvider) interface that
//! constructs transports per URI scheme, and the shared [`WorkerPool`].
//!
//! # Example
//!
//! ```no_run
//! use courier_core::{Format, Uri};
//! use courier_fabric::{transport::TcpTransportListener, Channel, WorkerPool};
//! use serde_json::Value;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = WorkerPool::new(1)?;
//! let listener = TcpTransportListener::bind("127.0.0.1:8080".parse()?).await?;
//! let (transport, _peer) = listener.accept().await?;
//!
//! let uri = Uri::parse("tcp://127.0.0.1:8080")?;
//! let channel: Channel<Value> = Channel::from_transport(uri, transport, Format::Json, pool)?;
//! let request = channel.receive().await?;
//! channel.send(&request).await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod error;
pub mod message;
pub mod pipeline;
pub mod pool;
pub mod provider;
pub mod transport;

// Re-exports for convenience
pub use channel::{Channel, ChannelState, Subscription};
pub use error::{Error, Result};
pub use message::{BytesMessage, Message};
pub use pipeline::MessagePipeline;
pub use pool::WorkerPool;
pub use provider::{ChannelProvider, ProviderFactory};
