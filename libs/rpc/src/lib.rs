//! Courier RPC - remote command calls over courier channels
//!
//! A client sends a [`CommandRequest`] on the channel named by the server's
//! URI and waits for the [`CommandResponse`] carrying the same id. The
//! [`RpcServer`] answers requests with registered command handlers.
//!
//! # Example
//!
//! ```no_run
//! use courier_channels::Channels;
//! use courier_core::{Configuration, Uri};
//! use courier_rpc::execute;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let channels = Channels::with_defaults(&Configuration::default())?;
//! let server = Uri::parse("tcp://127.0.0.1:7400")?;
//!
//! let out = execute(&channels, &server, "ping", 5, vec![])?;
//! println!("{out}");
//!
//! channels.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod command;
pub mod error;
pub mod execute;
pub mod server;

pub use client::{PendingCall, RpcClient};
pub use command::{CommandRequest, CommandResponse, RpcMessage};
pub use error::{Result, RpcError};
pub use execute::execute;
pub use server::{RpcServer, ServerHandle};
