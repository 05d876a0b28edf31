//! Courier Channels - provider registry, channel table and the facade
//!
//! # Example
//!
//! ```no_run
//! use courier_channels::Channels;
//! use courier_core::{Configuration, Persistence, Uri};
//! use courier_fabric::BytesMessage;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let channels = Channels::with_defaults(&Configuration::default())?;
//! let uri = Uri::parse("mem://sensors")?;
//! let channel = channels.open_channel::<BytesMessage>(&uri, Persistence::BestEffort, &[])?;
//! assert!(channel.is_open());
//! assert_eq!(channels.open_channels(), vec![uri]);
//!
//! channels.shutdown();
//! assert!(channels.open_channels().is_empty());
//! # Ok(())
//! # }
//! ```

pub mod channels;
pub mod error;
pub mod format;
pub mod registry;
pub mod table;

pub use channels::Channels;
pub use error::{ChannelsError, LifetimeCause, Result};
pub use format::resolve_format;
pub use registry::ProviderRegistry;
pub use table::{ChannelTable, TrackedChannel};
