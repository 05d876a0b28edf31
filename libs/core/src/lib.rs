//! Courier Core - shared value types
//!
//! Channel addresses, the descriptors attached to a channel when it is
//! opened, and process configuration.

pub mod config;
pub mod error;
pub mod metadata;
pub mod uri;

pub use config::{Configuration, Settings};
pub use error::{Error, Result};
pub use metadata::{Format, Metadata, Persistence};
pub use uri::Uri;
