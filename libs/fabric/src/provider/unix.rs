use courier_core::config::SocketSettings;
use courier_core::{Format, Metadata, Persistence, Settings, Uri};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::pool::WorkerPool;
use crate::provider::ChannelProvider;
use crate::transport::{Transport, UnixTransport};

pub const SCHEME: &str = "unix";

/// Provider for `unix:///path/to/socket` URIs
#[derive(Debug, Default)]
pub struct UnixProvider {
    settings: RwLock<Option<SocketSettings>>,
}

impl UnixProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChannelProvider for UnixProvider {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn start(&self, _pool: WorkerPool, settings: &Settings) {
        debug!(settings = ?settings.unix, "starting unix provider");
        *self.settings.write() = Some(settings.unix.clone());
    }

    fn stop(&self) {
        debug!("stopping unix provider");
        self.settings.write().take();
    }

    fn build(
        &self,
        uri: &Uri,
        _format: Format,
        _persistence: Persistence,
        _metadata: &[Metadata],
    ) -> Result<Box<dyn Transport>> {
        let settings = self
            .settings
            .read()
            .clone()
            .ok_or_else(|| Error::Custom("unix provider is not started".to_string()))?;
        if uri.path().is_empty() || uri.path() == "/" {
            return Err(Error::Custom(format!("unix URI needs a socket path: {uri}")));
        }

        let transport = UnixTransport::builder()
            .path(uri.path())
            .settings(&settings)
            .build()?;
        Ok(Box::new(transport))
    }
}
