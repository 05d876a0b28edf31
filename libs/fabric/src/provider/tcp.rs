use courier_core::config::SocketSettings;
use courier_core::{Format, Metadata, Persistence, Settings, Uri};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::pool::WorkerPool;
use crate::provider::ChannelProvider;
use crate::transport::{TcpTransport, Transport};

pub const SCHEME: &str = "tcp";

/// Provider for `tcp://host:port` URIs
#[derive(Debug, Default)]
pub struct TcpProvider {
    settings: RwLock<Option<SocketSettings>>,
}

impl TcpProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChannelProvider for TcpProvider {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn start(&self, _pool: WorkerPool, settings: &Settings) {
        debug!(settings = ?settings.tcp, "starting tcp provider");
        *self.settings.write() = Some(settings.tcp.clone());
    }

    fn stop(&self) {
        debug!("stopping tcp provider");
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
            .ok_or_else(|| Error::Custom("tcp provider is not started".to_string()))?;
        let (Some(address), Some(_)) = (uri.authority(), uri.port()) else {
            return Err(Error::Custom(format!("tcp URI needs host and port: {uri}")));
        };

        let transport = TcpTransport::builder()
            .address(address)
            .settings(&settings)
            .build()?;
        Ok(Box::new(transport))
    }
}
