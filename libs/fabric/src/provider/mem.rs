use courier_core::{Format, Metadata, Persistence, Settings, Uri};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::pool::WorkerPool;
use crate::provider::ChannelProvider;
use crate::transport::{MemHub, Transport};

pub const SCHEME: &str = "mem";

/// In-process provider for `mem://name` URIs
///
/// Treats every persistence policy as best-effort.
#[derive(Debug)]
pub struct MemProvider {
    hub: MemHub,
    capacity: RwLock<Option<usize>>,
}

impl Default for MemProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemProvider {
    pub fn new() -> Self {
        Self::with_hub(MemHub::new())
    }

    /// Share `hub` with other providers, e.g. those of another facade
    pub fn with_hub(hub: MemHub) -> Self {
        Self {
            hub,
            capacity: RwLock::new(None),
        }
    }

    pub fn hub(&self) -> &MemHub {
        &self.hub
    }
}

impl ChannelProvider for MemProvider {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn start(&self, _pool: WorkerPool, settings: &Settings) {
        debug!(capacity = settings.mem.capacity, "starting mem provider");
        *self.capacity.write() = Some(settings.mem.capacity);
    }

    fn stop(&self) {
        debug!(topics = self.hub.topic_count(), "stopping mem provider");
        self.capacity.write().take();
        self.hub.clear();
    }

    fn build(
        &self,
        uri: &Uri,
        _format: Format,
        _persistence: Persistence,
        _metadata: &[Metadata],
    ) -> Result<Box<dyn Transport>> {
        let capacity = (*self.capacity.read())
            .ok_or_else(|| Error::Custom("mem provider is not started".to_string()))?;
        Ok(Box::new(self.hub.transport(uri.as_str(), capacity)))
    }
}
