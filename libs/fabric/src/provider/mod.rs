use std::sync::Arc;

use courier_core::{Format, Metadata, Persistence, Settings, Uri};

use crate::error::Result;
use crate::pool::WorkerPool;
use crate::transport::Transport;

pub mod mem;
pub mod tcp;
pub mod unix;

pub use self::mem::MemProvider;
pub use self::tcp::TcpProvider;
pub use self::unix::UnixProvider;

/// Transport implementation bound to one URI scheme
///
/// A provider is long-lived and shared by every channel of its scheme.
/// `start` and `stop` bracket the resources it owns; `build` only constructs
/// an unopened transport, the caller decides when to open it.
pub trait ChannelProvider: Send + Sync {
    fn scheme(&self) -> &str;

    /// Called once on registration with the shared pool and loaded settings
    fn start(&self, pool: WorkerPool, settings: &Settings);

    fn stop(&self);

    fn build(
        &self,
        uri: &Uri,
        format: Format,
        persistence: Persistence,
        metadata: &[Metadata],
    ) -> Result<Box<dyn Transport>>;
}

/// Constructor for a provider, handed to the channels facade at start-up
pub type ProviderFactory = Box<dyn Fn() -> Arc<dyn ChannelProvider> + Send + Sync>;

/// Wrap a constructor as a [`ProviderFactory`]
pub fn factory<P, F>(make: F) -> ProviderFactory
where
    P: ChannelProvider + 'static,
    F: Fn() -> P + Send + Sync + 'static,
{
    Box::new(move || Arc::new(make()) as Arc<dyn ChannelProvider>)
}

/// Factories for the providers shipped with this crate
pub fn builtin() -> Vec<ProviderFactory> {
    vec![
        factory(MemProvider::new),
        factory(TcpProvider::new),
        factory(UnixProvider::new),
    ]
}
