//! The channels facade.
//!
//! [`Channels`] is what client code holds: it owns the shared worker pool,
//! the provider registry and the table of open channels, and is the only
//! place where a channel is opened.
//!
//! # Blocking
//!
//! [`Channels::open_channel`], [`Channels::close_channel`] and
//! [`Channels::shutdown`] block the calling thread, each bounded by a
//! timeout. They must be called from plain threads, not from inside an async
//! task; doing so yields an error instead of a deadlock.
//!
//! # Shutdown races
//!
//! An open racing [`Channels::shutdown`] either fails with
//! [`ChannelsError::Shutdown`] or lands in the table before it is drained.
//! An opener that records its channel and then sees the shutdown flag closes
//! the channel itself, so no opened channel is left untracked. An open still
//! in flight when the worker pool stops fails with
//! [`LifetimeCause::Interrupted`].

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;

use courier_core::{Configuration, Metadata, Persistence, Settings, Uri};
use courier_fabric::provider;
use courier_fabric::{
    Channel, ChannelProvider, Message, MessagePipeline, ProviderFactory, WorkerPool,
};
use dashmap::DashMap;
use tracing::{debug, error, warn};

use crate::error::{ChannelsError, LifetimeCause, Result};
use crate::format::resolve_format;
use crate::registry::ProviderRegistry;
use crate::table::{ChannelTable, Lookup, TrackedChannel};

/// Facade over providers, open channels and the shared worker pool
///
/// Cloning is cheap and every clone drives the same state. The last clone
/// to go away shuts everything down if [`shutdown`](Channels::shutdown) was
/// not called.
#[derive(Clone)]
pub struct Channels {
    inner: Arc<Inner>,
}

struct Inner {
    settings: Arc<Settings>,
    pool: WorkerPool,
    registry: ProviderRegistry,
    table: ChannelTable,
    extensions: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    shut_down: AtomicBool,
}

impl Channels {
    /// Load `configuration`, start the worker pool, and register one provider
    /// from each factory under the scheme it reports.
    ///
    /// A configuration that cannot be loaded is fatal: nothing is started.
    pub fn new(configuration: &Configuration, factories: Vec<ProviderFactory>) -> Result<Self> {
        let settings = Arc::new(
            configuration
                .load()
                .map_err(ChannelsError::Configuration)?,
        );
        let pool =
            WorkerPool::new(settings.channels.worker_threads).map_err(ChannelsError::Pool)?;
        let registry = ProviderRegistry::new(pool.clone(), Arc::clone(&settings));

        for make in &factories {
            let provider = make();
            let scheme = provider.scheme().to_string();
            registry.register(scheme, provider);
        }

        Ok(Self {
            inner: Arc::new(Inner {
                settings,
                pool,
                registry,
                table: ChannelTable::new(),
                extensions: DashMap::new(),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    /// Facade with the built-in `mem`, `tcp` and `unix` providers
    pub fn with_defaults(configuration: &Configuration) -> Result<Self> {
        Self::new(configuration, provider::builtin())
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn register(&self, scheme: impl Into<String>, provider: Arc<dyn ChannelProvider>) {
        self.inner.registry.register(scheme, provider);
    }

    /// Always fails with [`ChannelsError::Unsupported`]; use
    /// [`shutdown`](Channels::shutdown) instead.
    pub fn unregister(&self, scheme: &str) -> Result<()> {
        self.inner.registry.unregister(scheme)
    }

    pub fn get(&self, scheme: &str) -> Option<Arc<dyn ChannelProvider>> {
        self.inner.registry.get(scheme)
    }

    pub fn schemes(&self) -> Vec<String> {
        self.inner.registry.schemes()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// State of type `T` attached to this facade, created on first use
    ///
    /// Layers built on top of the facade keep their per-facade bookkeeping
    /// here. Every clone sees the same value; shutdown drops them all.
    pub fn extension<T: Any + Send + Sync + Default>(&self) -> Arc<T> {
        let stored = Arc::clone(
            self.inner
                .extensions
                .entry(TypeId::of::<T>())
                .or_insert_with(|| Arc::new(T::default()) as Arc<dyn Any + Send + Sync>)
                .value(),
        );
        match stored.downcast::<T>() {
            Ok(extension) => extension,
            Err(_) => {
                let extension = Arc::new(T::default());
                self.inner
                    .extensions
                    .insert(TypeId::of::<T>(), extension.clone());
                extension
            }
        }
    }

    /// Open a channel of message type `M` on `uri`, waiting at most the
    /// configured open timeout.
    ///
    /// Opens of one URI are serialized. If a live channel of the same message
    /// type is already tracked for `uri` it is returned as is.
    pub fn open_channel<M: Message>(
        &self,
        uri: &Uri,
        persistence: Persistence,
        metadata: &[Metadata],
    ) -> Result<Arc<Channel<M>>> {
        self.ensure_running()?;
        debug!(uri = %uri, "opening channel");

        let lock = self.inner.table.lock(uri);
        let guard = lock.lock();
        let opened = self.open_locked(uri, persistence, metadata);
        drop(guard);
        if opened.is_err() {
            self.inner.table.release_lock(uri, lock);
        }
        opened
    }

    fn open_locked<M: Message>(
        &self,
        uri: &Uri,
        persistence: Persistence,
        metadata: &[Metadata],
    ) -> Result<Arc<Channel<M>>> {
        match self.inner.table.lookup::<M>(uri) {
            Lookup::Live(channel) => return Ok(channel),
            Lookup::Mismatch(existing) => {
                return Err(ChannelsError::lifetime(
                    uri,
                    LifetimeCause::TypeMismatch { existing },
                ))
            }
            Lookup::Stale | Lookup::Missing => {}
        }

        let provider = self.get(uri.scheme()).ok_or_else(|| {
            ChannelsError::lifetime(uri, LifetimeCause::NoProvider(uri.scheme().to_string()))
        })?;

        let format = resolve_format::<M>(metadata);
        debug!(uri = %uri, format = %format, "using format");

        let pipeline =
            MessagePipeline::<M>::new(format).map_err(|e| ChannelsError::lifetime(uri, e))?;
        let transport = provider
            .build(uri, format, persistence, metadata)
            .map_err(|e| ChannelsError::lifetime(uri, e))?;
        let channel = Arc::new(Channel::new(
            uri.clone(),
            transport,
            pipeline,
            persistence,
            metadata.to_vec(),
            self.inner.pool.clone(),
        ));

        self.open_bounded(&channel)?;

        self.inner.table.insert(channel.clone());
        if self.is_shut_down() {
            self.inner.table.remove(uri);
            self.inner.close_tracked(channel.as_ref());
            return Err(ChannelsError::Shutdown);
        }
        Ok(channel)
    }

    /// URIs of tracked channels that are open right now
    pub fn open_channels(&self) -> Vec<Uri> {
        self.inner.table.open_uris()
    }

    /// Close and forget the channel tracked for `uri`; `false` if there was none
    pub fn close_channel(&self, uri: &Uri) -> Result<bool> {
        let lock = self.inner.table.lock(uri);
        let guard = lock.lock();
        let closed = self.close_locked(uri);
        drop(guard);
        self.inner.table.release_lock(uri, lock);
        closed
    }

    fn close_locked(&self, uri: &Uri) -> Result<bool> {
        let Some(channel) = self.inner.table.remove(uri) else {
            return Ok(false);
        };
        let timeout = self.inner.settings.channels.open_timeout();
        let closing = self
            .inner
            .pool
            .block_on(async { tokio::time::timeout(timeout, channel.close()).await });
        match closing {
            Ok(Ok(Ok(()))) => Ok(true),
            Ok(Ok(Err(e))) => Err(ChannelsError::lifetime(uri, e)),
            Ok(Err(_)) => Err(ChannelsError::lifetime(
                uri,
                courier_fabric::Error::timeout("close", timeout),
            )),
            Err(e) => Err(ChannelsError::lifetime(uri, e)),
        }
    }

    /// Close every channel, stop every provider, and stop the worker pool
    /// without draining it. Close failures are logged, never returned.
    /// Calling it again is a no-op.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            Err(ChannelsError::Shutdown)
        } else {
            Ok(())
        }
    }

    /// Run the open on the pool and wait for it on this thread
    ///
    /// The open task reports back over a channel; if the pool drops the task
    /// before it reports, the open was interrupted.
    fn open_bounded<M: Message>(&self, channel: &Arc<Channel<M>>) -> Result<()> {
        let uri = channel.uri();
        let timeout = self.inner.settings.channels.open_timeout();
        let pool = &self.inner.pool;
        pool.ensure_blocking().map_err(|e| ChannelsError::lifetime(uri, e))?;

        let (done, outcome) = mpsc::sync_channel(1);
        let opening = Arc::clone(channel);
        let task = pool
            .spawn(async move {
                let _ = done.send(opening.open().await);
            })
            .map_err(|e| ChannelsError::lifetime(uri, e))?;

        match outcome.recv_timeout(timeout) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ChannelsError::lifetime(uri, e)),
            Err(RecvTimeoutError::Disconnected) => {
                debug!(uri = %uri, "open task dropped before finishing");
                Err(ChannelsError::lifetime(uri, LifetimeCause::Interrupted))
            }
            Err(RecvTimeoutError::Timeout) => {
                task.abort();
                let closing = Arc::clone(channel);
                let _ = pool.spawn(async move {
                    if let Err(e) = closing.close().await {
                        warn!(uri = %closing.uri(), error = %e, "unable to close timed out channel");
                    }
                });
                Err(ChannelsError::lifetime(uri, LifetimeCause::OpenTimeout(timeout)))
            }
        }
    }
}

impl Inner {
    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(channels = self.table.len(), "shutting down all channels");

        // close all channels
        for channel in self.table.drain() {
            self.close_tracked(channel.as_ref());
        }

        // stop all transports
        self.registry.stop_all();

        // remove all providers
        self.registry.clear();

        self.extensions.clear();
        self.pool.shutdown_now();
    }

    fn close_tracked(&self, channel: &dyn TrackedChannel) {
        let timeout = self.settings.channels.open_timeout();
        let closing = self
            .pool
            .block_on(async { tokio::time::timeout(timeout, channel.close()).await });
        match closing {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => {
                error!(uri = %channel.uri(), error = %e, "unable to close channel");
            }
            Ok(Err(_)) => {
                error!(uri = %channel.uri(), ?timeout, "timed out closing channel");
            }
            Err(e) => {
                error!(uri = %channel.uri(), error = %e, "unable to close channel");
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
