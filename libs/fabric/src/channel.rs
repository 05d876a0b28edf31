use std::fmt;
use std::sync::Arc;

use courier_core::{Format, Metadata, Persistence, Uri};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::message::Message;
use crate::pipeline::MessagePipeline;
use crate::pool::WorkerPool;
use crate::transport::Transport;

/// Lifecycle of a channel; `Closed` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Unopened,
    Open,
    Closed,
}

/// Typed, URI-addressed channel
///
/// Combines a provider-built transport with the formatting pipeline for its
/// message type. The message type is fixed for the life of the channel.
pub struct Channel<M> {
    uri: Uri,
    persistence: Persistence,
    metadata: Vec<Metadata>,
    pipeline: MessagePipeline<M>,
    transport: Box<dyn Transport>,
    pool: WorkerPool,
    state: Mutex<ChannelState>,
}

impl<M: Message> Channel<M> {
    /// Create an unopened channel over `transport`
    pub fn new(
        uri: Uri,
        transport: Box<dyn Transport>,
        pipeline: MessagePipeline<M>,
        persistence: Persistence,
        metadata: Vec<Metadata>,
        pool: WorkerPool,
    ) -> Self {
        let state = if transport.is_open() {
            ChannelState::Open
        } else {
            ChannelState::Unopened
        };
        Self {
            uri,
            persistence,
            metadata,
            pipeline,
            transport,
            pool,
            state: Mutex::new(state),
        }
    }

    /// Create a channel from an already connected transport, e.g. one
    /// returned by a listener
    pub fn from_transport(
        uri: Uri,
        transport: impl Transport + 'static,
        format: Format,
        pool: WorkerPool,
    ) -> Result<Self> {
        Ok(Self::new(
            uri,
            Box::new(transport),
            MessagePipeline::new(format)?,
            Persistence::default(),
            Vec::new(),
            pool,
        ))
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn format(&self) -> Format {
        self.pipeline.format()
    }

    pub fn persistence(&self) -> Persistence {
        self.persistence
    }

    pub fn metadata(&self) -> &[Metadata] {
        &self.metadata
    }

    pub fn message_type(&self) -> &'static str {
        M::type_name()
    }

    /// Live state; an open channel whose transport went away reports `Closed`
    pub fn state(&self) -> ChannelState {
        let mut state = self.state.lock();
        if *state == ChannelState::Open && !self.transport.is_open() {
            *state = ChannelState::Closed;
        }
        *state
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    pub async fn open(&self) -> Result<()> {
        match self.state() {
            ChannelState::Open => return Ok(()),
            ChannelState::Closed => return Err(Error::ConnectionClosed),
            ChannelState::Unopened => {}
        }
        self.transport.open().await?;

        let mut state = self.state.lock();
        if *state == ChannelState::Closed {
            // closed while the transport was connecting
            return Err(Error::ConnectionClosed);
        }
        *state = ChannelState::Open;
        debug!(uri = %self.uri, format = %self.format(), "channel open");
        Ok(())
    }

    /// Send a message over the channel
    pub async fn send(&self, message: &M) -> Result<()> {
        if self.state() != ChannelState::Open {
            return Err(Error::NotOpen(self.uri.to_string()));
        }
        let bytes = self.pipeline.encode(message)?;
        self.transport.send(&bytes).await
    }

    /// Receive a message from the channel
    pub async fn receive(&self) -> Result<M> {
        if self.state() != ChannelState::Open {
            return Err(Error::NotOpen(self.uri.to_string()));
        }
        let bytes = self.transport.receive().await?;
        self.pipeline.decode(bytes)
    }

    /// Close the channel
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state == ChannelState::Closed {
                return Ok(());
            }
            *state = ChannelState::Closed;
        }
        debug!(uri = %self.uri, "closing channel");
        self.transport.close().await
    }

    /// Send without waiting; `done` runs on the worker pool once the send
    /// finished, or immediately if the pool no longer accepts work.
    pub fn publish<F>(self: &Arc<Self>, message: M, done: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let channel = Arc::clone(self);
        // `done` is handed to the task only once the spawn succeeded
        let (tx, rx) = tokio::sync::oneshot::channel::<F>();
        let spawned = self.pool.spawn(async move {
            let result = channel.send(&message).await;
            if let Ok(done) = rx.await {
                done(result);
            }
        });
        match spawned {
            Ok(_) => {
                let _ = tx.send(done);
            }
            Err(e) => done(Err(e)),
        }
    }

    /// Run a receive loop on the worker pool
    ///
    /// `handler` gets every decoded message. Codec errors and receive
    /// timeouts are handed to it and the loop keeps going; any other error is
    /// handed over once and ends the loop. Dropping the returned
    /// [`Subscription`] stops the loop.
    pub fn subscribe<F>(self: &Arc<Self>, mut handler: F) -> Result<Subscription>
    where
        F: FnMut(Result<M>) + Send + 'static,
    {
        let channel = Arc::clone(self);
        let task = self.pool.spawn(async move {
            loop {
                match channel.receive().await {
                    Ok(message) => handler(Ok(message)),
                    Err(e @ (Error::Codec(_) | Error::Timeout { .. })) => {
                        warn!(uri = %channel.uri, error = %e, "skipping undeliverable message");
                        handler(Err(e));
                    }
                    Err(e) => {
                        debug!(uri = %channel.uri, error = %e, "subscription ended");
                        handler(Err(e));
                        break;
                    }
                }
            }
        })?;
        Ok(Subscription { task })
    }
}

impl<M> fmt::Debug for Channel<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("uri", &self.uri)
            .field("pipeline", &self.pipeline)
            .field("persistence", &self.persistence)
            .field("state", &*self.state.lock())
            .finish()
    }
}

/// Handle to a running receive loop; dropping it stops the loop
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
