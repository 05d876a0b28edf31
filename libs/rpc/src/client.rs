//! Calling side of the RPC layer.
//!
//! Requests and responses share one `Channel<RpcMessage>` per URI. Every
//! channel gets a single [`Router`] that owns the receive loop and hands each
//! response to the call waiting for its id, so several clients of one facade
//! can talk to the same server concurrently. Routers are kept per facade,
//! as a [`Channels::extension`].

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Weak};
use std::time::Duration;

use courier_channels::Channels;
use courier_core::{Persistence, Uri};
use courier_fabric::{Channel, Error, Subscription};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::command::{CommandRequest, CommandResponse, RpcMessage};
use crate::error::{Result, RpcError};

type Slot = SyncSender<std::result::Result<CommandResponse, Error>>;
type Pending = Arc<DashMap<u64, Slot>>;

/// Running routers of one facade by URI
#[derive(Default)]
struct Routers {
    by_uri: DashMap<Uri, Weak<Router>>,
}

impl Routers {
    /// The router for `channel`, starting one if none is running on it
    fn attach(self: &Arc<Self>, channel: Arc<Channel<RpcMessage>>) -> Result<Arc<Router>> {
        // a replaced router must not be dropped while its entry is locked
        let mut replaced = None;
        let uri = channel.uri().clone();
        let router = match self.by_uri.entry(uri) {
            Entry::Occupied(mut entry) => match entry.get().upgrade() {
                Some(router) if Arc::ptr_eq(&router.channel, &channel) => router,
                current => {
                    replaced = current;
                    let router = Router::start(Arc::clone(self), channel)?;
                    entry.insert(Arc::downgrade(&router));
                    router
                }
            },
            Entry::Vacant(entry) => {
                let router = Router::start(Arc::clone(self), channel)?;
                entry.insert(Arc::downgrade(&router));
                router
            }
        };
        drop(replaced);
        Ok(router)
    }

    fn len(&self) -> usize {
        self.by_uri.len()
    }
}

/// Receive loop of one RPC channel plus the calls waiting on it
struct Router {
    routers: Arc<Routers>,
    channel: Arc<Channel<RpcMessage>>,
    pending: Pending,
    _subscription: Subscription,
}

impl Router {
    fn start(routers: Arc<Routers>, channel: Arc<Channel<RpcMessage>>) -> Result<Arc<Self>> {
        let pending: Pending = Arc::new(DashMap::new());
        let routing = Routing {
            uri: channel.uri().clone(),
            pending: Arc::clone(&pending),
        };

        let subscription = channel
            .subscribe(move |message| match message {
                Ok(RpcMessage::Response(response)) => routing.deliver(response),
                Ok(RpcMessage::Request(_)) => {}
                Err(Error::Codec(_) | Error::Timeout { .. }) => {}
                Err(e) => {
                    debug!(uri = %routing.uri, error = %e, "rpc channel went away");
                    routing.abandon_all();
                }
            })
            .map_err(RpcError::Execution)?;

        debug!(uri = %channel.uri(), "rpc router started");
        Ok(Arc::new(Self {
            routers,
            channel,
            pending,
            _subscription: subscription,
        }))
    }

    fn is_live(&self) -> bool {
        self.channel.is_open()
    }
}

/// Pending calls as seen by the receive loop
///
/// Dropping the slots wakes every waiter, both when the channel goes away and
/// when the loop itself is torn down with the worker pool.
struct Routing {
    uri: Uri,
    pending: Pending,
}

impl Routing {
    fn deliver(&self, response: CommandResponse) {
        match self.pending.remove(&response.id) {
            Some((_, slot)) => {
                let _ = slot.try_send(Ok(response));
            }
            None => trace!(uri = %self.uri, id = response.id, "discarding unclaimed response"),
        }
    }

    fn abandon_all(&self) {
        if !self.pending.is_empty() {
            debug!(uri = %self.uri, calls = self.pending.len(), "abandoning pending calls");
        }
        self.pending.clear();
    }
}

impl Drop for Routing {
    fn drop(&mut self) {
        self.abandon_all();
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.routers
            .by_uri
            .remove_if(self.channel.uri(), |_, router| router.strong_count() == 0);
    }
}

/// Client for the command server reachable at one URI
///
/// Cloning is cheap; clones share the open channel.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    channels: Channels,
    uri: Uri,
    router: Mutex<Option<Arc<Router>>>,
}

impl RpcClient {
    pub fn new(channels: Channels, uri: Uri) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                channels,
                uri,
                router: Mutex::new(None),
            }),
        }
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }

    /// Send `request` and return a handle to wait for its response
    ///
    /// Opens the RPC channel on first use, and again if it has closed since.
    /// Blocks while opening, so it must not be called from an async task.
    pub fn call(&self, request: CommandRequest) -> Result<PendingCall> {
        let router = self.router()?;
        let id = request.id;

        let (slot, response) = mpsc::sync_channel(1);
        router.pending.insert(id, slot);
        debug!(uri = %self.inner.uri, id, command = %request.name, "calling");

        let pending = Arc::clone(&router.pending);
        router
            .channel
            .publish(RpcMessage::Request(request), move |result| {
                if let Err(e) = result {
                    warn!(id, error = %e, "request could not be sent");
                    if let Some((_, slot)) = pending.remove(&id) {
                        let _ = slot.try_send(Err(e));
                    }
                }
            });

        Ok(PendingCall {
            id,
            response,
            router,
        })
    }

    /// Call `name` and wait up to `timeout` for its output
    pub fn execute(
        &self,
        name: &str,
        params: Vec<serde_json::Value>,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        self.call(CommandRequest::from(name, params))?
            .wait(timeout)?
            .into_result()
    }

    fn router(&self) -> Result<Arc<Router>> {
        let mut current = self.inner.router.lock();
        if let Some(router) = current.as_ref().filter(|router| router.is_live()) {
            return Ok(Arc::clone(router));
        }

        let channel = self.inner.channels.open_channel::<RpcMessage>(
            &self.inner.uri,
            Persistence::BestEffort,
            &[],
        )?;
        let router = self.inner.channels.extension::<Routers>().attach(channel)?;
        *current = Some(Arc::clone(&router));
        Ok(router)
    }
}

/// A sent request awaiting its response
///
/// Dropping it abandons the call; a response arriving later is discarded.
pub struct PendingCall {
    id: u64,
    response: Receiver<std::result::Result<CommandResponse, Error>>,
    router: Arc<Router>,
}

impl PendingCall {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block for at most `timeout` until the response arrives
    pub fn wait(self, timeout: Duration) -> Result<CommandResponse> {
        match self.response.recv_timeout(timeout) {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(RpcError::Execution(e)),
            Err(RecvTimeoutError::Timeout) => {
                debug!(id = self.id, ?timeout, "call timed out");
                Err(RpcError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(RpcError::Interrupted),
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.router.pending.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::Configuration;
    use serde_json::json;

    fn facade() -> Channels {
        Channels::with_defaults(&Configuration::default().skip_env_vars()).unwrap()
    }

    #[test]
    fn clients_of_one_facade_share_a_router() {
        let channels = facade();
        let uri = Uri::parse("mem://shared").unwrap();
        let first = RpcClient::new(channels.clone(), uri.clone());
        let second = RpcClient::new(channels.clone(), uri);

        let a = first.router().unwrap();
        let b = second.router().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(channels.extension::<Routers>().len(), 1);

        drop((a, b, first, second));
        assert_eq!(channels.extension::<Routers>().len(), 0);
        channels.shutdown();
    }

    #[test]
    fn facades_keep_separate_routers() {
        let left = facade();
        let right = facade();
        let uri = Uri::parse("mem://node").unwrap();

        let a = RpcClient::new(left.clone(), uri.clone()).router().unwrap();
        let b = RpcClient::new(right.clone(), uri).router().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a.channel, &b.channel));

        left.shutdown();
        right.shutdown();
    }

    #[test]
    fn reopened_channel_gets_a_fresh_router() {
        let channels = facade();
        let uri = Uri::parse("mem://again").unwrap();
        let client = RpcClient::new(channels.clone(), uri.clone());

        let before = client.router().unwrap();
        assert!(channels.close_channel(&uri).unwrap());
        let after = client.router().unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(after.is_live());

        // a request without a server just times out
        let pending = client.call(CommandRequest::from("ping", vec![json!(1)])).unwrap();
        assert!(matches!(
            pending.wait(Duration::from_millis(100)),
            Err(RpcError::Timeout(_))
        ));
        channels.shutdown();
    }
}
