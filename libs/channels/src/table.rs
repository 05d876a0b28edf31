use std::any::Any;
use std::sync::Arc;

use courier_core::Uri;
use courier_fabric::{Channel, Message};
use dashmap::DashMap;
use parking_lot::Mutex;

/// Type-erased view of an open channel, as tracked by the table
#[async_trait::async_trait]
pub trait TrackedChannel: Send + Sync {
    fn uri(&self) -> &Uri;

    fn is_open(&self) -> bool;

    fn message_type(&self) -> &'static str;

    async fn close(&self) -> courier_fabric::Result<()>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

#[async_trait::async_trait]
impl<M: Message> TrackedChannel for Channel<M> {
    fn uri(&self) -> &Uri {
        Channel::uri(self)
    }

    fn is_open(&self) -> bool {
        Channel::is_open(self)
    }

    fn message_type(&self) -> &'static str {
        Channel::message_type(self)
    }

    async fn close(&self) -> courier_fabric::Result<()> {
        Channel::close(self).await
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// What the table holds for a URI, from the point of view of message type `M`
pub enum Lookup<M> {
    Missing,
    /// Tracked but no longer open
    Stale,
    Live(Arc<Channel<M>>),
    /// Live, but carrying another message type
    Mismatch(&'static str),
}

/// Open channels by URI
///
/// Internally synchronized; callers that need to check-then-insert for one
/// URI hold the guard from [`ChannelTable::lock`] around both steps.
#[derive(Default)]
pub struct ChannelTable {
    channels: DashMap<Uri, Arc<dyn TrackedChannel>>,
    locks: DashMap<Uri, Arc<Mutex<()>>>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-URI mutual exclusion scope
    pub fn lock(&self, uri: &Uri) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(uri.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Give back a scope taken with [`ChannelTable::lock`]
    ///
    /// The entry is dropped once nobody else holds it, so the table only keeps
    /// scopes for URIs in use.
    pub fn release_lock(&self, uri: &Uri, lock: Arc<Mutex<()>>) {
        self.locks
            .remove_if(uri, |_, held| Arc::ptr_eq(held, &lock) && Arc::strong_count(held) == 2);
    }

    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    pub fn insert(&self, channel: Arc<dyn TrackedChannel>) -> Option<Arc<dyn TrackedChannel>> {
        self.channels.insert(channel.uri().clone(), channel)
    }

    pub fn get(&self, uri: &Uri) -> Option<Arc<dyn TrackedChannel>> {
        self.channels.get(uri).map(|entry| Arc::clone(entry.value()))
    }

    pub fn lookup<M: Message>(&self, uri: &Uri) -> Lookup<M> {
        let Some(tracked) = self.get(uri) else {
            return Lookup::Missing;
        };
        if !tracked.is_open() {
            return Lookup::Stale;
        }
        let existing = tracked.message_type();
        match tracked.into_any().downcast::<Channel<M>>() {
            Ok(channel) => Lookup::Live(channel),
            Err(_) => Lookup::Mismatch(existing),
        }
    }

    pub fn remove(&self, uri: &Uri) -> Option<Arc<dyn TrackedChannel>> {
        self.channels.remove(uri).map(|(_, channel)| channel)
    }

    /// URIs of tracked channels that currently report themselves open
    pub fn open_uris(&self) -> Vec<Uri> {
        let mut uris: Vec<Uri> = self
            .channels
            .iter()
            .filter(|entry| entry.value().is_open())
            .map(|entry| entry.key().clone())
            .collect();
        uris.sort();
        uris
    }

    /// Remove and return every tracked channel, forgetting all lock scopes
    pub fn drain(&self) -> Vec<Arc<dyn TrackedChannel>> {
        self.locks.clear();
        let uris: Vec<Uri> = self.channels.iter().map(|e| e.key().clone()).collect();
        uris.iter().filter_map(|uri| self.remove(uri)).collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{Format, Persistence};
    use courier_fabric::transport::MemHub;
    use courier_fabric::{BytesMessage, MessagePipeline, WorkerPool};

    fn channel<M: Message>(hub: &MemHub, pool: &WorkerPool, uri: &str) -> Arc<Channel<M>> {
        let uri = Uri::parse(uri).unwrap();
        Arc::new(Channel::new(
            uri.clone(),
            Box::new(hub.transport(uri.as_str(), 4)),
            MessagePipeline::new(Format::Json).unwrap(),
            Persistence::BestEffort,
            Vec::new(),
            pool.clone(),
        ))
    }

    #[test]
    fn lookup_distinguishes_live_stale_and_mismatched() {
        let pool = WorkerPool::new(1).unwrap();
        let hub = MemHub::new();
        let table = ChannelTable::new();
        let uri = Uri::parse("mem://a").unwrap();

        assert!(matches!(table.lookup::<BytesMessage>(&uri), Lookup::Missing));

        let bytes: Arc<Channel<BytesMessage>> = channel(&hub, &pool, "mem://a");
        table.insert(bytes.clone());
        // tracked but never opened
        assert!(matches!(table.lookup::<BytesMessage>(&uri), Lookup::Stale));

        pool.block_on(bytes.open()).unwrap().unwrap();
        match table.lookup::<BytesMessage>(&uri) {
            Lookup::Live(found) => assert!(Arc::ptr_eq(&found, &bytes)),
            _ => panic!("expected live channel"),
        }
        assert!(matches!(
            table.lookup::<serde_json::Value>(&uri),
            Lookup::Mismatch(_)
        ));
        pool.shutdown_now();
    }

    #[test]
    fn open_uris_reflect_live_status() {
        let pool = WorkerPool::new(1).unwrap();
        let hub = MemHub::new();
        let table = ChannelTable::new();

        let a: Arc<Channel<BytesMessage>> = channel(&hub, &pool, "mem://a");
        let b: Arc<Channel<BytesMessage>> = channel(&hub, &pool, "mem://b");
        pool.block_on(async {
            a.open().await.unwrap();
            b.open().await.unwrap();
        })
        .unwrap();
        table.insert(a.clone());
        table.insert(b.clone());
        assert_eq!(table.open_uris().len(), 2);

        // closed behind the table's back
        pool.block_on(b.close()).unwrap().unwrap();
        assert_eq!(table.open_uris(), vec![Uri::parse("mem://a").unwrap()]);
        assert_eq!(table.len(), 2);

        assert_eq!(table.drain().len(), 2);
        assert!(table.is_empty());
        pool.shutdown_now();
    }

    #[test]
    fn lock_is_shared_per_uri() {
        let table = ChannelTable::new();
        let uri = Uri::parse("mem://a").unwrap();
        let first = table.lock(&uri);
        let second = table.lock(&uri);
        assert!(Arc::ptr_eq(&first, &second));

        let other = table.lock(&Uri::parse("mem://b").unwrap());
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn released_lock_is_forgotten_once_unshared() {
        let table = ChannelTable::new();
        let uri = Uri::parse("mem://a").unwrap();

        let first = table.lock(&uri);
        let second = table.lock(&uri);
        table.release_lock(&uri, first);
        // still held by the second caller
        assert_eq!(table.lock_count(), 1);

        table.release_lock(&uri, second);
        assert_eq!(table.lock_count(), 0);

        table.lock(&Uri::parse("mem://b").unwrap());
        table.drain();
        assert_eq!(table.lock_count(), 0);
    }
}
