use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::transport::Transport;

#[derive(Debug, Clone)]
struct MemFrame {
    from: u64,
    bytes: Arc<[u8]>,
}

/// In-process message bus shared by `mem` transports
///
/// Every URI is a topic; each transport opened on it sees the frames sent by
/// the others, never its own. Delivery is best-effort: frames sent while
/// nobody listens are dropped and slow receivers skip what they missed.
/// Cloning shares the bus, which is how several facades in one process reach
/// each other.
#[derive(Debug, Clone)]
pub struct MemHub {
    topics: Arc<DashMap<String, broadcast::Sender<MemFrame>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for MemHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MemHub {
    pub fn new() -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Build an unopened transport on `topic`
    pub fn transport(&self, topic: impl Into<String>, capacity: usize) -> MemTransport {
        let (closed, _) = watch::channel(false);
        MemTransport {
            topic: topic.into(),
            capacity,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            hub: self.clone(),
            sender: parking_lot::Mutex::new(None),
            receiver: Mutex::new(None),
            open: AtomicBool::new(false),
            closed,
        }
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Forget all topics; transports already open keep their own handles
    pub fn clear(&self) {
        self.topics.clear();
    }

    fn join(&self, topic: &str, capacity: usize) -> broadcast::Sender<MemFrame> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .clone()
    }
}

/// Transport over a [`MemHub`] topic
pub struct MemTransport {
    topic: String,
    capacity: usize,
    id: u64,
    hub: MemHub,
    sender: parking_lot::Mutex<Option<broadcast::Sender<MemFrame>>>,
    receiver: Mutex<Option<broadcast::Receiver<MemFrame>>>,
    open: AtomicBool,
    closed: watch::Sender<bool>,
}

impl MemTransport {
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait::async_trait]
impl Transport for MemTransport {
    async fn open(&self) -> Result<()> {
        if *self.closed.borrow() {
            return Err(Error::ConnectionClosed);
        }
        if self.is_open() {
            return Ok(());
        }
        let sender = self.hub.join(&self.topic, self.capacity);
        *self.receiver.lock().await = Some(sender.subscribe());
        *self.sender.lock() = Some(sender);
        self.open.store(true, Ordering::Release);
        debug!(topic = %self.topic, id = self.id, "mem transport opened");
        Ok(())
    }

    async fn send(&self, bytes: &[u8]) -> Result<()> {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or_else(|| Error::NotOpen(self.topic.clone()))?;
        let frame = MemFrame {
            from: self.id,
            bytes: Arc::from(bytes),
        };
        // Only fails when there are no receivers at all
        if sender.send(frame).is_err() {
            debug!(topic = %self.topic, "mem frame dropped, no receivers");
        }
        Ok(())
    }

    async fn receive(&self) -> Result<Vec<u8>> {
        let mut closed = self.closed.subscribe();
        let mut guard = self.receiver.lock().await;
        let receiver = guard
            .as_mut()
            .ok_or_else(|| Error::NotOpen(self.topic.clone()))?;

        let receive_op = async {
            loop {
                match receiver.recv().await {
                    Ok(frame) if frame.from == self.id => continue,
                    Ok(frame) => return Ok(frame.bytes.to_vec()),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(topic = %self.topic, skipped, "mem receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(Error::ConnectionClosed)
                    }
                }
            }
        };

        let result = tokio::select! {
            result = receive_op => result,
            _ = closed.wait_for(|closed| *closed) => Err(Error::ConnectionClosed),
        };

        if matches!(result, Err(Error::ConnectionClosed)) {
            self.open.store(false, Ordering::Release);
        }
        result
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::Release);
        self.closed.send_replace(true);
        self.sender.lock().take();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}
