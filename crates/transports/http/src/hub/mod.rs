//! Subscriber broadcast hub
//!
//! A single loop owns the subscriber registry. Registration, removal, and
//! publish requests arrive as commands on one channel, so the registry is
//! never touched from outside the loop. Fan-out never waits on a subscriber:
//! each one has a bounded queue, and a subscriber whose queue is full is
//! evicted on the spot.

mod pump;

pub use pump::{read_pump, serve_subscriber, write_pump, PumpExit, PumpTimings};

use crate::error::{Error, Result};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Default per-subscriber queue bound
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Hub command channel bound
const COMMAND_CHANNEL_CAPACITY: usize = 1024;

enum Command {
    Register { id: u64, tx: mpsc::Sender<Bytes> },
    Unregister { id: u64 },
    Publish(Bytes),
    Count(oneshot::Sender<usize>),
}

/// Handle on the hub loop; cheap to clone
#[derive(Clone)]
pub struct BroadcastHub {
    commands: mpsc::Sender<Command>,
    next_id: Arc<AtomicU64>,
    queue_capacity: usize,
}

impl BroadcastHub {
    /// Spawn the hub loop
    ///
    /// The loop exits once every handle has been dropped. Must be called from
    /// within a Tokio runtime.
    ///
    /// ```
    /// # use mediarelay_http::BroadcastHub;
    /// # tokio_test::block_on(async {
    /// let hub = BroadcastHub::spawn(16);
    /// let mut subscription = hub.register().await.unwrap();
    ///
    /// hub.publish("hello").await.unwrap();
    /// assert_eq!(subscription.recv().await.unwrap().as_ref(), b"hello");
    /// # });
    /// ```
    pub fn spawn(queue_capacity: usize) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        tokio::spawn(run(rx));
        Self {
            commands,
            next_id: Arc::new(AtomicU64::new(1)),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Add a subscriber; it receives every message published after this returns
    pub async fn register(&self) -> Result<Subscription> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.commands
            .send(Command::Register { id, tx })
            .await
            .map_err(|_| Error::HubClosed)?;

        Ok(Subscription {
            id,
            rx,
            commands: self.commands.downgrade(),
            unregistered: false,
        })
    }

    /// Submit a message for fan-out
    ///
    /// Waits only for room on the hub's own command channel, never on a
    /// subscriber.
    pub async fn publish(&self, message: impl Into<Bytes>) -> Result<()> {
        self.commands
            .send(Command::Publish(message.into()))
            .await
            .map_err(|_| Error::HubClosed)
    }

    /// Number of registered subscribers
    pub async fn subscriber_count(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Count(reply))
            .await
            .map_err(|_| Error::HubClosed)?;
        rx.await.map_err(|_| Error::HubClosed)
    }
}

/// A registered subscriber's inbound queue
///
/// Dropping the subscription unregisters it.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Bytes>,
    commands: mpsc::WeakSender<Command>,
    unregistered: bool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next queued message; `None` once the hub has evicted or dropped us
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Next already-queued message without waiting
    pub fn try_recv(&mut self) -> Option<Bytes> {
        match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Remove this subscriber from the hub and wait for the request to be queued
    pub async fn unregister(mut self) {
        if let Some(commands) = self.commands.upgrade() {
            let _ = commands.send(Command::Unregister { id: self.id }).await;
        }
        self.unregistered = true;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.unregistered {
            return;
        }
        if let Some(commands) = self.commands.upgrade() {
            if commands.try_send(Command::Unregister { id: self.id }).is_err() {
                debug!(subscriber = self.id, "Unregister request dropped, hub busy or gone");
            }
        }
    }
}

async fn run(mut commands: mpsc::Receiver<Command>) {
    let mut subscribers: HashMap<u64, mpsc::Sender<Bytes>> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Register { id, tx } => {
                subscribers.insert(id, tx);
                info!(subscriber = id, total = subscribers.len(), "Subscriber registered");
            }
            Command::Unregister { id } => {
                if subscribers.remove(&id).is_some() {
                    info!(subscriber = id, total = subscribers.len(), "Subscriber unregistered");
                }
            }
            Command::Publish(message) => {
                let mut evicted = Vec::new();
                for (id, tx) in &subscribers {
                    match tx.try_send(message.clone()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => evicted.push((*id, "queue full")),
                        Err(TrySendError::Closed(_)) => evicted.push((*id, "disconnected")),
                    }
                }
                for &(id, reason) in &evicted {
                    subscribers.remove(&id);
                    warn!(subscriber = id, reason, "Subscriber evicted");
                }
                debug!(
                    delivered = subscribers.len(),
                    evicted = evicted.len(),
                    bytes = message.len(),
                    "Broadcast fan-out"
                );
            }
            Command::Count(reply) => {
                let _ = reply.send(subscribers.len());
            }
        }
    }

    debug!("Broadcast hub stopped");
}
