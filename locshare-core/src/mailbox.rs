//! Per-principal mailbox: buffer while nobody listens, fan out once somebody does.
//!
//! A mailbox is *unattended* while it has no live subscriber. Publishes then
//! land in a bounded buffer that keeps at most one message per source. The
//! first subscriber drains that buffer in arrival order; from then on every
//! publish is handed to each attached subscriber's queue.
//!
//! Lock order is always `subscribers` then `buffer`. A publish holds the
//! subscriber read lock for its whole hand-off, so a subscribe (which needs
//! the write lock) can never interleave between the attended check and the
//! buffer append or fan-out. That is what keeps a message from being seen
//! both through replay and directly.
//!
//! The hand-off blocks when a subscriber's queue is full. Such a publisher is
//! released when the subscriber drains, drops or unsubscribes its handle, or
//! when the mailbox is torn down.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::debug;

use crate::error::{CoreError, CoreResult, Entity};

/// Default number of messages retained for an unattended mailbox.
pub const DEFAULT_BUFFER_LIMIT: usize = 64;

/// Process-wide so a handle can never match a slot in another mailbox.
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// An opaque message addressed to a mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Name of the sending principal (or peer, for the line transport).
    pub source: String,
    /// Ciphertext. Never inspected.
    pub content: Bytes,
}

impl Message {
    /// Create a message.
    pub fn new(source: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
        }
    }
}

/// What happened to a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// No live subscriber; the message was buffered.
    Buffered,
    /// Handed to this many subscriber queues.
    FannedOut(usize),
    /// The mailbox was torn down; the message was dropped.
    Discarded,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Message>,
}

impl Subscriber {
    fn is_live(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// A live subscription to a [`Mailbox`].
///
/// Dropping the handle detaches it lazily; [`Mailbox::unsubscribe`] detaches
/// it immediately.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Message>,
    shutdown: watch::Receiver<bool>,
}

impl Subscription {
    /// Wait for the next message.
    ///
    /// Returns `None` once the mailbox is torn down or the handle was detached.
    /// Messages still queued at teardown are discarded.
    pub async fn recv(&mut self) -> Option<Message> {
        tokio::select! {
            biased;
            _ = torn_down(&mut self.shutdown) => None,
            message = self.rx.recv() => message,
        }
    }

    /// Take a queued message without waiting.
    pub fn try_recv(&mut self) -> Option<Message> {
        if *self.shutdown.borrow() {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Unique id of this subscription.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Resolves once `rx` observes teardown (or its sender is gone).
async fn torn_down(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Buffer-or-fan-out delivery channel for one principal.
pub struct Mailbox {
    subscribers: RwLock<Vec<Subscriber>>,
    buffer: Mutex<VecDeque<Message>>,
    buffer_limit: usize,
    teardown: watch::Sender<bool>,
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("buffer_limit", &self.buffer_limit)
            .field("torn_down", &*self.teardown.borrow())
            .finish_non_exhaustive()
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_LIMIT)
    }
}

impl Mailbox {
    /// Create an empty, unattended mailbox retaining up to `buffer_limit` messages.
    pub fn new(buffer_limit: usize) -> Self {
        let (teardown, _) = watch::channel(false);
        Self {
            subscribers: RwLock::new(Vec::new()),
            buffer: Mutex::new(VecDeque::new()),
            buffer_limit: buffer_limit.max(1),
            teardown,
        }
    }

    /// Publish a message.
    ///
    /// Buffers when unattended, otherwise waits until every live subscriber's
    /// queue has accepted it. Never fails.
    pub async fn publish(&self, message: Message) -> Delivery {
        if self.is_torn_down() {
            return Delivery::Discarded;
        }

        let subscribers = self.subscribers.read().await;
        // Teardown may have finished while we waited for the lock.
        if self.is_torn_down() {
            return Delivery::Discarded;
        }
        let live: Vec<&Subscriber> = subscribers.iter().filter(|s| s.is_live()).collect();

        if live.is_empty() {
            let mut buffer = self.buffer.lock().await;
            debug!(
                source = %message.source,
                bytes = message.content.len(),
                "buffering message for unattended mailbox"
            );
            push_buffered(&mut buffer, message, self.buffer_limit);
            return Delivery::Buffered;
        }

        let mut shutdown = self.teardown.subscribe();
        let mut delivered = 0;
        for subscriber in live {
            tokio::select! {
                biased;
                _ = torn_down(&mut shutdown) => return Delivery::Discarded,
                sent = subscriber.tx.send(message.clone()) => {
                    // A closed queue means the handle went away mid-publish.
                    if sent.is_ok() {
                        delivered += 1;
                    }
                }
            }
        }

        debug!(source = %message.source, subscribers = delivered, "fanned out message");
        Delivery::FannedOut(delivered)
    }

    /// Attach a new subscriber, replaying and clearing the buffer.
    ///
    /// After teardown this returns a handle that yields nothing.
    pub async fn subscribe(&self) -> Subscription {
        let shutdown = self.teardown.subscribe();
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.subscribers.write().await;
        let mut buffer = self.buffer.lock().await;

        if *shutdown.borrow() {
            let (_, rx) = mpsc::channel(1);
            return Subscription { id, rx, shutdown };
        }

        subscribers.retain(Subscriber::is_live);

        let replay: Vec<Message> = buffer.drain(..).collect();
        let (tx, rx) = mpsc::channel((replay.len() * 2).max(1));
        let replayed = replay.len();
        for message in replay {
            // Capacity is at least the replay length.
            let _ = tx.try_send(message);
        }

        subscribers.push(Subscriber { id, tx });
        debug!(
            subscription = id,
            replayed,
            subscribers = subscribers.len(),
            "subscriber attached"
        );

        Subscription { id, rx, shutdown }
    }

    /// Detach and close a subscription, discarding anything it had not read.
    ///
    /// Returns the number of live subscribers left. Fails with
    /// [`CoreError::NotFound`] if the handle is not attached here.
    pub async fn unsubscribe(&self, subscription: Subscription) -> CoreResult<usize> {
        let Subscription { id, rx, .. } = subscription;
        // Closing first releases any publisher blocked on this queue, which
        // may be holding the read lock we are about to wait for.
        drop(rx);

        let mut subscribers = self.subscribers.write().await;
        let position = subscribers
            .iter()
            .position(|s| s.id == id)
            .ok_or(CoreError::NotFound(Entity::Subscription))?;
        subscribers.remove(position);
        subscribers.retain(Subscriber::is_live);

        debug!(subscription = id, remaining = subscribers.len(), "subscriber detached");
        Ok(subscribers.len())
    }

    /// Tear the mailbox down: close every subscriber and drop the buffer.
    ///
    /// Irreversible. Later publishes are discarded.
    pub async fn close_all(&self) {
        self.teardown.send_replace(true);

        let mut subscribers = self.subscribers.write().await;
        let detached = subscribers.len();
        subscribers.clear();

        let mut buffer = self.buffer.lock().await;
        let dropped = buffer.len();
        buffer.clear();

        debug!(detached, dropped, "mailbox torn down");
    }

    /// Number of attached subscribers whose handles are still alive.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .await
            .iter()
            .filter(|s| s.is_live())
            .count()
    }

    /// Snapshot of the buffered messages, oldest first.
    pub async fn buffered(&self) -> Vec<Message> {
        self.buffer.lock().await.iter().cloned().collect()
    }

    /// Whether [`close_all`](Self::close_all) has run.
    pub fn is_torn_down(&self) -> bool {
        *self.teardown.borrow()
    }
}

/// Append under the one-per-source rule, then evict oldest past `limit`.
fn push_buffered(buffer: &mut VecDeque<Message>, message: Message, limit: usize) {
    buffer.retain(|m| m.source != message.source);
    buffer.push_back(message);
    while buffer.len() > limit {
        buffer.pop_front();
    }
}
