//! Plain-TCP line transport.
//!
//! Clients send newline-terminated commands:
//!
//! ```text
//! pub <topic> <data>   publish to a topic that currently has subscribers
//! sub <topic>          receive "<topic> <data>\n" for every later publish
//! close                hang up
//! close_next           hang up after the next pub
//! ```
//!
//! Topics are [`Mailbox`]es that exist only while somebody is subscribed.
//! Every accept goes through the caller's [`Listener`], normally a
//! [`PacedListener`](crate::limits::PacedListener).

use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::serve::Listener;
use bytes::Bytes;
use dashmap::DashMap;
use locshare_core::{Delivery, Mailbox, Message, Subscription};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{ProtocolError, RelayError};
use crate::server::LocationRelay;

/// Longest accepted command line, excluding the newline.
pub const MAX_LINE_LEN: usize = 4096;

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyCommand {
    /// `pub <topic> <data>`
    Publish {
        /// Target topic
        topic: String,
        /// Payload, without spaces
        data: String,
    },
    /// `sub <topic>`
    Subscribe {
        /// Topic to follow
        topic: String,
    },
    /// `close`
    Close,
    /// `close_next`
    CloseNext,
    /// Anything else; ignored.
    Unknown(String),
}

impl LegacyCommand {
    /// Parse one line (without its terminator).
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut words = line.split(' ');
        let verb = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();

        let command = match verb {
            "close" => LegacyCommand::Close,
            "close_next" => LegacyCommand::CloseNext,
            "pub" => {
                expect_arity(verb, &args, 2)?;
                LegacyCommand::Publish {
                    topic: args[0].to_string(),
                    data: args[1].to_string(),
                }
            }
            "sub" => {
                expect_arity(verb, &args, 1)?;
                LegacyCommand::Subscribe {
                    topic: args[0].to_string(),
                }
            }
            other => LegacyCommand::Unknown(other.to_string()),
        };
        Ok(command)
    }
}

fn expect_arity(verb: &str, args: &[&str], expected: usize) -> Result<(), ProtocolError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ProtocolError::Arity {
            command: verb.to_string(),
            expected,
            actual: args.len(),
        })
    }
}

/// Topic name → mailbox, for the line transport.
///
/// A topic is dropped once nothing but the broker holds its mailbox.
#[derive(Debug)]
pub struct TopicBroker {
    topics: DashMap<String, Arc<Mailbox>>,
    buffer_limit: usize,
}

impl TopicBroker {
    /// Create an empty broker.
    pub fn new(buffer_limit: usize) -> Self {
        Self {
            topics: DashMap::new(),
            buffer_limit,
        }
    }

    /// Subscribe to `topic`, creating it if needed.
    pub async fn subscribe(&self, topic: &str) -> (Arc<Mailbox>, Subscription) {
        let mailbox = Arc::clone(
            self.topics
                .entry(topic.to_string())
                .or_insert_with(|| Arc::new(Mailbox::new(self.buffer_limit)))
                .value(),
        );
        let subscription = mailbox.subscribe().await;
        (mailbox, subscription)
    }

    /// Detach a subscription and drop the topic if it is now unused.
    pub async fn unsubscribe(
        &self,
        topic: &str,
        mailbox: Arc<Mailbox>,
        subscription: Subscription,
    ) {
        if let Err(e) = mailbox.unsubscribe(subscription).await {
            debug!(topic, error = %e, "subscription already detached");
        }
        drop(mailbox);
        self.prune(topic);
    }

    /// Publish to `topic`. Returns `None` when nobody has the topic open.
    pub async fn publish(&self, topic: &str, source: &str, data: Bytes) -> Option<Delivery> {
        let mailbox = self.mailbox(topic)?;
        let delivery = mailbox.publish(Message::new(source, data)).await;
        drop(mailbox);
        if delivery == Delivery::Buffered {
            // The last subscriber left while we held the topic open.
            self.prune(topic);
        }
        Some(delivery)
    }

    /// Live subscribers on `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        let Some(mailbox) = self.mailbox(topic) else {
            return 0;
        };
        let count = mailbox.subscriber_count().await;
        drop(mailbox);
        self.prune(topic);
        count
    }

    /// Number of open topics.
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Whether no topic is open.
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    fn mailbox(&self, topic: &str) -> Option<Arc<Mailbox>> {
        self.topics.get(topic).map(|entry| Arc::clone(entry.value()))
    }

    fn prune(&self, topic: &str) {
        if self
            .topics
            .remove_if(topic, |_, mailbox| Arc::strong_count(mailbox) == 1)
            .is_some()
        {
            debug!(topic, "topic closed");
        }
    }
}

/// Accept line-protocol connections forever.
pub async fn serve<L>(mut listener: L, relay: Arc<LocationRelay>)
where
    L: Listener<Addr = SocketAddr>,
{
    loop {
        let (io, peer) = listener.accept().await;
        relay
            .metrics()
            .connections_legacy
            .fetch_add(1, Ordering::Relaxed);
        tokio::spawn(handle_connection(io, peer, Arc::clone(&relay)));
    }
}

/// Resolves once `rx` observes a hang-up (or its sender is gone).
async fn hung_up(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn handle_connection<S>(io: S, peer: SocketAddr, relay: Arc<LocationRelay>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    debug!(%peer, "legacy connection opened");
    let (reader, writer) = tokio::io::split(io);
    let mut reader = BufReader::new(reader);
    let writer = Arc::new(Mutex::new(writer));
    let hangup = Arc::new(watch::channel(false).0);
    let mut hangup_rx = hangup.subscribe();

    let source = peer.to_string();
    let mut subscribed = HashSet::new();
    let mut forwarders = JoinSet::new();
    let mut close_next = false;

    loop {
        let line = tokio::select! {
            biased;
            _ = hung_up(&mut hangup_rx) => break,
            line = read_line(&mut reader) => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(%peer, error = %e, "closing legacy connection");
                break;
            }
        };

        match LegacyCommand::parse(&line) {
            Ok(LegacyCommand::Close) => break,
            Ok(LegacyCommand::CloseNext) => close_next = true,
            Ok(LegacyCommand::Publish { topic, data }) => {
                let delivery = relay
                    .topics()
                    .publish(&topic, &source, Bytes::from(data))
                    .await;
                debug!(%peer, topic, ?delivery, "pub");
                if close_next {
                    break;
                }
            }
            Ok(LegacyCommand::Subscribe { topic }) => {
                if !subscribed.insert(topic.clone()) {
                    continue;
                }
                let (mailbox, subscription) = relay.topics().subscribe(&topic).await;
                info!(%peer, topic, "sub");
                forwarders.spawn(forward(
                    topic,
                    mailbox,
                    subscription,
                    Arc::clone(&writer),
                    Arc::clone(&hangup),
                    Arc::clone(&relay),
                ));
            }
            Ok(LegacyCommand::Unknown(verb)) => debug!(%peer, verb, "ignoring unknown command"),
            Err(e) => {
                warn!(%peer, error = %e, "closing legacy connection");
                break;
            }
        }
    }

    hangup.send_replace(true);
    while forwarders.join_next().await.is_some() {}
    if let Err(e) = writer.lock().await.shutdown().await {
        debug!(%peer, error = %e, "shutdown failed");
    }
    debug!(%peer, "legacy connection closed");
}

/// Copy one subscription onto the shared writer until hang-up.
///
/// Deliveries are moved off the mailbox queue as soon as they arrive, so a
/// peer that stops reading never holds up the publishers on its topic.
fn forward<W>(
    topic: String,
    mailbox: Arc<Mailbox>,
    mut subscription: Subscription,
    writer: Arc<Mutex<W>>,
    hangup: Arc<watch::Sender<bool>>,
    relay: Arc<LocationRelay>,
) -> impl Future<Output = ()> + Send + 'static
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async move {
        let (backlog_tx, mut backlog) = mpsc::unbounded_channel::<Message>();

        let mut pump_hangup = hangup.subscribe();
        let pump = async {
            let backlog_tx = backlog_tx;
            loop {
                let message = tokio::select! {
                    biased;
                    _ = hung_up(&mut pump_hangup) => break,
                    message = subscription.recv() => message,
                };
                let Some(message) = message else { break };
                if backlog_tx.send(message).is_err() {
                    break;
                }
            }
        };

        let mut write_hangup = hangup.subscribe();
        let write = async {
            loop {
                let message = tokio::select! {
                    biased;
                    _ = hung_up(&mut write_hangup) => break,
                    message = backlog.recv() => message,
                };
                let Some(message) = message else { break };

                let mut line = Vec::with_capacity(topic.len() + message.content.len() + 2);
                line.extend_from_slice(topic.as_bytes());
                line.push(b' ');
                line.extend_from_slice(&message.content);
                line.push(b'\n');

                if let Err(e) = writer.lock().await.write_all(&line).await {
                    debug!(topic, error = %e, "write failed");
                    hangup.send_replace(true);
                    break;
                }
            }
        };

        tokio::join!(pump, write);
        relay.topics().unsubscribe(&topic, mailbox, subscription).await;
    }
}

/// Read one line, without its terminator. `None` at end of stream.
async fn read_line<R>(reader: &mut R) -> Result<Option<String>, RelayError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let read = (&mut *reader)
        .take(MAX_LINE_LEN as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;
    if read == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > MAX_LINE_LEN {
        return Err(ProtocolError::LineTooLong {
            limit: MAX_LINE_LEN,
        }
        .into());
    }

    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}
