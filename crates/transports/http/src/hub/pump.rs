//! Per-subscriber WebSocket pumps
//!
//! The write side drains the subscriber queue, coalescing whatever is already
//! queued into one frame, and sends a ping when the keepalive timer fires.
//! The read side only watches for liveness: any frame from the peer counts,
//! and silence for longer than `pong_wait` evicts the subscriber.

use super::Subscription;
use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// Upper bound on messages merged into one frame
const MAX_COALESCED: usize = 256;

/// Keepalive and frame limits for subscriber connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpTimings {
    /// Deadline for a single write
    pub write_wait: Duration,
    /// Maximum silence from the peer
    pub pong_wait: Duration,
    /// Ping interval; must be shorter than `pong_wait`
    pub ping_period: Duration,
    /// Largest inbound message accepted
    pub max_message_bytes: usize,
}

impl Default for PumpTimings {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            write_wait: Duration::from_secs(10),
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            max_message_bytes: 512,
        }
    }
}

/// Why a subscriber connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpExit {
    /// The hub evicted or dropped the subscriber
    QueueClosed,
    /// A write failed
    WriteFailed(String),
    /// A write did not complete within `write_wait`
    WriteTimeout,
    /// The peer closed the connection
    PeerClosed,
    /// Nothing was heard from the peer within `pong_wait`
    PeerTimeout,
    /// The peer sent a message larger than `max_message_bytes`
    Oversized(usize),
    /// Reading from the peer failed
    ReadFailed(String),
}

impl Display for PumpExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PumpExit::QueueClosed => write!(f, "queue closed"),
            PumpExit::WriteFailed(e) => write!(f, "write failed: {}", e),
            PumpExit::WriteTimeout => write!(f, "write timed out"),
            PumpExit::PeerClosed => write!(f, "peer closed"),
            PumpExit::PeerTimeout => write!(f, "peer timed out"),
            PumpExit::Oversized(n) => write!(f, "inbound message of {} bytes too large", n),
            PumpExit::ReadFailed(e) => write!(f, "read failed: {}", e),
        }
    }
}

/// Join `first` with every message already queued, newline separated
fn coalesce(first: bytes::Bytes, subscription: &mut Subscription) -> Message {
    let mut frame = first.to_vec();
    for _ in 1..MAX_COALESCED {
        match subscription.try_recv() {
            Some(next) => {
                frame.push(b'\n');
                frame.extend_from_slice(&next);
            }
            None => break,
        }
    }

    match String::from_utf8(frame) {
        Ok(text) => Message::Text(text),
        Err(e) => Message::Binary(e.into_bytes()),
    }
}

async fn write_frame<S>(sink: &mut S, message: Message, write_wait: Duration) -> Result<(), PumpExit>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match timeout(write_wait, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(PumpExit::WriteFailed(e.to_string())),
        Err(_) => Err(PumpExit::WriteTimeout),
    }
}

/// Drain `subscription` into `sink` until the queue closes or a write fails
pub async fn write_pump<S>(
    sink: &mut S,
    subscription: &mut Subscription,
    timings: &PumpTimings,
) -> PumpExit
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ping = interval_at(Instant::now() + timings.ping_period, timings.ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let outcome = tokio::select! {
            message = subscription.recv() => match message {
                Some(first) => {
                    let frame = coalesce(first, subscription);
                    write_frame(sink, frame, timings.write_wait).await
                }
                None => {
                    let _ = write_frame(sink, Message::Close(None), timings.write_wait).await;
                    return PumpExit::QueueClosed;
                }
            },
            _ = ping.tick() => {
                trace!(subscriber = subscription.id(), "Sending ping");
                write_frame(sink, Message::Ping(Vec::new()), timings.write_wait).await
            }
        };

        if let Err(exit) = outcome {
            return exit;
        }
    }
}

/// Watch `stream` for liveness until the peer goes away
pub async fn read_pump<R, E>(stream: &mut R, timings: &PumpTimings) -> PumpExit
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let message = match timeout(timings.pong_wait, stream.next()).await {
            Err(_) => return PumpExit::PeerTimeout,
            Ok(None) => return PumpExit::PeerClosed,
            Ok(Some(Err(e))) => return PumpExit::ReadFailed(e.to_string()),
            Ok(Some(Ok(message))) => message,
        };

        let size = match &message {
            Message::Close(_) => return PumpExit::PeerClosed,
            Message::Text(text) => text.len(),
            Message::Binary(data) | Message::Ping(data) | Message::Pong(data) => data.len(),
        };
        if size > timings.max_message_bytes {
            return PumpExit::Oversized(size);
        }
    }
}

/// Run both pumps for one subscriber until either side ends
pub async fn serve_subscriber<S, R, E>(
    mut sink: S,
    mut stream: R,
    mut subscription: Subscription,
    timings: PumpTimings,
) -> PumpExit
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let exit = tokio::select! {
        exit = write_pump(&mut sink, &mut subscription, &timings) => exit,
        exit = read_pump(&mut stream, &timings) => exit,
    };

    debug!(subscriber = subscription.id(), "Subscriber connection ended: {}", exit);
    subscription.unregister().await;
    exit
}
