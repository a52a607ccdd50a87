//! Live fan-out of events to connected transports.
//!
//! The bus is for distribution only; the timeline store is the source of
//! truth. Durable events reach the bus strictly after they were appended, so a
//! subscriber that misses a message can always recover it through replay.
//!
//! ## Delivery
//!
//! - **Broadcast**: every subscription receives every message published after
//!   it subscribed. Nothing published earlier is replayed.
//! - **Best effort**: a dropped subscription is pruned silently. A failed
//!   publish after a durable append loses only the live copy.
//! - **Per-publisher order**: messages from one publisher arrive in publish
//!   order. Concurrent publishers interleave arbitrarily.
//! - **Unfiltered**: all streams and tenants share one bus. Consumers filter
//!   by `LiveEvent::stream_id` and by tenant (see `TenantScoped`).
//!
//! ## Gap-free resume
//!
//! A reconnecting client subscribes first and reads the timeline backlog
//! second. Anything appended in between shows up in both; the consumer drops
//! the live copy of every event id it already took from the backlog.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use atrium_core::StreamId;

use crate::envelope::StreamEvent;

/// An event as delivered to live subscribers, tagged with its stream.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveEvent {
    pub stream_id: StreamId,
    pub event: StreamEvent,
}

impl LiveEvent {
    pub fn new(stream_id: StreamId, event: StreamEvent) -> Self {
        Self { stream_id, event }
    }
}

/// Receiving side of a bus subscription.
///
/// Meant for a single consumer; transports usually drain it from a blocking
/// task and forward into an async channel:
///
/// ```ignore
/// let subscription = bus.subscribe();
/// loop {
///     match subscription.recv_timeout(Duration::from_secs(1)) {
///         Ok(live) => forward(live)?,
///         Err(RecvTimeoutError::Timeout) => continue, // heartbeat, client check
///         Err(RecvTimeoutError::Disconnected) => break,
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Broadcast pub/sub. Every subscription receives every message published
/// after it subscribed.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
