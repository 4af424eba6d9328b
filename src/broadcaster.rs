//! In-process publish/subscribe hub for notification events.
//!
//! A single [`Broadcaster`] is owned by the composition root and cloned into
//! route handlers and producers. Producers call [`Broadcaster::emit`];
//! subscribers register a transport via [`Broadcaster::subscribe`] and are
//! written to by a dedicated forwarder task, so one slow or dead connection
//! never blocks the others.
//!
//! ## Delivery contract
//! - Per-subscriber FIFO: frames reach each subscriber in emit order.
//! - No cross-subscriber ordering, no replay for late subscribers.
//! - Best-effort: a failing, timed-out, or backed-up subscriber is evicted;
//!   producers only ever see a delivery count.
//!
//! Fan-out is a bounded queue plus forwarder task per subscriber. `emit`
//! enqueues synchronously (the registry lock is never held across an await);
//! the forwarder applies the per-write timeout.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::event::{Event, EventError, EventKind};
use crate::sink::EventSink;

/// Frames buffered per subscriber before it is considered too slow.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// How long a single write to one subscriber may take.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared fan-out hub. Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

struct Inner {
    subscribers: Mutex<HashMap<Uuid, SubscriberHandle>>,
    queue_capacity: usize,
    write_timeout: Duration,
}

struct SubscriberHandle {
    frame_tx: mpsc::Sender<Bytes>,
    detach: CancellationToken,
    connected_at: Instant,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_WRITE_TIMEOUT, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_limits(write_timeout: Duration, queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(HashMap::new()),
                queue_capacity: queue_capacity.max(1),
                write_timeout,
            }),
        }
    }

    /// Register a new subscriber around `sink`.
    ///
    /// Always succeeds; registration is pure bookkeeping. The returned
    /// [`Subscription`] removes the subscriber when dropped or when
    /// [`Subscription::unsubscribe`] is called, whichever comes first.
    pub fn subscribe<S: EventSink>(&self, sink: S) -> Subscription {
        let id = Uuid::new_v4();
        let (frame_tx, frame_rx) = mpsc::channel(self.inner.queue_capacity);
        let detach = CancellationToken::new();

        self.inner.subscribers.lock().insert(
            id,
            SubscriberHandle {
                frame_tx,
                detach: detach.clone(),
                connected_at: Instant::now(),
            },
        );
        tokio::spawn(forward(
            id,
            sink,
            frame_rx,
            detach,
            self.inner.write_timeout,
            Arc::downgrade(&self.inner),
        ));
        tracing::debug!(subscriber = %id, "subscriber connected");

        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Broadcast `data` as an event of the given kind.
    ///
    /// Returns how many subscribers the frame was handed to; this is
    /// telemetry, not a delivery guarantee. A payload that cannot be
    /// serialized is a producer error and is rejected here.
    pub fn emit<T: Serialize>(&self, kind: EventKind, data: &T) -> Result<usize, EventError> {
        Ok(self.emit_event(&Event::new(kind, data)?))
    }

    /// Fan an already-built event out to every current subscriber.
    ///
    /// The frame is encoded once. Subscribers whose queue is full (or whose
    /// forwarder already exited) are evicted on the spot; delivery to the
    /// rest is unaffected.
    pub fn emit_event(&self, event: &Event) -> usize {
        let frame = event.to_frame();
        let mut subscribers = self.inner.subscribers.lock();
        let mut delivered = 0;
        let mut stalled = Vec::new();
        for (id, sub) in subscribers.iter() {
            match sub.frame_tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(subscriber = %id, kind = %event.kind, "subscriber queue full, evicting");
                    stalled.push(*id);
                }
                Err(TrySendError::Closed(_)) => stalled.push(*id),
            }
        }
        for id in stalled {
            if let Some(sub) = subscribers.remove(&id) {
                sub.detach.cancel();
                tracing::debug!(
                    subscriber = %id,
                    connected_for = ?sub.connected_at.elapsed(),
                    "subscriber removed (stalled)",
                );
            }
        }
        delivered
    }

    /// Keepalive broadcast. Driven by an interval timer owned by the caller.
    pub fn ping(&self) -> usize {
        self.emit_event(&Event::ping())
    }

    /// Current registry size. Always computed from the registry itself.
    pub fn connection_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Drop every subscriber and close their transports best-effort.
    ///
    /// The registry is empty when this returns; forwarder tasks finish
    /// closing their sinks in the background.
    pub fn disconnect_all(&self) {
        let drained: Vec<(Uuid, SubscriberHandle)> =
            self.inner.subscribers.lock().drain().collect();
        let count = drained.len();
        for (id, sub) in drained {
            sub.detach.cancel();
            tracing::debug!(
                subscriber = %id,
                connected_for = ?sub.connected_at.elapsed(),
                "subscriber removed (shutdown)",
            );
        }
        if count > 0 {
            tracing::info!(count, "disconnected all subscribers");
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    /// Remove one subscriber. Safe to call from racing paths; only the call
    /// that actually finds the entry logs and cancels.
    fn remove(&self, id: Uuid, reason: &str) -> bool {
        match self.subscribers.lock().remove(&id) {
            Some(sub) => {
                sub.detach.cancel();
                tracing::debug!(
                    subscriber = %id,
                    connected_for = ?sub.connected_at.elapsed(),
                    reason,
                    "subscriber removed",
                );
                true
            }
            None => false,
        }
    }
}

/// Per-subscriber delivery loop: drains the frame queue into the sink,
/// enforcing the write timeout. Exits when the subscriber is detached or a
/// write fails, then closes the sink.
async fn forward<S: EventSink>(
    id: Uuid,
    mut sink: S,
    mut frame_rx: mpsc::Receiver<Bytes>,
    detach: CancellationToken,
    write_timeout: Duration,
    inner: Weak<Inner>,
) {
    let failed = loop {
        tokio::select! {
            _ = detach.cancelled() => break false,
            frame = frame_rx.recv() => match frame {
                None => break false,
                Some(frame) => {
                    match tokio::time::timeout(write_timeout, sink.send(frame)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(error)) => {
                            tracing::debug!(subscriber = %id, %error, "subscriber write failed");
                            break true;
                        }
                        Err(_) => {
                            tracing::warn!(subscriber = %id, ?write_timeout, "subscriber write timed out");
                            break true;
                        }
                    }
                }
            }
        }
    };
    if failed {
        if let Some(inner) = inner.upgrade() {
            inner.remove(id, "write failure");
        }
    }
    sink.close().await;
}

/// Unsubscribe handle returned by [`Broadcaster::subscribe`].
///
/// Removal happens on the first of: an explicit [`unsubscribe`] call, the
/// handle being dropped, a failed write, or
/// [`Broadcaster::disconnect_all`]. All paths are idempotent with respect
/// to each other.
///
/// [`unsubscribe`]: Subscription::unsubscribe
pub struct Subscription {
    id: Uuid,
    inner: Weak<Inner>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Remove this subscriber from the registry. Calling it again (or
    /// dropping the handle afterwards) is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.remove(self.id, "unsubscribed");
        }
    }

    /// Deliver an event to this subscriber only, ahead of any future
    /// broadcasts. Used for the initial connect ping. Returns `false` if the
    /// subscriber is already gone or its queue is full.
    pub fn notify(&self, event: &Event) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let subscribers = inner.subscribers.lock();
        match subscribers.get(&self.id) {
            Some(sub) => sub.frame_tx.try_send(event.to_frame()).is_ok(),
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
