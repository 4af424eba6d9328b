//! flipcast — real-time event relay for resale-arbitrage tooling.
//!
//! Producers (scan pipelines, job runners) emit typed events into one
//! process-wide [`Broadcaster`]; connected clients receive them over a
//! Server-Sent-Events stream served by the router in [`api`]. Delivery is
//! in-process, immediate, and best-effort: no persistence, no replay, no
//! cross-subscriber ordering.

pub mod api;
pub mod broadcaster;
pub mod config;
pub mod event;
pub mod marketplace;
pub mod scan;
pub mod sink;

pub use broadcaster::{Broadcaster, Subscription};
pub use event::{Event, EventError, EventKind};
pub use sink::{EventSink, StreamSink};
