//! Live-update events pushed to connected browser tabs.
//!
//! - [`BroadcastHub`]: registry of subscriber queues, owned by the server state
//! - [`Subscription`]: one connection's queue, unregistered on drop
//! - [`Event`]: a named JSON payload with text event-stream framing

pub mod hub;

pub use hub::{BroadcastHub, Event, SubscriberId, Subscription};
