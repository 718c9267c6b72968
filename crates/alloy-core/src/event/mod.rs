//! Event model and in-process event bus.
//!
//! - [`model`] — the immutable [`Event`] record and [`Subscription`] predicate.
//! - [`bus`] — the bounded-queue, worker-pool [`EventBus`].

pub mod bus;
pub mod model;

pub use bus::{BusState, BusStatus, EventBus, EventBusPatch};
pub use model::{Event, Subscription, SubscriptionCallback, WILDCARD, requires_main_thread};
