//! Ledger events: the `Event` contract, envelopes, pub/sub and projection mechanics.
//!
//! Events are published only after the store commits; the store stays the
//! source of truth and every consumer here is a disposable read model.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod projection;
pub mod runner;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;
pub use runner::{Applied, ProjectionError, ProjectionRunner};
