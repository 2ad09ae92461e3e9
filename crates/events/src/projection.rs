use crate::{Event, EventEnvelope};

/// A projection folds ledger events into a queryable, disposable read model.
///
/// Read models can be deleted and rebuilt from the ledger at any time; the
/// ledger is the source of truth. `apply` must be idempotent because the bus
/// delivers at-least-once. [`crate::ProjectionRunner`] filters redeliveries by
/// sequence number, but projections should still tolerate duplicates.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);

    /// Forget everything (before a rebuild).
    fn reset(&mut self);
}
