//! Projection runner: sequence tracking on top of a [`Projection`].
//!
//! The runner drops redeliveries (sequence at or below the cursor) and reports
//! gaps, so the owner can decide to rebuild from the ledger instead of
//! silently drifting.

use crate::{EventEnvelope, Projection};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    /// An envelope arrived past a hole in the sequence; the read model is stale.
    Gap { last: u64, found: u64 },
}

/// Outcome of feeding one envelope to the runner.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Applied {
    Applied,
    /// Already seen (at-least-once redelivery).
    Duplicate,
}

/// Runs envelopes through a projection and tracks the last applied sequence.
#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    last_sequence_number: Option<u64>,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            last_sequence_number: None,
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn projection_mut(&mut self) -> &mut P {
        &mut self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    pub fn last_sequence_number(&self) -> Option<u64> {
        self.last_sequence_number
    }

    /// Apply one envelope. The first envelope may start at any sequence
    /// (a runner can attach to a bus mid-stream after a rebuild).
    pub fn apply(&mut self, envelope: &EventEnvelope<P::Ev>) -> Result<Applied, ProjectionError> {
        let found = envelope.sequence_number();

        if let Some(last) = self.last_sequence_number {
            if found <= last {
                return Ok(Applied::Duplicate);
            }
            if found != last + 1 {
                return Err(ProjectionError::Gap { last, found });
            }
        }

        self.projection.apply(envelope);
        self.last_sequence_number = Some(found);
        Ok(Applied::Applied)
    }

    /// Apply many envelopes in order, stopping at the first gap.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(), ProjectionError>
    where
        P::Ev: 'a,
    {
        for env in envelopes {
            self.apply(env)?;
        }
        Ok(())
    }

    /// Clear the read model and continue from `sequence_number` (the bus
    /// position the rebuild source is consistent with).
    pub fn reset_at(&mut self, sequence_number: Option<u64>) {
        self.projection.reset();
        self.last_sequence_number = sequence_number;
    }
}
