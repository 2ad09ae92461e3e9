use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{Money, MovementId};
use stockbook_events::Event;
use stockbook_series::SeriesScope;

use crate::movement::Movement;
use crate::payment::PaymentStatus;

/// Event: MovementRecorded. Carries the full movement so read models need no lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecorded {
    pub movement: Movement,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MovementAmended (header fields only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementAmended {
    pub movement_id: MovementId,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub date: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentUpdated {
    pub movement_id: MovementId,
    pub previous: PaymentStatus,
    pub status: PaymentStatus,
    pub paid: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LedgerPurged. Read models must rebuild after this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPurged {
    pub movements_deleted: u64,
    pub before: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SeriesAllocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesAllocated {
    pub series_code: String,
    pub scope: SeriesScope,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    MovementRecorded(MovementRecorded),
    MovementAmended(MovementAmended),
    PaymentUpdated(PaymentUpdated),
    LedgerPurged(LedgerPurged),
    SeriesAllocated(SeriesAllocated),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::MovementRecorded(_) => "ledger.movement.recorded",
            LedgerEvent::MovementAmended(_) => "ledger.movement.amended",
            LedgerEvent::PaymentUpdated(_) => "ledger.payment.updated",
            LedgerEvent::LedgerPurged(_) => "ledger.purged",
            LedgerEvent::SeriesAllocated(_) => "ledger.series.allocated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::MovementRecorded(e) => e.occurred_at,
            LedgerEvent::MovementAmended(e) => e.occurred_at,
            LedgerEvent::PaymentUpdated(e) => e.occurred_at,
            LedgerEvent::LedgerPurged(e) => e.occurred_at,
            LedgerEvent::SeriesAllocated(e) => e.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockbook_events::EventEnvelope;

    #[test]
    fn json_envelope_decodes_back_to_the_event() {
        let event = LedgerEvent::SeriesAllocated(SeriesAllocated {
            series_code: "B2C".into(),
            scope: SeriesScope::SaleB2c,
            reference: "B2C-000001".into(),
            occurred_at: Utc::now(),
        });
        let envelope = EventEnvelope::<serde_json::Value>::from_typed(7, &event).unwrap();
        assert_eq!(envelope.event_type(), "ledger.series.allocated");
        assert_eq!(envelope.sequence_number(), 7);
        let decoded = envelope.decode::<LedgerEvent>().unwrap();
        assert_eq!(decoded.payload(), &event);
    }
}
