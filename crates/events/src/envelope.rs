use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Event;

/// Delivery envelope for a published event.
///
/// `sequence_number` is the publisher's position: strictly increasing per
/// publisher, starting at 1. Consumers use it to drop redeliveries and to
/// notice gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    sequence_number: u64,
    event_type: String,
    event_version: u32,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        sequence_number: u64,
        event_type: impl Into<String>,
        event_version: u32,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            sequence_number,
            event_type: event_type.into(),
            event_version,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl EventEnvelope<serde_json::Value> {
    /// Wrap a typed event as a JSON envelope (the bus wire shape).
    pub fn from_typed<E>(sequence_number: u64, event: &E) -> Result<Self, serde_json::Error>
    where
        E: Event + Serialize,
    {
        Ok(Self::new(
            Uuid::now_v7(),
            sequence_number,
            event.event_type(),
            event.version(),
            serde_json::to_value(event)?,
        ))
    }

    /// Decode the JSON payload back into its typed event.
    pub fn decode<E>(&self) -> Result<EventEnvelope<E>, serde_json::Error>
    where
        E: Event + serde::de::DeserializeOwned,
    {
        Ok(EventEnvelope {
            event_id: self.event_id,
            sequence_number: self.sequence_number,
            event_type: self.event_type.clone(),
            event_version: self.event_version,
            payload: serde_json::from_value(self.payload.clone())?,
        })
    }
}
