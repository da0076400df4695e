//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EngineBus`] is the publish/subscribe hub for [`EngineEvent`]s emitted
//! by the dispatcher, the escalation scanner, and the service facade. It is
//! shared via `Arc<EngineBus>` across the application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use portaria_core::types::DbId;

// ---------------------------------------------------------------------------
// EngineEvent
// ---------------------------------------------------------------------------

/// A domain event that occurred inside the delivery engine.
///
/// Constructed via [`EngineEvent::new`] and enriched with the builder
/// methods [`with_tenant`](EngineEvent::with_tenant),
/// [`with_notification`](EngineEvent::with_notification), and
/// [`with_payload`](EngineEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    /// Dot-separated event name, e.g. `"entrega.enviada"`.
    pub event_type: String,

    /// Tenant the event belongs to, when known.
    pub condominio_id: Option<DbId>,

    /// Notification the event concerns, when applicable.
    pub notificacao_id: Option<DbId>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent {
    /// Create a new event with only the required `event_type`.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            condominio_id: None,
            notificacao_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Attach the tenant to the event.
    pub fn with_tenant(mut self, condominio_id: DbId) -> Self {
        self.condominio_id = Some(condominio_id);
        self
    }

    /// Attach the notification to the event.
    pub fn with_notification(mut self, notificacao_id: DbId) -> Self {
        self.notificacao_id = Some(notificacao_id);
        self
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EngineBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`EngineEvent`]. When the buffer
/// is full, the oldest un-consumed events are dropped and slow receivers
/// observe a `RecvError::Lagged`.
pub struct EngineBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EngineBus {
    /// Create a bus with a specific channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: EngineEvent) {
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EngineBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
