//! Notifications raised by devices for the UI layer.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::midi::Direction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// The driver did not end up in the requested open/closed state.
    PortStateMismatch {
        device: String,
        direction: Direction,
        requested: bool,
    },
}

pub trait EventSink: Send {
    fn report(&self, event: DeviceEvent);
}

/// Logs every event at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn report(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::PortStateMismatch {
                device,
                direction,
                requested,
            } => {
                let wanted = if requested { "open" } else { "close" };
                tracing::warn!(%device, %direction, "cannot {wanted} port");
            }
        }
    }
}

/// Keeps reported events in memory; clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<DeviceEvent>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<DeviceEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventSink for RecordingEventSink {
    fn report(&self, event: DeviceEvent) {
        self.events.lock().push(event);
    }
}

impl EventSink for broadcast::Sender<DeviceEvent> {
    fn report(&self, event: DeviceEvent) {
        // No subscribers is not an error for a notification hook.
        let _ = self.send(event);
    }
}
