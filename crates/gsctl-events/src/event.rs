use gsctl_core::{MatchStatusChangedEvent, NoFreeServerEvent, ServerStatusEvent};

use crate::error::{EventError, EventResult};

/// Every event the controller emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    ServerStatus(ServerStatusEvent),
    NoFreeServer(NoFreeServerEvent),
    MatchStatusChanged(MatchStatusChangedEvent),
}

impl ControllerEvent {
    /// Channel the event is published on.
    pub fn channel(&self) -> &'static str {
        match self {
            ControllerEvent::ServerStatus(_) => "ServerStatusEvent",
            ControllerEvent::NoFreeServer(_) => "NoFreeServerEvent",
            ControllerEvent::MatchStatusChanged(_) => "MatchStatusChangedEvent",
        }
    }

    /// JSON payload of the event.
    pub fn payload(&self) -> EventResult<serde_json::Value> {
        let value = match self {
            ControllerEvent::ServerStatus(e) => serde_json::to_value(e),
            ControllerEvent::NoFreeServer(e) => serde_json::to_value(e),
            ControllerEvent::MatchStatusChanged(e) => serde_json::to_value(e),
        };
        value.map_err(|e| EventError::Serialize(e.to_string()))
    }
}

impl From<ServerStatusEvent> for ControllerEvent {
    fn from(e: ServerStatusEvent) -> Self {
        ControllerEvent::ServerStatus(e)
    }
}

impl From<NoFreeServerEvent> for ControllerEvent {
    fn from(e: NoFreeServerEvent) -> Self {
        ControllerEvent::NoFreeServer(e)
    }
}

impl From<MatchStatusChangedEvent> for ControllerEvent {
    fn from(e: MatchStatusChangedEvent) -> Self {
        ControllerEvent::MatchStatusChanged(e)
    }
}
