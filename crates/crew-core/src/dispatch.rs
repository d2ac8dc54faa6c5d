//! Listener registry that turns connection activity into typed client events.

use crate::protocol::{decode_inbound, CrewMessage, Inbound};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, warn};

pub const NORMAL_CLOSURE: u16 = 1000;
pub const ABNORMAL_CLOSURE: u16 = 1006;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
    /// True when the closing handshake completed.
    pub clean: bool,
}

impl CloseInfo {
    pub fn normal(reason: &str) -> Self {
        Self {
            code: NORMAL_CLOSURE,
            reason: reason.to_string(),
            clean: true,
        }
    }

    pub fn abnormal() -> Self {
        Self {
            code: ABNORMAL_CLOSURE,
            reason: String::new(),
            clean: false,
        }
    }
}

/// What the connection layer reports, before any decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected(CloseInfo),
    Error(String),
    Message(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    Connected,
    Disconnected,
    Error,
    Status,
    CrewUpdate,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Connected => "connected",
            EventName::Disconnected => "disconnected",
            EventName::Error => "error",
            EventName::Status => "status",
            EventName::CrewUpdate => "crew_update",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Disconnected(CloseInfo),
    Error(String),
    Status(Value),
    CrewUpdate(CrewMessage),
}

impl ClientEvent {
    pub fn name(&self) -> EventName {
        match self {
            ClientEvent::Connected => EventName::Connected,
            ClientEvent::Disconnected(_) => EventName::Disconnected,
            ClientEvent::Error(_) => EventName::Error,
            ClientEvent::Status(_) => EventName::Status,
            ClientEvent::CrewUpdate(_) => EventName::CrewUpdate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Box<dyn FnMut(&ClientEvent) + Send>;

#[derive(Default)]
pub struct Dispatcher {
    listeners: HashMap<EventName, Vec<(ListenerId, Handler)>>,
    next_id: u64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, name: EventName, handler: F) -> ListenerId
    where
        F: FnMut(&ClientEvent) + Send + 'static,
    {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners
            .entry(name)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Removes one handler. Returns false if it was not registered under `name`.
    pub fn off(&mut self, name: EventName, id: ListenerId) -> bool {
        let Some(handlers) = self.listeners.get_mut(&name) else {
            return false;
        };
        let Some(index) = handlers.iter().position(|(existing, _)| *existing == id) else {
            return false;
        };
        handlers.remove(index);
        true
    }

    pub fn listener_count(&self, name: EventName) -> usize {
        self.listeners.get(&name).map(Vec::len).unwrap_or(0)
    }

    /// Runs every handler registered for the event, in registration order.
    /// A panicking handler is logged and skipped; the rest still run.
    /// Returns how many handlers completed.
    pub fn emit(&mut self, event: &ClientEvent) -> usize {
        let name = event.name();
        let Some(handlers) = self.listeners.get_mut(&name) else {
            return 0;
        };
        let mut completed = 0;
        for (id, handler) in handlers.iter_mut() {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => completed += 1,
                Err(payload) => {
                    error!(
                        "handler_panic: event={} listener={:?} detail={}",
                        name.as_str(),
                        id,
                        panic_detail(payload.as_ref())
                    );
                }
            }
        }
        completed
    }

    pub fn handle(&mut self, event: ConnectionEvent) {
        let client_event = match event {
            ConnectionEvent::Connected => Some(ClientEvent::Connected),
            ConnectionEvent::Disconnected(info) => Some(ClientEvent::Disconnected(info)),
            ConnectionEvent::Error(detail) => Some(ClientEvent::Error(detail)),
            ConnectionEvent::Message(raw) => classify(&raw),
        };
        if let Some(client_event) = client_event {
            self.emit(&client_event);
        }
    }
}

/// Maps one inbound text frame to the event it should raise, if any.
pub fn classify(raw: &str) -> Option<ClientEvent> {
    match decode_inbound(raw) {
        Ok(Inbound::Pong) => None,
        Ok(Inbound::Status(value)) => Some(ClientEvent::Status(value)),
        Ok(Inbound::Workflow(message)) => {
            debug!("crew_update: {}", message.kind);
            Some(ClientEvent::CrewUpdate(message))
        }
        Ok(Inbound::Unknown(kind)) => {
            warn!("unknown_message_type: {kind}");
            None
        }
        Err(err) => {
            warn!("inbound_decode_error: {err}");
            None
        }
    }
}

fn panic_detail(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        return (*text).to_string();
    }
    if let Some(text) = payload.downcast_ref::<String>() {
        return text.clone();
    }
    "non-string panic payload".to_string()
}
