//! In-memory capture of overseer events.
//!
//! The headless runner counts warnings per tick with it and tests assert on
//! the dotted event names and the subject fields (`room`, `role`, `owner`)
//! the scheduler attaches to them.

use std::collections::BTreeMap;
use std::fmt;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::world::Tick;

/// Field names that identify the room an event is about.
const ROOM_FIELDS: [&str; 4] = ["room", "colony", "anchor", "pos"];

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Flag(bool),
    Signed(i64),
    Count(u64),
    Ratio(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            FieldValue::Count(value) => Some(value),
            FieldValue::Signed(value) => u64::try_from(value).ok(),
            _ => None,
        }
    }
}

/// One captured event.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEnvelope {
    pub level: Level,
    pub target: String,
    /// The dotted event name, e.g. `spawn_group.request_dropped`.
    pub message: String,
    /// Set when the event carried a `tick` field.
    pub tick: Option<Tick>,
    pub fields: BTreeMap<&'static str, FieldValue>,
}

impl LogEnvelope {
    pub fn is_warning(&self) -> bool {
        self.level == Level::WARN
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_str)
    }

    pub fn field_u64(&self, name: &str) -> Option<u64> {
        self.fields.get(name).and_then(FieldValue::as_u64)
    }

    /// True when any room-identifying field names `room`, either as a room
    /// name or as a `room:x:y` style position.
    pub fn concerns_room(&self, room: &str) -> bool {
        ROOM_FIELDS.iter().any(|name| {
            self.field_str(name).is_some_and(|value| {
                value == room
                    || value
                        .strip_prefix(room)
                        .is_some_and(|rest| rest.starts_with(':'))
            })
        })
    }
}

/// Collects events emitted under a [`LogCaptureLayer`] for later inspection.
pub struct LogCapture {
    sender: Sender<LogEnvelope>,
    receiver: Receiver<LogEnvelope>,
}

impl Default for LogCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl LogCapture {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub fn layer(&self) -> LogCaptureLayer {
        LogCaptureLayer {
            sender: self.sender.clone(),
        }
    }

    pub fn drain(&self) -> Vec<LogEnvelope> {
        self.receiver.try_iter().collect()
    }

    /// Drains everything and keeps the warnings.
    pub fn drain_warnings(&self) -> Vec<LogEnvelope> {
        self.receiver
            .try_iter()
            .filter(LogEnvelope::is_warning)
            .collect()
    }
}

#[derive(Clone)]
pub struct LogCaptureLayer {
    sender: Sender<LogEnvelope>,
}

impl<S> Layer<S> for LogCaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut envelope = LogEnvelope {
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message: String::new(),
            tick: None,
            fields: BTreeMap::new(),
        };
        event.record(&mut envelope);
        // Dropped capture: nothing to deliver to.
        let _ = self.sender.send(envelope);
    }
}

impl LogEnvelope {
    fn store(&mut self, field: &Field, value: FieldValue) {
        match (field.name(), value) {
            ("message", FieldValue::Text(text)) => self.message = text,
            ("tick", FieldValue::Count(tick)) => self.tick = Some(tick),
            (name, value) => {
                self.fields.insert(name, value);
            }
        }
    }
}

impl Visit for LogEnvelope {
    fn record_bool(&mut self, field: &Field, value: bool) {
        self.store(field, FieldValue::Flag(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.store(field, FieldValue::Signed(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.store(field, FieldValue::Count(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.store(field, FieldValue::Ratio(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.store(field, FieldValue::Text(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        // `%room` and the message both arrive here already formatted.
        self.store(field, FieldValue::Text(format!("{value:?}")));
    }
}
