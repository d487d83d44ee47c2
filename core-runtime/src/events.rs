//! # Telemetry Messages
//!
//! The engine produces a single ordered stream of messages for the
//! presentation layer:
//!
//! - `property` messages: `{type: "property", name, value}`
//! - `event` messages: `{type: "event", name, data?}`
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐  poll / push  ┌────────────────┐  deliver  ┌─────────────┐
//! │ Active backend ├──────────────>│ PropertyBridge ├──────────>│ MessageSink │
//! └────────────────┘               └────────────────┘           └─────────────┘
//! ```
//!
//! [`MessageSink::deliver`] is synchronous and is called one message at a
//! time, in sequence order, with no engine lock held. A sink may call back
//! into the engine; messages caused by that call are delivered after
//! `deliver` returns.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{ChannelSink, EngineMessage, MessageSink, PropertyValue};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (sink, mut rx) = ChannelSink::new();
//! sink.deliver(EngineMessage::property("time-pos", PropertyValue::Double(12.5)));
//!
//! let message = rx.recv().await.unwrap();
//! assert_eq!(message.name(), "time-pos");
//! # }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;

// ============================================================================
// Message model
// ============================================================================

/// Typed property value.
///
/// Serialized untagged, so `Double(1.5)` becomes `1.5` and `Node` values are
/// passed through as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Double(f64),
    String(String),
    Node(Value),
}

impl PropertyValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Double(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        PropertyValue::Node(value)
    }
}

/// One telemetry message.
///
/// `sequence` is assigned by the bridge, increases by one per delivered
/// message and is not part of the wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EngineMessage {
    Property {
        name: String,
        value: PropertyValue,
        #[serde(skip)]
        sequence: u64,
    },
    Event {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(skip)]
        sequence: u64,
    },
}

impl EngineMessage {
    pub fn property(name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        EngineMessage::Property {
            name: name.into(),
            value: value.into(),
            sequence: 0,
        }
    }

    pub fn event(name: impl Into<String>, data: Option<Value>) -> Self {
        EngineMessage::Event {
            name: name.into(),
            data,
            sequence: 0,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EngineMessage::Property { name, .. } | EngineMessage::Event { name, .. } => name,
        }
    }

    pub fn sequence(&self) -> u64 {
        match self {
            EngineMessage::Property { sequence, .. } | EngineMessage::Event { sequence, .. } => {
                *sequence
            }
        }
    }

    pub fn with_sequence(mut self, seq: u64) -> Self {
        match &mut self {
            EngineMessage::Property { sequence, .. } | EngineMessage::Event { sequence, .. } => {
                *sequence = seq
            }
        }
        self
    }

    pub fn is_event(&self) -> bool {
        matches!(self, EngineMessage::Event { .. })
    }

    /// Property value, if this is a property message.
    pub fn value(&self) -> Option<&PropertyValue> {
        match self {
            EngineMessage::Property { value, .. } => Some(value),
            EngineMessage::Event { .. } => None,
        }
    }

    /// Event payload, if this is an event message with data.
    pub fn data(&self) -> Option<&Value> {
        match self {
            EngineMessage::Event { data, .. } => data.as_ref(),
            EngineMessage::Property { .. } => None,
        }
    }

    /// Wire form consumed by the presentation layer.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl fmt::Display for EngineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineMessage::Property { name, value, .. } => write!(f, "property {} = {:?}", name, value),
            EngineMessage::Event { name, .. } => write!(f, "event {}", name),
        }
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Receiver of the engine's telemetry stream.
pub trait MessageSink: Send + Sync {
    fn deliver(&self, message: EngineMessage);
}

/// Forwards messages into an unbounded channel with a single consumer.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<EngineMessage>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl MessageSink for ChannelSink {
    fn deliver(&self, message: EngineMessage) {
        // A dropped receiver means nobody is listening anymore.
        let _ = self.sender.send(message);
    }
}
