//! Event records and the payloads they carry.

use serde::{Deserialize, Serialize};

use crate::flags::EventFlags;
use crate::handle::{Handle, ListenerHandle};

/// Information about a remote connection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// The remote identifier, as announced by the peer.
    pub remote_id: String,
    /// The remote IP address.
    pub remote_ip: String,
    /// The remote port number.
    pub remote_port: u16,
    /// Last time any update was received from the peer, in microseconds.
    pub last_update: i64,
    /// The protocol version, encoded as `0xMMmm`.
    pub protocol_version: u32,
}

/// Metadata describing a topic.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TopicInfo {
    /// The topic handle, allocated by the store.
    pub topic: Handle,
    /// The topic name.
    pub name: String,
    /// The declared type string.
    pub type_str: String,
    /// Topic properties as a JSON object string.
    pub properties: String,
}

/// A topic value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// No value has been assigned.
    #[default]
    Unassigned,
    /// A boolean.
    Boolean(bool),
    /// A 64-bit integer.
    Integer(i64),
    /// A 32-bit float.
    Float(f32),
    /// A 64-bit float.
    Double(f64),
    /// A UTF-8 string.
    String(String),
    /// Opaque bytes.
    Raw(Vec<u8>),
    /// An array of booleans.
    BooleanArray(Vec<bool>),
    /// An array of integers.
    IntegerArray(Vec<i64>),
    /// An array of doubles.
    DoubleArray(Vec<f64>),
    /// An array of strings.
    StringArray(Vec<String>),
}

impl Value {
    /// Returns the canonical type string for this value.
    pub fn type_str(&self) -> &'static str {
        match self {
            Self::Unassigned => "",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "int",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Raw(_) => "raw",
            Self::BooleanArray(_) => "boolean[]",
            Self::IntegerArray(_) => "int[]",
            Self::DoubleArray(_) => "double[]",
            Self::StringArray(_) => "string[]",
        }
    }

    /// True for [`Value::Unassigned`].
    pub fn is_unassigned(&self) -> bool {
        matches!(self, Self::Unassigned)
    }
}

/// A value change on a topic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValueEventData {
    /// The topic whose value changed.
    pub topic: Handle,
    /// The subscriber or entry through which the change was observed.
    pub subentry: Handle,
    /// The new value.
    pub value: Value,
}

/// A log record forwarded to log listeners.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogMessage {
    /// Severity, see [`crate::LogLevel`].
    pub level: u32,
    /// Source file that emitted the message.
    pub filename: String,
    /// Source line that emitted the message.
    pub line: u32,
    /// The message text.
    pub message: String,
}

/// The category-specific part of an [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EventData {
    /// Connection opened or closed.
    Connection(ConnectionInfo),
    /// Topic metadata changed.
    Topic(TopicInfo),
    /// Topic value changed.
    Value(ValueEventData),
    /// Log message emitted.
    Log(LogMessage),
}

/// A single queued notification.
///
/// Only the accessor matching the event's category returns `Some`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The listener this event was queued for.
    pub listener: ListenerHandle,
    /// The flags passed to the notification that produced this event.
    pub flags: EventFlags,
    /// The payload.
    pub data: EventData,
}

impl Event {
    /// Returns the connection payload, if this is a connection event.
    pub fn connection_info(&self) -> Option<&ConnectionInfo> {
        match &self.data {
            EventData::Connection(info) => Some(info),
            _ => None,
        }
    }

    /// Returns the topic payload, if this is a topic event.
    pub fn topic_info(&self) -> Option<&TopicInfo> {
        match &self.data {
            EventData::Topic(info) => Some(info),
            _ => None,
        }
    }

    /// Returns the value payload, if this is a value event.
    pub fn value_data(&self) -> Option<&ValueEventData> {
        match &self.data {
            EventData::Value(data) => Some(data),
            _ => None,
        }
    }

    /// Mutable access to the value payload; used by veto predicates that
    /// rewrite an event before admitting it.
    pub fn value_data_mut(&mut self) -> Option<&mut ValueEventData> {
        match &mut self.data {
            EventData::Value(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the log payload, if this is a log event.
    pub fn log_message(&self) -> Option<&LogMessage> {
        match &self.data {
            EventData::Log(msg) => Some(msg),
            _ => None,
        }
    }

    /// The topic this event concerns, for topic and value events.
    pub fn topic_handle(&self) -> Option<Handle> {
        match &self.data {
            EventData::Topic(info) => Some(info.topic),
            EventData::Value(data) => Some(data.topic),
            _ => None,
        }
    }

    /// True if the event's flags intersect `kind`.
    pub fn is(&self, kind: EventFlags) -> bool {
        self.flags.intersects(kind)
    }
}
