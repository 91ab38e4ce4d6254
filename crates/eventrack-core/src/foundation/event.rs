//! The event record that flows through the pipeline.
//!
//! An [`Event`] is a JSON-like mapping with a mandatory `name`, an optional
//! UTC `timestamp`, and arbitrary other fields. [`Tracker::emit`] always
//! fills in `timestamp`, `data` and `context`; events built by hand (for
//! example in tests, or when feeding a [`RoutingNode`] directly) carry only
//! what the caller puts in them.
//!
//! The name and timestamp are held as typed fields so that the timestamp is
//! a real point in time while the event is processed, and only becomes an
//! ISO-8601 string when the event is serialized.
//!
//! [`Tracker::emit`]: crate::Tracker::emit
//! [`RoutingNode`]: crate::RoutingNode

use std::fmt;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::foundation::codec::{format_timestamp, parse_timestamp};

/// Name given to events emitted without a name.
pub const UNKNOWN_EVENT_NAME: &str = "unknown";

const NAME_KEY: &str = "name";
const TIMESTAMP_KEY: &str = "timestamp";
const DATA_KEY: &str = "data";
const CONTEXT_KEY: &str = "context";

/// A named, optionally timestamped event.
///
/// Equality compares the name, the timestamp and every other field, so two
/// events are equal exactly when they would serialize to the same JSON.
#[derive(Clone, PartialEq)]
pub struct Event {
    name: String,
    timestamp: Option<DateTime<Utc>>,
    fields: Map<String, Value>,
}

impl Event {
    /// Creates an event with the given name and no other fields.
    ///
    /// An empty name is replaced with [`UNKNOWN_EVENT_NAME`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: normalize_name(name.into()),
            timestamp: None,
            fields: Map::new(),
        }
    }

    /// Builds an event from a raw JSON object.
    ///
    /// A string `name` becomes the event name and a parseable `timestamp`
    /// string becomes the typed timestamp. Everything else is kept as-is.
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        let name = match map.remove(NAME_KEY) {
            Some(value) => name_from_value(value),
            None => UNKNOWN_EVENT_NAME.to_string(),
        };

        let mut event = Self {
            name,
            timestamp: None,
            fields: Map::new(),
        };
        for (key, value) in map {
            event.insert(key, value);
        }
        event
    }

    /// Returns the event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the event.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = normalize_name(name.into());
    }

    /// Returns the timestamp, if one has been set.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Sets the timestamp.
    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>) {
        self.timestamp = Some(timestamp);
        self.fields.remove(TIMESTAMP_KEY);
    }

    /// Sets the timestamp (builder pattern).
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.set_timestamp(timestamp);
        self
    }

    /// Returns the `data` mapping, if present and an object.
    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.fields.get(DATA_KEY).and_then(Value::as_object)
    }

    /// Returns the `data` mapping, creating an empty one if needed.
    pub fn data_mut(&mut self) -> &mut Map<String, Value> {
        self.object_entry(DATA_KEY)
    }

    /// Replaces the `data` mapping (builder pattern).
    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.fields.insert(DATA_KEY.to_string(), Value::Object(data));
        self
    }

    /// Returns the `context` mapping, if present and an object.
    pub fn context(&self) -> Option<&Map<String, Value>> {
        self.fields.get(CONTEXT_KEY).and_then(Value::as_object)
    }

    /// Returns the `context` mapping, creating an empty one if needed.
    pub fn context_mut(&mut self) -> &mut Map<String, Value> {
        self.object_entry(CONTEXT_KEY)
    }

    /// Replaces the `context` mapping (builder pattern).
    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.fields
            .insert(CONTEXT_KEY.to_string(), Value::Object(context));
        self
    }

    /// Returns a top-level field other than `name` and a typed `timestamp`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns a mutable top-level field.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.get_mut(key)
    }

    /// Inserts a top-level field, returning the previous value.
    ///
    /// `name` and `timestamp` are routed to the typed fields: a non-string
    /// name is stored in its JSON text form, and a timestamp string that
    /// cannot be parsed is kept as a plain field.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        match key.as_str() {
            NAME_KEY => {
                let previous = std::mem::replace(&mut self.name, name_from_value(value));
                Some(Value::String(previous))
            }
            TIMESTAMP_KEY => match value.as_str().and_then(parse_timestamp) {
                Some(timestamp) => {
                    let previous = self.timestamp.replace(timestamp);
                    self.fields.remove(TIMESTAMP_KEY);
                    previous.map(|ts| Value::String(format_timestamp(&ts)))
                }
                None => {
                    self.timestamp = None;
                    self.fields.insert(key, value)
                }
            },
            _ => self.fields.insert(key, value),
        }
    }

    /// Inserts a top-level field (builder pattern).
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Removes a top-level field. The name cannot be removed.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        if key == TIMESTAMP_KEY
            && let Some(timestamp) = self.timestamp.take()
        {
            return Some(Value::String(format_timestamp(&timestamp)));
        }
        self.fields.remove(key)
    }

    /// Returns `true` if the event has the given top-level field.
    pub fn contains_key(&self, key: &str) -> bool {
        key == NAME_KEY
            || (key == TIMESTAMP_KEY && self.timestamp.is_some())
            || self.fields.contains_key(key)
    }

    /// Iterates over every top-level field other than `name` and a typed
    /// `timestamp`.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    fn object_entry(&mut self, key: &str) -> &mut Map<String, Value> {
        let slot = self
            .fields
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(map) => map,
            _ => unreachable!("slot was just made an object"),
        }
    }
}

fn normalize_name(name: String) -> String {
    if name.is_empty() {
        UNKNOWN_EVENT_NAME.to_string()
    } else {
        name
    }
}

fn name_from_value(value: Value) -> String {
    match value {
        Value::String(name) => normalize_name(name),
        Value::Null => UNKNOWN_EVENT_NAME.to_string(),
        other => other.to_string(),
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(NAME_KEY, &self.name)?;
        if let Some(timestamp) = &self.timestamp {
            map.serialize_entry(TIMESTAMP_KEY, &format_timestamp(timestamp))?;
        }
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::deserialize(deserializer).map(Self::from_map)
    }
}

impl From<Map<String, Value>> for Event {
    fn from(map: Map<String, Value>) -> Self {
        Self::from_map(map)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("timestamp", &self.timestamp)
            .field("fields", &self.fields)
            .finish()
    }
}
