//! Bus events

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::Context;

/// Payload with a fixed event type
pub trait EventData: Serialize + Clone + Send + Sync + 'static {
    fn event_type() -> &'static str;
}

/// Name an event is fired and subscribed under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(Cow<'static, str>);

impl EventType {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for EventType {
    fn from(s: &'static str) -> Self {
        Self(Cow::Borrowed(s))
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        Self(Cow::Owned(s))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An event as delivered to listeners; the payload is plain JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub data: serde_json::Value,
    pub time_fired: DateTime<Utc>,
    pub context: Context,
}

impl Event {
    pub fn new(event_type: impl Into<EventType>, data: serde_json::Value, context: Context) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            time_fired: Utc::now(),
            context,
        }
    }

    /// Serialize a typed payload under its own event type
    pub fn typed<T: EventData>(data: &T, context: Context) -> serde_json::Result<Self> {
        Ok(Self::new(T::event_type(), serde_json::to_value(data)?, context))
    }

    /// Decode the payload back into its typed form
    pub fn decode<T: EventData + DeserializeOwned>(&self) -> Option<T> {
        if self.event_type.as_str() != T::event_type() {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }
}
