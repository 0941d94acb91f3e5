//! Request definitions
//!
//! Decodes a parsed JSON message into a typed request.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::store::{field_text, ID_FIELD};

/// Control keys of a request object; everything else in a `set` is record data
pub const ACTION_KEY: &str = "ACTION";
pub const UUID_KEY: &str = "UUID";
pub const ID_KEY: &str = "ID";

/// Identity recorded when a request carries no `UUID`
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Known actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Get,
    List,
    Set,
    Subscribe,
    Unsubscribe,
}

impl Action {
    /// Parse an action name, ignoring case
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "get" => Some(Action::Get),
            "list" => Some(Action::List),
            "set" => Some(Action::Set),
            "subscribe" => Some(Action::Subscribe),
            "unsubscribe" => Some(Action::Unsubscribe),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Get => "get",
            Action::List => "list",
            Action::Set => "set",
            Action::Subscribe => "subscribe",
            Action::Unsubscribe => "unsubscribe",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded client request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Fetch one record
    Get { uuid: String, id: String },

    /// Fetch every record
    List { uuid: String },

    /// Create or merge a record
    Set {
        uuid: String,
        id: String,
        fields: BTreeMap<String, String>,
    },

    /// Register for change notifications
    Subscribe { uuid: String },

    /// Drop a registration
    Unsubscribe { uuid: String },
}

/// Why a message could not be decoded into a request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("invalid request: expected a JSON object")]
    NotAnObject,

    #[error("missing field '{field}' for action '{action}'")]
    MissingField { field: &'static str, action: Action },

    #[error("unknown action: {0}")]
    UnknownAction(String),
}

impl Request {
    /// Decode a parsed JSON message
    pub fn from_value(value: &Value) -> Result<Self, RequestError> {
        let object = value.as_object().ok_or(RequestError::NotAnObject)?;

        let action_name = action_name(object);
        let action = Action::parse(&action_name)
            .ok_or_else(|| RequestError::UnknownAction(action_name.to_ascii_lowercase()))?;

        let uuid = object
            .get(UUID_KEY)
            .filter(|v| !v.is_null())
            .map(field_text)
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());

        let request = match action {
            Action::Get => Request::Get {
                uuid,
                id: required_id(object, action)?,
            },
            Action::List => Request::List { uuid },
            Action::Set => Request::Set {
                uuid,
                id: required_id(object, action)?,
                fields: record_fields(object),
            },
            Action::Subscribe => Request::Subscribe { uuid },
            Action::Unsubscribe => Request::Unsubscribe { uuid },
        };

        Ok(request)
    }

    pub fn action(&self) -> Action {
        match self {
            Request::Get { .. } => Action::Get,
            Request::List { .. } => Action::List,
            Request::Set { .. } => Action::Set,
            Request::Subscribe { .. } => Action::Subscribe,
            Request::Unsubscribe { .. } => Action::Unsubscribe,
        }
    }

    /// Client identity carried by the request
    pub fn uuid(&self) -> &str {
        match self {
            Request::Get { uuid, .. }
            | Request::List { uuid }
            | Request::Set { uuid, .. }
            | Request::Subscribe { uuid }
            | Request::Unsubscribe { uuid } => uuid,
        }
    }
}

/// Raw `ACTION` text, `""` when absent
///
/// Used on its own by the subscribed listener, which only needs the name.
pub fn action_name(object: &Map<String, Value>) -> String {
    match object.get(ACTION_KEY) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn required_id(object: &Map<String, Value>, action: Action) -> Result<String, RequestError> {
    let id = match object.get(ID_KEY) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };

    if id.is_empty() {
        return Err(RequestError::MissingField {
            field: ID_KEY,
            action,
        });
    }
    Ok(id)
}

/// Every key except the control keys; a data key named `id` is dropped
fn record_fields(object: &Map<String, Value>) -> BTreeMap<String, String> {
    object
        .iter()
        .filter(|(key, _)| {
            !matches!(key.as_str(), ACTION_KEY | UUID_KEY | ID_KEY | ID_FIELD)
        })
        .map(|(key, value)| (key.clone(), field_text(value)))
        .collect()
}
