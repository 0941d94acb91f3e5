//! Response definitions
//!
//! Represents responses and push notifications sent to clients.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use crate::store::Record;

/// Key of every failure payload
pub const ERROR_KEY: &str = "Error";

/// Outcome of a subscribe/unsubscribe request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Subscribed,
    Unsubscribed,
    NotFound,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Subscribed => "subscribed",
            SubscriptionStatus::Unsubscribed => "unsubscribed",
            SubscriptionStatus::NotFound => "not_found",
        }
    }
}

/// A response to send to client
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// A record's fields (get/set)
    Record(Record),

    /// Every record (list)
    List(Vec<Record>),

    /// Subscribe/unsubscribe acknowledgement
    Subscription {
        status: SubscriptionStatus,
        uuid: String,
        message: String,
    },

    /// `{"Error": message}`
    Error(String),
}

impl Response {
    /// Create an error response
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error(message.into())
    }

    /// Create an error response for an unexpected internal failure
    pub fn server_error(message: impl std::fmt::Display) -> Self {
        Response::Error(format!("server error: {}", message))
    }

    pub fn subscription(
        status: SubscriptionStatus,
        uuid: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Response::Subscription {
            status,
            uuid: uuid.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    /// JSON form written to the socket
    pub fn to_json(&self) -> Value {
        match self {
            Response::Record(record) => record.to_json(),
            Response::List(records) => json!({
                "records": records.iter().map(Record::to_json).collect::<Vec<_>>(),
                "count": records.len(),
            }),
            Response::Subscription {
                status,
                uuid,
                message,
            } => json!({
                "status": status.as_str(),
                "uuid": uuid,
                "message": message,
            }),
            Response::Error(message) => {
                let mut map = Map::with_capacity(1);
                map.insert(ERROR_KEY.to_string(), Value::String(message.clone()));
                Value::Object(map)
            }
        }
    }
}

/// Change notification pushed to every subscriber after a successful `set`
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub record: Record,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub const ACTION: &'static str = "update";

    /// Notification for a record written just now
    pub fn update(record: Record) -> Self {
        Self {
            record,
            timestamp: Utc::now(),
        }
    }

    /// `{"action": "update", "record": {...}, "timestamp": "<ISO-8601>"}`
    pub fn to_json(&self) -> Value {
        json!({
            "action": Self::ACTION,
            "record": self.record.to_json(),
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
        })
    }
}
