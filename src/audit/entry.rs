//! Audit entry definitions

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::SessionId;

/// A single immutable audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry id
    pub id: Uuid,

    /// Identity the client sent in `UUID`
    pub uuid: String,

    /// Session of the connection that carried the request
    pub session: SessionId,

    /// Lower-case action name
    pub action: String,

    /// When the entry was created
    pub timestamp: DateTime<Utc>,

    /// Record the action targeted, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,

    /// Fields supplied with a `set`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<BTreeMap<String, String>>,
}

impl AuditEntry {
    /// Create an entry stamped with a fresh id and the current time
    pub fn new(uuid: impl Into<String>, session: &SessionId, action: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            uuid: uuid.into(),
            session: session.clone(),
            action: action.into(),
            timestamp: Utc::now(),
            record_id: None,
            additional_data: None,
        }
    }

    pub fn with_record_id(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }

    /// Attach the `set` payload; an empty map is left out
    pub fn with_data(mut self, data: &BTreeMap<String, String>) -> Self {
        if !data.is_empty() {
            self.additional_data = Some(data.clone());
        }
        self
    }
}
