//! Protocol Module
//!
//! Defines the JSON wire protocol for client-server communication.
//!
//! ## Request Format
//! ```text
//! {"ACTION": "set", "UUID": "<client>", "ID": "<record>", "<field>": "<value>", ...}
//! ```
//!
//! ### Actions (case-insensitive)
//! - get:         requires ID
//! - list:        no fields
//! - set:         requires ID, every other key is record data
//! - subscribe:   keeps the connection open for notifications
//! - unsubscribe: drops the client's subscription
//!
//! ## Response Format
//! - get/set:               the record's fields, `{"id": ..., ...}`
//! - list:                  `{"records": [...], "count": N}`
//! - subscribe/unsubscribe: `{"status": ..., "uuid": ..., "message": ...}`
//! - any failure:           `{"Error": "<message>"}`
//!
//! ## Notification Format
//! `{"action": "update", "record": {...}, "timestamp": "<ISO-8601>"}`

mod request;
mod response;
mod codec;

pub use request::{
    action_name, Action, Request, RequestError, ACTION_KEY, ID_KEY, UNKNOWN_CLIENT, UUID_KEY,
};
pub use response::{Notification, Response, SubscriptionStatus, ERROR_KEY};
pub use codec::{
    read_message, try_parse, write_message, JsonStreamReader, MessageBuffer, DEFAULT_CHUNK_SIZE,
};
