//! Client
//!
//! Blocking client for the JSON protocol. The server closes the connection
//! after every response, so each request uses a fresh connection; a
//! subscription keeps its connection for as long as it lives.

use std::collections::{BTreeMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::{RelayError, Result};
use crate::protocol::{
    write_message, Action, JsonStreamReader, ACTION_KEY, ERROR_KEY, ID_KEY, UUID_KEY,
};

/// Stable client identity for this machine
///
/// A v5 uuid over `/etc/machine-id`, falling back to the hostname, so
/// repeated runs on one host subscribe under the same uuid.
pub fn machine_uuid() -> String {
    let seed = std::fs::read_to_string("/etc/machine-id")
        .ok()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .or_else(|| whoami::fallible::hostname().ok())
        .unwrap_or_else(|| "localhost".to_string());

    Uuid::new_v5(&Uuid::NAMESPACE_DNS, seed.as_bytes()).to_string()
}

/// Whether a message answers a request (as opposed to a pushed notification)
fn is_reply(message: &Value) -> bool {
    message.get("status").is_some() || message.get(ERROR_KEY).is_some()
}

/// Build a request object
pub fn build_request(
    uuid: &str,
    action: Action,
    id: Option<&str>,
    fields: &BTreeMap<String, String>,
) -> Value {
    let mut object = Map::new();
    object.insert(UUID_KEY.to_string(), Value::from(uuid));
    object.insert(ACTION_KEY.to_string(), Value::from(action.as_str()));
    if let Some(id) = id {
        object.insert(ID_KEY.to_string(), Value::from(id));
    }
    for (name, value) in fields {
        object.insert(name.clone(), Value::from(value.as_str()));
    }
    Value::Object(object)
}

/// Connection settings and identity for talking to a server
#[derive(Debug, Clone)]
pub struct Client {
    addr: String,
    uuid: String,
    timeout: Option<Duration>,
}

impl Client {
    pub fn new(addr: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            uuid: uuid.into(),
            timeout: None,
        }
    }

    /// Read/write timeout for one-shot requests
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    fn connect(&self) -> Result<TcpStream> {
        let stream = TcpStream::connect(&self.addr)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.timeout)?;
        stream.set_write_timeout(self.timeout)?;
        Ok(stream)
    }

    /// Send one request and wait for its response
    pub fn request(&self, request: &Value) -> Result<Value> {
        let mut stream = self.connect()?;
        write_message(&mut stream, request)?;

        let mut reader = JsonStreamReader::new(stream);
        reader.next_message()?.ok_or_else(|| {
            RelayError::Protocol("server closed the connection without a response".to_string())
        })
    }

    pub fn get(&self, id: &str) -> Result<Value> {
        self.request(&build_request(&self.uuid, Action::Get, Some(id), &BTreeMap::new()))
    }

    pub fn list(&self) -> Result<Value> {
        self.request(&build_request(&self.uuid, Action::List, None, &BTreeMap::new()))
    }

    pub fn set(&self, id: &str, fields: &BTreeMap<String, String>) -> Result<Value> {
        self.request(&build_request(&self.uuid, Action::Set, Some(id), fields))
    }

    /// Open a subscription and wait for the server's confirmation
    pub fn subscribe(&self) -> Result<Subscription> {
        let mut stream = self.connect()?;
        write_message(
            &mut stream,
            &build_request(&self.uuid, Action::Subscribe, None, &BTreeMap::new()),
        )?;

        let writer = stream.try_clone()?;
        let mut reader = JsonStreamReader::new(stream);

        // The server registers before it confirms, so a notification may come first
        let mut pending = VecDeque::new();
        let confirmation = loop {
            let message = reader.next_message()?.ok_or_else(|| {
                RelayError::Protocol("server closed the connection before confirming".to_string())
            })?;
            if is_reply(&message) {
                break message;
            }
            pending.push_back(message);
        };

        // Notifications may be far apart
        reader.get_ref().set_read_timeout(None)?;

        Ok(Subscription {
            writer,
            reader,
            uuid: self.uuid.clone(),
            confirmation,
            pending,
        })
    }

    /// Stay subscribed, reconnecting after `retry` whenever the link drops
    ///
    /// `on_event` sees every confirmation, notification and disconnect;
    /// returning `false` ends the watch. Ends with the server's reply to
    /// `unsubscribe`, or `None` if it stopped while disconnected.
    pub fn watch<F>(&self, retry: Duration, mut on_event: F) -> Result<Option<Value>>
    where
        F: FnMut(WatchEvent<'_>) -> Result<bool>,
    {
        loop {
            let mut subscription = match self.subscribe() {
                Ok(subscription) => subscription,
                Err(e) => {
                    tracing::warn!("Subscribe to {} failed: {}. Retrying in {:?}", self.addr, e, retry);
                    thread::sleep(retry);
                    continue;
                }
            };

            if !on_event(WatchEvent::Subscribed(subscription.confirmation()))? {
                return subscription.unsubscribe().map(Some);
            }

            loop {
                match subscription.next_message() {
                    Ok(Some(message)) => {
                        if !on_event(WatchEvent::Notification(&message))? {
                            return subscription.unsubscribe().map(Some);
                        }
                    }
                    Ok(None) => {
                        tracing::warn!("Server {} closed the subscription", self.addr);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Lost subscription to {}: {}", self.addr, e);
                        break;
                    }
                }
            }

            if !on_event(WatchEvent::Disconnected)? {
                return Ok(None);
            }
            thread::sleep(retry);
        }
    }
}

/// What `Client::watch` reports to its callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WatchEvent<'a> {
    /// (Re)subscribed; carries the server's confirmation
    Subscribed(&'a Value),

    /// A pushed change notification
    Notification(&'a Value),

    /// The connection dropped; a reconnect follows after the retry interval
    Disconnected,
}

/// A live subscription
pub struct Subscription {
    writer: TcpStream,
    reader: JsonStreamReader<TcpStream>,
    uuid: String,
    confirmation: Value,

    /// Notifications that arrived ahead of the confirmation
    pending: VecDeque<Value>,
}

impl Subscription {
    /// The server's reply to `subscribe`
    pub fn confirmation(&self) -> &Value {
        &self.confirmation
    }

    /// Next message pushed by the server, `None` once it closes the connection
    pub fn next_message(&mut self) -> Result<Option<Value>> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(Some(message));
        }
        self.reader.next_message()
    }

    /// Bound how long `next_message` may block
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }

    /// Send an arbitrary message on the subscribed connection
    pub fn send(&mut self, message: &Value) -> Result<()> {
        write_message(&mut self.writer, message)
    }

    /// Unsubscribe and return the server's reply
    ///
    /// Notifications that arrive before the reply are skipped.
    pub fn unsubscribe(mut self) -> Result<Value> {
        let request = build_request(&self.uuid, Action::Unsubscribe, None, &BTreeMap::new());
        self.send(&request)?;

        loop {
            let message = self.reader.next_message()?.ok_or_else(|| {
                RelayError::Protocol("server closed the connection before replying".to_string())
            })?;
            if is_reply(&message) {
                return Ok(message);
            }
        }
    }

    /// Drop the connection without unsubscribing
    pub fn close(self) {
        let _ = self.writer.shutdown(Shutdown::Both);
    }
}

/// Appends watched messages to a file as pretty-printed JSON objects
pub struct NotificationLog {
    path: PathBuf,
    file: File,
}

impl NotificationLog {
    /// Open `path` for appending, creating it if needed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a subscription confirmation (numbered 0)
    pub fn append_confirmation(&mut self, message: &Value) -> Result<()> {
        self.write_entry(0, "subscription_confirmation", message)
    }

    /// Record the `number`th notification of this watch
    pub fn append_notification(&mut self, number: u64, message: &Value) -> Result<()> {
        self.write_entry(number, "data_update", message)
    }

    fn write_entry(&mut self, number: u64, kind: &str, message: &Value) -> Result<()> {
        let entry = json!({
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "notification_number": number,
            "type": kind,
            "data": message,
        });

        let mut bytes = serde_json::to_vec_pretty(&entry)?;
        bytes.push(b'\n');
        self.file.write_all(&bytes)?;
        self.file.flush()?;
        Ok(())
    }
}
