//! Connection Handler
//!
//! Drives one client connection through a single request, or through a
//! subscription until the client unsubscribes or goes away.
//!
//! ```text
//! AwaitingRequest ──(get/list/set/unsubscribe/error)──▶ Closed
//!        │
//!        └──(subscribe)──▶ SubscribedListening ──(unsubscribe/EOF/error)──▶ Closed
//! ```

use std::io::ErrorKind;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use crate::config::Config;
use crate::engine::{Engine, Outcome};
use crate::error::{RelayError, Result};
use crate::notify::{SharedWriter, SocketSubscriber, Subscriber, SubscriberHandle};
use crate::protocol::{
    action_name, read_message, write_message, Action, MessageBuffer, Request, Response,
    UNKNOWN_CLIENT,
};
use crate::session::SessionId;

/// Per-connection socket settings
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Read timeout while subscribed
    pub poll_timeout: Duration,

    /// Write deadline for notifications
    pub notify_write_timeout: Duration,

    /// Size of each socket read
    pub read_buffer_size: usize,

    /// Largest accepted request
    pub max_message_size: usize,
}

impl ConnectionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_timeout: config.poll_timeout(),
            notify_write_timeout: config.notify_write_timeout(),
            read_buffer_size: config.read_buffer_size,
            max_message_size: config.max_message_size,
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Handles a single client connection
pub struct Connection {
    /// Read half (owned exclusively by this handler)
    reader: TcpStream,

    /// Write half, shared with the registry once subscribed
    writer: SharedWriter,

    /// Reference to the request engine
    engine: Arc<Engine>,

    /// Session id issued at accept time
    session: SessionId,

    settings: ConnectionSettings,

    /// Set when the server is shutting down
    shutdown: Arc<AtomicBool>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    pub fn new(
        stream: TcpStream,
        engine: Arc<Engine>,
        session: SessionId,
        settings: ConnectionSettings,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let writer = Arc::new(Mutex::new(stream.try_clone()?));

        Ok(Self {
            reader: stream,
            writer,
            engine,
            session,
            settings,
            shutdown,
            peer_addr,
        })
    }

    /// Handle the connection (blocking until closed)
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!(
            "Connection established from {} (session {})",
            self.peer_addr,
            self.session
        );

        let result = self.serve();
        self.close();
        result
    }

    fn serve(&mut self) -> Result<()> {
        let mut buffer = MessageBuffer::new(self.settings.max_message_size);

        // No read timeout: wait as long as it takes for the first request
        let value = match read_message(&mut self.reader, &mut buffer, self.settings.read_buffer_size) {
            Ok(Some(value)) => value,
            Ok(None) => {
                tracing::debug!("Connection from {} closed without a complete request", self.peer_addr);
                return Ok(());
            }
            Err(RelayError::Protocol(e)) => {
                tracing::warn!("Dropping connection from {}: {}", self.peer_addr, e);
                return Ok(());
            }
            Err(RelayError::Io(ref e)) if is_disconnect(e) => {
                tracing::debug!("Client {} disconnected mid-request: {}", self.peer_addr, e);
                return Ok(());
            }
            Err(e) => {
                tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                return Err(e);
            }
        };

        tracing::trace!("Received request from {}: {}", self.peer_addr, value);

        match self.dispatch(&value) {
            Outcome::Reply(response) => {
                self.send_response(&response);
                Ok(())
            }
            Outcome::Subscribed { handle, response } => {
                if !self.send_response(&response) {
                    self.engine.detach(&handle);
                    return Ok(());
                }
                self.listen(handle)
            }
        }
    }

    /// Decode and execute one request
    fn dispatch(&self, value: &Value) -> Outcome {
        let request = match Request::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!("Rejected request from {}: {}", self.peer_addr, e);
                return Outcome::Reply(Response::error(e.to_string()));
            }
        };

        let writer = Arc::clone(&self.writer);
        let write_timeout = self.settings.notify_write_timeout;
        let attach = move |uuid: &str| -> Result<Box<dyn Subscriber>> {
            Ok(Box::new(SocketSubscriber::new(writer, uuid, write_timeout)?))
        };

        match self.engine.execute(request, &self.session, attach) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Error handling request from {}: {}", self.peer_addr, e);
                Outcome::Reply(Response::server_error(e))
            }
        }
    }

    /// Subscribed-listening state: wait for `unsubscribe`, reject anything else
    fn listen(&mut self, handle: SubscriberHandle) -> Result<()> {
        tracing::debug!("Keeping connection from {} open for notifications", self.peer_addr);

        let poll_timeout = self.settings.poll_timeout.max(Duration::from_millis(1));
        if let Err(e) = self.reader.set_read_timeout(Some(poll_timeout)) {
            self.engine.detach(&handle);
            return Err(e.into());
        }

        let mut buffer = MessageBuffer::new(self.settings.max_message_size);

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                tracing::debug!("Server shutting down, releasing subscriber {}", self.peer_addr);
                break;
            }

            match read_message(&mut self.reader, &mut buffer, self.settings.read_buffer_size) {
                Ok(Some(value)) => {
                    let action = value
                        .as_object()
                        .map(action_name)
                        .unwrap_or_default()
                        .to_ascii_lowercase();
                    tracing::debug!("Action received while subscribed: {}", action);

                    if Action::parse(&action) == Some(Action::Unsubscribe) {
                        let uuid = Request::from_value(&value)
                            .map(|request| request.uuid().to_string())
                            .unwrap_or_else(|_| UNKNOWN_CLIENT.to_string());
                        let response = self.engine.unsubscribe(&uuid, &self.session, Some(&handle));
                        self.send_response(&response);
                        break;
                    }

                    let response = Response::error(format!(
                        "action '{}' not allowed while subscribed",
                        action
                    ));
                    if !self.send_response(&response) {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!("Subscribed client {} closed the connection", self.peer_addr);
                    break;
                }
                Err(RelayError::Io(ref e)) if is_timeout(e) => continue,
                Err(RelayError::Protocol(e)) => {
                    buffer.clear();
                    if !self.send_response(&Response::error(e)) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!("Error listening to subscribed client {}: {}", self.peer_addr, e);
                    break;
                }
            }
        }

        // No-op when the client unsubscribed this handle itself
        self.engine.detach(&handle);
        Ok(())
    }

    /// Write a response; returns whether the write succeeded
    fn send_response(&self, response: &Response) -> bool {
        let mut stream = self.writer.lock();
        match write_message(&mut *stream, &response.to_json()) {
            Ok(()) => true,
            Err(RelayError::Io(ref e)) if is_disconnect(e) => {
                tracing::debug!(
                    "Client {} disconnected before response could be sent: {}",
                    self.peer_addr,
                    e
                );
                false
            }
            Err(e) => {
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                false
            }
        }
    }

    fn close(&self) {
        if let Err(e) = self.reader.shutdown(Shutdown::Both) {
            if e.kind() != ErrorKind::NotConnected {
                tracing::debug!("Error closing connection to {}: {}", self.peer_addr, e);
            }
        }
        tracing::debug!("Connection closed with {}", self.peer_addr);
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }
}

/// Read timeout (Windows reports TimedOut instead of WouldBlock)
fn is_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn is_disconnect(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
            | ErrorKind::NotConnected
    )
}
