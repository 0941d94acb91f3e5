//! Subscriber capability and its socket-backed implementation

use std::io::{self, ErrorKind, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// Write half of a connection, shared between its handler and the registry
///
/// Every write to a subscribed connection goes through this mutex, so a
/// notification never interleaves with a response.
pub type SharedWriter = Arc<Mutex<TcpStream>>;

/// Something that can receive change notifications
pub trait Subscriber: Send {
    /// Identity the client subscribed with
    fn client_uuid(&self) -> &str;

    /// Write one serialized notification
    ///
    /// An error means this subscriber is gone; the registry drops it.
    fn deliver(&mut self, message: &[u8]) -> io::Result<()>;

    fn is_active(&self) -> bool;

    /// Release this subscriber's share of the connection
    fn close(&mut self);
}

/// Subscriber writing to a live TCP connection
pub struct SocketSubscriber {
    writer: Option<SharedWriter>,
    uuid: String,
    active: bool,
}

impl SocketSubscriber {
    /// Wrap a connection, applying `write_timeout` as the delivery deadline
    pub fn new(writer: SharedWriter, uuid: impl Into<String>, write_timeout: Duration) -> io::Result<Self> {
        if !write_timeout.is_zero() {
            writer.lock().set_write_timeout(Some(write_timeout))?;
        }

        Ok(Self {
            writer: Some(writer),
            uuid: uuid.into(),
            active: true,
        })
    }
}

impl Subscriber for SocketSubscriber {
    fn client_uuid(&self) -> &str {
        &self.uuid
    }

    fn deliver(&mut self, message: &[u8]) -> io::Result<()> {
        let writer = match (&self.writer, self.active) {
            (Some(writer), true) => writer,
            _ => return Err(io::Error::new(ErrorKind::NotConnected, "subscriber closed")),
        };

        let mut stream = writer.lock();
        let result = stream.write_all(message).and_then(|_| stream.flush());

        if result.is_err() {
            self.active = false;
            // Wakes the handler's listening loop so it stops waiting on a dead peer
            let _ = stream.shutdown(Shutdown::Both);
        }
        result
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn close(&mut self) {
        self.active = false;
        self.writer = None;
    }
}
