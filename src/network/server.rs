//! TCP Server
//!
//! Accepts connections and hands each one to its own thread.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{RelayError, Result};
use crate::session::SessionIdGenerator;

use super::connection::{Connection, ConnectionSettings};

/// How long the acceptor sleeps when no connection is pending
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Cloneable switch that stops a running server
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Stop accepting and release subscribed connections
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// TCP server for RelayKV
///
/// One thread per accepted connection, with no cap; the acceptor never
/// waits on per-connection work.
pub struct Server {
    listener: TcpListener,
    engine: Arc<Engine>,
    sessions: SessionIdGenerator,
    settings: ConnectionSettings,
    shutdown: ShutdownHandle,
}

impl Server {
    /// Bind the configured address
    ///
    /// An address already held by another listener is fatal
    /// (`RelayError::AddressInUse`); there is no fallback port.
    pub fn bind(config: &Config, engine: Arc<Engine>) -> Result<Self> {
        // std sets SO_REUSEADDR on Unix, so a restart does not wait out TIME_WAIT
        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| match e.kind() {
            ErrorKind::AddrInUse => RelayError::AddressInUse(config.listen_addr.clone()),
            _ => RelayError::Io(e),
        })?;

        // Non-blocking accept so the loop can observe shutdown
        listener.set_nonblocking(true)?;

        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            engine,
            sessions: SessionIdGenerator::new(),
            settings: ConnectionSettings::from_config(config),
            shutdown: ShutdownHandle::default(),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle that can stop this server from another thread
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Signal the server to shutdown
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    /// Accept connections until shutdown (blocking)
    pub fn run(&self) -> Result<()> {
        while !self.shutdown.is_shutdown() {
            let (stream, addr) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                    continue;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("Accept error: {}", e);
                    continue;
                }
            };

            // Accepted sockets may inherit non-blocking mode on some platforms
            if let Err(e) = stream.set_nonblocking(false) {
                tracing::warn!("Dropping connection from {}: {}", addr, e);
                continue;
            }

            let session = self.sessions.generate();
            tracing::debug!("New connection from {} - session {}", addr, session);

            let engine = Arc::clone(&self.engine);
            let settings = self.settings;
            let shutdown = Arc::clone(&self.shutdown.flag);

            let spawned = thread::Builder::new()
                .name(format!("relaykv-conn-{}", self.sessions.issued()))
                .spawn(move || {
                    let mut connection = match Connection::new(stream, engine, session, settings, shutdown) {
                        Ok(connection) => connection,
                        Err(e) => {
                            tracing::warn!("Failed to set up connection from {}: {}", addr, e);
                            return;
                        }
                    };
                    if let Err(e) = connection.handle() {
                        tracing::warn!("Connection {} ended with error: {}", addr, e);
                    }
                });

            if let Err(e) = spawned {
                tracing::error!("Failed to spawn handler for {}: {}", addr, e);
            }
        }

        tracing::info!("Server stopped accepting connections");
        Ok(())
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Number of sessions issued so far
    pub fn sessions_issued(&self) -> u64 {
        self.sessions.issued()
    }
}
