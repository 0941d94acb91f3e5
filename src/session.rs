//! Session identifiers
//!
//! Every accepted connection gets a fresh random id used to correlate its
//! audit entries.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier scoped to one connection's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        SessionId(s.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issues session ids (uuid v4)
#[derive(Debug, Default)]
pub struct SessionIdGenerator {
    issued: AtomicU64,
}

impl SessionIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a new unique session id
    pub fn generate(&self) -> SessionId {
        self.issued.fetch_add(1, Ordering::Relaxed);
        SessionId(Uuid::new_v4().to_string())
    }

    /// How many ids have been handed out
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}
