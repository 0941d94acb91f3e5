//! # RelayKV
//!
//! A JSON-over-TCP record store that pushes change notifications to
//! subscribed clients:
//! - One request per connection, framed by JSON parse success
//! - Create-or-merge record writes with canonical default fields
//! - Audit entry for every handled action
//! - Subscriber registry with best-effort, self-healing fan-out
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │              (one thread per connection)                     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Engine                                 │
//! │        (get / list / set / subscribe / unsubscribe)          │
//! └──────┬──────────────────────┬─────────────────────┬─────────┘
//!        │                      │                     │
//!        ▼                      ▼                     ▼
//!  ┌───────────┐         ┌─────────────┐      ┌──────────────┐
//!  │ Audit Log │         │ Repository  │      │  Subscriber  │
//!  │ (append)  │         │ (get/put)   │      │   Registry   │
//!  └───────────┘         └─────────────┘      └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod store;
pub mod audit;
pub mod session;
pub mod notify;
pub mod protocol;
pub mod engine;
pub mod network;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{RelayError, Result};
pub use config::Config;
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of RelayKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
