//! Notify Module
//!
//! Push notifications to subscribed clients.
//!
//! ## Responsibilities
//! - Track subscriber registrations (duplicates per client uuid allowed)
//! - Fan a notification out to every active subscriber
//! - Drop subscribers whose delivery fails, without failing the writer
//!
//! ## Ownership
//! The registry owns every subscriber. A socket subscriber shares its
//! connection's write half with the connection handler until either side
//! closes it.

mod subscriber;
mod registry;

pub use subscriber::{SharedWriter, SocketSubscriber, Subscriber};
pub use registry::{NotifyReport, SubscriberHandle, SubscriberRegistry};
