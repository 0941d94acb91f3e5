//! Engine Module
//!
//! Executes decoded requests against the repository, the audit log and the
//! subscriber registry.
//!
//! ## Responsibilities
//! - Validate-then-audit-then-act for every known action
//! - Create-or-merge semantics for `set`
//! - Broadcast a change notification after every successful `set`
//! - Register and drop subscribers

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::audit::{AuditEntry, AuditLog, JournalAuditLog, MemoryAuditLog};
use crate::config::{Config, StorageBackend};
use crate::error::Result;
use crate::notify::{Subscriber, SubscriberHandle, SubscriberRegistry};
use crate::protocol::{Action, Notification, Request, Response, SubscriptionStatus};
use crate::session::SessionId;
use crate::store::{FileRepository, MemoryRepository, Record, Repository};

const SUBSCRIBED_MESSAGE: &str = "Client subscribed successfully. Change notifications will follow.";
const UNSUBSCRIBED_MESSAGE: &str = "Client unsubscribed successfully.";
const NOT_SUBSCRIBED_MESSAGE: &str = "Client not found among subscribers.";

/// What the connection should do after a request
#[derive(Debug)]
pub enum Outcome {
    /// Write the response and close
    Reply(Response),

    /// Write the response and keep listening for `unsubscribe`
    Subscribed {
        handle: SubscriberHandle,
        response: Response,
    },
}

impl Outcome {
    pub fn response(&self) -> &Response {
        match self {
            Outcome::Reply(response) => response,
            Outcome::Subscribed { response, .. } => response,
        }
    }
}

/// The request engine
///
/// Shared by every connection thread; all state it touches is owned by the
/// collaborators, which do their own locking.
pub struct Engine {
    repository: Arc<dyn Repository>,
    audit: Arc<dyn AuditLog>,
    registry: Arc<SubscriberRegistry>,
}

impl Engine {
    /// Assemble an engine from its collaborators
    pub fn new(
        repository: Arc<dyn Repository>,
        audit: Arc<dyn AuditLog>,
        registry: Arc<SubscriberRegistry>,
    ) -> Self {
        Self {
            repository,
            audit,
            registry,
        }
    }

    /// Open the repository and audit log the config selects
    pub fn open(config: &Config) -> Result<Self> {
        let (repository, audit): (Arc<dyn Repository>, Arc<dyn AuditLog>) = match config.storage {
            StorageBackend::Memory => (
                Arc::new(MemoryRepository::new()),
                Arc::new(MemoryAuditLog::new()),
            ),
            StorageBackend::File => (
                Arc::new(FileRepository::open(&config.data_dir, config.sync_strategy)?),
                Arc::new(JournalAuditLog::open(&config.data_dir)?),
            ),
        };

        Ok(Self::new(repository, audit, Arc::new(SubscriberRegistry::new())))
    }

    /// Execute a request
    ///
    /// `attach` builds the subscriber for a `subscribe`; it is not called for
    /// any other action. Errors are unexpected internal failures.
    pub fn execute<F>(&self, request: Request, session: &SessionId, attach: F) -> Result<Outcome>
    where
        F: FnOnce(&str) -> Result<Box<dyn Subscriber>>,
    {
        tracing::debug!("{} requested by {} (session {})", request.action(), request.uuid(), session);

        let outcome = match request {
            Request::Get { uuid, id } => Outcome::Reply(self.get(&uuid, &id, session)?),
            Request::List { uuid } => Outcome::Reply(self.list(&uuid, session)?),
            Request::Set { uuid, id, fields } => {
                Outcome::Reply(self.set(&uuid, &id, fields, session)?)
            }
            Request::Subscribe { uuid } => {
                let (handle, response) = self.subscribe(&uuid, session, attach)?;
                Outcome::Subscribed { handle, response }
            }
            Request::Unsubscribe { uuid } => Outcome::Reply(self.unsubscribe(&uuid, session, None)),
        };

        Ok(outcome)
    }

    /// Fetch one record
    pub fn get(&self, uuid: &str, id: &str, session: &SessionId) -> Result<Response> {
        self.record_audit(AuditEntry::new(uuid, session, Action::Get.as_str()).with_record_id(id));

        match self.repository.get(id)? {
            Some(record) => Ok(Response::Record(record)),
            None => {
                tracing::debug!("Record {} not found", id);
                Ok(Response::error(format!("record with ID '{}' not found", id)))
            }
        }
    }

    /// Fetch every record
    pub fn list(&self, uuid: &str, session: &SessionId) -> Result<Response> {
        self.record_audit(AuditEntry::new(uuid, session, Action::List.as_str()));

        let records = self.repository.list()?;
        tracing::debug!("Listing {} records", records.len());
        Ok(Response::List(records))
    }

    /// Create or merge a record, then notify subscribers
    ///
    /// The result depends only on the repository write; how many
    /// subscribers received the push does not matter.
    pub fn set(
        &self,
        uuid: &str,
        id: &str,
        fields: BTreeMap<String, String>,
        session: &SessionId,
    ) -> Result<Response> {
        self.record_audit(
            AuditEntry::new(uuid, session, Action::Set.as_str())
                .with_record_id(id)
                .with_data(&fields),
        );

        let record = match self.repository.get(id)? {
            Some(mut existing) => {
                existing.merge(fields);
                existing
            }
            None => Record::create(id, fields),
        };

        if let Err(e) = self.repository.put(&record) {
            tracing::error!("Failed to save record {}: {}", id, e);
            return Ok(Response::error(format!("could not save record with ID '{}'", id)));
        }

        tracing::debug!("Record {} saved", id);
        let notification = Notification::update(record.clone());
        self.registry.notify_all(&notification.to_json());

        Ok(Response::Record(record))
    }

    /// Register a subscriber built by `attach`
    pub fn subscribe<F>(
        &self,
        uuid: &str,
        session: &SessionId,
        attach: F,
    ) -> Result<(SubscriberHandle, Response)>
    where
        F: FnOnce(&str) -> Result<Box<dyn Subscriber>>,
    {
        self.record_audit(AuditEntry::new(uuid, session, Action::Subscribe.as_str()));

        let subscriber = attach(uuid)?;
        let handle = self.registry.subscribe(subscriber);
        let response = Response::subscription(SubscriptionStatus::Subscribed, uuid, SUBSCRIBED_MESSAGE);
        Ok((handle, response))
    }

    /// Drop one of `uuid`'s registrations, preferring `own` when given
    pub fn unsubscribe(
        &self,
        uuid: &str,
        session: &SessionId,
        own: Option<&SubscriberHandle>,
    ) -> Response {
        self.record_audit(AuditEntry::new(uuid, session, Action::Unsubscribe.as_str()));
        tracing::info!("Client {} requested unsubscribe", uuid);

        match self.registry.unsubscribe_client(uuid, own) {
            Some(_) => Response::subscription(SubscriptionStatus::Unsubscribed, uuid, UNSUBSCRIBED_MESSAGE),
            None => Response::subscription(SubscriptionStatus::NotFound, uuid, NOT_SUBSCRIBED_MESSAGE),
        }
    }

    /// Drop a registration without a client request (connection gone)
    pub fn detach(&self, handle: &SubscriberHandle) -> bool {
        self.registry.unsubscribe(handle)
    }

    fn record_audit(&self, entry: AuditEntry) {
        if let Err(e) = self.audit.append(&entry) {
            tracing::error!("Failed to record audit entry for {}: {}", entry.action, e);
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn audit(&self) -> &Arc<dyn AuditLog> {
        &self.audit
    }
}
