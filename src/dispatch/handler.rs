//! Request dispatcher
//!
//! Each invocation opens one session, runs at most one operation and closes
//! the session before the envelope is built. Errors never leave the handler;
//! they become envelopes.

use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::ingest::unwrap_gateway_event;
use super::request::{Operation, Plan};
use super::response::{gateway_headers, Envelope, Outcome};
use super::routes;
use crate::config::Variant;
use crate::db::convert::{document_to_json, id_to_string};
use crate::db::{Connector, DocumentStore, Session};
use crate::types::{DispatchError, Result};

/// Translates request events into collection operations
#[derive(Clone)]
pub struct Dispatcher {
    connector: Arc<dyn Connector>,
}

impl Dispatcher {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Handle one event with the given ingestion variant
    pub async fn handle(&self, variant: Variant, event: Value) -> Envelope {
        match variant {
            Variant::Direct => self.handle_direct(event).await,
            Variant::Gateway => self.handle_gateway(event).await,
            Variant::Proxy => routes::handle_proxy(self, event).await,
        }
    }

    /// Direct variant: the event is the request payload
    ///
    /// `find` answers with a bare array and no headers are attached.
    pub async fn handle_direct(&self, event: Value) -> Envelope {
        match self.run(Plan::from_payload(event)).await {
            Ok(outcome) => Envelope::json(200, &outcome.into_body()),
            Err(e) => failure(e),
        }
    }

    /// API-gateway variant: the payload may be JSON text in `body`
    ///
    /// A malformed body is rejected before the database is touched. Every
    /// response carries the CORS and content-type headers.
    pub async fn handle_gateway(&self, event: Value) -> Envelope {
        let envelope = match unwrap_gateway_event(event) {
            Err(e) => failure(e),
            Ok(payload) => match self.run(Plan::from_payload(payload)).await {
                Ok(outcome) => Envelope::json(200, &outcome.into_wrapped_body()),
                Err(e) => failure(e),
            },
        };
        envelope.with_headers(gateway_headers())
    }

    /// Open a session, execute the plan and always close the session
    ///
    /// The session is opened even when the plan could not be built so that
    /// every dispatched request costs exactly one open and one close. A
    /// panicking store is reported as a failure after the session is closed.
    pub async fn run(&self, plan: Result<Plan>) -> Result<Outcome> {
        let session = self.open().await?;

        let outcome = match plan {
            Ok(Plan::Execute(operation)) => guarded(execute(session.store(), operation)).await,
            Ok(Plan::InvalidAction) => {
                info!("Rejected request with unsupported action");
                Ok(Outcome::InvalidAction)
            }
            Err(e) => Err(e),
        };

        session.close().await;
        outcome
    }

    /// Open a session for the configured database
    pub async fn open(&self) -> Result<Session> {
        let session = self.connector.connect().await?;
        debug!("Session opened");
        Ok(session)
    }
}

/// Run one operation against the store
pub async fn execute(store: &dyn DocumentStore, operation: Operation) -> Result<Outcome> {
    let action = operation.action();
    info!(%action, "Dispatching operation");

    let outcome = match operation {
        Operation::Insert { document } => {
            let id = store.insert_one(document.clone()).await?;
            Outcome::Inserted {
                id: id_to_string(&id),
                document,
            }
        }
        Operation::Find { filter } => {
            let documents = store.find(filter).await?;
            debug!(%action, count = documents.len(), "Documents found");
            Outcome::Found(documents.into_iter().map(document_to_json).collect())
        }
        Operation::Update { filter, update } => Outcome::Modified(store.update_many(filter, update).await?),
        Operation::Delete { filter } => Outcome::Deleted(store.delete_many(filter).await?),
    };

    Ok(outcome)
}

/// Await a store call, turning a panic into an internal error
pub(crate) async fn guarded<T>(future: impl Future<Output = Result<T>>) -> Result<T> {
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown cause".to_string());
            Err(DispatchError::Internal(format!("operation panicked: {}", reason)))
        }
    }
}

/// Fold an error into `{"error": message}` with its status
pub(crate) fn failure(err: DispatchError) -> Envelope {
    let (status, message) = err.into_status_code_and_message();
    if status.is_server_error() {
        error!("Request failed: {}", message);
    }
    Envelope::error(status.as_u16(), &message)
}
