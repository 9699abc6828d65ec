//! Document database access
//!
//! A `Connector` opens one `Session` per invocation. The session owns the
//! store handle and is consumed by `close`, so a handle can only be released
//! once.

pub mod convert;
pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use bson::{Bson, Document};
use mongodb::options::UpdateModifications;
use tracing::debug;

use crate::types::Result;

pub use memory::MemoryConnector;
pub use mongo::MongoConnector;

/// Modification passed through to `update_many`
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateSpec {
    /// Update operator document such as `{"$set": {...}}`
    Modifiers(Document),
    /// Aggregation pipeline stages
    Pipeline(Vec<Document>),
}

impl From<UpdateSpec> for UpdateModifications {
    fn from(update: UpdateSpec) -> Self {
        match update {
            UpdateSpec::Modifiers(doc) => UpdateModifications::Document(doc),
            UpdateSpec::Pipeline(stages) => UpdateModifications::Pipeline(stages),
        }
    }
}

/// Counts reported by `update_many`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateCounts {
    pub matched: u64,
    pub modified: u64,
}

/// Operations over the single target collection
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert one document, returning the identifier the database assigned
    async fn insert_one(&self, document: Document) -> Result<Bson>;

    /// All documents matching the filter
    async fn find(&self, filter: Document) -> Result<Vec<Document>>;

    /// Update every matching document
    async fn update_many(&self, filter: Document, update: UpdateSpec) -> Result<UpdateCounts>;

    /// Delete every matching document, returning how many were deleted
    async fn delete_many(&self, filter: Document) -> Result<u64>;

    /// Round-trip to the database without touching documents
    async fn ping(&self) -> Result<()>;

    /// Release the underlying connection
    async fn close(&self);
}

/// Opens a store handle for one invocation
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Session>;
}

/// A store handle scoped to one invocation
pub struct Session {
    store: Box<dyn DocumentStore>,
}

impl Session {
    pub fn new(store: Box<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Release the handle
    pub async fn close(self) {
        self.store.close().await;
        debug!("Session closed");
    }
}
