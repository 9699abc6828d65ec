//! MongoDB connector and collection handle
//!
//! A new driver client is built for every session and shut down when the
//! session closes; nothing is cached between invocations.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::{Client, Collection};
use tracing::debug;

use super::{Connector, DocumentStore, Session, UpdateCounts, UpdateSpec};
use crate::config::Target;
use crate::types::{DispatchError, Result};

/// Opens MongoDB sessions against the fixed database and collection
#[derive(Debug, Clone)]
pub struct MongoConnector {
    target: Target,
}

impl MongoConnector {
    pub fn new(target: Target) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self) -> Result<Session> {
        debug!("Connecting to MongoDB at {}:{}", self.target.host, self.target.port);

        let client = Client::with_uri_str(self.target.uri())
            .await
            .map_err(|e| DispatchError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        let db = client.database(&self.target.database);
        let collection = db.collection::<Document>(&self.target.collection);

        Ok(Session::new(Box::new(MongoStore {
            client,
            database: self.target.database.clone(),
            collection,
        })))
    }
}

/// Collection handle for one session
pub struct MongoStore {
    client: Client,
    database: String,
    collection: Collection<Document>,
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn insert_one(&self, document: Document) -> Result<Bson> {
        let result = self
            .collection
            .insert_one(document)
            .await
            .map_err(|e| DispatchError::Database(format!("Insert failed: {}", e)))?;

        Ok(result.inserted_id)
    }

    async fn find(&self, filter: Document) -> Result<Vec<Document>> {
        let cursor = self
            .collection
            .find(filter)
            .await
            .map_err(|e| DispatchError::Database(format!("Find failed: {}", e)))?;

        cursor
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| DispatchError::Database(format!("Error reading documents: {}", e)))
    }

    async fn update_many(&self, filter: Document, update: UpdateSpec) -> Result<UpdateCounts> {
        let result = self
            .collection
            .update_many(filter, update)
            .await
            .map_err(|e| DispatchError::Database(format!("Update failed: {}", e)))?;

        Ok(UpdateCounts {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete_many(&self, filter: Document) -> Result<u64> {
        let result = self
            .collection
            .delete_many(filter)
            .await
            .map_err(|e| DispatchError::Database(format!("Delete failed: {}", e)))?;

        Ok(result.deleted_count)
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| DispatchError::Database(format!("MongoDB ping failed: {}", e)))?;
        Ok(())
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
        debug!("MongoDB client shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Operations need a running MongoDB instance; only construction is covered here.

    #[test]
    fn test_connector_keeps_target() {
        let connector = MongoConnector::new(Target::new("mongo.local"));
        assert_eq!(connector.target().host, "mongo.local");
        assert_eq!(connector.target().collection, "testcol");
    }
}
