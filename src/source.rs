//! Deal sources: where the query layer gets its documents from.

use crate::db::{list_documents, DocumentList, COLLECTION_DEALS};
use crate::errors::FetchError;
use async_trait::async_trait;
use rusqlite::Connection;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Abstraction over the deal store for testability.
/// Real implementation: `SqliteDealSource`. In-memory: `StaticDealSource`.
#[async_trait]
pub trait DealSource: Send + Sync + 'static {
    /// List the raw deal documents. Decoding into deals happens downstream.
    async fn fetch_deals(&self) -> Result<DocumentList, FetchError>;
}

/// Lists a collection of the local document store.
pub struct SqliteDealSource {
    conn: Arc<Mutex<Connection>>,
    collection: String,
}

impl SqliteDealSource {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self::with_collection(conn, COLLECTION_DEALS)
    }

    pub fn with_collection(conn: Arc<Mutex<Connection>>, collection: impl Into<String>) -> Self {
        Self {
            conn,
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl DealSource for SqliteDealSource {
    async fn fetch_deals(&self) -> Result<DocumentList, FetchError> {
        let conn = Arc::clone(&self.conn);
        let collection = self.collection.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| FetchError::Unavailable("database lock poisoned".to_string()))?;
            list_documents(&conn, &collection).map_err(|err| FetchError::Store(format!("{:#}", err)))
        })
        .await
        .map_err(|err| FetchError::Task(err.to_string()))?
    }
}

/// Serves a fixed set of documents.
#[derive(Debug, Clone, Default)]
pub struct StaticDealSource {
    documents: Vec<Value>,
}

impl StaticDealSource {
    pub fn new(documents: Vec<Value>) -> Self {
        Self { documents }
    }

    pub fn from_deals(deals: &[crate::deal::Deal]) -> Self {
        Self::new(deals.iter().map(|deal| deal.to_document()).collect())
    }
}

#[async_trait]
impl DealSource for StaticDealSource {
    async fn fetch_deals(&self) -> Result<DocumentList, FetchError> {
        Ok(DocumentList {
            total: self.documents.len(),
            documents: self.documents.clone(),
        })
    }
}
