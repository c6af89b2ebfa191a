//! In-memory implementations of the persistence ports.
//!
//! The real deployment hands records to long-term storage; the core only
//! relies on get/put-by-key semantics, which these adapters provide.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{ReviewEntry, Transaction};
use crate::ports::{
    RepositoryError, RepositoryResult, ReviewQueue, TransactionRepository,
};

#[derive(Default)]
struct Tables {
    by_id: HashMap<Uuid, Transaction>,
    by_idempotency_key: HashMap<String, Uuid>,
    by_provider_reference: HashMap<String, Uuid>,
}

/// Transaction store backed by hash maps under a single `RwLock`.
#[derive(Clone, Default)]
pub struct InMemoryTransactionRepository {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let mut tables = self.tables.write().await;
        if tables.by_idempotency_key.contains_key(&tx.idempotency_key) {
            return Err(RepositoryError::Conflict(format!(
                "idempotency key already used: {}",
                tx.idempotency_key
            )));
        }
        tables
            .by_idempotency_key
            .insert(tx.idempotency_key.clone(), tx.id);
        tables.by_id.insert(tx.id, tx.clone());
        Ok(tx.clone())
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Transaction> {
        let tables = self.tables.read().await;
        tables
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn update(&self, tx: &Transaction) -> RepositoryResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.by_id.contains_key(&tx.id) {
            return Err(RepositoryError::NotFound(tx.id.to_string()));
        }
        let mut updated = tx.clone();
        updated.updated_at = Utc::now();
        if let Some(reference) = &updated.provider_reference {
            tables
                .by_provider_reference
                .insert(reference.clone(), updated.id);
        }
        tables.by_id.insert(updated.id, updated);
        Ok(())
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_idempotency_key
            .get(key)
            .and_then(|id| tables.by_id.get(id))
            .cloned())
    }

    async fn find_by_provider_reference(
        &self,
        reference: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_provider_reference
            .get(reference)
            .and_then(|id| tables.by_id.get(id))
            .cloned())
    }

    async fn list(&self, limit: usize) -> RepositoryResult<Vec<Transaction>> {
        let tables = self.tables.read().await;
        let mut all: Vec<Transaction> = tables.by_id.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        Ok(all)
    }
}

/// Review queue backed by a vector. Listed newest-first.
#[derive(Clone, Default)]
pub struct InMemoryReviewQueue {
    entries: Arc<RwLock<Vec<ReviewEntry>>>,
}

impl InMemoryReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReviewQueue for InMemoryReviewQueue {
    async fn record(&self, entry: ReviewEntry) {
        self.entries.write().await.push(entry);
    }

    async fn list(&self) -> Vec<ReviewEntry> {
        let mut entries = self.entries.read().await.clone();
        entries.reverse();
        entries
    }
}
