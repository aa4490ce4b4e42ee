/// Data-access collaborator interface
///
/// The relational layer is owned by the surrounding application. The backup
/// subsystem only needs read-all per kind, plus delete-all and insert inside
/// a transaction it controls.

use async_trait::async_trait;
use thiserror::Error;

use super::entities::{EntityKind, EntityRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id}: foreign key violation ({detail})")]
    Constraint {
        kind: EntityKind,
        id: String,
        detail: String,
    },

    #[error("{kind} {id}: duplicate identifier")]
    Duplicate { kind: EntityKind, id: String },

    #[error("{0}")]
    Backend(String),
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Every record of one kind, in storage order
    async fn read_all(&self, kind: EntityKind) -> Result<Vec<EntityRecord>, StoreError>;

    /// Open a transaction. Dropping it without `commit` discards all changes.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

#[async_trait]
pub trait StoreTransaction: Send {
    /// Remove every record of one kind, returning how many were removed
    async fn delete_all(&mut self, kind: EntityKind) -> Result<u64, StoreError>;

    /// Insert a record with its own identifier and timestamps
    async fn insert(&mut self, record: &EntityRecord) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
