/// In-process entity store
///
/// Enforces the same foreign-key rules as the relational schema: a child
/// cannot be inserted before its parents, and a parent table cannot be
/// emptied while children still point at it. Transactions work on a private
/// copy that replaces the shared tables on commit.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::entities::{EntityKind, EntityRecord, EntitySet, INSERT_ORDER};
use super::store::{EntityStore, StoreError, StoreTransaction};

type Tables = BTreeMap<EntityKind, Vec<EntityRecord>>;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `entities`, checked like a normal insert
    pub fn with_entities(entities: &EntitySet) -> Result<Self, StoreError> {
        let mut tables = Tables::new();
        for kind in INSERT_ORDER {
            for record in entities.records(kind) {
                insert_checked(&mut tables, record)?;
            }
        }
        Ok(Self {
            tables: Arc::new(Mutex::new(tables)),
        })
    }

    /// Copy of the committed contents
    pub fn contents(&self) -> Result<EntitySet, StoreError> {
        let tables = self.lock()?;
        let mut set = EntitySet::new();
        for kind in INSERT_ORDER {
            for record in tables.get(&kind).into_iter().flatten() {
                set.push(record.clone());
            }
        }
        Ok(set)
    }

    pub fn count(&self, kind: EntityKind) -> Result<usize, StoreError> {
        Ok(self.lock()?.get(&kind).map(|rows| rows.len()).unwrap_or(0))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

fn contains(tables: &Tables, kind: EntityKind, id: &str) -> bool {
    tables
        .get(&kind)
        .map(|rows| rows.iter().any(|r| r.id() == id))
        .unwrap_or(false)
}

fn insert_checked(tables: &mut Tables, record: EntityRecord) -> Result<(), StoreError> {
    let kind = record.kind();

    if contains(tables, kind, record.id()) {
        return Err(StoreError::Duplicate {
            kind,
            id: record.id().to_string(),
        });
    }

    for (parent, parent_id) in record.references() {
        if !contains(tables, parent, parent_id) {
            return Err(StoreError::Constraint {
                kind,
                id: record.id().to_string(),
                detail: format!("{} {} does not exist", parent, parent_id),
            });
        }
    }

    tables.entry(kind).or_default().push(record);
    Ok(())
}

fn delete_checked(tables: &mut Tables, kind: EntityKind) -> Result<u64, StoreError> {
    for child in kind.dependents() {
        let blocking = tables.get(&child).and_then(|rows| {
            rows.iter().find_map(|row| {
                row.references()
                    .into_iter()
                    .find(|(parent, _)| *parent == kind)
                    .map(|(_, parent_id)| (row.id().to_string(), parent_id.to_string()))
            })
        });

        if let Some((child_id, parent_id)) = blocking {
            return Err(StoreError::Constraint {
                kind,
                id: parent_id,
                detail: format!("still referenced by {} {}", child, child_id),
            });
        }
    }

    Ok(tables.remove(&kind).map(|rows| rows.len() as u64).unwrap_or(0))
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn read_all(&self, kind: EntityKind) -> Result<Vec<EntityRecord>, StoreError> {
        Ok(self.lock()?.get(&kind).cloned().unwrap_or_default())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let working = self.lock()?.clone();
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.tables),
            working,
        }))
    }
}

struct MemoryTransaction {
    shared: Arc<Mutex<Tables>>,
    working: Tables,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn delete_all(&mut self, kind: EntityKind) -> Result<u64, StoreError> {
        delete_checked(&mut self.working, kind)
    }

    async fn insert(&mut self, record: &EntityRecord) -> Result<(), StoreError> {
        insert_checked(&mut self.working, record.clone())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { shared, working } = *self;
        let mut tables = shared
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))?;
        *tables = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::snapshot::{decode, tests::sample_document};

    fn sample_store() -> MemoryStore {
        let set = decode(sample_document()).unwrap().entities;
        MemoryStore::with_entities(&set).unwrap()
    }

    #[tokio::test]
    async fn test_read_all() {
        let store = sample_store();
        let users = store.read_all(EntityKind::Users).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id(), "u1");
        assert!(store.read_all(EntityKind::Services).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_parent_before_child_fails() {
        let store = sample_store();
        let mut tx = store.begin().await.unwrap();

        let err = tx.delete_all(EntityKind::Users).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint { kind: EntityKind::Users, .. }));
    }

    #[tokio::test]
    async fn test_insert_child_without_parent_fails() {
        let store = MemoryStore::new();
        let set = decode(sample_document()).unwrap().entities;
        let driver = set.records(EntityKind::Drivers).remove(0);

        let mut tx = store.begin().await.unwrap();
        let err = tx.insert(&driver).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint { kind: EntityKind::Drivers, .. }));
    }

    #[tokio::test]
    async fn test_duplicate_id_fails() {
        let store = sample_store();
        let set = decode(sample_document()).unwrap().entities;
        let user = set.records(EntityKind::Users).remove(0);

        let mut tx = store.begin().await.unwrap();
        let err = tx.insert(&user).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn test_uncommitted_changes_are_invisible() {
        let store = sample_store();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.delete_all(EntityKind::Payments).await.unwrap(), 1);
        assert_eq!(store.count(EntityKind::Payments).unwrap(), 1);

        tx.rollback().await.unwrap();
        assert_eq!(store.count(EntityKind::Payments).unwrap(), 1);

        let mut tx = store.begin().await.unwrap();
        tx.delete_all(EntityKind::Payments).await.unwrap();
        drop(tx);
        assert_eq!(store.count(EntityKind::Payments).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_commit_publishes() {
        let store = sample_store();

        let mut tx = store.begin().await.unwrap();
        tx.delete_all(EntityKind::Payments).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.count(EntityKind::Payments).unwrap(), 0);
        assert_eq!(store.contents().unwrap().total(), 4);
    }
}
