/// Postgres entity store
///
/// Shape-agnostic: rows are read with `row_to_json` and written back with
/// `jsonb_populate_record`, so every column round-trips without this crate
/// knowing the schema beyond table names.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};

use super::entities::{EntityKind, EntityRecord};
use super::store::{EntityStore, StoreError, StoreTransaction};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        tracing::info!("connecting to postgres");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to connect to postgres: {}", e)))?;
        Ok(Self { pool })
    }
}

fn table(kind: EntityKind) -> String {
    format!("\"{}\"", kind.as_str())
}

fn map_insert_error(record: &EntityRecord, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_foreign_key_violation() {
            return StoreError::Constraint {
                kind: record.kind(),
                id: record.id().to_string(),
                detail: db_err.message().to_string(),
            };
        }
        if db_err.is_unique_violation() {
            return StoreError::Duplicate {
                kind: record.kind(),
                id: record.id().to_string(),
            };
        }
    }
    StoreError::Backend(err.to_string())
}

#[async_trait]
impl EntityStore for PgStore {
    async fn read_all(&self, kind: EntityKind) -> Result<Vec<EntityRecord>, StoreError> {
        let sql = format!("SELECT row_to_json(t) FROM {} t", table(kind));
        let rows: Vec<Json<Value>> = sqlx::query_scalar(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.into_iter()
            .map(|Json(value)| {
                EntityRecord::from_value(kind, value)
                    .map_err(|e| StoreError::Backend(format!("unreadable {} row: {}", kind, e)))
            })
            .collect()
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn delete_all(&mut self, kind: EntityKind) -> Result<u64, StoreError> {
        let sql = format!("DELETE FROM {}", table(kind));
        let result = sqlx::query(&sql)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                    StoreError::Constraint {
                        kind,
                        id: "*".to_string(),
                        detail: db_err.message().to_string(),
                    }
                }
                _ => StoreError::Backend(e.to_string()),
            })?;
        Ok(result.rows_affected())
    }

    async fn insert(&mut self, record: &EntityRecord) -> Result<(), StoreError> {
        let target = table(record.kind());
        let sql = format!(
            "INSERT INTO {target} SELECT * FROM jsonb_populate_record(NULL::{target}, $1)"
        );
        let value = record
            .to_value()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        sqlx::query(&sql)
            .bind(Json(value))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_insert_error(record, e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgTransaction { tx } = *self;
        tx.commit()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let PgTransaction { tx } = *self;
        tx.rollback()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}
