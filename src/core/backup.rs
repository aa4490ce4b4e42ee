/// Backup orchestrator
///
/// Picks the strategy from the runtime environment:
/// - restricted hosts get an in-memory JSON snapshot, never written to disk
/// - everywhere else `pg_dump` writes a compressed dump into the backups
///   directory
///
/// Backups only read from the live store.

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;

use super::config::{Settings, DIRECT_URL};
use super::entities::{EntitySet, INSERT_ORDER};
use super::environment::RuntimeEnvironment;
use super::error::{BackupError, BackupResult};
use super::lease::OperationLease;
use super::native::NativeDumper;
use super::registry::{ArtifactRegistry, BackupArtifact};
use super::snapshot::{self, BackupKind, DatabaseSnapshot};
use super::store::EntityStore;
use crate::utils::artifact_name;

/// Result of a backup request
#[derive(Debug, Clone)]
pub struct CreatedBackup {
    pub artifact: BackupArtifact,
    /// Present for in-memory JSON backups, for immediate download
    pub snapshot: Option<DatabaseSnapshot>,
}

pub struct BackupOrchestrator {
    settings: Settings,
    store: Arc<dyn EntityStore>,
    dumper: Arc<dyn NativeDumper>,
    registry: Arc<ArtifactRegistry>,
    lease: OperationLease,
}

impl BackupOrchestrator {
    pub fn new(
        settings: Settings,
        store: Arc<dyn EntityStore>,
        dumper: Arc<dyn NativeDumper>,
        registry: Arc<ArtifactRegistry>,
        lease: OperationLease,
    ) -> Self {
        Self {
            settings,
            store,
            dumper,
            registry,
            lease,
        }
    }

    /// Create a backup with the strategy suited to the current environment
    pub async fn create_backup(&self) -> BackupResult<CreatedBackup> {
        self.create_backup_of_kind(BackupKind::Native).await
    }

    /// Create a backup of the requested kind.
    ///
    /// Restricted environments always produce an in-memory JSON snapshot,
    /// whatever was requested.
    pub async fn create_backup_of_kind(&self, kind: BackupKind) -> BackupResult<CreatedBackup> {
        let _guard = self.lease.try_acquire()?;

        if RuntimeEnvironment::classify(&self.settings).is_restricted() {
            return self.create_inline_json().await;
        }

        match kind {
            BackupKind::Native => self.create_native().await,
            BackupKind::Json => self.create_json_file().await,
        }
    }

    /// Snapshot of the whole store, in any environment, without touching disk
    pub async fn export_snapshot(&self) -> BackupResult<DatabaseSnapshot> {
        let _guard = self.lease.try_acquire()?;
        self.read_snapshot().await
    }

    async fn read_snapshot(&self) -> BackupResult<DatabaseSnapshot> {
        let mut entities = EntitySet::new();
        for kind in INSERT_ORDER {
            let records = self.store.read_all(kind).await?;
            tracing::debug!(%kind, count = records.len(), "read entity records");
            for record in records {
                entities.push(record);
            }
        }
        Ok(snapshot::encode(entities))
    }

    async fn create_inline_json(&self) -> BackupResult<CreatedBackup> {
        let snapshot = self.read_snapshot().await?;
        let body = snapshot.to_json_pretty()?;

        let artifact = BackupArtifact {
            name: artifact_name(snapshot.metadata.created_at, BackupKind::Json.extension()),
            size_bytes: body.len() as u64,
            created_at: snapshot.metadata.created_at,
            kind: BackupKind::Json,
            location_path: None,
        };

        tracing::info!(
            artifact = %artifact.name,
            records = snapshot.entities.total(),
            "created in-memory JSON backup"
        );

        Ok(CreatedBackup {
            artifact,
            snapshot: Some(snapshot),
        })
    }

    async fn create_json_file(&self) -> BackupResult<CreatedBackup> {
        let snapshot = self.read_snapshot().await?;
        let body = snapshot.to_json_pretty()?;

        let dir = self.registry.backup_dir();
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(artifact_name(
            snapshot.metadata.created_at,
            BackupKind::Json.extension(),
        ));
        tokio::fs::write(&path, body).await?;

        let artifact = self.registry.describe(&path).await?;
        tracing::info!(artifact = %artifact.name, size = artifact.size_bytes, "created JSON backup");

        Ok(CreatedBackup {
            artifact,
            snapshot: None,
        })
    }

    async fn create_native(&self) -> BackupResult<CreatedBackup> {
        let uri = self
            .settings
            .direct_url()
            .ok_or(BackupError::ConfigMissing(DIRECT_URL))?;

        let dir = self.registry.backup_dir();
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(artifact_name(Utc::now(), BackupKind::Native.extension()));

        if let Err(e) = self.dumper.dump(uri, &path).await {
            tracing::error!(error = %e, code = e.code(), "native dump failed");
            remove_partial(&path).await;
            return Err(BackupError::DumpFailed(e));
        }

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {}
            _ => {
                remove_partial(&path).await;
                return Err(BackupError::DumpOutputMissing(path));
            }
        }

        let artifact = self.registry.describe(&path).await?;
        tracing::info!(artifact = %artifact.name, size = artifact.size_bytes, "created native backup");

        Ok(CreatedBackup {
            artifact,
            snapshot: None,
        })
    }
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove partial dump");
        }
    }
}
