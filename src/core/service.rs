/// Backup service facade
///
/// Wires the orchestrators and the registry around one shared lease so the
/// CLI and the HTTP server see the same rules.

use std::sync::Arc;

use super::backup::{BackupOrchestrator, CreatedBackup};
use super::config::{Settings, DATABASE_URL};
use super::environment::RuntimeEnvironment;
use super::error::{BackupError, BackupResult};
use super::lease::OperationLease;
use super::native::{NativeDumper, PgTools};
use super::registry::{ArtifactListing, ArtifactRegistry};
use super::restore::{RestoreOrchestrator, RestorePhase, RestoreResult, RestoreSource};
use super::snapshot::{BackupKind, DatabaseSnapshot};
use super::store::EntityStore;

/// Open the entity store named by `DATABASE_URL`.
///
/// There is no fallback: without a reachable database every entity operation
/// would run against nothing, so a missing URL is a configuration error.
#[cfg_attr(not(feature = "postgres"), allow(unused_variables))]
pub async fn open_store(settings: &Settings) -> BackupResult<Arc<dyn EntityStore>> {
    let url = settings
        .database_url()
        .ok_or(BackupError::ConfigMissing(DATABASE_URL))?;

    #[cfg(feature = "postgres")]
    {
        let store = super::pg_store::PgStore::connect(url).await?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "postgres"))]
    {
        tracing::error!("DATABASE_URL is set but this build has no postgres support");
        Err(BackupError::ConfigMissing(DATABASE_URL))
    }
}

pub struct BackupService {
    settings: Settings,
    registry: Arc<ArtifactRegistry>,
    lease: OperationLease,
    backups: BackupOrchestrator,
    restores: RestoreOrchestrator,
}

impl BackupService {
    pub fn new(settings: Settings, store: Arc<dyn EntityStore>, dumper: Arc<dyn NativeDumper>) -> Self {
        let registry = Arc::new(ArtifactRegistry::new(settings.clone()));
        let lease = OperationLease::new();

        let backups = BackupOrchestrator::new(
            settings.clone(),
            Arc::clone(&store),
            Arc::clone(&dumper),
            Arc::clone(&registry),
            lease.clone(),
        );
        let restores = RestoreOrchestrator::new(
            settings.clone(),
            store,
            dumper,
            Arc::clone(&registry),
            lease.clone(),
        );

        Self {
            settings,
            registry,
            lease,
            backups,
            restores,
        }
    }

    /// Service using the `pg_dump`/`pg_restore` binaries named in `settings`
    pub fn with_pg_tools(settings: Settings, store: Arc<dyn EntityStore>) -> Self {
        let tools = PgTools::new(settings.pg_dump_bin(), settings.pg_restore_bin());
        Self::new(settings, store, Arc::new(tools))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn environment(&self) -> RuntimeEnvironment {
        RuntimeEnvironment::classify(&self.settings)
    }

    pub fn is_busy(&self) -> bool {
        self.lease.is_held()
    }

    pub async fn create_backup(&self) -> BackupResult<CreatedBackup> {
        self.backups.create_backup().await
    }

    pub async fn create_backup_of_kind(&self, kind: BackupKind) -> BackupResult<CreatedBackup> {
        self.backups.create_backup_of_kind(kind).await
    }

    pub async fn export_snapshot(&self) -> BackupResult<DatabaseSnapshot> {
        self.backups.export_snapshot().await
    }

    pub async fn list(&self) -> BackupResult<ArtifactListing> {
        self.registry.list().await
    }

    pub async fn delete(&self, name: &str) -> BackupResult<()> {
        self.registry.delete(name).await
    }

    pub async fn restore(&self, source: RestoreSource) -> BackupResult<RestoreResult> {
        self.restores.restore(source).await
    }

    pub fn last_phase(&self) -> RestorePhase {
        self.restores.last_phase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::BACKUP_DIR;
    use crate::core::entities::EntityKind;
    use crate::core::memory_store::MemoryStore;
    use crate::core::native::MockNativeDumper;
    use crate::core::snapshot;
    use crate::core::snapshot::tests::sample_document;

    fn service(settings: Settings, store: Arc<MemoryStore>) -> BackupService {
        let mut dumper = MockNativeDumper::new();
        dumper.expect_dump().never();
        dumper.expect_restore().never();
        BackupService::new(settings, store, Arc::new(dumper))
    }

    #[tokio::test]
    async fn test_open_store_requires_database_url() {
        let err = open_store(&Settings::from_vars([(BACKUP_DIR, "/tmp/vtc".to_string())]))
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), "CONFIG_MISSING");
        assert!(err.to_string().contains(DATABASE_URL));

        let blank = Settings::from_vars([(DATABASE_URL, "  ".to_string())]);
        let err = open_store(&blank).await.err().unwrap();
        assert_eq!(err.code(), "CONFIG_MISSING");
    }

    #[tokio::test]
    async fn test_json_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::from_vars([(BACKUP_DIR, dir.path().display().to_string())]);
        let entities = snapshot::decode(sample_document()).unwrap().entities;
        let store = Arc::new(MemoryStore::with_entities(&entities).unwrap());
        let svc = service(settings, store.clone());

        let created = svc.create_backup_of_kind(BackupKind::Json).await.unwrap();
        let listing = svc.list().await.unwrap();
        assert_eq!(listing.artifacts.len(), 1);
        assert_eq!(listing.artifacts[0].name, created.artifact.name);

        let result = svc
            .restore(RestoreSource::Stored {
                name: created.artifact.name.clone(),
            })
            .await
            .unwrap();
        assert_eq!(result.total_records, 5);
        assert_eq!(store.contents().unwrap(), entities);
        assert_eq!(svc.last_phase(), RestorePhase::Done);
        assert!(!svc.is_busy());
    }

    #[tokio::test]
    async fn test_restricted_backup_then_inline_restore() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::from_vars([
            (BACKUP_DIR, dir.path().display().to_string()),
            ("NETLIFY", "true".to_string()),
        ]);
        let entities = snapshot::decode(sample_document()).unwrap().entities;
        let store = Arc::new(MemoryStore::with_entities(&entities).unwrap());
        let svc = service(settings, store.clone());
        assert!(svc.environment().is_restricted());

        let created = svc.create_backup().await.unwrap();
        let document = serde_json::to_value(created.snapshot.unwrap()).unwrap();

        let listing = svc.list().await.unwrap();
        assert!(listing.artifacts.is_empty());
        assert!(listing.note.is_some());

        let result = svc.restore(RestoreSource::Inline(document)).await.unwrap();
        assert_eq!(result.per_entity_counts[&EntityKind::Payments], 1);
        assert_eq!(store.contents().unwrap(), entities);
    }
}
