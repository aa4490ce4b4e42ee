/// Restore orchestrator
///
/// ```text
/// IDLE -> VALIDATING -> CLEARING -> RELOADING -> SUMMARIZING -> DONE
///              \____________\____________\_____________\______> FAILED
/// ```
///
/// JSON snapshots are replayed inside a single store transaction: every kind
/// is wiped children-first, then reinserted parents-first with the original
/// identifiers and timestamps. Any failure rolls the whole transaction back.
///
/// Native dumps are handed to `pg_restore --clean`. A tool failure there can
/// leave the database in whatever state the tool reached; nothing here
/// compensates for it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::config::{Settings, DIRECT_URL};
use super::entities::{EntityKind, EntitySet, DELETE_ORDER, INSERT_ORDER};
use super::environment::RuntimeEnvironment;
use super::error::{BackupError, BackupResult};
use super::lease::OperationLease;
use super::native::NativeDumper;
use super::registry::{kind_for_name, ArtifactRegistry, BackupArtifact};
use super::snapshot::{self, BackupKind, DatabaseSnapshot};
use super::store::{EntityStore, StoreError, StoreTransaction};

pub const INLINE_SOURCE: &str = "inline";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestorePhase {
    Idle,
    Validating,
    Clearing,
    Reloading,
    Summarizing,
    Done,
    Failed,
}

impl RestorePhase {
    pub fn can_advance_to(self, next: RestorePhase) -> bool {
        use RestorePhase::*;
        match (self, next) {
            (Idle, Validating) => true,
            (Validating, Clearing) => true,
            (Clearing, Reloading) => true,
            (Reloading, Summarizing) => true,
            (Summarizing, Done) => true,
            (Idle | Done | Failed, Failed) => false,
            (_, Failed) => true,
            _ => false,
        }
    }
}

/// Where the snapshot comes from
#[derive(Debug, Clone)]
pub enum RestoreSource {
    /// An artifact in the backups directory
    Stored { name: String },
    /// A JSON snapshot supplied by the caller
    Inline(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResult {
    pub restored_at: DateTime<Utc>,
    pub source: String,
    pub kind: BackupKind,
    /// Records inserted per kind. Empty for native restores.
    pub per_entity_counts: BTreeMap<EntityKind, usize>,
    pub total_records: usize,
}

enum RestorePlan {
    Json {
        source: String,
        snapshot: DatabaseSnapshot,
    },
    Native {
        artifact: BackupArtifact,
        uri: String,
    },
}

/// Phase of the current run, mirrored into the orchestrator's shared slot
struct PhaseTracker {
    current: RestorePhase,
    shared: Arc<Mutex<RestorePhase>>,
}

impl PhaseTracker {
    fn start(shared: Arc<Mutex<RestorePhase>>) -> Self {
        let mut tracker = Self {
            current: RestorePhase::Idle,
            shared,
        };
        tracker.advance(RestorePhase::Validating);
        tracker
    }

    fn advance(&mut self, next: RestorePhase) {
        if !self.current.can_advance_to(next) {
            tracing::warn!(from = ?self.current, to = ?next, "ignoring invalid restore transition");
            return;
        }
        tracing::debug!(from = ?self.current, to = ?next, "restore phase");
        self.current = next;
        if let Ok(mut shared) = self.shared.lock() {
            *shared = next;
        }
    }
}

pub struct RestoreOrchestrator {
    settings: Settings,
    store: Arc<dyn EntityStore>,
    dumper: Arc<dyn NativeDumper>,
    registry: Arc<ArtifactRegistry>,
    lease: OperationLease,
    last_phase: Arc<Mutex<RestorePhase>>,
}

impl RestoreOrchestrator {
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
            last_phase: Arc::new(Mutex::new(RestorePhase::Idle)),
        }
    }

    /// Phase reached by the most recent restore
    pub fn last_phase(&self) -> RestorePhase {
        self.last_phase
            .lock()
            .map(|p| *p)
            .unwrap_or(RestorePhase::Failed)
    }

    pub async fn restore(&self, source: RestoreSource) -> BackupResult<RestoreResult> {
        let _guard = self.lease.try_acquire()?;
        let mut tracker = PhaseTracker::start(Arc::clone(&self.last_phase));

        match self.run(&mut tracker, source).await {
            Ok(result) => {
                tracker.advance(RestorePhase::Done);
                tracing::info!(
                    source = %result.source,
                    total = result.total_records,
                    "restore completed"
                );
                Ok(result)
            }
            Err(e) => {
                tracker.advance(RestorePhase::Failed);
                if e.is_validation() {
                    tracing::warn!(code = e.code(), error = %e, "restore rejected");
                } else {
                    tracing::error!(code = e.code(), error = %e, "restore failed");
                }
                Err(e)
            }
        }
    }

    async fn run(&self, tracker: &mut PhaseTracker, source: RestoreSource) -> BackupResult<RestoreResult> {
        match self.validate(source).await? {
            RestorePlan::Json { source, snapshot } => {
                let counts = self.reload_json(tracker, &snapshot.entities).await?;
                tracker.advance(RestorePhase::Summarizing);
                Ok(RestoreResult {
                    restored_at: Utc::now(),
                    source,
                    kind: BackupKind::Json,
                    total_records: counts.values().sum(),
                    per_entity_counts: counts,
                })
            }
            RestorePlan::Native { artifact, uri } => {
                let path = artifact
                    .location_path
                    .clone()
                    .ok_or_else(|| BackupError::ArtifactNotFound(artifact.name.clone()))?;

                tracker.advance(RestorePhase::Clearing);
                self.dumper.restore(&uri, &path).await?;
                tracker.advance(RestorePhase::Reloading);

                tracker.advance(RestorePhase::Summarizing);
                Ok(RestoreResult {
                    restored_at: Utc::now(),
                    source: artifact.name,
                    kind: BackupKind::Native,
                    per_entity_counts: BTreeMap::new(),
                    total_records: 0,
                })
            }
        }
    }

    async fn validate(&self, source: RestoreSource) -> BackupResult<RestorePlan> {
        let environment = RuntimeEnvironment::classify(&self.settings);

        match source {
            RestoreSource::Inline(value) => Ok(RestorePlan::Json {
                source: INLINE_SOURCE.to_string(),
                snapshot: snapshot::decode(value)?,
            }),
            RestoreSource::Stored { name } => {
                let kind = kind_for_name(&name);
                if kind == BackupKind::Native && environment.is_restricted() {
                    return Err(BackupError::RestoreUnsupportedInRestrictedEnv);
                }

                let artifact = self.registry.resolve(&name).await?;

                match kind {
                    BackupKind::Json => {
                        let path = artifact
                            .location_path
                            .ok_or_else(|| BackupError::ArtifactNotFound(name.clone()))?;
                        let text = tokio::fs::read_to_string(&path).await?;
                        Ok(RestorePlan::Json {
                            source: name,
                            snapshot: snapshot::decode_str(&text)?,
                        })
                    }
                    BackupKind::Native => {
                        let uri = self
                            .settings
                            .direct_url()
                            .ok_or(BackupError::ConfigMissing(DIRECT_URL))?
                            .to_string();
                        Ok(RestorePlan::Native { artifact, uri })
                    }
                }
            }
        }
    }

    async fn reload_json(
        &self,
        tracker: &mut PhaseTracker,
        entities: &EntitySet,
    ) -> BackupResult<BTreeMap<EntityKind, usize>> {
        let mut tx = self.store.begin().await.map_err(BackupError::RestoreFailed)?;

        match replay(tx.as_mut(), tracker, entities).await {
            Ok(counts) => {
                tx.commit().await.map_err(BackupError::RestoreFailed)?;
                Ok(counts)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback reported an error");
                }
                Err(BackupError::RestoreFailed(e))
            }
        }
    }
}

/// Wipe and reload inside an open transaction
async fn replay(
    tx: &mut dyn StoreTransaction,
    tracker: &mut PhaseTracker,
    entities: &EntitySet,
) -> Result<BTreeMap<EntityKind, usize>, StoreError> {
    tracker.advance(RestorePhase::Clearing);
    for kind in DELETE_ORDER {
        let removed = tx.delete_all(kind).await?;
        tracing::debug!(%kind, removed, "cleared");
    }

    tracker.advance(RestorePhase::Reloading);
    let mut counts = BTreeMap::new();
    for kind in INSERT_ORDER {
        let records = entities.records(kind);
        for record in &records {
            tx.insert(record).await?;
        }
        tracing::debug!(%kind, inserted = records.len(), "reloaded");
        counts.insert(kind, records.len());
    }

    Ok(counts)
}
