/// Artifact registry
///
/// Lists, sizes and deletes backup files in the backups directory. There is
/// no locking against concurrent creation or deletion; a listing taken while
/// a file is being removed may still show it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::config::Settings;
use super::environment::RuntimeEnvironment;
use super::error::{BackupError, BackupResult};
use super::snapshot::BackupKind;
use crate::utils::{
    format_bytes, has_artifact_prefix, is_native_artifact_name, JSON_EXTENSION, NATIVE_EXTENSION,
    RESTRICTED_LISTING_NOTE,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupArtifact {
    pub name: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub kind: BackupKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_path: Option<PathBuf>,
}

impl BackupArtifact {
    pub fn size_display(&self) -> String {
        format_bytes(self.size_bytes)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactListing {
    pub artifacts: Vec<BackupArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Artifact kind implied by a filename
pub fn kind_for_name(name: &str) -> BackupKind {
    if name.ends_with(&format!(".{}", JSON_EXTENSION)) {
        BackupKind::Json
    } else {
        BackupKind::Native
    }
}

pub struct ArtifactRegistry {
    settings: Settings,
}

impl ArtifactRegistry {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.settings.backup_dir()
    }

    fn environment(&self) -> RuntimeEnvironment {
        RuntimeEnvironment::classify(&self.settings)
    }

    /// Describe an existing file
    pub async fn describe(&self, path: &Path) -> BackupResult<BackupArtifact> {
        let meta = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let created_at = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(BackupArtifact {
            kind: kind_for_name(&name),
            name,
            size_bytes: meta.len(),
            created_at,
            location_path: Some(path.to_path_buf()),
        })
    }

    /// All stored artifacts, newest first
    pub async fn list(&self) -> BackupResult<ArtifactListing> {
        if self.environment().is_restricted() {
            return Ok(ArtifactListing {
                artifacts: Vec::new(),
                note: Some(RESTRICTED_LISTING_NOTE.to_string()),
            });
        }

        let dir = self.backup_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ArtifactListing {
                    artifacts: Vec::new(),
                    note: None,
                })
            }
            Err(e) => return Err(e.into()),
        };

        let mut artifacts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let known_ext = name.ends_with(&format!(".{}", NATIVE_EXTENSION))
                || name.ends_with(&format!(".{}", JSON_EXTENSION));
            if !has_artifact_prefix(&name) || !known_ext {
                continue;
            }

            // A file deleted between read_dir and stat is simply skipped
            match self.describe(&entry.path()).await {
                Ok(artifact) if entry.path().is_file() => artifacts.push(artifact),
                Ok(_) => {}
                Err(e) => tracing::debug!(file = %name, error = %e, "skipping unreadable artifact"),
            }
        }

        artifacts.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.name.cmp(&a.name))
        });

        Ok(ArtifactListing {
            artifacts,
            note: None,
        })
    }

    /// Locate a stored artifact for restore
    pub async fn resolve(&self, name: &str) -> BackupResult<BackupArtifact> {
        if !has_artifact_prefix(name) {
            return Err(BackupError::InvalidFilename(name.to_string()));
        }
        if self.environment().is_restricted() {
            return Err(BackupError::ArtifactNotFound(name.to_string()));
        }

        let path = self.backup_dir().join(name);
        if !path.is_file() {
            return Err(BackupError::ArtifactNotFound(name.to_string()));
        }

        self.describe(&path).await
    }

    /// Delete a native backup. JSON artifacts are refused by the name check.
    pub async fn delete(&self, name: &str) -> BackupResult<()> {
        if !is_native_artifact_name(name) {
            return Err(BackupError::InvalidFilename(name.to_string()));
        }
        if self.environment().is_restricted() {
            return Err(BackupError::ArtifactNotFound(name.to_string()));
        }

        let path = self.backup_dir().join(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(artifact = %name, "deleted backup");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BackupError::ArtifactNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
