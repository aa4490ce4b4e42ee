/// Snapshot codec
///
/// Self-describing JSON documents holding the whole store:
///
/// ```text
/// { "metadata": { "version": "1.0", "created": ..., "type": "json-backup", "tables": [...] },
///   "data": { "services": [...], "users": [...], ... } }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entities::{EntityKind, EntitySet};
use super::error::{BackupError, BackupResult};
use crate::utils::{JSON_EXTENSION, NATIVE_EXTENSION};

pub const FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupKind {
    #[serde(rename = "native-backup", alias = "native")]
    Native,
    #[serde(rename = "json-backup", alias = "json")]
    Json,
}

impl BackupKind {
    pub fn extension(&self) -> &'static str {
        match self {
            BackupKind::Native => NATIVE_EXTENSION,
            BackupKind::Json => JSON_EXTENSION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupMetadata {
    #[serde(rename = "version")]
    pub format_version: String,
    #[serde(rename = "created")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub backup_kind: BackupKind,
    #[serde(rename = "tables")]
    pub entity_kinds: Vec<String>,
}

impl BackupMetadata {
    pub fn json_now() -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            created_at: Utc::now(),
            backup_kind: BackupKind::Json,
            entity_kinds: EntityKind::names(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub metadata: BackupMetadata,
    #[serde(rename = "data")]
    pub entities: EntitySet,
}

impl DatabaseSnapshot {
    pub fn to_json_pretty(&self) -> BackupResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| BackupError::InvalidFormat(e.to_string()))
    }
}

/// Wrap the store contents in a fresh snapshot
pub fn encode(entities: EntitySet) -> DatabaseSnapshot {
    DatabaseSnapshot {
        metadata: BackupMetadata::json_now(),
        entities,
    }
}

/// Decode a snapshot from raw text
pub fn decode_str(raw: &str) -> BackupResult<DatabaseSnapshot> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| BackupError::InvalidFormat(e.to_string()))?;
    decode(value)
}

/// Decode a snapshot from an already-parsed document
pub fn decode(raw: Value) -> BackupResult<DatabaseSnapshot> {
    let has_shape = raw
        .as_object()
        .map(|obj| obj.contains_key("metadata") && obj.contains_key("data"))
        .unwrap_or(false);
    if !has_shape {
        return Err(BackupError::InvalidFormat(
            "missing \"data\" or \"metadata\" key".to_string(),
        ));
    }

    let snapshot: DatabaseSnapshot =
        serde_json::from_value(raw).map_err(|e| BackupError::InvalidFormat(e.to_string()))?;

    if snapshot.metadata.backup_kind != BackupKind::Json {
        return Err(BackupError::InvalidFormat(
            "metadata type is not json-backup".to_string(),
        ));
    }

    let major = snapshot.metadata.format_version.split('.').next().unwrap_or("");
    if major != "1" {
        return Err(BackupError::InvalidFormat(format!(
            "unsupported snapshot version {}",
            snapshot.metadata.format_version
        )));
    }

    Ok(snapshot)
}
