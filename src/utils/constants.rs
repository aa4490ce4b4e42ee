/// Backup subsystem constants

/// Prefix shared by every backup artifact filename
pub const ARTIFACT_PREFIX: &str = "vtc-backup";

pub const NATIVE_EXTENSION: &str = "bak";
pub const JSON_EXTENSION: &str = "json";

pub const DEFAULT_BACKUP_DIR: &str = "backups";
pub const DEFAULT_PG_DUMP_BIN: &str = "pg_dump";
pub const DEFAULT_PG_RESTORE_BIN: &str = "pg_restore";

/// Shown instead of a listing where there is no persistent disk
pub const RESTRICTED_LISTING_NOTE: &str =
    "Backups are not stored on this host. Download the JSON backup when you create it and keep it safe.";

/// Largest request body accepted by the inline restore route
pub const MAX_RESTORE_BODY_BYTES: usize = 100 * 1024 * 1024;
