/// Configuration for the backup subsystem
///
/// Settings are an immutable key/value snapshot built once by the caller and
/// injected into the orchestrators. Nothing in `core` reads the process
/// environment directly.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::environment::SERVERLESS_MARKERS;
use crate::utils::{DEFAULT_BACKUP_DIR, DEFAULT_PG_DUMP_BIN, DEFAULT_PG_RESTORE_BIN};

pub const DIRECT_URL: &str = "DIRECT_URL";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const BACKUP_DIR: &str = "BACKUP_DIR";
pub const PG_DUMP_BIN: &str = "PG_DUMP_BIN";
pub const PG_RESTORE_BIN: &str = "PG_RESTORE_BIN";
pub const ADMIN_TOKEN: &str = "VTC_ADMIN_TOKEN";
pub const RUNTIME_OVERRIDE: &str = "VTC_RUNTIME";

const KNOWN_KEYS: &[&str] = &[
    DIRECT_URL,
    DATABASE_URL,
    BACKUP_DIR,
    PG_DUMP_BIN,
    PG_RESTORE_BIN,
    ADMIN_TOKEN,
    RUNTIME_OVERRIDE,
];

#[derive(Debug, Clone, Default)]
pub struct Settings {
    vars: HashMap<String, String>,
}

impl Settings {
    /// Build settings from an explicit set of variables
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Merge the process environment over an optional .env file.
    ///
    /// The file is parsed without exporting anything into the process.
    pub fn load<P: AsRef<Path>>(env_file: Option<P>) -> Result<Self> {
        let mut vars = HashMap::new();

        if let Some(path) = env_file {
            let path = path.as_ref();
            if path.exists() {
                let iter = dotenv::from_path_iter(path)
                    .with_context(|| format!("Failed to open {}", path.display()))?;
                for item in iter {
                    let (key, value) = item
                        .with_context(|| format!("Failed to parse {}", path.display()))?;
                    vars.insert(key, value);
                }
            }
        }

        vars.extend(std::env::vars());

        Ok(Self { vars })
    }

    /// Get a configuration value, treating blank values as unset
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Same settings with one value replaced
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn direct_url(&self) -> Option<&str> {
        self.get(DIRECT_URL)
    }

    pub fn database_url(&self) -> Option<&str> {
        self.get(DATABASE_URL)
    }

    pub fn backup_dir(&self) -> PathBuf {
        PathBuf::from(self.get(BACKUP_DIR).unwrap_or(DEFAULT_BACKUP_DIR))
    }

    pub fn pg_dump_bin(&self) -> &str {
        self.get(PG_DUMP_BIN).unwrap_or(DEFAULT_PG_DUMP_BIN)
    }

    pub fn pg_restore_bin(&self) -> &str {
        self.get(PG_RESTORE_BIN).unwrap_or(DEFAULT_PG_RESTORE_BIN)
    }

    pub fn admin_token(&self) -> Option<&str> {
        self.get(ADMIN_TOKEN)
    }

    /// Validate configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(mode) = self.get(RUNTIME_OVERRIDE) {
            if !matches!(mode, "restricted" | "unrestricted") {
                errors.push(format!(
                    "{} must be 'restricted' or 'unrestricted', got '{}'",
                    RUNTIME_OVERRIDE, mode
                ));
            }
        }

        for key in [DIRECT_URL, DATABASE_URL] {
            if let Some(url) = self.get(key) {
                if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                    errors.push(format!("{} must be a postgres:// connection string", key));
                }
            }
        }

        if self.direct_url().is_none() {
            errors.push(format!("{} is not set (native dumps unavailable)", DIRECT_URL));
        }

        errors
    }

    /// Keys this crate reads that are currently set, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = KNOWN_KEYS
            .iter()
            .chain(SERVERLESS_MARKERS)
            .filter(|key| self.get(**key).is_some())
            .map(|key| key.to_string())
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_env_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# Backup configuration").unwrap();
        writeln!(file, "VTC_TEST_ONLY_BACKUP_DIR_KEY=/var/backups/vtc").unwrap();
        writeln!(file, "VTC_TEST_ONLY_EMPTY=").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();

        assert_eq!(settings.get("VTC_TEST_ONLY_BACKUP_DIR_KEY"), Some("/var/backups/vtc"));
        assert_eq!(settings.get("VTC_TEST_ONLY_EMPTY"), None);
    }

    #[test]
    fn test_missing_env_file_is_ignored() {
        let settings = Settings::load(Some("/nonexistent/vtc/.env")).unwrap();
        assert_eq!(settings.get("VTC_TEST_ONLY_BACKUP_DIR_KEY"), None);
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_vars(Vec::<(String, String)>::new());
        assert_eq!(settings.backup_dir(), PathBuf::from(DEFAULT_BACKUP_DIR));
        assert_eq!(settings.pg_dump_bin(), "pg_dump");
        assert_eq!(settings.pg_restore_bin(), "pg_restore");
        assert_eq!(settings.direct_url(), None);
    }

    #[test]
    fn test_validate() {
        let settings = Settings::from_vars([
            (DIRECT_URL, "mysql://localhost/vtc"),
            (RUNTIME_OVERRIDE, "lambda"),
        ]);
        let errors = settings.validate();
        assert_eq!(errors.len(), 2);

        let settings = Settings::from_vars([(DIRECT_URL, "postgresql://vtc@db:5432/vtc")]);
        assert!(settings.validate().is_empty());
    }

    #[test]
    fn test_keys_only_lists_known_settings() {
        let settings = Settings::from_vars([
            (BACKUP_DIR, "/srv/backups"),
            ("VERCEL", "1"),
            ("PATH", "/usr/bin"),
            (ADMIN_TOKEN, " "),
        ]);
        assert_eq!(settings.keys(), vec!["BACKUP_DIR".to_string(), "VERCEL".to_string()]);
    }
}
