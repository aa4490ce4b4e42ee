/// Helper utilities for backup artifacts

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

use super::constants::{ARTIFACT_PREFIX, NATIVE_EXTENSION};

/// Filesystem-safe UTC timestamp: an ISO-8601 instant with `:` and `.` as `-`
pub fn artifact_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string()
}

/// `<prefix>-<timestamp>.<extension>`
pub fn artifact_name(at: DateTime<Utc>, extension: &str) -> String {
    format!("{}-{}.{}", ARTIFACT_PREFIX, artifact_timestamp(at), extension)
}

/// True for names a native backup could have been written under
pub fn is_native_artifact_name(name: &str) -> bool {
    static NATIVE_RE: OnceLock<Regex> = OnceLock::new();
    let re = NATIVE_RE.get_or_init(|| {
        Regex::new(&format!(
            r"^{}-\d{{4}}-\d{{2}}-\d{{2}}T\d{{2}}-\d{{2}}-\d{{2}}-\d{{3}}Z\.{}$",
            regex::escape(ARTIFACT_PREFIX),
            NATIVE_EXTENSION
        ))
        .expect("artifact name pattern is valid")
    });
    re.is_match(name)
}

/// True for names carrying the artifact prefix and no path components
pub fn has_artifact_prefix(name: &str) -> bool {
    name.starts_with(&format!("{}-", ARTIFACT_PREFIX))
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
}

/// Format bytes to human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1_000;
    const MB: u64 = 1_000_000;
    const GB: u64 = 1_000_000_000;
    const TB: u64 = 1_000_000_000_000;

    if bytes >= TB {
        format!("{:.1}TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1}GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.0}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.0}KB", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_artifact_name() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(artifact_name(at, "bak"), "vtc-backup-2024-03-09T14-05-07-000Z.bak");
        assert_eq!(artifact_name(at, "json"), "vtc-backup-2024-03-09T14-05-07-000Z.json");
    }

    #[test]
    fn test_native_name_pattern() {
        let name = artifact_name(Utc::now(), NATIVE_EXTENSION);
        assert!(is_native_artifact_name(&name));

        assert!(!is_native_artifact_name("vtc-backup-2024-03-09T14-05-07-000Z.json"));
        assert!(!is_native_artifact_name("other-2024-03-09T14-05-07-000Z.bak"));
        assert!(!is_native_artifact_name("../vtc-backup-2024-03-09T14-05-07-000Z.bak"));
        assert!(!is_native_artifact_name("vtc-backup-latest.bak"));
    }

    #[test]
    fn test_prefix_check() {
        assert!(has_artifact_prefix("vtc-backup-x.json"));
        assert!(!has_artifact_prefix("vtc-backup-../../etc/passwd"));
        assert!(!has_artifact_prefix("notes.txt"));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2_400), "2KB");
        assert_eq!(format_bytes(48_000_000), "48MB");
        assert_eq!(format_bytes(1_200_000_000), "1.2GB");
    }
}
