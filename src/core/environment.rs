/// Runtime environment classification
///
/// Restricted runtimes (managed function hosts) have no durable local disk
/// and cannot spawn processes, so only JSON snapshots are possible there.

use serde::Serialize;

use super::config::{Settings, RUNTIME_OVERRIDE};

/// Variables set by managed serverless hosts
pub const SERVERLESS_MARKERS: &[&str] = &[
    "VERCEL",
    "AWS_LAMBDA_FUNCTION_NAME",
    "NETLIFY",
    "FUNCTIONS_WORKER_RUNTIME",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    Restricted,
    Unrestricted,
}

impl RuntimeEnvironment {
    /// Classify from settings. Evaluated on every call; nothing is cached.
    pub fn classify(settings: &Settings) -> Self {
        match settings.get(RUNTIME_OVERRIDE) {
            Some("restricted") => return RuntimeEnvironment::Restricted,
            Some("unrestricted") => return RuntimeEnvironment::Unrestricted,
            _ => {}
        }

        let marked = SERVERLESS_MARKERS.iter().any(|key| {
            settings
                .get(key)
                .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false"))
                .unwrap_or(false)
        });

        if marked {
            RuntimeEnvironment::Restricted
        } else {
            RuntimeEnvironment::Unrestricted
        }
    }

    pub fn is_restricted(&self) -> bool {
        *self == RuntimeEnvironment::Restricted
    }
}
