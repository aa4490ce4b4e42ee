pub mod backup;
pub mod config;
pub mod entities;
pub mod environment;
pub mod error;
pub mod lease;
pub mod memory_store;
pub mod native;
#[cfg(feature = "postgres")]
pub mod pg_store;
pub mod registry;
pub mod restore;
pub mod service;
pub mod snapshot;
pub mod store;

pub use backup::{BackupOrchestrator, CreatedBackup};
pub use config::Settings;
pub use entities::{EntityKind, EntityRecord, EntitySet};
pub use environment::RuntimeEnvironment;
pub use error::{BackupError, BackupResult};
pub use memory_store::MemoryStore;
pub use native::{NativeDumper, PgTools};
#[cfg(feature = "postgres")]
pub use pg_store::PgStore;
pub use registry::{ArtifactListing, ArtifactRegistry, BackupArtifact};
pub use restore::{RestoreOrchestrator, RestorePhase, RestoreResult, RestoreSource};
pub use service::{open_store, BackupService};
pub use snapshot::{BackupKind, DatabaseSnapshot};
pub use store::{EntityStore, StoreError, StoreTransaction};
