/// Backup and restore for the VTC platform database
///
/// `core` holds the orchestrators and their collaborators, `server` exposes
/// them over HTTP (feature `server`), `utils` carries naming helpers shared by
/// both.

pub mod core;
pub mod server;
pub mod utils;

pub use crate::core::{BackupError, BackupResult, BackupService, Settings};
