/// Single in-flight operation lease
///
/// Backups and restores share one lease; a second request arriving while
/// one is running is rejected instead of interleaving at the store level.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::error::{BackupError, BackupResult};

#[derive(Debug, Clone, Default)]
pub struct OperationLease {
    held: Arc<AtomicBool>,
}

/// Releases the lease when dropped
#[derive(Debug)]
pub struct LeaseGuard {
    held: Arc<AtomicBool>,
}

impl OperationLease {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> BackupResult<LeaseGuard> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| BackupError::OperationInProgress)?;

        Ok(LeaseGuard {
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}
