//! Application layer module
//!
//! The sync orchestrator and the scheduler that drives it.

pub mod scheduler;
pub mod sync_orchestrator;

pub use scheduler::{SyncJob, SyncScheduler};
pub use sync_orchestrator::{BackfillReport, ComicSyncService, CycleReport, SyncError};
