pub mod clock;
pub mod error;
pub mod key_pool;
pub mod maintenance;
pub mod merge;
pub mod progress;
pub mod rating_cache;
pub mod reconcile;
pub mod scheduler;
pub mod service;
pub mod snapshot;
pub mod store;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StoreError, SyncError};
pub use key_pool::{KeyStatus, ProviderStatus};
pub use maintenance::{CleanupReport, DuplicateGroup, StaleRecord, ValidationReport};
pub use merge::{merge_record, Field, MergePolicy, RemoteFacts};
pub use rating_cache::{RatingCacheManager, RatingRequest};
pub use reconcile::{HistoryReconciler, ReconcileOptions, ReconcileOutcome};
pub use scheduler::{BatchReport, SubjectReport, SyncHandle, SyncScheduler};
pub use service::WatchLedger;
pub use store::{FileLedgerStore, LedgerStore, LedgerTransaction};
