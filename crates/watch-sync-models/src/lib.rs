pub mod catalog;
pub mod library;
pub mod media;
pub mod progress;
pub mod rating;
pub mod status;
pub mod watch_record;

pub use catalog::{CatalogItem, CatalogLibrary, CatalogUser, ItemKind, TICKS_PER_MINUTE};
pub use library::LibrarySnapshotRow;
pub use media::{MediaKind, Provenance};
pub use progress::{percent, NextEpisode, SeasonProgress, ShowProgress};
pub use rating::{ExternalRatings, RatingBundle, RatingCacheRow, RatingOrigin};
pub use status::{SyncState, SyncStatusRecord};
pub use watch_record::{RecordId, WatchRecord};
