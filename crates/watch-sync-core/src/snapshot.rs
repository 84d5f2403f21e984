//! Per-subject library snapshots: the libraries a user can see and how many
//! items each holds, cached so front ends can list them without the server.

use std::sync::Arc;
use tracing::{debug, info};
use watch_sync_models::{CatalogLibrary, LibrarySnapshotRow};
use watch_sync_sources::{CatalogClient, ItemQuery};

use crate::clock::Clock;
use crate::error::SyncError;
use crate::store::LedgerStore;

/// Library kinds whose reported child count is replaced by a real item count
const COUNTED_COLLECTIONS: &[&str] = &["movies", "tvshows", "music", "musicvideos", "homevideos"];

/// Replaces a subject's cached library list with what the catalog reports now
pub struct LibrarySnapshotRefresher {
    catalog: Arc<dyn CatalogClient>,
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
}

impl LibrarySnapshotRefresher {
    pub fn new(catalog: Arc<dyn CatalogClient>, store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { catalog, store, clock }
    }

    pub async fn refresh(&self, subject: &str) -> Result<Vec<LibrarySnapshotRow>, SyncError> {
        let libraries = self
            .catalog
            .list_libraries(subject)
            .await
            .map_err(SyncError::RemoteUnavailable)?;

        let snapshot_at = self.clock.now();
        let mut rows = Vec::with_capacity(libraries.len());
        for library in libraries {
            let item_count = self.item_count(subject, &library).await;
            rows.push(LibrarySnapshotRow {
                subject: subject.to_string(),
                library_id: library.id,
                name: library.name,
                collection_type: library.collection_type,
                item_count,
                snapshot_at,
            });
        }

        self.store.replace_libraries(subject, rows.clone()).await?;
        info!(operation = "refresh_libraries", subject = %subject, libraries = rows.len(), "Library snapshot replaced");
        Ok(rows)
    }

    /// Counts items with a one-item probe; falls back to the child count the
    /// catalog reported with the library
    async fn item_count(&self, subject: &str, library: &CatalogLibrary) -> u64 {
        let counted = library
            .collection_type
            .as_deref()
            .map_or(false, |kind| COUNTED_COLLECTIONS.contains(&kind));
        if !counted {
            return library.child_count;
        }

        let probe = ItemQuery {
            parent_id: Some(library.id.clone()),
            ..ItemQuery::default()
        }
        .page(0, 1);
        match self.catalog.list_items(subject, &probe).await {
            Ok(page) => page.total,
            Err(e) => {
                debug!(library_id = %library.id, error = %e, "Item count probe failed, using child count");
                library.child_count
            }
        }
    }
}
