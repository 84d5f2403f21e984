//! Ledger maintenance: duplicate cleanup after series id churn, and probing
//! remote ids that may no longer resolve.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use watch_sync_models::{RecordId, WatchRecord};
use watch_sync_sources::CatalogClient;

use crate::error::SyncError;
use crate::progress::group_by_series;
use crate::store::{LedgerStore, LedgerTransaction};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub series_name: String,
    pub kept_series_id: String,
    pub removed_series_ids: Vec<String>,
    pub record_ids: Vec<RecordId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupReport {
    pub dry_run: bool,
    pub groups: Vec<DuplicateGroup>,
    /// Records deleted; always 0 for a dry run
    pub removed: usize,
}

impl CleanupReport {
    pub fn candidate_count(&self) -> usize {
        self.groups.iter().map(|g| g.record_ids.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaleRecord {
    pub record_id: RecordId,
    pub remote_id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub checked: usize,
    pub valid: usize,
    pub stale: Vec<StaleRecord>,
    /// Probes that failed for reasons other than "not found"
    pub errors: usize,
    /// Stale records whose remote ids were cleared
    pub fixed: usize,
}

pub struct LedgerMaintenance {
    catalog: Arc<dyn CatalogClient>,
    store: Arc<dyn LedgerStore>,
}

impl LedgerMaintenance {
    pub fn new(catalog: Arc<dyn CatalogClient>, store: Arc<dyn LedgerStore>) -> Self {
        Self { catalog, store }
    }

    /// Finds series names recorded under more than one series id and removes
    /// the remote-sync records filed under every id but the most recently
    /// watched one. A dry run reports the same candidates without deleting.
    pub async fn cleanup_duplicates(&self, subject: &str, dry_run: bool) -> Result<CleanupReport, SyncError> {
        let records = self.store.records_for_subject(subject).await?;
        let mut groups = Vec::new();

        for group in group_by_series(records).into_values() {
            let series_ids = group.series_ids();
            let Some((kept, others)) = series_ids.split_first() else {
                continue;
            };
            if others.is_empty() {
                continue;
            }

            let record_ids: Vec<RecordId> = group
                .records
                .iter()
                .filter(|record| record.provenance.is_reconciled())
                .filter(|record| {
                    record
                        .series_id
                        .as_ref()
                        .map_or(false, |series_id| others.contains(series_id))
                })
                .filter_map(|record| record.id)
                .collect();
            if record_ids.is_empty() {
                continue;
            }

            groups.push(DuplicateGroup {
                series_name: group.display_name.clone(),
                kept_series_id: kept.clone(),
                removed_series_ids: others.to_vec(),
                record_ids,
            });
        }

        let mut report = CleanupReport {
            dry_run,
            groups,
            removed: 0,
        };

        if !dry_run && report.candidate_count() > 0 {
            let doomed: HashSet<RecordId> = report
                .groups
                .iter()
                .flat_map(|group| group.record_ids.iter().copied())
                .collect();
            report.removed = self
                .store
                .delete_where(subject, &|record: &WatchRecord| {
                    record.id.map_or(false, |id| doomed.contains(&id))
                })
                .await?;
        }

        info!(
            operation = "cleanup_duplicates",
            subject = %subject,
            dry_run,
            groups = report.groups.len(),
            candidates = report.candidate_count(),
            removed = report.removed,
            "Duplicate cleanup finished"
        );
        Ok(report)
    }

    /// Asks the catalog about every remote id of the subject. Ids the catalog
    /// no longer resolves are reported; with `fix_stale` their records lose
    /// the remote and series ids but are kept.
    pub async fn validate_remote_ids(&self, subject: &str, fix_stale: bool) -> Result<ValidationReport, SyncError> {
        let records = self.store.records_for_subject(subject).await?;
        let mut report = ValidationReport {
            checked: 0,
            valid: 0,
            stale: Vec::new(),
            errors: 0,
            fixed: 0,
        };

        for record in &records {
            let (Some(record_id), Some(remote_id)) = (record.id, record.remote_id.as_deref()) else {
                continue;
            };
            report.checked += 1;

            match self.catalog.get_item(subject, remote_id).await {
                Ok(_) => report.valid += 1,
                Err(e) if e.is_not_found() => {
                    let error = SyncError::RemoteNotFound(remote_id.to_string());
                    info!(record_id = %record_id, title = %record.title, "{}", error);
                    report.stale.push(StaleRecord {
                        record_id,
                        remote_id: remote_id.to_string(),
                        title: record.title.clone(),
                    });
                }
                Err(e) => {
                    warn!(record_id = %record_id, remote_id = %remote_id, error = %e, "Remote id probe failed");
                    report.errors += 1;
                }
            }
        }

        if fix_stale && !report.stale.is_empty() {
            let mut transaction = LedgerTransaction::new();
            for stale in &report.stale {
                transaction.clear_remote_ids(stale.record_id);
            }
            self.store.commit(transaction).await?;
            report.fixed = report.stale.len();
        }

        info!(
            operation = "validate_remote_ids",
            subject = %subject,
            checked = report.checked,
            valid = report.valid,
            stale = report.stale.len(),
            errors = report.errors,
            fixed = report.fixed,
            "Remote id validation finished"
        );
        Ok(report)
    }
}
