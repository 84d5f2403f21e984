//! Single-flight sync runs, started on demand or by the interval timer.
//!
//! A run must hold the [`RunToken`]. A trigger that finds it taken fails
//! with [`SyncError::AlreadyRunning`] before any catalog call is made. With a
//! lock file configured the token also excludes runs in other processes, so
//! a one-off `sync` cannot overlap the daemon.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};
use watch_sync_config::SyncConfig;
use watch_sync_models::SyncStatusRecord;
use watch_sync_sources::CatalogClient;

use crate::clock::Clock;
use crate::error::{StoreError, SyncError};
use crate::reconcile::{HistoryReconciler, ReconcileOptions, ReconcileOutcome};
use crate::snapshot::LibrarySnapshotRefresher;
use crate::store::{FileLock, LedgerStore};

/// Proof of owning the only running sync. Released on drop.
pub struct RunToken {
    _guard: OwnedMutexGuard<()>,
    _file: Option<FileLock>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubjectReport {
    pub subject: String,
    pub outcome: Option<ReconcileOutcome>,
    pub libraries: Option<usize>,
    pub error: Option<String>,
}

impl SubjectReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub subjects: Vec<SubjectReport>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.subjects.iter().filter(|s| s.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.subjects.len() - self.succeeded()
    }
}

/// A sync started in the background
#[derive(Debug)]
pub struct SyncHandle(JoinHandle<Result<BatchReport, SyncError>>);

impl SyncHandle {
    pub async fn wait(self) -> Result<BatchReport, SyncError> {
        self.0
            .await
            .map_err(|e| SyncError::TaskAborted(e.to_string()))?
    }
}

struct SchedulerInner {
    catalog: Arc<dyn CatalogClient>,
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    reconciler: HistoryReconciler,
    refresher: LibrarySnapshotRefresher,
    config: SyncConfig,
    run_lock: Arc<Mutex<()>>,
}

#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<SchedulerInner>,
    lock_file: Option<PathBuf>,
}

impl SyncScheduler {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        let reconciler = HistoryReconciler::new(
            catalog.clone(),
            store.clone(),
            clock.clone(),
            ReconcileOptions::from(&config),
        );
        let refresher = LibrarySnapshotRefresher::new(catalog.clone(), store.clone(), clock.clone());
        Self {
            inner: Arc::new(SchedulerInner {
                catalog,
                store,
                clock,
                reconciler,
                refresher,
                config,
                run_lock: Arc::new(Mutex::new(())),
            }),
            lock_file: None,
        }
    }

    /// Shares the run token with every process locking the same file
    pub fn with_lock_file(mut self, path: PathBuf) -> Self {
        self.lock_file = Some(path);
        self
    }

    pub fn try_acquire(&self) -> Result<RunToken, SyncError> {
        let guard = self
            .inner
            .run_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| SyncError::AlreadyRunning)?;
        let file = match &self.lock_file {
            Some(path) => match FileLock::try_acquire(path).map_err(StoreError::from)? {
                Some(lock) => Some(lock),
                None => {
                    info!(operation = "sync_lock", path = %path.display(), "Sync running in another process");
                    return Err(SyncError::AlreadyRunning);
                }
            },
            None => None,
        };
        Ok(RunToken {
            _guard: guard,
            _file: file,
        })
    }

    pub fn is_running(&self) -> bool {
        matches!(self.try_acquire(), Err(SyncError::AlreadyRunning))
    }

    /// Starts a batch in the background and returns once the token is held.
    /// `None` syncs every allowed subject.
    pub fn trigger(&self, subject: Option<String>) -> Result<SyncHandle, SyncError> {
        let token = self.try_acquire()?;
        let inner = self.inner.clone();
        Ok(SyncHandle(tokio::spawn(async move {
            let _token = token;
            inner.run_batch(subject.as_deref()).await
        })))
    }

    /// Runs a batch on the current task
    pub async fn run_now(&self, subject: Option<&str>) -> Result<BatchReport, SyncError> {
        let _token = self.try_acquire()?;
        self.inner.run_batch(subject).await
    }

    /// One reconciliation pass for `subject`, excluded from overlapping
    /// scheduled runs
    pub async fn reconcile_exclusive(&self, subject: &str) -> Result<ReconcileOutcome, SyncError> {
        let _token = self.try_acquire()?;
        self.inner.reconciler.reconcile(subject).await
    }

    /// Spawns the interval loop. A zero interval disables it. Ticks that
    /// find a run in progress are skipped.
    pub fn start_timer(&self) -> Option<JoinHandle<()>> {
        let minutes = self.inner.config.interval_minutes;
        if minutes == 0 {
            info!(operation = "sync_timer", "Periodic sync disabled");
            return None;
        }

        let period = Duration::from_secs(minutes * 60);
        let scheduler = self.clone();
        info!(operation = "sync_timer", interval_minutes = minutes, "Periodic sync enabled");
        Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let token = match scheduler.try_acquire() {
                    Ok(token) => token,
                    Err(_) => {
                        info!(operation = "scheduled_sync_skipped", "Previous sync still running, skipping tick");
                        continue;
                    }
                };
                info!(operation = "scheduled_sync_start", "Starting scheduled sync");
                match scheduler.inner.run_batch(None).await {
                    Ok(report) => info!(
                        operation = "scheduled_sync_complete",
                        succeeded = report.succeeded(),
                        failed = report.failed(),
                        "Scheduled sync completed"
                    ),
                    Err(e) => error!(operation = "scheduled_sync_error", error = %e, "Scheduled sync failed"),
                }
                drop(token);
            }
        }))
    }
}

impl SchedulerInner {
    async fn subjects(&self, subject: Option<&str>) -> Result<Vec<String>, SyncError> {
        if let Some(subject) = subject {
            return Ok(vec![subject.to_string()]);
        }
        let users = self
            .catalog
            .list_subjects()
            .await
            .map_err(SyncError::RemoteUnavailable)?;
        Ok(users
            .into_iter()
            .filter(|user| self.config.is_subject_allowed(&user.id, &user.name))
            .map(|user| user.id)
            .collect())
    }

    async fn run_batch(&self, subject: Option<&str>) -> Result<BatchReport, SyncError> {
        let started_at = self.clock.now();
        let subjects = self.subjects(subject).await?;
        info!(operation = "sync_batch", subjects = subjects.len(), "Starting sync batch");

        let mut reports = Vec::with_capacity(subjects.len());
        for subject in subjects {
            reports.push(self.sync_subject(&subject).await);
        }

        let report = BatchReport {
            started_at,
            finished_at: self.clock.now(),
            subjects: reports,
        };
        info!(
            operation = "sync_batch",
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Sync batch finished"
        );
        Ok(report)
    }

    /// Failures stay with the subject; the batch carries on
    async fn sync_subject(&self, subject: &str) -> SubjectReport {
        let status = match self.store.sync_status(subject).await {
            Ok(status) => status.unwrap_or_else(|| SyncStatusRecord::idle(subject)),
            Err(e) => {
                warn!(subject = %subject, error = %e, "Failed to read sync status");
                SyncStatusRecord::idle(subject)
            }
        };
        self.put_status(status.clone().start()).await;

        let libraries = match self.refresher.refresh(subject).await {
            Ok(rows) => Some(rows.len()),
            Err(e) => {
                warn!(subject = %subject, error = %e, "Library refresh failed");
                None
            }
        };

        match self.reconciler.reconcile(subject).await {
            Ok(outcome) => {
                self.put_status(status.succeed(self.clock.now())).await;
                SubjectReport {
                    subject: subject.to_string(),
                    outcome: Some(outcome),
                    libraries,
                    error: None,
                }
            }
            Err(e) => {
                error!(operation = "sync_subject", subject = %subject, error = %e, "Subject sync failed");
                self.put_status(status.fail(e.to_string())).await;
                SubjectReport {
                    subject: subject.to_string(),
                    outcome: None,
                    libraries,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn put_status(&self, status: SyncStatusRecord) {
        let subject = status.subject.clone();
        if let Err(e) = self.store.put_sync_status(status).await {
            warn!(subject = %subject, error = %e, "Failed to save sync status");
        }
    }
}
