use super::AppContext;
use crate::output::Output;
use color_eyre::Result;
use watch_sync_core::BatchReport;

pub async fn run_sync(subject: Option<String>, output: &Output) -> Result<()> {
    tracing::debug!("Sync command started");
    let app = AppContext::load()?;

    let report = app
        .ledger
        .scheduler()
        .run_now(subject.as_deref())
        .await
        .map_err(|e| {
            if e.is_already_running() {
                color_eyre::eyre::eyre!("A sync is already running (is the daemon syncing?). Try again once it finishes")
            } else {
                color_eyre::eyre::eyre!("Sync failed: {}", e)
            }
        })?;

    print_report(&report, output);
    if report.failed() > 0 {
        return Err(color_eyre::eyre::eyre!("{} of {} subjects failed to sync", report.failed(), report.subjects.len()));
    }
    Ok(())
}

pub fn print_report(report: &BatchReport, output: &Output) {
    output.data(report);
    let rows = report
        .subjects
        .iter()
        .map(|s| match (&s.outcome, &s.error) {
            (Some(o), _) => vec![
                s.subject.clone(),
                o.added.to_string(),
                o.updated.to_string(),
                o.unchanged.to_string(),
                o.skipped.to_string(),
                o.degraded.to_string(),
                o.reattached.to_string(),
                s.libraries.map_or("-".to_string(), |n| n.to_string()),
            ],
            (None, error) => vec![
                s.subject.clone(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                error.clone().unwrap_or_default(),
            ],
        })
        .collect();
    output.table(
        &["Subject", "Added", "Updated", "Unchanged", "Skipped", "Degraded", "Re-attached", "Libraries"],
        rows,
    );
    let elapsed = report.finished_at - report.started_at;
    if report.failed() == 0 {
        output.success(format!(
            "Synced {} subjects in {:.1}s",
            report.subjects.len(),
            elapsed.num_milliseconds() as f64 / 1000.0
        ));
    } else {
        output.warn(format!("{} succeeded, {} failed", report.succeeded(), report.failed()));
    }
}
