use super::AppContext;
use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use owo_colors::OwoColorize;
use watch_sync_models::SyncState;

fn format_time(time: Option<chrono::DateTime<chrono::Utc>>) -> String {
    time.map_or("never".to_string(), |t| t.format("%Y-%m-%d %H:%M UTC").to_string())
}

pub async fn run_progress(subject: &str, output: &Output) -> Result<()> {
    let app = AppContext::load()?;
    let shows = app
        .ledger
        .get_shows_progress(subject)
        .await
        .map_err(|e| eyre!("Failed to compute progress: {}", e))?;

    output.data(&shows);
    if shows.is_empty() {
        output.info("No series watched yet");
        return Ok(());
    }
    let rows = shows
        .iter()
        .map(|show| {
            vec![
                show.series_name.clone(),
                format!("{}/{}", show.watched_episodes, show.total_episodes),
                format!("{:.1}%", show.progress),
                show.next_episode.as_ref().map_or("-".to_string(), |next| {
                    format!("S{:02}E{:02} {}", next.season_number, next.episode_number, next.name)
                }),
                format_time(show.last_watched),
            ]
        })
        .collect();
    output.table(&["Series", "Watched", "Progress", "Next", "Last watched"], rows);
    Ok(())
}

pub async fn run_status(subject: &str, output: &Output) -> Result<()> {
    let app = AppContext::load()?;
    let status = app
        .ledger
        .get_sync_status(subject)
        .await
        .map_err(|e| eyre!("Failed to read sync status: {}", e))?;

    output.data(&status);
    if output.is_human() {
        let state = match status.state {
            SyncState::Idle => status.state.to_string().green().to_string(),
            SyncState::Running => status.state.to_string().yellow().to_string(),
            SyncState::Error => status.state.to_string().red().to_string(),
        };
        output.println(format!("Subject:      {}", status.subject));
        output.println(format!("State:        {}", state));
        output.println(format!("Last success: {}", format_time(status.last_success_at)));
        if let Some(error) = &status.last_error {
            output.println(format!("Last error:   {}", error));
        }
    }
    Ok(())
}

pub async fn run_libraries(subject: &str, refresh: bool, output: &Output) -> Result<()> {
    let app = AppContext::load()?;
    let rows = if refresh {
        app.ledger.refresh_libraries(subject).await
    } else {
        app.ledger.cached_libraries(subject).await
    }
    .map_err(|e| eyre!("Failed to load libraries: {}", e))?;

    output.data(&rows);
    if rows.is_empty() {
        output.info("No library snapshot yet. Run with --refresh or sync first");
        return Ok(());
    }
    let table_rows = rows
        .iter()
        .map(|row| {
            vec![
                row.name.clone(),
                row.collection_type.clone().unwrap_or_else(|| "-".to_string()),
                row.item_count.to_string(),
                format_time(Some(row.snapshot_at)),
            ]
        })
        .collect();
    output.table(&["Library", "Type", "Items", "Snapshot"], table_rows);
    Ok(())
}

pub async fn run_cleanup(subject: &str, dry_run: bool, output: &Output) -> Result<()> {
    let app = AppContext::load()?;
    let report = app
        .ledger
        .cleanup_duplicates(subject, dry_run)
        .await
        .map_err(|e| eyre!("Duplicate cleanup failed: {}", e))?;

    output.data(&report);
    if report.groups.is_empty() {
        output.success("No duplicate series records found");
        return Ok(());
    }
    let rows = report
        .groups
        .iter()
        .map(|group| {
            vec![
                group.series_name.clone(),
                group.kept_series_id.clone(),
                group.removed_series_ids.join(", "),
                group.record_ids.len().to_string(),
            ]
        })
        .collect();
    output.table(&["Series", "Kept id", "Duplicate ids", "Records"], rows);
    if dry_run {
        output.info(format!(
            "{} records would be removed. Re-run with --apply to delete them",
            report.candidate_count()
        ));
    } else {
        output.success(format!("Removed {} duplicate records", report.removed));
    }
    Ok(())
}

pub async fn run_validate(subject: &str, fix: bool, output: &Output) -> Result<()> {
    let app = AppContext::load()?;
    let report = app
        .ledger
        .validate_remote_ids(subject, fix)
        .await
        .map_err(|e| eyre!("Remote id validation failed: {}", e))?;

    output.data(&report);
    let rows = report
        .stale
        .iter()
        .map(|stale| vec![stale.record_id.to_string(), stale.remote_id.clone(), stale.title.clone()])
        .collect();
    output.table(&["Record", "Remote id", "Title"], rows);
    output.info(format!(
        "Checked {} records: {} valid, {} stale, {} lookups failed",
        report.checked,
        report.valid,
        report.stale.len(),
        report.errors
    ));
    if fix {
        output.success(format!("Cleared remote ids on {} records", report.fixed));
    } else if !report.stale.is_empty() {
        output.info("Re-run with --fix to clear stale remote ids");
    }
    Ok(())
}
