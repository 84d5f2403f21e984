use super::AppContext;
use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use watch_sync_core::RatingRequest;
use watch_sync_models::MediaKind;

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or("-".to_string(), |v| v.to_string())
}

pub async fn run_rating(
    id: Option<String>,
    title: Option<String>,
    year: Option<i32>,
    kind: MediaKind,
    secondary_id: Option<String>,
    output: &Output,
) -> Result<()> {
    let request = RatingRequest {
        rating_id: id,
        secondary_id,
        title,
        year,
        kind,
    };
    let app = AppContext::load()?;
    let bundle = app
        .ledger
        .get_rating(&request)
        .await
        .map_err(|e| eyre!("Rating lookup failed: {}", e))?;

    output.data(&bundle);
    let r = &bundle.ratings;
    output.table(
        &["Field", "Value"],
        vec![
            vec!["Title".to_string(), or_dash(r.title.as_ref())],
            vec!["Year".to_string(), or_dash(r.year)],
            vec!["IMDb id".to_string(), or_dash(r.imdb_id.as_ref())],
            vec!["IMDb rating".to_string(), or_dash(r.imdb_rating)],
            vec!["IMDb votes".to_string(), or_dash(r.imdb_votes)],
            vec!["Rotten Tomatoes".to_string(), or_dash(r.rotten_tomatoes.map(|v| format!("{}%", v)))],
            vec!["Metacritic".to_string(), or_dash(r.metacritic)],
            vec!["Rated".to_string(), or_dash(r.rated.as_ref())],
            vec!["Source".to_string(), (if bundle.is_cached() { "cache" } else { "provider" }).to_string()],
        ],
    );
    Ok(())
}

pub async fn run_search(query: &str, kind: MediaKind, page: u32, output: &Output) -> Result<()> {
    let app = AppContext::load()?;
    let results = app
        .ledger
        .search_ratings(query, kind, page)
        .await
        .map_err(|e| eyre!("Search failed: {}", e))?;

    output.data(&results);
    let rows = results
        .results
        .iter()
        .map(|r| vec![r.title.clone(), or_dash(r.year.as_ref()), r.imdb_id.clone(), r.kind.clone()])
        .collect();
    output.table(&["Title", "Year", "IMDb id", "Type"], rows);
    output.info(format!("Page {}, {} results in total", page.max(1), results.total));
    Ok(())
}

pub async fn run_providers(output: &Output) -> Result<()> {
    let app = AppContext::load()?;
    let status = app.ledger.get_provider_status();

    output.data(&status);
    if status.total_keys == 0 {
        output.warn("No rating provider keys configured. Run `playledger config set-keys --rating-keys <k1,k2>`");
        return Ok(());
    }
    let rows = status
        .keys
        .iter()
        .map(|key| {
            vec![
                format!("{}{}", key.index, if key.is_current { " *" } else { "" }),
                key.key_hint.clone(),
                key.used.to_string(),
                key.remaining.to_string(),
                key.errors.to_string(),
                (if key.exhausted { "exhausted" } else { "ok" }).to_string(),
            ]
        })
        .collect();
    output.table(&["#", "Key", "Used", "Remaining", "Errors", "State"], rows);
    output.info(format!(
        "{} requests left today across {} keys (counters reset at 00:00 UTC)",
        status.total_remaining, status.total_keys
    ));
    Ok(())
}
