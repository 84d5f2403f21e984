use clap::{ArgAction, Parser, Subcommand};
use commands::{clear, config, daemon, ledger, ratings, sync};
use watch_sync_config::PathManager;
use watch_sync_models::MediaKind;

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "playledger")]
#[command(about = "PlayLedger - Keep a watch ledger of everything played on your media server")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile playback into the ledger (one-time sync)
    #[command(long_about = "Refresh library snapshots and reconcile played and in-progress items into the watch ledger. Without --subject every user on the server that passes the allow-list is synced.")]
    Sync {
        /// Sync only this user id
        #[arg(long)]
        subject: Option<String>,
    },
    /// Run in the foreground with the periodic sync timer
    #[command(long_about = "Run PlayLedger as a long-lived process that syncs every sync.interval_minutes. A sync is started on startup when sync.sync_on_startup is set, unless --no-startup-sync is given.")]
    Daemon {
        /// Skip the initial sync on startup
        #[arg(long, action = ArgAction::SetTrue)]
        no_startup_sync: bool,

        /// Write logs to the rotating daemon log file instead of stderr
        #[arg(long, action = ArgAction::SetTrue)]
        log_file: bool,
    },
    /// Show per-series progress for a user
    Progress {
        #[arg(long)]
        subject: String,
    },
    /// Show the sync status of a user
    Status {
        #[arg(long)]
        subject: String,
    },
    /// Show a user's libraries
    Libraries {
        #[arg(long)]
        subject: String,

        /// Fetch fresh counts from the server instead of the cached snapshot
        #[arg(long, action = ArgAction::SetTrue)]
        refresh: bool,
    },
    /// Look up external ratings (cached for the configured TTL)
    Rating {
        /// Provider id, e.g. tt0113277
        #[arg(long, conflicts_with = "title")]
        id: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        year: Option<i32>,

        /// Look up a series instead of a movie
        #[arg(long, action = ArgAction::SetTrue)]
        series: bool,

        /// Secondary (TMDB) id to store alongside the ratings
        #[arg(long)]
        secondary_id: Option<String>,
    },
    /// Search the rating provider by title
    Search {
        query: String,

        #[arg(long, action = ArgAction::SetTrue)]
        series: bool,

        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Show rating provider key usage for today
    Providers,
    /// Remove duplicate series records left behind by re-added shows
    #[command(long_about = "Find series that appear under more than one remote series id and delete the remote-sync records filed under the older ids. Runs as a dry run unless --apply is given.")]
    Cleanup {
        #[arg(long)]
        subject: String,

        /// Delete the duplicates instead of listing them
        #[arg(long, action = ArgAction::SetTrue)]
        apply: bool,
    },
    /// Check that recorded remote ids still resolve on the server
    Validate {
        #[arg(long)]
        subject: String,

        /// Clear remote ids that no longer resolve so the next sync can re-attach them
        #[arg(long, action = ArgAction::SetTrue)]
        fix: bool,
    },
    /// Manage configuration and credentials
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
    /// Delete the ledger, credentials or both
    Clear {
        /// Delete everything
        #[arg(long, action = ArgAction::SetTrue)]
        all: bool,

        /// Delete the ledger snapshot (watch records, libraries, rating cache)
        #[arg(long, action = ArgAction::SetTrue)]
        ledger: bool,

        /// Delete stored credentials
        #[arg(long, action = ArgAction::SetTrue)]
        credentials: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration (masks secrets)
    Show {
        /// Show secrets unmasked
        #[arg(long, action = ArgAction::SetTrue)]
        full: bool,
    },
    /// Write a default configuration for a server
    Init {
        #[arg(long)]
        server_url: String,

        /// Overwrite an existing configuration
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },
    /// Store API keys in the credentials file
    SetKeys {
        /// Media server API key
        #[arg(long)]
        catalog_key: Option<String>,

        /// Rating provider keys, comma separated, in rotation order
        #[arg(long, value_delimiter = ',')]
        rating_keys: Option<Vec<String>>,
    },
}

fn media_kind(series: bool) -> MediaKind {
    if series {
        MediaKind::Episode
    } else {
        MediaKind::Movie
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let log_file = match &cli.command {
        Commands::Daemon { log_file: true, .. } => Some(PathManager::default().daemon_log_file()),
        _ => None,
    };
    logging::init_logging(cli.verbose, cli.quiet, log_file)
        .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

    let output = output::Output::new(cli.output, cli.quiet);

    match cli.command {
        Commands::Sync { subject } => sync::run_sync(subject, &output).await,
        Commands::Daemon { no_startup_sync, .. } => daemon::run_daemon(no_startup_sync, &output).await,
        Commands::Progress { subject } => ledger::run_progress(&subject, &output).await,
        Commands::Status { subject } => ledger::run_status(&subject, &output).await,
        Commands::Libraries { subject, refresh } => ledger::run_libraries(&subject, refresh, &output).await,
        Commands::Rating {
            id,
            title,
            year,
            series,
            secondary_id,
        } => ratings::run_rating(id, title, year, media_kind(series), secondary_id, &output).await,
        Commands::Search { query, series, page } => {
            ratings::run_search(&query, media_kind(series), page, &output).await
        }
        Commands::Providers => ratings::run_providers(&output).await,
        Commands::Cleanup { subject, apply } => ledger::run_cleanup(&subject, !apply, &output).await,
        Commands::Validate { subject, fix } => ledger::run_validate(&subject, fix, &output).await,
        Commands::Config { cmd } => config::run_config(cmd, &output),
        Commands::Clear { all, ledger, credentials } => clear::run_clear(all, ledger, credentials, &output),
    }
}
