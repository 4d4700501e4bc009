//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};

use meetnews_core::{Broker, EnrichmentService, reset_for_retry, start_broker};
use meetnews_shared::{AppConfig, NewMeeting, init_config, load_config, load_config_from};
use meetnews_storage::Storage;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// MeetNews: attach related news to meeting records.
#[derive(Parser)]
#[command(
    name = "meetnews",
    version,
    about = "Find, rank, and summarize news related to stored meeting records.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.meetnews/meetnews.toml.
    #[arg(long, env = "MEETNEWS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overriding `[database] path`.
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Items kept after ranking, overriding `[ranking] top_k`.
    #[arg(long, global = true)]
    pub top_k: Option<usize>,

    /// Seconds to wait for ranking, overriding `[ranking] delegate_timeout_secs`.
    #[arg(long, global = true)]
    pub delegate_timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Store a meeting record and enrich it with news.
    Add {
        /// Owner of the record.
        #[arg(short, long)]
        user: i64,

        /// Meeting title.
        #[arg(short, long)]
        title: String,

        /// Summary the news is ranked against.
        #[arg(short, long)]
        summary: String,

        /// Search keywords, comma-separated.
        #[arg(short, long, value_delimiter = ',', required = true)]
        keywords: Vec<String>,

        /// File holding the original transcript.
        #[arg(long)]
        transcript: Option<PathBuf>,

        /// Only store the record; a running `meetnews worker` enriches it.
        #[arg(long)]
        detach: bool,
    },

    /// Enrich an existing record with news.
    Enrich {
        /// Record id.
        id: i64,

        #[arg(short, long)]
        user: i64,
    },

    /// Clear a record's news and enrich it again.
    Retry {
        /// Record id.
        id: i64,

        #[arg(short, long)]
        user: i64,

        /// Only clear the news; a running `meetnews worker` enriches it.
        #[arg(long)]
        detach: bool,
    },

    /// Delete a record.
    Delete {
        /// Record id.
        id: i64,

        #[arg(short, long)]
        user: i64,
    },

    /// Print a stored record as JSON.
    Show {
        /// Record id.
        id: i64,

        #[arg(short, long)]
        user: i64,
    },

    /// List an owner's records, newest first.
    List {
        #[arg(short, long)]
        user: i64,
    },

    /// Run both worker pools, enriching pending records until Ctrl-C.
    Worker,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "meetnews=info",
        1 => "meetnews=debug",
        _ => "meetnews=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config {
        action: ConfigAction::Init,
    } = &cli.command
    {
        return cmd_config_init();
    }

    let mut config = resolve_config(cli.config.as_ref())?;
    apply_overrides(&mut config, &cli);

    match cli.command {
        Command::Add {
            user,
            title,
            summary,
            keywords,
            transcript,
            detach,
        } => {
            let meeting = new_meeting(user, title, summary, keywords, transcript)?;
            cmd_add(&config, meeting, detach).await
        }
        Command::Enrich { id, user } => cmd_enrich(&config, id, user).await,
        Command::Retry { id, user, detach } => cmd_retry(&config, id, user, detach).await,
        Command::Delete { id, user } => cmd_delete(&config, id, user).await,
        Command::Show { id, user } => cmd_show(&config, id, user).await,
        Command::List { user } => cmd_list(&config, user).await,
        Command::Worker => cmd_worker(&config).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

fn resolve_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

/// Apply command-line overrides on top of file values.
fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }
    if let Some(top_k) = cli.top_k {
        config.ranking.top_k = top_k;
    }
    if let Some(secs) = cli.delegate_timeout {
        config.ranking.delegate_timeout_secs = secs;
    }
}

async fn open_storage(config: &AppConfig) -> Result<Arc<Storage>> {
    let path = config.database.resolved_path()?;
    Ok(Arc::new(Storage::open(&path).await?))
}

/// Trim keywords and drop empty entries.
fn clean_keywords(raw: Vec<String>) -> Vec<String> {
    raw.into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Start the pools and the service that feeds them.
///
/// Callers must `shutdown` the broker so queued work drains before exit.
fn start_service(config: &AppConfig, storage: Arc<Storage>) -> Result<(Broker, EnrichmentService)> {
    let broker = start_broker(config, storage.clone())?;
    let service = EnrichmentService::new(broker.dispatcher(), storage);
    Ok((broker, service))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

/// Validate `add` arguments into a record to store.
fn new_meeting(
    user: i64,
    title: String,
    summary: String,
    keywords: Vec<String>,
    transcript: Option<PathBuf>,
) -> Result<NewMeeting> {
    let keywords = clean_keywords(keywords);
    if keywords.is_empty() {
        return Err(eyre!("at least one non-empty keyword is required"));
    }
    if summary.trim().is_empty() {
        return Err(eyre!("summary must not be empty"));
    }

    let original_meeting = match transcript {
        Some(path) => std::fs::read_to_string(&path)
            .map_err(|e| eyre!("cannot read transcript '{}': {e}", path.display()))?,
        None => String::new(),
    };

    Ok(NewMeeting {
        user_id: user,
        title,
        original_meeting,
        summary_meeting: summary,
        keywords,
    })
}

async fn cmd_add(config: &AppConfig, meeting: NewMeeting, detach: bool) -> Result<()> {
    let storage = open_storage(config).await?;

    if detach {
        let id = storage.insert_meeting(&meeting).await?;
        info!(id, user = meeting.user_id, "meeting stored, pending");
        println!("Stored meeting {id}; a running worker will enrich it.");
        return Ok(());
    }

    let (broker, service) = start_service(config, storage)?;
    let submitted = service.add_meeting(&meeting).await;
    broker.shutdown().await;
    let (id, _) = submitted?;

    println!("Stored meeting {id}; news enrichment finished.");
    Ok(())
}

async fn cmd_enrich(config: &AppConfig, id: i64, user: i64) -> Result<()> {
    let storage = open_storage(config).await?;
    let (broker, service) = start_service(config, storage)?;
    let submitted = service.enrich_existing(id, user).await;
    broker.shutdown().await;
    submitted?;

    println!("News enrichment finished for meeting {id}.");
    Ok(())
}

async fn cmd_retry(config: &AppConfig, id: i64, user: i64, detach: bool) -> Result<()> {
    let storage = open_storage(config).await?;

    if detach {
        reset_for_retry(&storage, id, user).await?;
        println!("News cleared for meeting {id}; a running worker will enrich it.");
        return Ok(());
    }

    let (broker, service) = start_service(config, storage)?;
    let submitted = service.retry_news_analysis(id, user).await;
    broker.shutdown().await;
    submitted?;

    println!("News analysis retried for meeting {id}.");
    Ok(())
}

async fn cmd_delete(config: &AppConfig, id: i64, user: i64) -> Result<()> {
    let storage = open_storage(config).await?;
    if !storage.delete_meeting(id, user).await? {
        return Err(eyre!("meeting {id} not found for user {user}"));
    }
    info!(id, user, "meeting deleted");
    println!("Deleted meeting {id}.");
    Ok(())
}

async fn cmd_show(config: &AppConfig, id: i64, user: i64) -> Result<()> {
    let storage = open_storage(config).await?;
    let record = storage
        .get_meeting(id, user)
        .await?
        .ok_or_else(|| eyre!("meeting {id} not found for user {user}"))?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn cmd_list(config: &AppConfig, user: i64) -> Result<()> {
    let storage = open_storage(config).await?;
    let rows = storage.list_meetings(user).await?;

    if rows.is_empty() {
        println!("No meetings for user {user}.");
        return Ok(());
    }
    for row in rows {
        println!(
            "{:>6}  {}  {}",
            row.id,
            row.created_dt.format("%Y-%m-%d %H:%M"),
            row.title
        );
    }
    Ok(())
}

async fn cmd_worker(config: &AppConfig) -> Result<()> {
    let storage = open_storage(config).await?;
    let (broker, service) = start_service(config, storage)?;
    let interval = Duration::from_secs(config.queues.poll_interval_secs.max(1));
    println!("Workers running. Press Ctrl-C to stop.");

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
        }
    };
    service
        .poll_until(interval, config.queues.poll_batch_size.max(1), ctrl_c)
        .await;

    broker.shutdown().await;
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
