//! # ranktrack CLI (`rankt`)
//!
//! The `rankt` binary is the primary interface for ranktrack. It provides
//! commands for database initialization, interactive rank tracking,
//! AI-mode mention checks, scheduled batch refreshes, history readout,
//! and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! rankt --config ./config/ranktrack.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rankt init` | Create the SQLite database and run schema migrations |
//! | `rankt track "<keywords>" --domain <domain>` | Resolve and record rankings |
//! | `rankt ai "<keyword>" --business <name> --domain <domain>` | AI-mode mention check |
//! | `rankt refresh` | Batch pass over every tracked identity |
//! | `rankt history --domain <domain>` | Current snapshots with trend deltas |
//! | `rankt serve` | Start the JSON HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! rankt init
//!
//! # Track two keywords on desktop and mobile
//! rankt track "pizza nyc, best pizza" --domain joes-pizza.com \
//!     --device desktop --device mobile
//!
//! # Track local-pack placement for a storefront
//! rankt track "pizza" --domain joes-pizza.com --device google_local \
//!     --location "New York, NY"
//!
//! # Where does the AI answer mention the business?
//! rankt ai "best pizza in nyc" --business "Joe's Pizza" --domain joes-pizza.com
//!
//! # Refresh every tracked identity (scheduled from cron)
//! rankt refresh
//!
//! # Read back a domain's positions with trend arrows
//! rankt history --domain joes-pizza.com
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ranktrack::ai_mode::{self, AiCheckRequest};
use ranktrack::config;
use ranktrack::history;
use ranktrack::migrate;
use ranktrack::models::{Device, SearchEngine};
use ranktrack::provider::SerpClient;
use ranktrack::refresh;
use ranktrack::server;
use ranktrack::store::SqliteSnapshotStore;
use ranktrack::track::{self, TrackRequest};

/// ranktrack CLI — track where a domain ranks in search results over time.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. The provider API key may instead come from `SERPAPI_API_KEY`.
#[derive(Parser)]
#[command(
    name = "rankt",
    about = "ranktrack — search-rank extraction and trend tracking",
    version,
    long_about = "ranktrack resolves where a domain ranks in Google organic, local, and \
    AI-mode results for tracked keywords, persists one snapshot per identity, and maintains \
    rolling 24h/7d/30d trend baselines for dashboards and reports."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ranktrack.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the snapshots table. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Resolve and record rankings for one or more keywords.
    ///
    /// Keywords may be separated by commas or newlines. Each keyword is
    /// resolved once per requested device; results are stored as one
    /// snapshot per combination and trend baselines roll forward.
    Track {
        /// Keyword list (comma- or newline-separated).
        keywords: String,

        /// Target domain to look for. Any URL form is accepted and
        /// normalized (scheme, `www.`, and case are ignored).
        #[arg(long)]
        domain: String,

        /// Device to resolve for. Repeat for several: desktop, mobile,
        /// google_local. Defaults to desktop.
        #[arg(long = "device", value_name = "DEVICE")]
        devices: Vec<Device>,

        /// Location text appended to the query and sent to the provider.
        #[arg(long)]
        location: Option<String>,

        /// Organic search engine override (ignored by google_local).
        #[arg(long, default_value = "google")]
        engine: SearchEngine,

        /// User the snapshots belong to. Defaults to tracking.default_user.
        #[arg(long)]
        user: Option<String>,
    },

    /// Check whether an AI-mode answer mentions a business or its domain.
    ///
    /// Walks the answer's text blocks, extracts cited domains in reading
    /// order, and falls back to a business-name substring check. A mention
    /// is recorded as a snapshot; silence is reported but not persisted.
    Ai {
        /// Keyword to ask the AI mode about.
        keyword: String,

        /// Business name to look for in the answer text.
        #[arg(long)]
        business: String,

        /// Target domain to look for among cited sources.
        #[arg(long)]
        domain: String,

        /// User the snapshot belongs to. Defaults to tracking.default_user.
        #[arg(long)]
        user: Option<String>,
    },

    /// Refresh every tracked identity in one batch pass.
    ///
    /// Distinct (keyword, domain, device, location) tuples are resolved
    /// once each and fanned out to all users sharing them. Failures are
    /// isolated per tuple. Safe to re-run; meant for cron.
    Refresh,

    /// List a domain's current snapshots with trend deltas.
    History {
        /// Domain whose snapshots to list.
        #[arg(long)]
        domain: String,

        /// Narrow the listing to one keyword.
        #[arg(long)]
        keyword: Option<String>,

        /// User whose snapshots to list. Defaults to tracking.default_user.
        #[arg(long)]
        user: Option<String>,
    },

    /// Start the JSON HTTP server.
    ///
    /// Binds to the address configured in `[server].bind` and exposes the
    /// track/ai/refresh/history operations over HTTP.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ranktrack=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Track {
            keywords,
            domain,
            devices,
            location,
            engine,
            user,
        } => {
            let request = TrackRequest {
                user_id: user.unwrap_or_else(|| cfg.tracking.default_user.clone()),
                keywords,
                domain,
                devices,
                location,
                engine,
            };
            track::run_track(&cfg, request).await?;
        }
        Commands::Ai {
            keyword,
            business,
            domain,
            user,
        } => {
            run_ai(&cfg, keyword, business, domain, user).await?;
        }
        Commands::Refresh => {
            refresh::run_refresh(&cfg).await?;
        }
        Commands::History {
            domain,
            keyword,
            user,
        } => {
            let user = user.unwrap_or_else(|| cfg.tracking.default_user.clone());
            history::run_history(&cfg, &user, &domain, keyword.as_deref()).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

/// Run an AI-mode check and print where the business surfaced.
async fn run_ai(
    cfg: &config::Config,
    keyword: String,
    business: String,
    domain: String,
    user: Option<String>,
) -> Result<()> {
    let pool = ranktrack::db::connect(cfg).await?;
    let store = SqliteSnapshotStore::new(pool.clone());
    let provider = SerpClient::new(&cfg.provider)?;

    let request = AiCheckRequest {
        user_id: user.unwrap_or_else(|| cfg.tracking.default_user.clone()),
        keyword,
        business,
        domain,
    };
    let outcome = ai_mode::check(&provider, &store, &request).await?;

    match outcome.placement.final_position() {
        Some(position) => {
            println!(
                "{} surfaces at position {} in the AI answer for \"{}\"",
                outcome.domain, position, outcome.keyword
            );
            if outcome.placement.domain_position.is_none() {
                println!("  (matched by business name \"{}\", not a cited source)", outcome.business);
            }
            println!("snapshot recorded");
        }
        None => {
            println!(
                "Neither {} nor \"{}\" is mentioned in the AI answer for \"{}\"",
                outcome.domain, outcome.business, outcome.keyword
            );
        }
    }

    pool.close().await;
    Ok(())
}
