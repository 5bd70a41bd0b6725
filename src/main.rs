//! # salesdesk CLI
//!
//! The `salesdesk` binary initializes the account database, runs the HTTP
//! service, and exposes the catalog, chat and analytics pipelines for
//! one-off use from a shell.
//!
//! ## Usage
//!
//! ```bash
//! salesdesk --config ./config/salesdesk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `salesdesk init` | Create the account table and seed the admin account |
//! | `salesdesk serve` | Start the HTTP server |
//! | `salesdesk ask "<question>"` | Run the chat pipeline once |
//! | `salesdesk import <file>` | Replace the catalog from a spreadsheet |
//! | `salesdesk analyze` | Regenerate the chat analytics report |
//! | `salesdesk users` | List accounts |
//!
//! Secrets (`OPENAI_API_KEY`, `WOLFRAM_APP_ID`, `SALESDESK_ADMIN_PASSWORD`)
//! are read from the environment; a `.env` file in the working directory is
//! loaded first when present. Log verbosity follows `SALESDESK_LOG`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use salesdesk::accounts::Accounts;
use salesdesk::assistant::Assistant;
use salesdesk::catalog::CatalogStore;
use salesdesk::chat_log::ChatLog;
use salesdesk::config::{self, Config};
use salesdesk::llm::OpenAiChat;
use salesdesk::{analytics, db, ingest, knowledge, migrate, server};

#[derive(Parser)]
#[command(
    name = "salesdesk",
    about = "salesdesk: product catalog, grounded sales assistant and admin tools",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/salesdesk.toml`. See
    /// `config/salesdesk.example.toml` for every option.
    #[arg(long, global = true, default_value = "./config/salesdesk.toml")]
    config: PathBuf,

    /// Log debug events (overridden by `SALESDESK_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the account database.
    ///
    /// Creates the SQLite file and the `users` table, and seeds the admin
    /// account from `SALESDESK_ADMIN_PASSWORD` (or `admin.seed_password`).
    /// Safe to run repeatedly.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Answer one question through the full lookup chain and print the
    /// source and reply. The exchange is appended to the chat log.
    Ask {
        question: String,

        /// Username recorded in the chat log.
        #[arg(long)]
        username: Option<String>,
    },

    /// Replace the active catalog from a spreadsheet (csv, tsv, xlsx, xls, ods).
    Import { file: PathBuf },

    /// Compute the chat analytics report and write it to `logs.analysis_path`.
    Analyze,

    /// List registered accounts.
    Users,
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_env("SALESDESK_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

async fn run_ask(cfg: &Config, question: &str, username: Option<&str>) -> anyhow::Result<()> {
    let question = question.trim();
    if question.is_empty() {
        anyhow::bail!("question must not be empty");
    }

    let assistant = Assistant::new(
        Arc::new(CatalogStore::load(&cfg.catalog)),
        knowledge::from_config(&cfg.knowledge)?,
        Arc::new(OpenAiChat::new(&cfg.llm)?),
        Arc::new(ChatLog::open(cfg.logs.chat_log.clone())),
        &cfg.llm,
    );
    let reply = assistant.answer(question, username).await?;

    println!("[{}] {}", reply.source, reply.reply);
    if reply.degraded {
        anyhow::bail!("language model unavailable; fallback reply logged");
    }
    Ok(())
}

async fn run_import(cfg: &Config, file: &std::path::Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(file)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", file.display(), e))?;
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.csv");

    let catalog = CatalogStore::load(&cfg.catalog);
    let summary =
        ingest::import_sheet(&catalog, &cfg.uploads.backup_dir(), file_name, &bytes).await?;

    println!("import {}", file.display());
    println!("  products: {}", summary.total);
    println!("  backup: {}", summary.backup);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool, &cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ask { question, username } => {
            run_ask(&cfg, &question, username.as_deref()).await?;
        }
        Commands::Import { file } => {
            run_import(&cfg, &file).await?;
        }
        Commands::Analyze => {
            let report =
                analytics::run_analysis(&cfg.logs.chat_log, &cfg.logs.analysis_path).await?;
            println!("analyze {}", cfg.logs.chat_log.display());
            println!("  messages: {}", report.total_messages);
            if let Some(user) = &report.most_active_user {
                println!("  most active user: {} ({})", user.username, user.count);
            }
            println!("  report: {}", cfg.logs.analysis_path.display());
        }
        Commands::Users => {
            let pool = db::connect(&cfg).await?;
            let accounts = Accounts::new(pool, cfg.admin.seed_username.clone());
            for user in accounts.all().await? {
                let tag = if accounts.is_privileged(&user.username) {
                    " (admin)"
                } else {
                    ""
                };
                println!("{:>4}  {}{}", user.id, user.username, tag);
            }
        }
    }

    Ok(())
}
