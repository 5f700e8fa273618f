//! # ClauseMate CLI (`clausemate`)
//!
//! The `clausemate` binary drives the precedent engine: database setup, case
//! ingestion, retrieval, contract review, chat, and the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! clausemate --config ./config/clausemate.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `clausemate init` | Create the SQLite database and run schema migrations |
//! | `clausemate ingest <file>` | Ingest case records from a JSON file |
//! | `clausemate study` | Ingest recent precedents from the law.go.kr API |
//! | `clausemate search "<query>"` | Show the nearest precedents |
//! | `clausemate review` | Review a contract (text, documents, images) |
//! | `clausemate chat "<question>"` | Ask a precedent-grounded question |
//! | `clausemate stats` | Show index statistics |
//! | `clausemate serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! clausemate init
//! clausemate ingest ./data/real_cases.json
//! clausemate study --keyword 하도급 --keyword 경업금지
//! clausemate study --keyword 근로기준법 --pages 100
//! clausemate search "보증금 반환" --top-k 5
//! clausemate review --doc ./contract.txt --image ./page1.jpg
//! clausemate chat "위약금이 너무 과하면 줄일 수 있나요?"
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use clausemate::sources::{JsonFileSource, LawApiSource};
use clausemate::{chat, config, ingest, logging, migrate, review, search, server, stats};

/// ClauseMate — precedent-grounded contract review for Korean contracts.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/clausemate.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "clausemate",
    about = "ClauseMate — precedent-grounded contract review",
    version,
    long_about = "ClauseMate ingests Korean case law into a vector index, retrieves the \
    precedents closest to a contract or question, and grounds contract reviews and chat \
    answers in them."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/clausemate.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest case records from a JSON file.
    ///
    /// The file holds an array of `{id, title, text, meta: {source, date}}`
    /// objects. Records whose id is already indexed are skipped.
    Ingest {
        /// Path to the JSON case file.
        file: PathBuf,
    },

    /// Ingest recent precedents from the national law-information API.
    ///
    /// Requires `[sources.law_api]` in the config.
    Study {
        /// Keyword to sweep (repeatable). Defaults to the configured list.
        #[arg(long = "keyword")]
        keywords: Vec<String>,

        /// First listing page per keyword (history backfill).
        #[arg(long)]
        start_page: Option<u32>,

        /// Listing pages to walk per keyword; stops early at an empty page.
        #[arg(long)]
        pages: Option<u32>,
    },

    /// Show the precedents nearest to a query.
    Search {
        query: String,

        /// Number of precedents to return.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Review a contract and print the findings.
    Review {
        /// Contract text typed directly.
        #[arg(long)]
        text: Option<String>,

        /// Plain-text document holding contract text (repeatable).
        #[arg(long = "doc")]
        docs: Vec<PathBuf>,

        /// Contract image: jpg, png, webp, or heic (repeatable).
        #[arg(long = "image")]
        images: Vec<PathBuf>,
    },

    /// Ask a question answered with precedent grounding.
    Chat {
        question: String,

        /// Passage the question refers to.
        #[arg(long)]
        context: Option<String>,
    },

    /// Show index statistics.
    Stats,

    /// Start the HTTP API server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { file } => {
            ingest::run_ingest(&cfg, &JsonFileSource::new(file)).await?;
        }
        Commands::Study {
            keywords,
            start_page,
            pages,
        } => {
            let Some(law_api) = cfg.sources.law_api.clone() else {
                anyhow::bail!("study requires [sources.law_api] in the config");
            };
            let source = LawApiSource::new(law_api)?
                .with_keywords(keywords)
                .with_pages(start_page, pages);
            ingest::run_ingest(&cfg, &source).await?;
        }
        Commands::Search { query, top_k } => {
            search::run_search(&cfg, &query, top_k).await?;
        }
        Commands::Review { text, docs, images } => {
            review::run_review(&cfg, text, &docs, &images).await?;
        }
        Commands::Chat { question, context } => {
            chat::run_chat(&cfg, &question, context.as_deref()).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
