//! FinChat CLI: process financial documents and ask questions about them.
//!
//! # Usage
//!
//! ```bash
//! finchat ingest q3-report.pdf
//! finchat ask "What was the revenue growth?"
//! finchat chat AAPL
//! finchat news RELIANCE.NS --json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use finchat_core::config::{
    config_path, load_config, load_config_from, set_catalog_path, CONFIG_FILENAME,
};
use finchat_core::{
    app_data_dir, index_dir, status, Answer, Assistant, Config, ConversationSession, CuratedCatalog,
    Document, IndexRegistry, OllamaClient,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const DEFAULT_SCOPE: &str = "default";

#[derive(Parser)]
#[command(name = "finchat", version)]
#[command(about = "FinChat: grounded answers from financial documents, company data and news")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Custom data directory (default: platform standard location)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show backend status and configuration.
    Status,
    /// Show where FinChat stores its config and indexes.
    DataDir,
    /// Process a document (PDF, DOCX, text or markdown), replacing the scope's index.
    Ingest {
        #[arg(value_name = "PATH")]
        path: PathBuf,
        /// Index to write; separate scopes keep separate documents.
        #[arg(long, default_value = DEFAULT_SCOPE)]
        scope: String,
    },
    /// Ask one question about the processed document.
    Ask {
        question: String,
        #[arg(long, default_value = DEFAULT_SCOPE)]
        scope: String,
    },
    /// Summarise the processed document.
    Summarize {
        #[arg(long, default_value = DEFAULT_SCOPE)]
        scope: String,
        /// Aspect to focus the summary on.
        #[arg(long)]
        focus: Option<String>,
    },
    /// Interactive finance chat about a company (`/reset` clears, `/quit` exits).
    Chat {
        ticker: String,
        /// Also ground answers on this scope's document.
        #[arg(long, default_value = DEFAULT_SCOPE)]
        scope: String,
    },
    /// Neutral analysis of an IPO.
    Ipo {
        name: String,
        /// Extra details such as price band or issue size.
        #[arg(long)]
        details: Option<String>,
    },
    /// Draft a retirement plan from a free-text investor profile.
    Retire { profile: String },
    /// Curated and live news for a ticker, with sentiment.
    News { ticker: String },
    /// Search the curated catalog by ticker or company name.
    Lookup { query: String },
    /// Use a TOML company catalog for curated facts and news.
    SetCatalog {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let data_dir = cli.data_dir.clone();
    let config_file = match &data_dir {
        Some(dir) => Some(dir.join(CONFIG_FILENAME)),
        None => config_path(),
    };
    let config = match &data_dir {
        Some(dir) => load_config_from(&dir.join(CONFIG_FILENAME)),
        None => load_config(),
    };

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Status => {
            println!("FinChat backend");
            println!("  core: {}", status());
            println!("  ollama: {}", config.ollama.base_url);
            println!("  embed model: {}", config.ollama.embed_model);
            println!("  chat model: {}", config.ollama.chat_model);
            if let Err(e) = config.validate() {
                println!("  config: {e}");
            }
        }
        Commands::DataDir => match data_dir.or_else(app_data_dir) {
            Some(p) => println!("{}", p.display()),
            None => eprintln!("Could not determine app data directory."),
        },
        Commands::Ingest { path, scope } => {
            let assistant = build_assistant(&config, data_dir.as_deref(), &scope).await?;
            let document = Document::read(&path)?;
            let report = assistant.process_document(&document).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Processed {} ({} characters) into {} chunk(s), index version {}",
                    report.label, report.char_count, report.chunk_count, report.version
                );
            }
        }
        Commands::Ask { question, scope } => {
            let assistant = build_assistant(&config, data_dir.as_deref(), &scope).await?;
            let mut session = ConversationSession::new();
            let answer = assistant.ask_document(&mut session, &question).await?;
            print_answer(&answer, cli.json)?;
        }
        Commands::Summarize { scope, focus } => {
            let assistant = build_assistant(&config, data_dir.as_deref(), &scope).await?;
            let answer = assistant.summarize_document(focus.as_deref()).await?;
            print_answer(&answer, cli.json)?;
        }
        Commands::Chat { ticker, scope } => {
            let assistant = build_assistant(&config, data_dir.as_deref(), &scope).await?;
            run_chat(&assistant, &ticker, cli.json).await?;
        }
        Commands::Ipo { name, details } => {
            let assistant = build_assistant(&config, data_dir.as_deref(), DEFAULT_SCOPE).await?;
            let answer = assistant.ipo_analysis(&name, details.as_deref()).await?;
            print_answer(&answer, cli.json)?;
        }
        Commands::Retire { profile } => {
            let assistant = build_assistant(&config, data_dir.as_deref(), DEFAULT_SCOPE).await?;
            let answer = assistant.retirement_plan(&profile).await?;
            print_answer(&answer, cli.json)?;
        }
        Commands::News { ticker } => {
            let assistant = build_assistant(&config, data_dir.as_deref(), DEFAULT_SCOPE).await?;
            let analyzed = assistant.analyze_news(&ticker).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&analyzed)?);
            } else if analyzed.is_empty() {
                println!("No news for {ticker}.");
            } else {
                for a in analyzed {
                    let marker = if a.fallback { " (fallback)" } else { "" };
                    println!("[{}{marker}] {}", a.insight.sentiment, a.item.headline);
                    println!("    {}", a.insight.summary);
                }
            }
        }
        Commands::Lookup { query } => {
            let catalog = load_catalog(&config)?;
            let hits = catalog.search(&query);
            if hits.is_empty() {
                println!("No companies match \"{query}\".");
            }
            for (ticker, entry) in hits {
                println!("{ticker:<14} {}  ({}, {})", entry.name, entry.sector, entry.exchange);
            }
        }
        Commands::SetCatalog { path } => {
            let Some(config_file) = config_file else {
                bail!("could not determine app data directory; pass --data-dir");
            };
            let catalog = CuratedCatalog::load(&path)
                .with_context(|| format!("loading catalog {}", path.display()))?;
            let config = set_catalog_path(&config_file, &path)?;
            println!(
                "Catalog set to {} ({} companies)",
                config.catalog_path.unwrap_or_default(),
                catalog.len()
            );
        }
    }

    Ok(())
}

async fn build_assistant(
    config: &Config,
    data_dir: Option<&Path>,
    scope: &str,
) -> Result<Assistant> {
    let ollama = Arc::new(OllamaClient::from_config(&config.ollama)?);
    let index_root = match data_dir {
        Some(dir) => {
            let root = dir.join("indexes");
            std::fs::create_dir_all(&root).with_context(|| format!("creating {}", root.display()))?;
            Some(root)
        }
        None => index_dir(),
    };
    let registry = IndexRegistry::new(ollama.clone(), index_root);
    let index = registry.handle(scope).await;
    let assistant =
        Assistant::new(config.clone(), index, ollama)?.with_catalog(load_catalog(config)?);
    Ok(assistant)
}

fn load_catalog(config: &Config) -> Result<CuratedCatalog> {
    match config.catalog_path() {
        Some(path) => CuratedCatalog::load(&path)
            .with_context(|| format!("loading catalog {}", path.display())),
        None => Ok(CuratedCatalog::default()),
    }
}

fn print_answer(answer: &Answer, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(answer)?);
        return Ok(());
    }
    println!("{}", answer.text.trim());
    if answer.truncated_context {
        eprintln!("note: some context was left out to fit the model's budget");
    }
    Ok(())
}

async fn run_chat(assistant: &Assistant, ticker: &str, json: bool) -> Result<()> {
    if ticker.trim().is_empty() {
        bail!("ticker must not be empty");
    }
    let mut session = ConversationSession::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("Chatting about {ticker}. /reset clears the conversation, /quit exits.");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset();
                eprintln!("(conversation cleared)");
                continue;
            }
            _ => {}
        }
        match assistant.chat(&mut session, ticker, line).await {
            Ok(answer) => print_answer(&answer, json)?,
            Err(e) if e.is_retryable() => eprintln!("error: {e} (try again)"),
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}
