//! contextbuddy - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use contextbuddy::{
    cli::{display, parse_filters, Args, ChatSession, Commands, Config, Verbosity},
    errors::EngineError,
    index::{LocalEmbedder, QdrantIndex},
    models::OllamaModel,
    rag::{AnswerRequest, ContextEngine},
    session::{ConversationStore, FileConversationStore},
    types::{ConversationTurn, Document},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Documents embedded and written per upsert call
const INDEX_BATCH_SIZE: usize = 32;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let verbosity = args.verbosity();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(verbosity.log_filter())),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(args.config.clone())?;

    match args.command {
        Commands::Ask {
            query,
            session,
            top_k,
            filters,
            no_save,
            no_cache,
            topic,
        } => {
            let options = AskOptions {
                session,
                top_k,
                filters,
                no_save,
                no_cache,
                topic,
            };
            run_ask(&config, verbosity, query, options).await?;
        }
        Commands::Chat {
            session,
            top_k,
            topic,
        } => {
            run_chat(&config, verbosity, session, top_k, topic).await?;
        }
        Commands::Index { file } => {
            run_index(&config, verbosity, &file).await?;
        }
        Commands::Sessions { show, delete } => {
            run_sessions(&config, show, delete)?;
        }
        Commands::Config => {
            show_config(&config, args.config.as_deref())?;
        }
    }

    Ok(())
}

/// Wire the local embedder, Qdrant and Ollama into an engine
async fn build_engine(config: &Config, verbosity: Verbosity) -> Result<Arc<ContextEngine>> {
    let pb = display::spinner("Loading embedding model...", verbosity.show_progress());
    let model_id = config.index.embedding_model.clone();
    let embedder = tokio::task::spawn_blocking(move || LocalEmbedder::new(&model_id))
        .await
        .context("Embedding model loader panicked")??;
    pb.finish_and_clear();

    // Lazy client: an unreachable index degrades each answer instead of failing startup
    let index = QdrantIndex::new(
        &config.index.url,
        &config.index.collection,
        Arc::new(embedder),
    )?;

    let model = OllamaModel::with_config(
        &config.model.base_url,
        &config.model.name,
        config.model.max_input_chars,
        config.model_timeout(),
    )?;
    if !model.health_check().await {
        warn!(url = %config.model.base_url, "Ollama is not responding; start it with: ollama serve");
    }

    Ok(Arc::new(ContextEngine::new(
        Arc::new(index),
        Arc::new(model),
        config.engine_settings(),
    )))
}

/// Flags of the `ask` subcommand
struct AskOptions {
    session: Option<String>,
    top_k: Option<usize>,
    filters: Vec<String>,
    no_save: bool,
    no_cache: bool,
    topic: Option<String>,
}

async fn run_ask(
    config: &Config,
    verbosity: Verbosity,
    query: String,
    options: AskOptions,
) -> Result<()> {
    let AskOptions {
        session,
        top_k,
        filters,
        no_save,
        no_cache,
        topic,
    } = options;

    let filters = parse_filters(&filters).map_err(anyhow::Error::msg)?;
    let store = FileConversationStore::new(config.sessions_dir())?;
    let history = match &session {
        Some(id) => store.read(id)?,
        None => Vec::new(),
    };

    let engine = build_engine(config, verbosity).await?;

    let mut request = AnswerRequest::new(query.clone())
        .with_history(history)
        .with_filters(filters);
    request.top_k = top_k;
    request.bypass_cache = no_cache;

    let pb = display::spinner("Thinking...", verbosity.show_progress());
    let result = engine.answer_request(request).await;
    pb.finish_and_clear();

    let answer = match result {
        Ok(answer) => answer,
        Err(e) => {
            display::show_error(&e.to_string());
            if let EngineError::ContextDoesNotFit { warnings } = &e {
                display::show_warnings(warnings);
            }
            std::process::exit(1);
        }
    };

    display::show_answer(&answer, verbosity.show_details());

    if !no_save {
        let session_id = session.unwrap_or_else(FileConversationStore::new_session_id);
        if let Some(topic) = &topic {
            store.set_topic(&session_id, topic)?;
        }
        store.append(&session_id, ConversationTurn::user(query))?;
        store.append(&session_id, ConversationTurn::assistant(answer.response))?;
        if verbosity.show_progress() {
            println!("{} {}", "Session:".dimmed(), session_id.dimmed());
        }
    }

    Ok(())
}

async fn run_chat(
    config: &Config,
    verbosity: Verbosity,
    session: Option<String>,
    top_k: Option<usize>,
    topic: Option<String>,
) -> Result<()> {
    let store = Arc::new(FileConversationStore::new(config.sessions_dir())?);
    let engine = build_engine(config, verbosity).await?;
    let session_id = session.unwrap_or_else(FileConversationStore::new_session_id);
    if let Some(topic) = &topic {
        store.set_topic(&session_id, topic)?;
    }

    let mut chat = ChatSession::new(engine, store, session_id, top_k, verbosity);
    chat.run().await
}

async fn run_index(config: &Config, verbosity: Verbosity, file: &Path) -> Result<()> {
    let documents = read_documents(file)?;
    if documents.is_empty() {
        println!("{}", "No documents found.".yellow());
        return Ok(());
    }

    let model_id = config.index.embedding_model.clone();
    let embedder = tokio::task::spawn_blocking(move || LocalEmbedder::new(&model_id))
        .await
        .context("Embedding model loader panicked")??;
    let index = QdrantIndex::connect(
        &config.index.url,
        &config.index.collection,
        Arc::new(embedder),
    )
    .await?;

    let pb = if verbosity.show_progress() {
        ProgressBar::new(documents.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    if let Ok(style) = ProgressStyle::default_bar()
        .template("Indexing [{bar:40.cyan/blue}] {pos}/{len} | ETA: {eta}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }

    let mut written = 0;
    for batch in documents.chunks(INDEX_BATCH_SIZE) {
        written += index.upsert(batch).await?;
        pb.inc(batch.len() as u64);
    }
    pb.finish_and_clear();

    println!(
        "{} {} documents into '{}' ({} total)",
        "Indexed".green(),
        written,
        index.collection(),
        index.count().await?
    );
    Ok(())
}

/// Parse a JSON Lines file of documents, skipping blank lines
fn read_documents(file: &Path) -> Result<Vec<Document>> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<Document>(line)
                .with_context(|| format!("Invalid document on line {}", n + 1))
        })
        .collect()
}

fn run_sessions(config: &Config, show: Option<String>, delete: Option<String>) -> Result<()> {
    let store = FileConversationStore::new(config.sessions_dir())?;

    if let Some(id) = delete {
        if store.delete_session(&id)? {
            println!("{} {}", "Deleted session".yellow(), id);
        } else {
            println!("{} {}", "No such session:".red(), id);
        }
        return Ok(());
    }

    if let Some(id) = show {
        let turns = store.read(&id)?;
        display::show_turns(&turns, turns.len());
        return Ok(());
    }

    display::show_sessions(&store.list_sessions()?);
    Ok(())
}

fn show_config(config: &Config, explicit: Option<&Path>) -> Result<()> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(Config::default_path);
    if let Some(path) = path {
        println!("{} {}\n", "Config file:".bold().cyan(), path.display());
    }
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    println!("{}", contents);
    Ok(())
}
