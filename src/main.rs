use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use attest_chat::chatbot::ChatReply;
use attest_chat::context::AppContext;
use attest_chat::session::{JsonSessionStore, SessionStore};
use attest_core::{AttestConfig, AttestError, DocumentMetadata, OutputFormat, ScoredChunk};
use attest_retrieval::chunk_store::ChunkStore;
use attest_retrieval::index::IndexStats;
use attest_retrieval::ingest::{IngestReport, Ingestor};
use attest_retrieval::store::IndexStore;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = ".attest.toml";

#[derive(Parser)]
#[command(
    name = "attest",
    version,
    about = "Governed document retrieval for grounded chat answers",
    long_about = "Attest answers questions from approved documents only.\n\n\
                   Documents are checked against their approval record, split into\n\
                   overlapping word windows, embedded, and indexed. Questions retrieve\n\
                   the closest chunks, optionally scoped to one topic, and a chat model\n\
                   answers from that context.\n\n\
                   Examples:\n  \
                     attest init                                   Create .attest.toml\n  \
                     attest ingest leave.md --type HR --approved --approved-by hr-lead\n  \
                     attest build                                  Rebuild the default index\n  \
                     attest search 'parental leave' --topic HR     Nearest approved chunks\n  \
                     attest chat 'How long is parental leave?'     Grounded answer\n  \
                     attest doctor                                 Check setup and environment"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .attest.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable tables and summaries (default)\n  \
                         json      Machine-readable JSON\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable verbose (debug) logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest approved documents into the chunk store
    #[command(long_about = "Ingest approved documents into the chunk store.\n\n\
        Each file is checked against its approval record, split into overlapping\n\
        word windows, and saved under the data directory. Unapproved documents are\n\
        rejected before anything is written. Supports .txt and .md files.\n\n\
        Examples:\n  attest ingest handbook.md --type HR --approved --approved-by j.doe\n  \
        attest ingest a.txt b.txt --type Engineering --approved --approved-by lead")]
    Ingest {
        /// Files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Document title (default: file name)
        #[arg(long)]
        title: Option<String>,

        /// Topic label used to scope retrieval
        #[arg(long = "type")]
        document_type: String,

        /// Document version
        #[arg(long, default_value = "1.0")]
        doc_version: String,

        /// Mark the documents as approved
        #[arg(long)]
        approved: bool,

        /// Who approved the documents
        #[arg(long, default_value = "")]
        approved_by: String,

        /// Document id (default: a new UUID; single file only)
        #[arg(long)]
        id: Option<String>,
    },
    /// Rebuild a vector index from the chunk store
    #[command(long_about = "Rebuild a vector index from the chunk store.\n\n\
        Embeds every approved chunk and replaces the named index atomically.\n\
        Requires an embedding API key.\n\n\
        Examples:\n  attest build\n  attest build --store hr --topic HR")]
    Build {
        /// Index name (default: retrieval.store_name)
        #[arg(long)]
        store: Option<String>,

        /// Only index chunks of this document type
        #[arg(long)]
        topic: Option<String>,
    },
    /// Retrieve the chunks closest to a query
    #[command(long_about = "Retrieve the chunks closest to a query.\n\n\
        Scores are squared Euclidean distances: lower is closer.\n\n\
        Examples:\n  attest search 'expense deadline'\n  attest search 'leave' --topic HR -k 3")]
    Search {
        /// Natural language query
        query: String,

        /// Number of results (default: retrieval.top_k)
        #[arg(short, long)]
        k: Option<usize>,

        /// Restrict results to one document type
        #[arg(long)]
        topic: Option<String>,

        /// Index name (default: retrieval.store_name)
        #[arg(long)]
        store: Option<String>,
    },
    /// Ask a question grounded in the indexed documents
    #[command(long_about = "Ask a question grounded in the indexed documents.\n\n\
        Without a message, starts an interactive session on stdin (type 'exit' to quit).\n\
        Sessions are saved and can be resumed with --session.\n\n\
        Examples:\n  attest chat 'How many vacation days do I get?' --topic HR\n  \
        attest chat --session 6f0c...")]
    Chat {
        /// Message to send (omit for interactive mode)
        message: Option<String>,

        /// Session to continue (default: a new session)
        #[arg(long)]
        session: Option<String>,

        /// Topic filter, remembered by the session
        #[arg(long)]
        topic: Option<String>,
    },
    /// Show the transcript of a saved chat session
    History {
        /// Session id
        session: String,

        /// Show only the most recent messages
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List the document types of approved chunks
    Topics,
    /// Show vector index statistics
    Stats {
        /// Index name (default: all indexes)
        #[arg(long)]
        store: Option<String>,
    },
    /// Create a default .attest.toml configuration file
    Init,
    /// Check setup and environment
    Doctor,
    /// Generate shell completions
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");

    if use_color {
        println!("\x1b[1mattest\x1b[0m v{version} \u{00b7} answers from approved documents only\n");

        println!("Quick start:");
        println!("  \x1b[36mattest init\x1b[0m                   Create a .attest.toml config file");
        println!("  \x1b[36mattest ingest FILE --type T --approved --approved-by NAME\x1b[0m");
        println!("  \x1b[36mattest build\x1b[0m                  Build the vector index");
        println!("  \x1b[36mattest chat 'question'\x1b[0m        Ask a grounded question\n");

        println!("All commands:");
        println!("  \x1b[32mingest\x1b[0m   Validate, chunk and store documents");
        println!("  \x1b[32mbuild\x1b[0m    Rebuild a vector index");
        println!("  \x1b[32msearch\x1b[0m   Nearest chunks for a query");
        println!("  \x1b[32mchat\x1b[0m     Retrieval-augmented chat");
        println!("  \x1b[32mhistory\x1b[0m  Saved session transcripts");
        println!("  \x1b[32mtopics\x1b[0m   Available document types");
        println!("  \x1b[32mstats\x1b[0m    Index statistics");
        println!("  \x1b[32mdoctor\x1b[0m   Check your setup and environment");
        println!("  \x1b[32minit\x1b[0m     Create default configuration\n");
    } else {
        println!("attest v{version} - answers from approved documents only\n");

        println!("Quick start:");
        println!("  attest init                   Create a .attest.toml config file");
        println!("  attest ingest FILE --type T --approved --approved-by NAME");
        println!("  attest build                  Build the vector index");
        println!("  attest chat 'question'        Ask a grounded question\n");

        println!("All commands:");
        println!("  ingest   Validate, chunk and store documents");
        println!("  build    Rebuild a vector index");
        println!("  search   Nearest chunks for a query");
        println!("  chat     Retrieval-augmented chat");
        println!("  history  Saved session transcripts");
        println!("  topics   Available document types");
        println!("  stats    Index statistics");
        println!("  doctor   Check your setup and environment");
        println!("  init     Create default configuration\n");
    }

    println!("Run 'attest <command> --help' for details.");
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("warn,attest=debug,attest_core=debug,attest_retrieval=debug,attest_chat=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn spinner(message: &'static str) -> Option<indicatif::ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_style(
        indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Some(pb)
}

fn finish(spinner: Option<indicatif::ProgressBar>, message: &'static str) {
    if let Some(pb) = spinner {
        pb.finish_with_message(message);
    }
}

fn preview(text: &str, words: usize) -> String {
    let mut head: Vec<&str> = text.split_whitespace().take(words + 1).collect();
    if head.len() > words {
        head.truncate(words);
        format!("{} ...", head.join(" "))
    } else {
        head.join(" ")
    }
}

fn print_ingest(reports: &[IngestReport], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(reports).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!("| Document | Characters | Chunks |\n|---|---|---|");
            for r in reports {
                println!("| `{}` | {} | {} |", r.document_id, r.text_length, r.chunk_count);
            }
        }
        OutputFormat::Text => {
            for r in reports {
                println!(
                    "Ingested {} ({} chars, {} chunks)",
                    r.document_id, r.text_length, r.chunk_count
                );
            }
            println!("Run 'attest build' to update the index.");
        }
    }
    Ok(())
}

fn print_search(results: &[ScoredChunk], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            if results.is_empty() {
                println!("No results found.");
                return Ok(());
            }
            println!("# Search Results\n");
            for (i, r) in results.iter().enumerate() {
                let meta = &r.chunk.metadata;
                println!(
                    "## {}. {} [{}] (score: {:.4})\n\n`{}`\n\n> {}\n",
                    i + 1,
                    meta.title,
                    meta.document_type,
                    r.score,
                    r.chunk.chunk_id,
                    preview(&r.chunk.text, 60),
                );
            }
        }
        OutputFormat::Text => {
            if results.is_empty() {
                println!("No results found.");
                return Ok(());
            }
            for (i, r) in results.iter().enumerate() {
                let meta = &r.chunk.metadata;
                println!(
                    "{}. {} [{}] {} (score: {:.4})",
                    i + 1,
                    meta.title,
                    meta.document_type,
                    r.chunk.chunk_id,
                    r.score,
                );
                println!("   {}\n", preview(&r.chunk.text, 30));
            }
        }
    }
    Ok(())
}

fn print_reply(reply: &ChatReply, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(reply).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!("{}\n", reply.message);
            if !reply.sources.is_empty() {
                println!("**Sources:**\n");
                for s in &reply.sources {
                    println!(
                        "- {} [{}] `{}` ({:.4})",
                        s.document_title, s.document_type, s.chunk_id, s.similarity_score
                    );
                }
            }
        }
        OutputFormat::Text => {
            println!("{}\n", reply.message);
            if !reply.sources.is_empty() {
                let titles: Vec<String> = reply
                    .sources
                    .iter()
                    .map(|s| format!("{} [{}]", s.document_title, s.document_type))
                    .collect();
                println!("Sources: {}", titles.join(", "));
            }
        }
    }
    Ok(())
}

fn print_stats(stats: &[(String, IndexStats)], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json: serde_json::Map<String, serde_json::Value> = stats
                .iter()
                .map(|(name, s)| serde_json::to_value(s).map(|v| (name.clone(), v)))
                .collect::<std::result::Result<_, serde_json::Error>>()
                .into_diagnostic()?;
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!("| Store | Vectors | Chunks | Dimension |\n|---|---|---|---|");
            for (name, s) in stats {
                println!(
                    "| {name} | {} | {} | {} |",
                    s.total_vectors, s.total_chunks, s.dimension
                );
            }
        }
        OutputFormat::Text => {
            if stats.is_empty() {
                println!("No indexes built yet. Run 'attest build'.");
            }
            for (name, s) in stats {
                println!(
                    "{name:<16} {} vectors, {} chunks, dimension {}",
                    s.total_vectors, s.total_chunks, s.dimension
                );
            }
        }
    }
    Ok(())
}

async fn run_chat(
    ctx: &AppContext,
    message: Option<String>,
    session: Option<String>,
    topic: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let engine = ctx.chat_engine();
    let session_id = session.unwrap_or_else(|| ctx.sessions().create_session());

    if let Some(message) = message {
        let pb = spinner("Thinking...");
        let reply = engine
            .chat(&session_id, &message, topic.as_deref())
            .await
            .inspect_err(|_| {
                if let Some(pb) = &pb {
                    pb.finish_with_message("Failed");
                }
            })?;
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        print_reply(&reply, format)?;
        eprintln!("session: {session_id}");
        return Ok(());
    }

    eprintln!("session: {session_id} (type 'exit' to quit)");
    let stdin = std::io::stdin();
    let mut topic = topic;
    loop {
        eprint!("> ");
        std::io::stderr().flush().into_diagnostic()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).into_diagnostic()? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        // an explicit topic applies to the first turn; the session remembers it
        match engine.chat(&session_id, line, topic.take().as_deref()).await {
            Ok(reply) => print_reply(&reply, format)?,
            Err(e) if e.is_transient() => eprintln!("error: {e}"),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self) -> &'static str {
        match self.status {
            "pass" => "\u{2713}",
            "fail" => "\u{2717}",
            _ => "~",
        }
    }

    fn colored_symbol(&self) -> String {
        match self.status {
            "pass" => "\x1b[32m\u{2713}\x1b[0m".into(),
            "fail" => "\x1b[31m\u{2717}\x1b[0m".into(),
            _ => "\x1b[33m~\x1b[0m".into(),
        }
    }
}

fn run_doctor(config: &AttestConfig, config_path: &Path, format: OutputFormat, use_color: bool) -> Result<()> {
    let mut checks: Vec<CheckResult> = Vec::new();

    // 1. Config file
    if config_path.exists() {
        checks.push(CheckResult::pass(
            "config_file",
            format!("{} found", config_path.display()),
        ));
    } else {
        checks.push(CheckResult::fail(
            "config_file",
            format!("{} not found", config_path.display()),
            "run 'attest init' to create a default config",
        ));
    }
    match config.validate() {
        Ok(()) => checks.push(CheckResult::pass(
            "chunking",
            format!(
                "{} words, {} overlap",
                config.chunking.chunk_size, config.chunking.overlap
            ),
        )),
        Err(e) => checks.push(CheckResult::fail(
            "chunking",
            e.to_string(),
            "fix the [chunking] section in .attest.toml",
        )),
    }

    // 2. API keys
    let env_key = std::env::var("OPENAI_API_KEY").is_ok();
    checks.push(CheckResult::info(
        "llm_model",
        format!(
            "{} at {}",
            config.llm.model,
            config.llm.base_url.as_deref().unwrap_or("api.openai.com")
        ),
    ));
    if config.llm.api_key.is_some() || env_key {
        checks.push(CheckResult::pass("llm_api_key", "configured"));
    } else {
        checks.push(CheckResult::fail(
            "llm_api_key",
            "OPENAI_API_KEY not set",
            "export OPENAI_API_KEY=... or set api_key under [llm]",
        ));
    }
    if config.embedding.api_key.is_some() || env_key {
        checks.push(CheckResult::pass(
            "embedding_api_key",
            format!("configured (model: {})", config.embedding.model),
        ));
    } else {
        checks.push(CheckResult::fail(
            "embedding_api_key",
            "OPENAI_API_KEY not set",
            "export OPENAI_API_KEY=... or set api_key under [embedding]",
        ));
    }

    // 3. Corpus
    let chunks = ChunkStore::new(config.storage.chunks_dir());
    match chunks.document_ids() {
        Ok(ids) if !ids.is_empty() => {
            checks.push(CheckResult::pass("documents", format!("{} ingested", ids.len())));
        }
        Ok(_) => checks.push(CheckResult::fail(
            "documents",
            "no documents ingested",
            "run 'attest ingest FILE --type T --approved --approved-by NAME'",
        )),
        Err(e) => checks.push(CheckResult::fail(
            "documents",
            e.to_string(),
            format!("check permissions on {}", chunks.dir().display()),
        )),
    }

    // 4. Index
    let store_name = &config.retrieval.store_name;
    let store = IndexStore::new(config.storage.index_dir());
    match store.load(store_name) {
        Ok(Some(index)) => {
            let stats = index.stats();
            let detail = format!(
                "'{store_name}': {} vectors, dimension {}",
                stats.total_vectors, stats.dimension
            );
            if stats.dimension == config.embedding.dimensions {
                checks.push(CheckResult::pass("vector_index", detail));
            } else {
                checks.push(CheckResult::fail(
                    "vector_index",
                    detail,
                    format!(
                        "embedding.dimensions is {}; run 'attest build' to rebuild",
                        config.embedding.dimensions
                    ),
                ));
            }
        }
        Ok(None) => checks.push(CheckResult::fail(
            "vector_index",
            format!("'{store_name}' not built"),
            "run 'attest build'",
        )),
        Err(e) => checks.push(CheckResult::fail(
            "vector_index",
            e.to_string(),
            "run 'attest build' to replace the artifact",
        )),
    }

    // Output
    let version = env!("CARGO_PKG_VERSION");
    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "version": version,
                "checks": checks,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        _ => {
            println!("Attest v{version} Environment Check\n");

            for check in &checks {
                let sym = if use_color {
                    check.colored_symbol()
                } else {
                    check.symbol().to_string()
                };
                let label = check.name.replace('_', " ");
                println!("  {sym} {label:<20} {}", check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }

            let passed = checks.iter().filter(|c| c.status == "pass").count();
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            let info = checks.iter().filter(|c| c.status == "info").count();
            println!("\n{passed} checks passed, {failed} failed, {info} info");
        }
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# Attest Configuration

[llm]
# OpenAI-compatible chat completions endpoint
# base_url = "https://api.openai.com/v1"
# model = "gpt-4o"
# api_key = "..."            # falls back to OPENAI_API_KEY
# temperature = 0.7
# max_tokens = 800

[embedding]
# base_url = "https://api.openai.com/v1"
# model = "text-embedding-3-small"
# dimensions = 1536
# batch_size = 16

[chunking]
# chunk_size = 500           # words per chunk
# overlap = 100              # words shared by consecutive chunks

[retrieval]
# top_k = 5
# topic_overfetch = 3        # candidates fetched per result when filtering by topic
# store_name = "default"

[storage]
# data_dir = "data"

[chat]
# k = 3                      # context chunks per answer
# max_history = 10           # previous messages sent to the model
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let config = if config_path.exists() {
        AttestConfig::from_file(&config_path)?
    } else if cli.config.is_some() {
        miette::bail!("config file not found: {}", config_path.display());
    } else {
        AttestConfig::default()
    };
    tracing::debug!(config = %config_path.display(), format = %cli.format, "configuration loaded");

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    match cli.command {
        None => {
            print_welcome(use_color);
            return Ok(());
        }
        Some(Command::Ingest {
            ref files,
            ref title,
            ref document_type,
            ref doc_version,
            approved,
            ref approved_by,
            ref id,
        }) => {
            if id.is_some() && files.len() > 1 {
                miette::bail!("--id can only be used with a single file");
            }
            config.validate()?;
            let ingestor = Ingestor::new(
                std::sync::Arc::new(ChunkStore::new(config.storage.chunks_dir())),
                config.chunking,
            );

            let mut reports = Vec::with_capacity(files.len());
            for path in files {
                let name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("untitled");
                let mut metadata = DocumentMetadata::new(
                    title.clone().unwrap_or_else(|| name.to_string()),
                    document_type.as_str(),
                    doc_version.as_str(),
                    approved,
                    approved_by.as_str(),
                );
                metadata.document_id = id.clone();
                reports.push(ingestor.ingest_file(path, metadata)?);
            }
            print_ingest(&reports, cli.format)?;
        }
        Some(Command::Build {
            ref store,
            ref topic,
        }) => {
            let ctx = AppContext::from_config(config.clone())?;
            let store_name = store.as_deref().unwrap_or(&config.retrieval.store_name);

            let pb = spinner("Embedding and indexing chunks...");
            let stats = ctx
                .index_builder()
                .build(store_name, true, topic.as_deref())
                .await
                .inspect_err(|_| {
                    if let Some(pb) = &pb {
                        pb.finish_with_message("Failed");
                    }
                })?;
            finish(pb, "Done");

            print_stats(&[(store_name.to_string(), stats)], cli.format)?;
        }
        Some(Command::Search {
            ref query,
            k,
            ref topic,
            ref store,
        }) => {
            let ctx = AppContext::from_config(config.clone())?;
            let store_name = store.as_deref().unwrap_or(&config.retrieval.store_name);
            let k = k.unwrap_or(config.retrieval.top_k);

            let results = ctx
                .retriever()
                .retrieve(store_name, query, k, topic.as_deref())
                .await?;
            print_search(&results, cli.format)?;
        }
        Some(Command::Chat {
            message,
            session,
            topic,
        }) => {
            let ctx = AppContext::from_config(config)?;
            let outcome = run_chat(&ctx, message, session, topic, cli.format).await;
            ctx.shutdown();
            outcome?;
        }
        Some(Command::History { ref session, limit }) => {
            let store = JsonSessionStore::new(config.storage.sessions_dir());
            let transcript = store
                .load(session)?
                .ok_or_else(|| AttestError::SessionNotFound(session.clone()))?;
            let messages = transcript.recent(limit.unwrap_or(transcript.messages.len()));

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(messages).into_diagnostic()?);
                }
                OutputFormat::Markdown => {
                    for m in messages {
                        println!("**{:?}** ({})\n\n{}\n", m.role, m.timestamp.to_rfc3339(), m.content);
                    }
                }
                OutputFormat::Text => {
                    if let Some(topic) = &transcript.selected_topic {
                        println!("topic: {topic}\n");
                    }
                    for m in messages {
                        println!(
                            "[{}] {:?}: {}",
                            m.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            m.role,
                            m.content
                        );
                    }
                }
            }
        }
        Some(Command::Topics) => {
            let topics = ChunkStore::new(config.storage.chunks_dir()).available_topics()?;
            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&topics).into_diagnostic()?);
                }
                OutputFormat::Markdown => {
                    for t in &topics {
                        println!("- {t}");
                    }
                }
                OutputFormat::Text => {
                    if topics.is_empty() {
                        println!("No approved documents ingested yet.");
                    }
                    for t in &topics {
                        println!("{t}");
                    }
                }
            }
        }
        Some(Command::Stats { ref store }) => {
            let index_store = IndexStore::new(config.storage.index_dir());
            let names = match store {
                Some(name) => vec![name.clone()],
                None => index_store.list()?,
            };
            let mut stats = Vec::with_capacity(names.len());
            for name in names {
                let index = index_store
                    .load(&name)?
                    .ok_or_else(|| AttestError::IndexNotFound(name.clone()))?;
                stats.push((name, index.stats()));
            }
            print_stats(&stats, cli.format)?;
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Some(Command::Doctor) => {
            run_doctor(&config, &config_path, cli.format, use_color)?;
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "attest", &mut std::io::stdout());
        }
    }

    Ok(())
}
