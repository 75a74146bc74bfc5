use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

use recall_core::{OutputFormat, RecallConfig};
use recall_engine::indexer::Indexer;
use recall_engine::search::SearchEngine;
use recall_engine::store::IndexStore;

#[derive(Parser)]
#[command(
    name = "recall",
    version,
    about = "Local-first hybrid search over your notes and documents",
    long_about = "Recall indexes plain-text documents into a local SQLite database and\n\
                   searches them with a hybrid of semantic similarity and keyword matching.\n\
                   Everything runs on your machine; the default embedding provider needs\n\
                   no API key and no network.\n\n\
                   Examples:\n  \
                     recall init                     Create a .recall.toml config file\n  \
                     recall index ./notes            Index a directory of documents\n  \
                     recall search 'key rotation'    Search the index\n  \
                     recall status                   Show index statistics"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .recall.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text  Human-readable summaries (default)\n  \
                         json  Machine-readable JSON with camelCase keys"
    )]
    output: OutputFormat,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Index a file or directory of documents
    #[command(long_about = "Index a file or directory of documents.\n\n\
        Files are chunked, embedded, and stored in .recall/index.db under the\n\
        indexed path. Unchanged files (by content hash) are skipped, so repeat\n\
        runs are cheap. Files that vanished since the last run are dropped\n\
        from search.\n\n\
        Examples:\n  recall index ./notes\n  recall index ./docs --patterns '*.md,*.rst'\n  recall index ./notes --force")]
    Index {
        /// File or directory to index (default: current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Comma-separated file patterns (default: from config)
        #[arg(long)]
        patterns: Option<String>,

        /// Re-embed files even when their content is unchanged
        #[arg(long)]
        force: bool,
    },
    /// Search the index with a natural-language query
    #[command(long_about = "Search the index with a natural-language query.\n\n\
        Runs both a vector-similarity path and a keyword path, fuses the\n\
        normalized scores, and returns the best chunks with file and line\n\
        attribution.\n\n\
        Examples:\n  recall search 'how do we rotate keys'\n  recall search 'AES-256' --limit 5 --min-score 0.5")]
    Search {
        /// Search query
        query: String,

        /// Directory whose index to search (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Maximum results to return (default: from config)
        #[arg(long)]
        limit: Option<usize>,

        /// Minimum hybrid score to include (default: from config)
        #[arg(long)]
        min_score: Option<f64>,
    },
    /// Show index statistics
    #[command(long_about = "Show index statistics.\n\n\
        Reports tracked files, chunk count, database size, and which vector\n\
        search backend is active.\n\n\
        Example:\n  recall status --path ./notes")]
    Status {
        /// Directory whose index to inspect (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
    /// Create a default .recall.toml configuration file
    #[command(long_about = "Create a default .recall.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .recall.toml already exists.")]
    Init,
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
        println!("\x1b[1m\x1b[33m◆\x1b[0m \x1b[1mrecall\x1b[0m v{version} — local-first hybrid search for your documents\n");

        println!("Quick start:");
        println!("  \x1b[36mrecall init\x1b[0m                   Create a .recall.toml config file");
        println!("  \x1b[36mrecall index ./notes\x1b[0m          Index a directory of documents");
        println!("  \x1b[36mrecall search 'key rotation'\x1b[0m  Search the index\n");

        println!("All commands:");
        println!("  \x1b[32mindex\x1b[0m   Chunk, embed, and store documents (incremental)");
        println!("  \x1b[32msearch\x1b[0m  Hybrid semantic + keyword search");
        println!("  \x1b[32mstatus\x1b[0m  Index statistics and active vector backend");
        println!("  \x1b[32minit\x1b[0m    Create default configuration\n");
    } else {
        println!("recall v{version} — local-first hybrid search for your documents\n");

        println!("Quick start:");
        println!("  recall init                   Create a .recall.toml config file");
        println!("  recall index ./notes          Index a directory of documents");
        println!("  recall search 'key rotation'  Search the index\n");

        println!("All commands:");
        println!("  index   Chunk, embed, and store documents (incremental)");
        println!("  search  Hybrid semantic + keyword search");
        println!("  status  Index statistics and active vector backend");
        println!("  init    Create default configuration\n");
    }

    println!("Run 'recall <command> --help' for details.");
}

const DEFAULT_CONFIG: &str = r#"# Recall Configuration

[embedding]
# provider = "local"          # "local" needs no key; anything else is a
#                             # Voyage-style HTTP API
# model = "voyage-3-lite"
# api_key = ""                # or set RECALL_API_KEY
# dimensions = 384            # changing this requires a full re-index

[index]
# chunk_size_tokens = 400
# overlap_tokens = 80
# patterns = ["*.md", "*.txt"]

[search]
# limit = 10
# min_score = 0.35
# vector_weight = 0.7
# keyword_weight = 0.3
# keyword_norm_default = 50.0
"#;

fn index_db_path(root: &std::path::Path) -> PathBuf {
    if root.is_dir() {
        root.join(".recall/index.db")
    } else {
        // A file, or a path that vanished: the index lives next to it.
        root.parent()
            .unwrap_or(std::path::Path::new("."))
            .join(".recall/index.db")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RecallConfig::from_file(path)?,
        None => {
            let default_path = std::path::Path::new(".recall.toml");
            if default_path.exists() {
                RecallConfig::from_file(default_path)?
            } else {
                RecallConfig::default()
            }
        }
    };

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
        Some(Command::Index {
            ref path,
            ref patterns,
            force,
        }) => {
            // Hint: remote provider configured but no key available
            if config.embedding.provider != "local"
                && config.embedding.api_key.is_none()
                && std::env::var("RECALL_API_KEY").is_err()
            {
                miette::bail!(miette::miette!(
                    help = "Set RECALL_API_KEY or add api_key in your .recall.toml under [embedding]",
                    "No API key configured for embedding provider '{}'",
                    config.embedding.provider
                ));
            }

            let provider = recall_engine::embedding::from_config(&config.embedding)?;
            let store = IndexStore::open(&index_db_path(path), config.embedding.dimensions)?;
            let indexer = Indexer::new(&store, provider, &config.index);

            let patterns: Vec<String> = match patterns {
                Some(list) => list
                    .split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect(),
                None => config.index.patterns.clone(),
            };

            // A path that is a file, or that vanished since it was indexed,
            // goes through the single-file path so it can be tombstoned.
            let summary = if !path.is_dir() {
                let mut summary = recall_core::IndexSummary::default();
                match indexer.index_file(path, force).await {
                    Ok(outcome) if outcome.skipped => summary.files_skipped += 1,
                    Ok(outcome) => {
                        summary.files_indexed += 1;
                        summary.chunks_created += outcome.chunks_written;
                    }
                    Err(e) => summary.errors.push(recall_core::IndexFileError {
                        path: path.display().to_string(),
                        message: e.to_string(),
                    }),
                }
                summary
            } else {
                let is_tty = std::io::stderr().is_terminal();
                let spinner = if is_tty {
                    let pb = indicatif::ProgressBar::new_spinner();
                    pb.set_style(
                        indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg}")
                            .expect("static template"),
                    );
                    pb.enable_steady_tick(std::time::Duration::from_millis(120));
                    Some(pb)
                } else {
                    None
                };

                let summary = indexer
                    .index_directory(path, &patterns, force, |file| {
                        if let Some(pb) = &spinner {
                            pb.set_message(format!("indexing {}", file.display()));
                        }
                    })
                    .await?;

                if let Some(pb) = spinner {
                    pb.finish_and_clear();
                }
                summary
            };

            match cli.output {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&summary).into_diagnostic()?
                    );
                }
                OutputFormat::Text => {
                    println!(
                        "Indexed {} files ({} chunks), skipped {} unchanged",
                        summary.files_indexed, summary.chunks_created, summary.files_skipped,
                    );
                    if !summary.errors.is_empty() {
                        eprintln!("{} files failed:", summary.errors.len());
                        for err in &summary.errors {
                            eprintln!("  {}: {}", err.path, err.message);
                        }
                    }
                }
            }
        }
        Some(Command::Search {
            ref query,
            ref path,
            limit,
            min_score,
        }) => {
            let db_path = index_db_path(path);
            if !db_path.exists() {
                let target = path.display();
                miette::bail!(miette::miette!(
                    help = "Run 'recall index {target}' first",
                    "No index found at {}",
                    db_path.display()
                ));
            }

            let provider = recall_engine::embedding::from_config(&config.embedding)?;
            let store = IndexStore::open(&db_path, config.embedding.dimensions)?;
            let engine = SearchEngine::new(&store, provider, &config.search);

            let limit = limit.unwrap_or(config.search.limit);
            let min_score = min_score.unwrap_or(config.search.min_score);
            let results = engine.search(query, limit, min_score).await?;

            match cli.output {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&results).into_diagnostic()?
                    );
                }
                OutputFormat::Text => {
                    if results.is_empty() {
                        println!("No results found.");
                    } else {
                        for (i, r) in results.iter().enumerate() {
                            println!(
                                "{}. {}:{}–{} (score: {:.4})",
                                i + 1,
                                r.path,
                                r.start_line,
                                r.end_line,
                                r.hybrid_score,
                            );
                            // Show a snippet preview (first 3 lines)
                            let preview: String = r
                                .text
                                .lines()
                                .take(3)
                                .map(|l| format!("   {l}"))
                                .collect::<Vec<_>>()
                                .join("\n");
                            println!("{preview}\n");
                        }
                    }
                }
            }
        }
        Some(Command::Status { ref path }) => {
            let db_path = index_db_path(path);
            if !db_path.exists() {
                let target = path.display();
                miette::bail!(miette::miette!(
                    help = "Run 'recall index {target}' first",
                    "No index found at {}",
                    db_path.display()
                ));
            }

            let store = IndexStore::open(&db_path, config.embedding.dimensions)?;
            let stats = store.stats()?;

            match cli.output {
                OutputFormat::Json => {
                    let json = serde_json::json!({
                        "totalFiles": stats.total_files,
                        "deletedFiles": stats.deleted_files,
                        "totalChunks": stats.total_chunks,
                        "indexSizeBytes": stats.index_size_bytes,
                        "vectorBackend": store.vector_backend(),
                        "embeddingDimensions": store.dimensions(),
                    });
                    println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
                }
                OutputFormat::Text => {
                    println!("Index: {}", db_path.display());
                    println!("  Files tracked:    {}", stats.total_files);
                    println!("  Files deleted:    {}", stats.deleted_files);
                    println!("  Chunks:           {}", stats.total_chunks);
                    println!("  Size:             {} bytes", stats.index_size_bytes);
                    println!("  Vector backend:   {}", store.vector_backend());
                    println!("  Dimensions:       {}", store.dimensions());
                }
            }
        }
        Some(Command::Init) => {
            let path = std::path::Path::new(".recall.toml");
            if path.exists() {
                miette::bail!(".recall.toml already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created .recall.toml with default configuration");
        }
    }

    Ok(())
}
