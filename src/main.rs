use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use abstract_search::{evaluate, AppConfig, EmbeddingSearchEngine, EvalQuery, LoggingConfig};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use extract::{ExtractionPipeline, GeminiClient, SlidingWindowLimiter};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "abstract-search")]
#[command(about = "Semantic search and keyphrase extraction over scientific abstracts", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(short, long, global = true, help = "YAML config file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed a corpus and write the caches
    Index {
        #[arg(help = "JSON array of document strings")]
        corpus: PathBuf,
        #[arg(long, help = "Ignore existing caches")]
        force: bool,
    },
    /// Query an indexed corpus
    Search {
        corpus: PathBuf,
        query: String,
        #[arg(short = 'n', long, default_value_t = 5, help = "Number of results")]
        top_n: usize,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Extract keyphrases for every document through the remote model
    Extract {
        corpus: PathBuf,
        #[arg(short, long, help = "Where to write the annotated corpus")]
        output: PathBuf,
    },
    /// Score retrieval with MRR and Precision@5
    Evaluate {
        corpus: PathBuf,
        #[arg(help = "JSON array of {query, relevant} objects")]
        queries: PathBuf,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_or_default(cli.config.as_deref())
        .context("loading configuration")?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Index { corpus, force } => {
            let documents = read_corpus(&corpus)?;
            let mut engine = EmbeddingSearchEngine::new(config.engine)?;
            let source = engine.build_index(documents, force)?;
            info!(source = ?source, device = %engine.device(), "index_command_done");
        }
        Commands::Search {
            corpus,
            query,
            top_n,
            json,
        } => {
            let mut engine = EmbeddingSearchEngine::new(config.engine)?;
            engine.build_index(read_corpus(&corpus)?, false)?;
            let hits = engine.search(&query, top_n)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                for (rank, hit) in hits.iter().enumerate() {
                    let score = hit.score.map(|s| format!("{s:.4}")).unwrap_or_default();
                    println!("{:>2}. [{}] {} {}", rank + 1, hit.document_index, score, hit.text);
                }
            }
        }
        Commands::Extract { corpus, output } => {
            let documents = read_corpus(&corpus)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let report = runtime.block_on(async {
                let client = Arc::new(GeminiClient::from_env(config.extraction.gemini.clone())?);
                let limiter = Arc::new(SlidingWindowLimiter::new(config.extraction.rate_limit));
                let pipeline = ExtractionPipeline::new(client, limiter, &config.extraction)?;
                Ok::<_, extract::ExtractError>(pipeline.process_all(&documents).await)
            })?;
            report.save_json(&documents, &output)?;
            println!(
                "{}/{} batches succeeded, {} of {} documents annotated",
                report.successful_batches,
                report.total_batches,
                report.annotated_count(),
                documents.len()
            );
        }
        Commands::Evaluate {
            corpus,
            queries,
            json,
        } => {
            let raw = fs::read(&queries)
                .with_context(|| format!("reading {}", queries.display()))?;
            let queries: Vec<EvalQuery> = serde_json::from_slice(&raw)
                .with_context(|| format!("parsing {}", queries.display()))?;
            let mut engine = EmbeddingSearchEngine::new(config.engine)?;
            engine.build_index(read_corpus(&corpus)?, false)?;
            let report = evaluate(&engine, &queries)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("MRR:         {:.4}", report.mrr);
                println!("Precision@5: {:.4}", report.precision_at_5);
            }
        }
    }
    Ok(())
}

fn init_tracing(cfg: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cfg.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_corpus(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read(path).with_context(|| format!("reading corpus {}", path.display()))?;
    let documents: Vec<String> = serde_json::from_slice(&raw)
        .with_context(|| format!("corpus {} must be a JSON array of strings", path.display()))?;
    if documents.is_empty() {
        bail!("corpus {} is empty", path.display());
    }
    Ok(documents)
}
