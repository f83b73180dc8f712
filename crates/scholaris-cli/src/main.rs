// SPDX-License-Identifier: Apache-2.0
#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode as ProcessExitCode;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use scholaris_core::ExitCode;
use scholaris_index::{
    ensure_indices, Embedder, EsClient, HttpEmbedder, IndexError, IndexErrorCode,
    QUERY_EMBED_PREFIX,
};
use scholaris_ingest::{
    clean_articles, clean_authors, generate_combined_parts, generate_enriched_parts, run_init,
    DataLayout, InitOptions, DEFAULT_PARTS, EMBED_BATCH,
};
use scholaris_model::{Filters, ARTICLE_INDEX, AUTHOR_INDEX};
use scholaris_query::{
    hybrid_search_body, semantic_search_body, text_search_body, SearchMethod, DEFAULT_MIN_SCORE,
};

#[derive(Parser)]
#[command(name = "scholaris")]
#[command(about = "Scholaris operations CLI")]
struct Cli {
    /// Emit machine-readable JSON summaries.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[arg(long, global = true, default_value_t = false)]
    quiet: bool,
    #[arg(long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full data pipeline against Elasticsearch.
    Init {
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
        #[arg(long, default_value_t = DEFAULT_PARTS)]
        parts: usize,
        #[arg(long, default_value_t = EMBED_BATCH)]
        batch_size: usize,
        #[arg(long, default_value_t = false)]
        recreate_indices: bool,
        #[arg(long, default_value_t = false)]
        skip_embeddings: bool,
    },
    Indices {
        #[command(subcommand)]
        command: IndicesCommand,
    },
    /// Clean a raw harvester export.
    Clean {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = ExportKind::Articles)]
        kind: ExportKind,
    },
    /// Generate embedding part files from a cleaned export.
    Embed {
        /// Cleaned articles file; ignored with --combined.
        #[arg(long)]
        input: Option<PathBuf>,
        /// Data directory; parts land in its enriched/ or combined/ subdirectory.
        #[arg(long, default_value = "data")]
        out_dir: PathBuf,
        #[arg(long, default_value_t = DEFAULT_PARTS)]
        parts: usize,
        #[arg(long, default_value_t = EMBED_BATCH)]
        batch: usize,
        /// Build combined-content embeddings from existing enriched parts.
        #[arg(long, default_value_t = false)]
        combined: bool,
    },
    /// Ad-hoc search printing raw hit JSON.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, value_enum, default_value_t = MethodCli::Text)]
        method: MethodCli,
        #[arg(long, default_value_t = 10)]
        size: usize,
    },
    /// Index statistics snapshot.
    Stats,
}

#[derive(Subcommand)]
enum IndicesCommand {
    Create {
        #[arg(long, default_value_t = false)]
        recreate: bool,
    },
    Stats,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExportKind {
    Articles,
    Authors,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MethodCli {
    Text,
    Semantic,
    Hybrid,
}

impl From<MethodCli> for SearchMethod {
    fn from(method: MethodCli) -> Self {
        match method {
            MethodCli::Text => Self::Text,
            MethodCli::Semantic => Self::Semantic,
            MethodCli::Hybrid => Self::Hybrid,
        }
    }
}

struct CliError {
    code: ExitCode,
    message: String,
}

impl CliError {
    fn new(code: ExitCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn validation(message: impl Into<String>) -> Self {
        Self::new(ExitCode::Validation, message)
    }

    fn dependency(message: impl Into<String>) -> Self {
        Self::new(ExitCode::DependencyFailure, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(ExitCode::Internal, message)
    }
}

impl From<IndexError> for CliError {
    fn from(error: IndexError) -> Self {
        let code = match error.code {
            IndexErrorCode::Validation | IndexErrorCode::NotFound => ExitCode::Validation,
            IndexErrorCode::Network | IndexErrorCode::Upstream => ExitCode::DependencyFailure,
            _ => ExitCode::Internal,
        };
        Self::new(code, error.to_string())
    }
}

impl From<scholaris_ingest::IngestError> for CliError {
    fn from(error: scholaris_ingest::IngestError) -> Self {
        Self::dependency(error.to_string())
    }
}

struct Output {
    json: bool,
    quiet: bool,
}

impl Output {
    fn emit(&self, summary: &Value, lines: &[String]) {
        if self.quiet {
            return;
        }
        if self.json {
            println!("{summary}");
        } else {
            for line in lines {
                println!("{line}");
            }
        }
    }
}

fn main() -> ProcessExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("runtime startup failed: {error}");
            return ProcessExitCode::from(ExitCode::Internal as u8);
        }
    };

    let output = Output {
        json: cli.json,
        quiet: cli.quiet,
    };
    match runtime.block_on(run(cli.command, &output)) {
        Ok(()) => ProcessExitCode::from(ExitCode::Success as u8),
        Err(error) => {
            eprintln!("{}", error.message);
            ProcessExitCode::from(error.code as u8)
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn es_client() -> Result<EsClient, CliError> {
    let url = std::env::var(scholaris_core::ENV_SCHOLARIS_ES_URL)
        .unwrap_or_else(|_| "http://localhost:9200".to_string());
    EsClient::new(&url).map_err(CliError::from)
}

fn embedder() -> Result<Option<HttpEmbedder>, CliError> {
    match std::env::var(scholaris_core::ENV_SCHOLARIS_EMBEDDER_URL) {
        Ok(url) if !url.trim().is_empty() => Ok(Some(HttpEmbedder::new(&url)?)),
        _ => Ok(None),
    }
}

fn require_embedder() -> Result<HttpEmbedder, CliError> {
    embedder()?.ok_or_else(|| {
        CliError::dependency(format!(
            "no embedder configured; set {}",
            scholaris_core::ENV_SCHOLARIS_EMBEDDER_URL
        ))
    })
}

fn load_json_array(path: &PathBuf) -> Result<Vec<Value>, CliError> {
    let payload = fs::read(path)
        .map_err(|e| CliError::validation(format!("reading {}: {e}", path.display())))?;
    let value: Value = serde_json::from_slice(&payload)
        .map_err(|e| CliError::validation(format!("parsing {}: {e}", path.display())))?;
    value
        .as_array()
        .cloned()
        .ok_or_else(|| CliError::validation(format!("{} is not a JSON array", path.display())))
}

async fn run(command: Commands, output: &Output) -> Result<(), CliError> {
    match command {
        Commands::Init {
            data_dir,
            parts,
            batch_size,
            recreate_indices,
            skip_embeddings,
        } => {
            let client = es_client()?;
            let embedder = embedder()?;
            let options = InitOptions {
                data_dir,
                parts,
                batch_size,
                recreate_indices,
                skip_embeddings,
            };
            let report = run_init(
                &options,
                &client,
                embedder.as_ref().map(|e| e as &dyn Embedder),
            )
            .await?;
            let lines: Vec<String> = report
                .stages
                .iter()
                .map(|stage| {
                    let marker = if stage.skipped { "skip" } else { "done" };
                    format!("[{marker}] {}: {}", stage.stage, stage.summary)
                })
                .collect();
            let summary = json!({
                "stages": report
                    .stages
                    .iter()
                    .map(|s| json!({"stage": s.stage, "summary": s.summary, "skipped": s.skipped}))
                    .collect::<Vec<_>>()
            });
            output.emit(&summary, &lines);
            Ok(())
        }
        Commands::Indices { command } => match command {
            IndicesCommand::Create { recreate } => {
                let client = es_client()?;
                let created = ensure_indices(&client, recreate).await?;
                let line = if created.is_empty() {
                    "all indices already present".to_string()
                } else {
                    format!("created: {}", created.join(", "))
                };
                output.emit(&json!({"created": created}), &[line]);
                Ok(())
            }
            IndicesCommand::Stats => print_stats(output).await,
        },
        Commands::Clean {
            input,
            output: output_path,
            kind,
        } => {
            let raw = load_json_array(&input)?;
            let outcome = match kind {
                ExportKind::Articles => clean_articles(&raw),
                ExportKind::Authors => clean_authors(&raw),
            };
            let payload = serde_json::to_vec_pretty(&outcome.records)
                .map_err(|e| CliError::internal(format!("encoding cleaned output: {e}")))?;
            fs::write(&output_path, payload).map_err(|e| {
                CliError::internal(format!("writing {}: {e}", output_path.display()))
            })?;
            output.emit(
                &json!({"cleaned": outcome.records.len(), "skipped": outcome.skipped}),
                &[format!(
                    "cleaned {} records ({} skipped) into {}",
                    outcome.records.len(),
                    outcome.skipped,
                    output_path.display()
                )],
            );
            Ok(())
        }
        Commands::Embed {
            input,
            out_dir,
            parts,
            batch,
            combined,
        } => {
            let embedder = require_embedder()?;
            let layout = DataLayout::new(out_dir);
            layout.ensure()?;
            let report = if combined {
                generate_combined_parts(&layout, &embedder, batch).await?
            } else {
                let input = input.unwrap_or_else(|| layout.cleaned_articles());
                let articles = load_json_array(&input)?;
                generate_enriched_parts(&layout, &embedder, &articles, parts, batch).await?
            };
            output.emit(
                &json!({
                    "parts_written": report.parts_written,
                    "articles": report.articles,
                    "skipped_existing": report.skipped_existing
                }),
                &[format!(
                    "{} parts written covering {} articles{}",
                    report.parts_written,
                    report.articles,
                    if report.skipped_existing {
                        " (existing parts, skipped)"
                    } else {
                        ""
                    }
                )],
            );
            Ok(())
        }
        Commands::Search {
            query,
            method,
            size,
        } => {
            let client = es_client()?;
            let method = SearchMethod::from(method);
            let filters = Filters::default();
            let body = match method {
                SearchMethod::Text => text_search_body(&query, size, 0, &filters),
                SearchMethod::Semantic | SearchMethod::Hybrid => {
                    let embedder = require_embedder()?;
                    let prefixed = format!("{QUERY_EMBED_PREFIX}{query}");
                    let vectors = embedder.embed(&[prefixed]).await?;
                    let vector = vectors.into_iter().next().ok_or_else(|| {
                        CliError::dependency("embedder returned no vector for the query")
                    })?;
                    if method == SearchMethod::Semantic {
                        semantic_search_body(&vector, size, 0, DEFAULT_MIN_SCORE, &filters)
                    } else {
                        hybrid_search_body(&query, &vector, size, 0, 0.3, 0.7, &filters)
                    }
                }
            };
            let response = client.search(ARTICLE_INDEX, &body).await?;
            let hits = response["hits"]["hits"].as_array().cloned().unwrap_or_default();
            let lines: Vec<String> = hits
                .iter()
                .map(|hit| {
                    format!(
                        "{:>8.3}  {}  {}",
                        hit["_score"].as_f64().unwrap_or(0.0),
                        hit.pointer("/_source/id").and_then(Value::as_str).unwrap_or("?"),
                        hit.pointer("/_source/title").and_then(Value::as_str).unwrap_or("")
                    )
                })
                .collect();
            output.emit(&json!({"hits": hits}), &lines);
            Ok(())
        }
        Commands::Stats => print_stats(output).await,
    }
}

async fn print_stats(output: &Output) -> Result<(), CliError> {
    let client = es_client()?;
    let mut lines = Vec::new();
    let mut summary = serde_json::Map::new();
    for index in [ARTICLE_INDEX, AUTHOR_INDEX] {
        let stats = client.index_stats(index).await?;
        lines.push(format!(
            "{}: {} docs ({} deleted), {} bytes, {} fields, {} shards",
            stats.index_name,
            stats.doc_count,
            stats.deleted_docs,
            stats.size_bytes,
            stats.field_count,
            stats.shard_count
        ));
        summary.insert(
            index.to_string(),
            json!({
                "doc_count": stats.doc_count,
                "deleted_docs": stats.deleted_docs,
                "size_bytes": stats.size_bytes,
                "field_count": stats.field_count,
                "shard_count": stats.shard_count
            }),
        );
    }
    output.emit(&Value::Object(summary), &lines);
    Ok(())
}
