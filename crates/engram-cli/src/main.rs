//! Engram CLI
//!
//! Thin command-line front-end over the knowledge store. Every command
//! prints a JSON document on stdout and exits 0 on success, 1 on any
//! error; logs go to stderr so output stays machine-readable.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use engram_core::{
    ConnectionType, CreateInput, DecayConfig, Direction, KnowledgeStore, KnowledgeType,
    Orchestrator, SearchRequest, StoreConfig,
};

/// Engram - local-first knowledge memory store
#[derive(Parser)]
#[command(name = "engram")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "File-backed knowledge memory store with hybrid search and a knowledge graph")]
struct Cli {
    /// Base directory of the memory tree (defaults to the platform data dir)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// SQLite index path (defaults to <base-dir>/.index/search.sqlite)
    #[arg(long, global = true)]
    sqlite_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a new entry
    Note {
        /// Entry title
        title: String,
        /// Body text; use "-" to read from stdin
        content: String,
        /// Knowledge type (decision, incident, entity, pattern, workflow, note, session)
        #[arg(long, default_value = "note")]
        r#type: String,
        /// Tags (comma-separated, hierarchical with '/')
        #[arg(long)]
        tags: Option<String>,
    },

    /// Hybrid search over the store
    Search {
        /// Query text
        query: String,
        /// Restrict to entries carrying any of these tags (comma-separated)
        #[arg(long)]
        tags: Option<String>,
        /// Restrict to entries directly connected to this id
        #[arg(long)]
        connected_to: Option<String>,
        /// Maximum results
        #[arg(long)]
        limit: Option<usize>,
        /// Minimum fused score
        #[arg(long)]
        min_score: Option<f64>,
    },

    /// Read an entry by id, or by relative path when the argument contains '/'
    Read {
        /// Entry id or relative file path
        target: String,
    },

    /// Rewrite an entry's body
    Update {
        /// Relative file path of the entry
        path: String,
        /// New body text; use "-" to read from stdin
        content: String,
        /// Why the body changed (recorded in the diff and commit)
        #[arg(long, default_value = "update")]
        reason: String,
    },

    /// Delete an entry
    Forget {
        /// Entry id
        id: String,
    },

    /// Commit outstanding file changes to the embedded repository
    Commit {
        /// Commit message
        message: String,
    },

    /// List entries
    List {
        /// Restrict to one knowledge type
        #[arg(long)]
        r#type: Option<String>,
        /// Maximum entries
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Walk the knowledge graph from an entry
    Traverse {
        /// Start entry id
        start_id: String,
        /// Edge direction: outgoing, incoming or both
        #[arg(long, default_value = "both")]
        direction: String,
        /// Walk depth (clamped at 2)
        #[arg(long, default_value = "1")]
        depth: u32,
        /// Restrict to these connection types (comma-separated)
        #[arg(long)]
        types: Option<String>,
    },

    /// Rebuild the index from the Markdown tree
    Rebuild,

    /// Show store statistics
    Stats,

    /// Show commit history of the embedded repository
    Log {
        /// Maximum commits
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Propose stale entries for archival
    Decay {
        /// Maximum candidates
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(value) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
            );
        }
        Err(e) => {
            println!("{}", json!({ "error": e.to_string() }));
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<serde_json::Value> {
    let config = StoreConfig {
        base_dir: cli.base_dir.clone(),
        sqlite_path: cli.sqlite_path.clone(),
        ..Default::default()
    };
    let store = Arc::new(KnowledgeStore::open(config).context("failed to open store")?);
    tracing::debug!(base_dir = %store.base_dir().display(), "store opened");
    let orchestrator = Orchestrator::single(store);

    match cli.command {
        Commands::Note {
            title,
            content,
            r#type,
            tags,
        } => {
            let input = CreateInput {
                title,
                entry_type: KnowledgeType::parse(&r#type)?,
                content: read_arg_or_stdin(content)?,
                tags: split_csv(tags),
                ..Default::default()
            };
            let result = orchestrator.note(input).await?;
            Ok(serde_json::to_value(result)?)
        }

        Commands::Search {
            query,
            tags,
            connected_to,
            limit,
            min_score,
        } => {
            let response = orchestrator
                .search(SearchRequest {
                    query,
                    tags: split_csv(tags),
                    connected_to,
                    limit,
                    min_score,
                })
                .await?;
            Ok(serde_json::to_value(response)?)
        }

        Commands::Read { target } => {
            let doc = if target.contains('/') {
                orchestrator.read_path(&target).await?
            } else {
                orchestrator.read(&target).await?
            };
            Ok(serde_json::to_value(doc)?)
        }

        Commands::Update {
            path,
            content,
            reason,
        } => {
            let result = orchestrator
                .update(&path, &read_arg_or_stdin(content)?, &reason)
                .await?;
            Ok(serde_json::to_value(result)?)
        }

        Commands::Forget { id } => {
            orchestrator.forget(&id).await?;
            Ok(json!({ "deleted": id }))
        }

        Commands::Commit { message } => {
            let commit = orchestrator.commit(&message).await?;
            Ok(json!({ "commit": commit }))
        }

        Commands::List { r#type, limit } => {
            let ty = r#type.as_deref().map(KnowledgeType::parse).transpose()?;
            let entries = orchestrator.list(ty, limit).await?;
            Ok(serde_json::to_value(entries)?)
        }

        Commands::Traverse {
            start_id,
            direction,
            depth,
            types,
        } => {
            let direction = parse_direction(&direction)?;
            let types = types
                .map(|csv| {
                    csv.split(',')
                        .map(|t| ConnectionType::parse(t.trim()))
                        .collect::<Result<Vec<_>, _>>()
                })
                .transpose()?;
            let hits = orchestrator
                .traverse(&start_id, direction, depth, types.as_deref())
                .await?;
            Ok(json!({ "results": hits }))
        }

        Commands::Rebuild => {
            let report = orchestrator.rebuild().await?;
            Ok(serde_json::to_value(report)?)
        }

        Commands::Stats => {
            let stats = orchestrator.stats().await?;
            Ok(serde_json::to_value(stats)?)
        }

        Commands::Log { limit } => {
            let history = orchestrator.history(limit).await?;
            Ok(json!({ "commits": history }))
        }

        Commands::Decay { limit } => {
            let candidates = orchestrator
                .decay_candidates(&DecayConfig {
                    max_candidates: limit,
                    ..Default::default()
                })
                .await?;
            Ok(json!({ "candidates": candidates }))
        }
    }
}

/// Treat a literal "-" argument as "read the text from stdin"
fn read_arg_or_stdin(arg: String) -> anyhow::Result<String> {
    if arg == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        Ok(buf)
    } else {
        Ok(arg)
    }
}

fn split_csv(arg: Option<String>) -> Vec<String> {
    arg.map(|csv| {
        csv.split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn parse_direction(s: &str) -> anyhow::Result<Direction> {
    match s.trim().to_lowercase().as_str() {
        "outgoing" => Ok(Direction::Outgoing),
        "incoming" => Ok(Direction::Incoming),
        "both" => Ok(Direction::Both),
        other => anyhow::bail!("unknown direction: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_splitting() {
        assert_eq!(
            split_csv(Some("tech/ai, tech/data ,".to_string())),
            vec!["tech/ai", "tech/data"]
        );
        assert!(split_csv(None).is_empty());
    }

    #[test]
    fn directions_parse() {
        assert!(matches!(parse_direction("both").unwrap(), Direction::Both));
        assert!(matches!(
            parse_direction("Outgoing").unwrap(),
            Direction::Outgoing
        ));
        assert!(parse_direction("sideways").is_err());
    }
}
