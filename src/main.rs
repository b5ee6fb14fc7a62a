use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bookseek::catalog::{Catalog, SqliteCatalog};
use bookseek::config::Config;
use bookseek::semantic::{Field, SemanticSearchService};

mod cli;
use cli::SearchMode;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = cli::Args::parse();

    let config = Config::load().context("failed to load config")?;
    let catalog: Arc<dyn Catalog> = Arc::new(
        SqliteCatalog::from_config(&config.catalog).context("invalid catalog configuration")?,
    );
    let service = SemanticSearchService::with_model(
        config.semantic_search.clone(),
        config.base_path().to_path_buf(),
        catalog,
    );

    match args.command {
        cli::Command::Build { no_progress } => {
            let report = service
                .with_progress(!no_progress)
                .rebuild()
                .context("failed to build vector store")?;
            tracing::info!(
                entities = report.entities,
                vectors = report.title_vectors + report.chunk_vectors,
                "vector store built"
            );
            print_json(&report)
        }

        cli::Command::Search { query, mode, limit } => match mode {
            SearchMode::Title | SearchMode::Description => {
                let fields = if mode == SearchMode::Title {
                    [Field::Title]
                } else {
                    [Field::DescriptionChunk]
                };
                let mut outcome = service.search_fields(&query, &fields)?;
                if let Some(limit) = limit {
                    outcome = outcome.truncate(limit);
                }
                print_json(&outcome)
            }
            SearchMode::Combined => {
                let mut outcome = service.search_combined(&query)?;
                if let Some(limit) = limit {
                    outcome = outcome.truncate(limit);
                }
                print_json(&outcome)
            }
        },

        cli::Command::Raw { query } => print_json(&service.raw_scores(&query)?),

        cli::Command::Status {} => print_json(&serde_json::json!({
            "status": service.status(),
            "model_info": service.model_info(),
        })),
    }
}
