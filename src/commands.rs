use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::builder::{BuildReport, SchemaIndexBuilder};
use crate::catalog::{SchemaSource, SqliteCatalog};
use crate::config::Config;
use crate::embeddings::{Embedder, OllamaClient};
use crate::index::{LoadedIndex, SchemaMetadata, SchemaVectorIndex};
use crate::relations::{DEFAULT_PROBES, PROBE_DEPTH, RelationMap, SimilarityBand};
use crate::retriever::SchemaRetriever;

fn embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let client = OllamaClient::new(&config.ollama).context("Failed to initialize Ollama client")?;
    Ok(Arc::new(client))
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    Ok(spinner)
}

/// Build and publish the schema index for the configured database
#[inline]
pub async fn build_index(config: &Config) -> Result<BuildReport> {
    let catalog = SqliteCatalog::open(config.database_path())
        .await
        .context("Failed to open source database")?;
    let source: Arc<dyn SchemaSource> = Arc::new(catalog.clone());

    let builder = SchemaIndexBuilder::new(config.index_settings(), source, embedder(config)?);

    let progress = spinner(&format!(
        "Embedding table schemas from {}...",
        config.database_path().display()
    ))?;
    let result = builder.build().await;
    progress.finish_and_clear();
    catalog.close().await;

    let report = result?;
    println!(
        "{} Indexed {} tables ({} dimensions)",
        style("✓").green(),
        style(report.table_count).cyan(),
        report.dimension
    );
    println!("  Build: {}", report.build_id);
    println!(
        "  Location: {}",
        style(report.storage_dir.display()).cyan()
    );
    for name in &report.table_names {
        println!("    • {}", name);
    }

    Ok(report)
}

/// Print the tables most relevant to a question
#[inline]
pub async fn query_index(
    config: &Config,
    question: &str,
    top_k: Option<usize>,
    scores: bool,
) -> Result<()> {
    if question.trim().is_empty() {
        anyhow::bail!("Question must not be empty");
    }

    let retriever = SchemaRetriever::new(config.index_settings(), embedder(config)?);
    let results = retriever.retrieve_scored(question, top_k).await?;

    if results.is_empty() {
        println!("No tables matched.");
        return Ok(());
    }

    for (rank, table) in results.iter().enumerate() {
        if scores {
            println!(
                "{:2}. {} {}",
                rank + 1,
                style(&table.table_name).bold(),
                style(format!(
                    "(distance {:.4}, similarity {:.4})",
                    table.distance, table.similarity
                ))
                .dim()
            );
        } else {
            println!("{:2}. {}", rank + 1, style(&table.table_name).bold());
        }
        println!("    {}", table.schema_text);
    }

    Ok(())
}

/// Print the relation map of the current index
#[inline]
pub async fn inspect_index(config: &Config, pairs: usize, probes: &[String]) -> Result<()> {
    let settings = config.index_settings();
    let index = LoadedIndex::load(&settings.layout()).await?;
    let metadata = index.metadata();

    println!("{}", style("🔍 Schema Index Relation Map").bold().cyan());
    println!("  Database: {}", config.database_path().display());
    println!("  Embedding model: {}", metadata.embedding_model);
    println!("  Vector store: {}", settings.storage_dir.display());
    println!(
        "  Loaded {} vectors of dimension {}",
        index.len(),
        metadata.dimension
    );
    println!();

    println!("{}", style("Tables").bold().yellow());
    for (position, (name, text)) in metadata
        .table_names
        .iter()
        .zip(&metadata.schema_texts)
        .enumerate()
    {
        println!("{:2}. {}", position + 1, name);
        println!("    {}", style(text).dim());
    }
    println!();

    let map = RelationMap::from_index(&index).await?;

    println!(
        "{}",
        style(format!("Top {} Most Similar Table Pairs", pairs))
            .bold()
            .yellow()
    );
    for (rank, pair) in map.top_pairs(pairs).iter().enumerate() {
        println!(
            "{:2}. {} ↔ {} ({:.4})",
            rank + 1,
            pair.first,
            pair.second,
            pair.similarity
        );
    }
    println!();

    println!("{}", style("Similarity Heat Map").bold().yellow());
    print!("{}", map.heatmap());
    println!("Legend: {}", SimilarityBand::legend());
    println!();

    let probes: Vec<String> = if probes.is_empty() {
        DEFAULT_PROBES.iter().map(|p| (*p).to_string()).collect()
    } else {
        probes.to_vec()
    };

    let retriever = SchemaRetriever::new(settings, embedder(config)?);
    println!("{}", style("Query Probes").bold().yellow());
    for probe in &probes {
        println!("Query: '{}'", probe);
        match retriever.retrieve_scored(probe, Some(PROBE_DEPTH)).await {
            Ok(matches) => {
                for (rank, table) in matches.iter().enumerate() {
                    println!(
                        "  {}. {} (similarity: {:.4})",
                        rank + 1,
                        table.table_name,
                        table.similarity
                    );
                }
            }
            Err(e) => {
                warn!("Probe '{}' failed: {}", probe, e);
                println!("  {} {}", style("✗").red(), e);
            }
        }
    }

    Ok(())
}

/// Show whether an index exists and what it was built from
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    let settings = config.index_settings();
    let layout = settings.layout();

    println!("{}", style("📊 Schema Index Status").bold().cyan());
    println!("  Database: {}", config.database_path().display());
    println!("  Vector store: {}", layout.root().display());
    println!();

    match SchemaMetadata::read_from(&layout.metadata_path()) {
        Ok(metadata) => {
            println!("  Build: {}", metadata.build_id);
            println!(
                "  Built at: {}",
                metadata.built_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!("  Tables: {}", metadata.len());
            println!(
                "  Model: {} ({} dimensions)",
                metadata.embedding_model, metadata.dimension
            );

            if metadata.embedding_model != settings.embedding_model {
                println!(
                    "  {} configured model is {}; rebuild before querying",
                    style("⚠").yellow(),
                    settings.embedding_model
                );
            }

            match LoadedIndex::load(&layout).await {
                Ok(_) => println!("  Integrity: {}", style("✓ consistent").green()),
                Err(e) => println!("  Integrity: {} {}", style("✗").red(), e),
            }
            match SchemaVectorIndex::builds(&layout.index_path()).await {
                Ok(builds) => println!("  Stored builds: {}", builds.len()),
                Err(e) => println!("  Stored builds: {} {}", style("✗").red(), e),
            }
        }
        Err(e) => {
            println!("  Index: {} {}", style("✗ not built").red(), e);
        }
    }
    println!();

    let client = OllamaClient::new(&config.ollama).context("Failed to initialize Ollama client")?;
    let url = client.base_url().clone();
    let health = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .context("Health check task failed")?;
    match health {
        Ok(()) => {
            info!("Ollama reachable at {}", url);
            println!("  Ollama: {} {}", style("✓ reachable").green(), url);
        }
        Err(e) => println!("  Ollama: {} {} ({})", style("✗ unreachable").red(), url, e),
    }

    Ok(())
}
