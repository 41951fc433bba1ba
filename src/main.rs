use anyhow::Result;
use clap::{Parser, Subcommand};
use schema_rag::commands::{build_index, inspect_index, query_index, show_status};
use schema_rag::config::{Config, get_config_dir, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "schema-rag")]
#[command(about = "Semantic table retrieval over a SQLite schema")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the database, Ollama connection and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Build the schema index from the configured database
    Build,
    /// Find the tables most relevant to a question
    Query {
        /// Natural-language question
        question: String,
        /// Number of tables to return
        #[arg(long)]
        top_k: Option<usize>,
        /// Print distances and similarity scores
        #[arg(long)]
        scores: bool,
    },
    /// Show pairwise table similarity and sample query matches
    Inspect {
        /// Number of most similar table pairs to list
        #[arg(long, default_value_t = 10)]
        pairs: usize,
        /// Probe question; repeat for several
        #[arg(long = "probe")]
        probes: Vec<String>,
    },
    /// Show index and embedding service status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&Config::load_default()?);
            } else {
                run_interactive_config(&get_config_dir()?)?;
            }
        }
        Commands::Build => {
            build_index(&Config::load_default()?).await?;
        }
        Commands::Query {
            question,
            top_k,
            scores,
        } => {
            query_index(&Config::load_default()?, &question, top_k, scores).await?;
        }
        Commands::Inspect { pairs, probes } => {
            inspect_index(&Config::load_default()?, pairs, &probes).await?;
        }
        Commands::Status => {
            show_status(&Config::load_default()?).await?;
        }
    }

    Ok(())
}
