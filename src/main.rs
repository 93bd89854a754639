use clap::{Parser, Subcommand};
use rag_ingest::Result;
use rag_ingest::commands::{
    check_consistency, delete_configuration, delete_source, ingest_file, load_config,
    show_config, write_config,
};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "rag-ingest")]
#[command(about = "Ingest documents into a vector index for retrieval-augmented generation")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and both databases (default: ~/.rag-ingest)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the configuration file, or print it with --show
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ingest a .pdf or .docx document
    Ingest {
        /// Path to the document
        path: PathBuf,
        /// RAG configuration the document belongs to
        #[arg(long)]
        configuration: Uuid,
        /// Target collection (default from config)
        #[arg(long)]
        collection: Option<String>,
        /// Only process these chunk ordinals, e.g. "1,4"
        #[arg(long, value_delimiter = ',')]
        retry: Option<Vec<usize>>,
    },
    /// Delete one document's chunks and vectors
    DeleteSource {
        /// Source name, the document's filename
        source: String,
        #[arg(long)]
        configuration: Uuid,
        #[arg(long)]
        collection: Option<String>,
    },
    /// Delete every chunk and vector of a configuration
    DeleteConfiguration {
        configuration: Uuid,
        #[arg(long)]
        collection: Option<String>,
    },
    /// Compare metadata rows against vector points
    Check {
        /// Limit the check to one configuration
        #[arg(long)]
        configuration: Option<Uuid>,
        #[arg(long)]
        collection: Option<String>,
        /// Delete orphaned points
        #[arg(long)]
        cleanup: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config_dir.as_deref())?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config)?;
            } else {
                write_config(&config)?;
            }
        }
        Commands::Ingest {
            path,
            configuration,
            collection,
            retry,
        } => {
            ingest_file(&config, &path, configuration, collection.as_deref(), retry).await?;
        }
        Commands::DeleteSource {
            source,
            configuration,
            collection,
        } => {
            delete_source(&config, configuration, &source, collection.as_deref()).await?;
        }
        Commands::DeleteConfiguration {
            configuration,
            collection,
        } => {
            delete_configuration(&config, configuration, collection.as_deref()).await?;
        }
        Commands::Check {
            configuration,
            collection,
            cleanup,
        } => {
            check_consistency(&config, configuration, collection.as_deref(), cleanup).await?;
        }
    }

    Ok(())
}
