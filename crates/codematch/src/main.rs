use anyhow::Result;
use clap::{Parser, Subcommand};
use codematch_common::{logger, AppConfig};
use codematch_embed::OllamaVectoriser;
use codematch_vector::{
    corpus, is_reserved_column, BuildOptions, ColumnType, MetadataSchema, VectorStore,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Find project root by looking for the workspace Cargo.lock or .git
fn find_project_root() -> Option<PathBuf> {
    let mut current_dir = std::env::current_dir().ok()?;

    loop {
        if current_dir.join(".git").exists() || current_dir.join("Cargo.lock").exists() {
            return Some(current_dir);
        }

        if !current_dir.pop() {
            break;
        }
    }

    None
}

/// Load .env file from project root
fn load_dotenv_from_project_root() {
    match find_project_root().map(|root| root.join(".env")) {
        Some(env_path) if env_path.exists() => {
            dotenv::from_path(&env_path).ok();
        }
        _ => {
            dotenv::dotenv().ok();
        }
    }
}

/// `name=type` metadata column declaration
fn parse_column(arg: &str) -> std::result::Result<(String, ColumnType), String> {
    let (name, dtype) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=TYPE, got '{}'", arg))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty column name in '{}'", arg));
    }
    if is_reserved_column(name) {
        return Err(format!("column name '{}' is reserved for result fields", name));
    }
    let dtype = dtype.parse::<ColumnType>().map_err(|e| e.to_string())?;
    Ok((name.to_string(), dtype))
}

#[derive(Parser)]
#[command(name = "codematch")]
#[command(about = "Codematch - embedding search over classification code knowledge bases", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a built store over HTTP
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long)]
        port: Option<u16>,

        /// Snapshot directory to load
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Path segment the store operations are mounted under
        #[arg(long)]
        endpoint: Option<String>,

        /// Label scoring for deduplicated results (naive, average)
        #[arg(long)]
        scoring: Option<String>,
    },

    /// Embed a JSON corpus and write a store snapshot
    Build {
        /// JSON array of {id, text, ...metadata} objects
        #[arg(long)]
        corpus: PathBuf,

        /// Snapshot directory (defaults to STORE_DIR)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Texts per embedding call
        #[arg(long)]
        batch_size: Option<usize>,

        /// Metadata column to keep, as COLUMN=TYPE (str, int, float, bool)
        #[arg(long = "metadata", value_parser = parse_column)]
        metadata: Vec<(String, ColumnType)>,

        /// Replace an existing snapshot directory
        #[arg(long)]
        overwrite: bool,
    },
}

async fn serve(config: AppConfig) -> Result<()> {
    config.ensure_directories()?;
    logger::setup_logging(&config.log_dir, &config.log_level)?;

    tracing::info!("Codematch starting...");
    tracing::info!("Configuration loaded:");
    tracing::info!("  Bind: {}", config.server_bind_address());
    tracing::info!("  Store: {}", config.store_dir.display());
    tracing::info!("  Embedding: {} @ {}", config.embedding_model, config.ollama_base_url);

    let vectoriser = OllamaVectoriser::from_config(&config)?;
    if !vectoriser.test_connection().await.unwrap_or(false) {
        tracing::warn!(
            "Ollama is not reachable at {}; embed and search will fail until it is",
            config.ollama_base_url
        );
    }

    let store = VectorStore::load(&config.store_dir, Arc::new(vectoriser))
        .await?
        .with_embed_batch_size(config.embed_batch_size)?;

    println!("Server listening on http://{}", config.server_bind_address());
    codematch_server::start_server(config, Arc::new(store)).await?;
    Ok(())
}

async fn build(
    config: AppConfig,
    corpus_path: PathBuf,
    output: Option<PathBuf>,
    batch_size: Option<usize>,
    metadata: Vec<(String, ColumnType)>,
    overwrite: bool,
) -> Result<()> {
    logger::setup_console_logging(&config.log_level)?;

    let records = corpus::read_corpus(&corpus_path).await?;
    let schema: MetadataSchema = metadata.into_iter().collect();
    let output_dir = output.unwrap_or_else(|| config.store_dir.clone());

    let options = BuildOptions::new(&output_dir)
        .with_batch_size(batch_size.unwrap_or(config.embed_batch_size))
        .with_metadata(schema)
        .with_overwrite(overwrite)
        .with_progress(true);

    let vectoriser = OllamaVectoriser::from_config(&config)?;
    let store = VectorStore::build(records, Arc::new(vectoriser), options).await?;

    println!(
        "Built {} vectors of dimension {} into {}",
        store.len(),
        store.dimension(),
        output_dir.display()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env early so CLI overrides below win over it
    load_dotenv_from_project_root();

    match cli.command {
        Some(Commands::Serve {
            host,
            port,
            store_dir,
            endpoint,
            scoring,
        }) => {
            // Override with CLI arguments
            if let Some(host) = &host {
                std::env::set_var("SERVER_HOST", host);
            }
            if let Some(port) = port {
                std::env::set_var("SERVER_PORT", port.to_string());
            }
            if let Some(dir) = &store_dir {
                std::env::set_var("STORE_DIR", dir);
            }
            if let Some(endpoint) = &endpoint {
                std::env::set_var("ENDPOINT_NAME", endpoint);
            }
            if let Some(scoring) = &scoring {
                std::env::set_var("SCORING_METHOD", scoring);
            }

            serve(AppConfig::from_env()?).await?;
        }
        Some(Commands::Build {
            corpus,
            output,
            batch_size,
            metadata,
            overwrite,
        }) => {
            build(
                AppConfig::from_env()?,
                corpus,
                output,
                batch_size,
                metadata,
                overwrite,
            )
            .await?;
        }
        None => {
            // Default: serve with configuration from the environment
            serve(AppConfig::from_env()?).await?;
        }
    }

    Ok(())
}
