use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod catalog_store;
use catalog_store::SqliteCatalogStore;

mod features;
use features::transcription::TranscriptionClient;

mod qbh;

mod qbi;
use qbi::{ComponentInit, QbiEngine, QbiScoringMode};

mod retrieval;
use retrieval::RetrievalOrchestrator;

mod server;
use server::{run_server, RequestsLoggingLevel, ServerConfig};

mod uploads;
use uploads::UploadStore;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite catalog database file.
    #[clap(long, env = "DATABASE_NAME", default_value = "catalog.db", value_parser = parse_path)]
    pub catalog_db: PathBuf,

    /// Root directory for uploaded files and feature artifacts.
    #[clap(long, default_value = "public/uploads")]
    pub uploads_root: PathBuf,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 4001)]
    pub port: u16,

    /// Origin allowed by CORS.
    #[clap(long, default_value = "http://localhost:4000")]
    pub cors_origin: String,

    /// Base URL of the audio transcription service.
    #[clap(long, default_value = "http://127.0.0.1:8000")]
    pub transcriber_url: String,

    /// Timeout in seconds for transcription requests.
    #[clap(long, default_value_t = 30)]
    pub transcriber_timeout_sec: u64,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Maximum number of PCA components in the image model.
    #[clap(long, default_value_t = 100)]
    pub pca_components: usize,

    /// Seed PCA power iteration randomly instead of with the
    /// deterministic alternating-sign pattern.
    #[clap(long)]
    pub pca_random_init: bool,

    /// Score image queries with per-pair PCA instead of the catalog
    /// model.
    #[clap(long)]
    pub pairwise_scoring: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    // The catalog is SQLite; networked-database credentials from older
    // deployments are ignored.
    for var in ["DATABASE_SERVER", "DATABASE_USERNAME", "DATABASE_PASSWORD"] {
        if std::env::var(var).is_ok() {
            warn!("{} is set but unused; the catalog lives at {:?}", var, cli_args.catalog_db);
        }
    }

    info!("Opening SQLite catalog database at {:?}...", cli_args.catalog_db);
    let store = Arc::new(SqliteCatalogStore::new(&cli_args.catalog_db)?);

    let uploads = Arc::new(UploadStore::new(&cli_args.uploads_root));
    tokio::fs::create_dir_all(uploads.root())
        .await
        .context("Failed to create uploads root")?;

    let transcriber = Arc::new(TranscriptionClient::new(
        cli_args.transcriber_url,
        cli_args.transcriber_timeout_sec,
    ));

    let component_init = if cli_args.pca_random_init {
        ComponentInit::Random
    } else {
        ComponentInit::Deterministic
    };
    let scoring_mode = if cli_args.pairwise_scoring {
        QbiScoringMode::Pairwise
    } else {
        QbiScoringMode::Model
    };

    let qbi = Arc::new(QbiEngine::new(cli_args.pca_components, component_init));
    let orchestrator = Arc::new(RetrievalOrchestrator::new(
        store.clone(),
        uploads.clone(),
        transcriber,
        qbi,
        scoring_mode,
        component_init,
    ));

    if scoring_mode == QbiScoringMode::Model {
        info!("Building image model from catalog...");
        orchestrator.rebuild_model().await?;
    }

    let config = ServerConfig {
        port: cli_args.port,
        cors_origin: cli_args.cors_origin,
        requests_logging_level: cli_args.logging_level,
    };

    info!("Ready to serve at port {}!", config.port);
    run_server(config, store, uploads, orchestrator).await
}
