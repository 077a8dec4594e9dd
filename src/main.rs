use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use review_trends_server::background_jobs::{
    InMemoryJobQueue, JobContext, JobQueue, SqliteJobQueue, WorkerPool,
};
use review_trends_server::classifier::{LlmReviewClassifier, ReviewClassifier};
use review_trends_server::config::{
    AppConfig, CliConfig, FileConfig, QueueUrl, DEFAULT_LLM_MODEL, DEFAULT_QUEUE_URL,
};
use review_trends_server::llm::{LlmProvider, OpenAIProvider, DEFAULT_OPENAI_BASE_URL};
use review_trends_server::review_store::{ReviewStore, SqliteReviewStore};
use review_trends_server::server::{
    self, run_metrics_server, run_server, RequestsLoggingLevel, ServerConfig,
};

/// Upper bound on waiting for in-flight jobs at shutdown.
const WORKER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

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
    /// Path to the SQLite review database file. Created if missing.
    #[clap(value_parser = parse_path, env = "REVIEWS_DB")]
    pub db_path: Option<PathBuf>,

    /// Optional TOML config file; its values override the flags below.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 8000)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Job queue connection string: memory:// or sqlite://<path>.
    #[clap(long, env = "QUEUE_URL", default_value = DEFAULT_QUEUE_URL)]
    pub queue_url: String,

    /// Number of background workers consuming the job queue.
    #[clap(long, default_value_t = 2)]
    pub worker_count: usize,

    /// Base URL of the OpenAI-compatible API used for classification.
    #[clap(long, env = "LLM_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL)]
    pub llm_base_url: String,

    #[clap(long, env = "LLM_MODEL", default_value = DEFAULT_LLM_MODEL)]
    pub llm_model: String,

    #[clap(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    /// Timeout in seconds for a single classification call.
    #[clap(long, default_value_t = 30)]
    pub llm_timeout_sec: u64,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_path: self.db_path.clone(),
            port: self.port,
            metrics_port: self.metrics_port,
            logging_level: self.logging_level.clone(),
            queue_url: self.queue_url.clone(),
            worker_count: self.worker_count,
            llm_base_url: self.llm_base_url.clone(),
            llm_model: self.llm_model.clone(),
            llm_api_key: self.llm_api_key.clone(),
            llm_timeout_sec: self.llm_timeout_sec,
        }
    }
}

fn open_job_queue(config: &AppConfig) -> Result<Arc<dyn JobQueue>> {
    let queue: Arc<dyn JobQueue> = match &config.queue.url {
        QueueUrl::Memory => {
            warn!("Using the in-memory job queue: pending jobs are lost on restart");
            Arc::new(InMemoryJobQueue::new())
        }
        QueueUrl::Sqlite(path) => Arc::new(SqliteJobQueue::new(
            path,
            config.queue.lease,
            config.queue.poll_interval,
        )?),
    };
    Ok(queue)
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
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
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;
    info!("Resolved configuration: {:?}", config);

    info!("Initializing metrics...");
    server::metrics::init_metrics();

    info!("Opening SQLite review database at {:?}...", config.db_path);
    let review_store: Arc<dyn ReviewStore> = Arc::new(SqliteReviewStore::new(&config.db_path)?);

    info!("Opening job queue {}...", config.queue.url);
    let job_queue = open_job_queue(&config)?;

    if config.llm.api_key.is_none() {
        warn!("No LLM API key configured; classification calls may be rejected");
    }
    let provider: Arc<dyn LlmProvider> = Arc::new(OpenAIProvider::new(
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.api_key.clone(),
    ));
    info!(
        "Classifying reviews with {} model {}",
        provider.name(),
        provider.model()
    );
    let classifier: Arc<dyn ReviewClassifier> =
        Arc::new(LlmReviewClassifier::new(provider, config.llm.timeout));

    let shutdown = CancellationToken::new();
    let job_context = JobContext::new(shutdown.child_token(), review_store.clone(), classifier);
    let workers = WorkerPool::spawn(
        job_context,
        job_queue.clone(),
        config.queue.worker_count,
        shutdown.child_token(),
    );

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received shutdown signal");
                    shutdown.cancel();
                }
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
        });
    }

    {
        let shutdown = shutdown.clone();
        let metrics_port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(metrics_port, shutdown).await {
                error!("Metrics server stopped: {:#}", e);
            }
        });
    }

    let server_config = ServerConfig {
        requests_logging_level: config.logging_level.clone(),
        port: config.port,
    };
    let result = run_server(server_config, review_store, job_queue, shutdown.clone()).await;

    shutdown.cancel();
    workers.shutdown();
    workers.join(WORKER_SHUTDOWN_TIMEOUT).await;
    info!("Shutdown complete");
    result
}
