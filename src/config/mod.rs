mod file_config;

pub use file_config::{FileConfig, LlmConfig, QueueConfig};

use crate::llm::DEFAULT_OPENAI_BASE_URL;
use crate::server::RequestsLoggingLevel;
use anyhow::{anyhow, bail, Result};
use clap::ValueEnum;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_QUEUE_URL: &str = "memory://";
const DEFAULT_LEASE_SECS: u64 = 300;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// CLI arguments that take part in config resolution.
/// Mirrors the CLI flags that the TOML file can override.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub queue_url: String,
    pub worker_count: usize,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_timeout_sec: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            port: 8000,
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::Path,
            queue_url: DEFAULT_QUEUE_URL.to_string(),
            worker_count: 2,
            llm_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            llm_api_key: None,
            llm_timeout_sec: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,

    pub llm: LlmSettings,
    pub queue: QueueSettings,
}

#[derive(Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

// Keeps the API key out of logs.
impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub url: QueueUrl,
    pub worker_count: usize,
    pub lease: Duration,
    pub poll_interval: Duration,
}

/// Queue backend selected by connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueUrl {
    /// `memory://`
    Memory,
    /// `sqlite://<path>`
    Sqlite(PathBuf),
}

impl FromStr for QueueUrl {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "memory://" || s == "memory" {
            return Ok(QueueUrl::Memory);
        }
        if let Some(path) = s.strip_prefix("sqlite://") {
            if path.is_empty() {
                bail!("Queue URL {:?} is missing a database path", s);
            }
            return Ok(QueueUrl::Sqlite(PathBuf::from(path)));
        }
        bail!(
            "Unsupported queue URL {:?}: expected memory:// or sqlite://<path>",
            s
        )
    }
}

impl fmt::Display for QueueUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueUrl::Memory => write!(f, "memory://"),
            QueueUrl::Sqlite(path) => write!(f, "sqlite://{}", path.display()),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow!("db_path must be specified as an argument, via REVIEWS_DB or in config file")
            })?;
        ensure_parent_dir_exists(&db_path)?;

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        let logging_level = match file.logging_level {
            Some(s) => parse_logging_level(&s)
                .ok_or_else(|| anyhow!("Invalid logging_level in config file: {:?}", s))?,
            None => cli.logging_level.clone(),
        };

        let llm_file = file.llm.unwrap_or_default();
        let timeout_sec = llm_file.timeout_sec.unwrap_or(cli.llm_timeout_sec);
        if timeout_sec == 0 {
            bail!("LLM timeout must be greater than zero");
        }
        let llm = LlmSettings {
            base_url: llm_file
                .base_url
                .unwrap_or_else(|| cli.llm_base_url.clone()),
            model: llm_file.model.unwrap_or_else(|| cli.llm_model.clone()),
            api_key: llm_file.api_key.or_else(|| cli.llm_api_key.clone()),
            timeout: Duration::from_secs(timeout_sec),
        };

        let queue_url: QueueUrl = file
            .queue_url
            .as_deref()
            .unwrap_or(&cli.queue_url)
            .parse()?;
        let queue_url = match queue_url {
            QueueUrl::Sqlite(queue_path) => {
                ensure_parent_dir_exists(&queue_path)?;
                let queue_path = comparable_path(&queue_path)?;
                if queue_path == comparable_path(&db_path)? {
                    bail!("The job queue needs its own database file, not {:?}", db_path);
                }
                QueueUrl::Sqlite(queue_path)
            }
            other => other,
        };
        let worker_count = file.worker_count.unwrap_or(cli.worker_count);
        if worker_count == 0 {
            bail!("worker_count must be at least 1");
        }
        let queue_file = file.queue.unwrap_or_default();
        let lease = Duration::from_secs(queue_file.lease_secs.unwrap_or(DEFAULT_LEASE_SECS));
        // A lease that can run out mid-call hands in-flight jobs to a second worker.
        if lease <= llm.timeout {
            bail!(
                "queue.lease_secs ({:?}) must be longer than the LLM timeout ({:?})",
                lease,
                llm.timeout
            );
        }
        let poll_interval = Duration::from_millis(
            queue_file
                .poll_interval_ms
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        );
        if poll_interval.is_zero() {
            bail!("queue.poll_interval_ms must be greater than zero");
        }
        let queue = QueueSettings {
            url: queue_url,
            worker_count,
            lease,
            poll_interval,
        };

        Ok(Self {
            db_path,
            port,
            metrics_port,
            logging_level,
            llm,
            queue,
        })
    }
}

fn ensure_parent_dir_exists(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            bail!("Directory does not exist: {:?}", parent)
        }
        _ => Ok(()),
    }
}

/// Absolute form of `path` with its directory resolved through symlinks, so
/// two spellings of the same file compare equal even before the file exists.
fn comparable_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    if let Ok(canonical) = absolute.canonicalize() {
        return Ok(canonical);
    }
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => match parent.canonicalize() {
            Ok(parent) => Ok(parent.join(name)),
            Err(_) => Ok(absolute),
        },
        _ => Ok(absolute),
    }
}

/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    <RequestsLoggingLevel as ValueEnum>::from_str(s, true).ok()
}
