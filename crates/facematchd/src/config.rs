use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use facematch_core::{DEFAULT_EMBED_TIMEOUT, DEFAULT_MAX_DIMENSION, DEFAULT_SCORE_THRESHOLD};

const MAX_DEFAULT_WORKERS: usize = 4;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
    #[error("score threshold must be finite and greater than zero, got {0}")]
    InvalidThreshold(f64),
    #[error("model directory not found: {0}")]
    ModelDirNotFound(PathBuf),
    #[error("model path is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Daemon configuration, loaded from `FACEMATCH_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// IP address to bind to (default: 0.0.0.0).
    pub bind_addr: IpAddr,
    /// HTTP port (default: 8080).
    pub port: u16,
    /// Directory containing the SCRFD and ArcFace ONNX model files.
    pub model_dir: PathBuf,
    /// Embedding distance at which the similarity score reaches 0.
    pub score_threshold: f64,
    /// Deadline in seconds for each embedding call.
    pub embed_timeout_secs: u64,
    /// Number of isolated model instances (one worker thread each).
    pub workers: usize,
    /// ONNX Runtime intra-op threads per model session.
    pub intra_threads: usize,
    /// Largest accepted image width or height, in pixels.
    pub max_image_dimension: u32,
    /// Largest accepted request body, in bytes.
    pub body_limit_bytes: usize,
    /// Append logs to this file instead of stderr.
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            model_dir: facematch_core::default_model_dir(),
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            embed_timeout_secs: DEFAULT_EMBED_TIMEOUT.as_secs(),
            workers: default_workers(),
            intra_threads: 2,
            max_image_dimension: DEFAULT_MAX_DIMENSION,
            body_limit_bytes: 16 * 1024 * 1024,
            log_file: None,
        }
    }
}

impl Config {
    const ENV_BIND_ADDR: &'static str = "FACEMATCH_BIND_ADDR";
    const ENV_PORT: &'static str = "FACEMATCH_PORT";
    const ENV_MODEL_DIR: &'static str = "FACEMATCH_MODEL_DIR";
    const ENV_SCORE_THRESHOLD: &'static str = "FACEMATCH_SCORE_THRESHOLD";
    const ENV_EMBED_TIMEOUT_SECS: &'static str = "FACEMATCH_EMBED_TIMEOUT_SECS";
    const ENV_WORKERS: &'static str = "FACEMATCH_WORKERS";
    const ENV_INTRA_THREADS: &'static str = "FACEMATCH_INTRA_THREADS";
    const ENV_MAX_IMAGE_DIMENSION: &'static str = "FACEMATCH_MAX_IMAGE_DIMENSION";
    const ENV_BODY_LIMIT_BYTES: &'static str = "FACEMATCH_BODY_LIMIT_BYTES";
    const ENV_LOG_FILE: &'static str = "FACEMATCH_LOG_FILE";

    /// Load configuration from `FACEMATCH_*` environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            bind_addr: parse_or(&var, Self::ENV_BIND_ADDR, defaults.bind_addr)?,
            port: parse_or(&var, Self::ENV_PORT, defaults.port)?,
            model_dir: var(Self::ENV_MODEL_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            score_threshold: parse_or(&var, Self::ENV_SCORE_THRESHOLD, defaults.score_threshold)?,
            embed_timeout_secs: parse_or(
                &var,
                Self::ENV_EMBED_TIMEOUT_SECS,
                defaults.embed_timeout_secs,
            )?,
            workers: parse_or(&var, Self::ENV_WORKERS, defaults.workers)?,
            intra_threads: parse_or(&var, Self::ENV_INTRA_THREADS, defaults.intra_threads)?,
            max_image_dimension: parse_or(
                &var,
                Self::ENV_MAX_IMAGE_DIMENSION,
                defaults.max_image_dimension,
            )?,
            body_limit_bytes: parse_or(&var, Self::ENV_BODY_LIMIT_BYTES, defaults.body_limit_bytes)?,
            log_file: var(Self::ENV_LOG_FILE).map(PathBuf::from),
        })
    }

    /// Check numeric invariants. Does not touch the filesystem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.score_threshold.is_finite() || self.score_threshold <= 0.0 {
            return Err(ConfigError::InvalidThreshold(self.score_threshold));
        }
        let positive = [
            (Self::ENV_EMBED_TIMEOUT_SECS, self.embed_timeout_secs as usize),
            (Self::ENV_WORKERS, self.workers),
            (Self::ENV_INTRA_THREADS, self.intra_threads),
            (Self::ENV_MAX_IMAGE_DIMENSION, self.max_image_dimension as usize),
            (Self::ENV_BODY_LIMIT_BYTES, self.body_limit_bytes),
        ];
        if let Some(&(key, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero { key });
        }
        Ok(())
    }

    /// Check that the model directory exists.
    pub fn validate_model_dir(&self) -> Result<(), ConfigError> {
        if !self.model_dir.exists() {
            return Err(ConfigError::ModelDirNotFound(self.model_dir.clone()));
        }
        if !self.model_dir.is_dir() {
            return Err(ConfigError::NotADirectory(self.model_dir.clone()));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout_secs)
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_WORKERS)
}

fn parse_or<T>(
    var: impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        None => Ok(default),
        Some(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|e| ConfigError::InvalidValue {
                key,
                reason: e.to_string(),
                value,
            })
        }
    }
}
