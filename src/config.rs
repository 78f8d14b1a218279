use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "ClaimLens";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default generation model for extraction and both decision stages.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

/// Claim directories are scanned as `claim 1` ..= `claim N`.
pub const DEFAULT_MAX_CLAIM_ID: u32 = 25;

/// Pause between two claims of one batch (rate-limit courtesy, not backoff).
pub const DEFAULT_PACING_SECS: u64 = 30;

pub const DEFAULT_VISION_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_DECISION_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_VERIFICATION_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "claimlens=info,claimlens_lib=info,tower_http=info"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} not found in environment variables")]
    MissingVar(&'static str),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Credentials for the custom search service. Both halves are required.
#[derive(Debug, Clone)]
pub struct SearchCredentials {
    pub api_key: String,
    pub engine_id: String,
}

/// Runtime configuration resolved from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub google_api_key: String,
    pub search: Option<SearchCredentials>,
    pub model_name: String,
    pub api_base_url: String,
    pub claims_dir: PathBuf,
    pub results_dir: PathBuf,
    pub system_prompt_file: Option<PathBuf>,
    pub tesseract_bin: PathBuf,
    /// Tessdata directory for the linked Tesseract library (`ocr` feature).
    pub tessdata_dir: Option<PathBuf>,
    pub max_claim_id: u32,
    pub pacing: Duration,
    pub vision_timeout: Duration,
    pub decision_timeout: Duration,
    pub verification_timeout: Duration,
    pub search_timeout: Duration,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    /// Load `.env` (if present) and read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "Failed to read .env file");
            }
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let google_api_key = var("GOOGLE_API_KEY").ok_or(ConfigError::MissingVar("GOOGLE_API_KEY"))?;

        let search = match (var("GOOGLE_SEARCH_API_KEY"), var("GOOGLE_SEARCH_ENGINE_ID")) {
            (Some(api_key), Some(engine_id)) => Some(SearchCredentials { api_key, engine_id }),
            _ => None,
        };

        let base_dir = var("CLAIMLENS_BASE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            google_api_key,
            search,
            model_name: var("CLAIMLENS_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_base_url: var("CLAIMLENS_API_BASE_URL")
                .unwrap_or_else(|| crate::pipeline::llm::gemini::DEFAULT_BASE_URL.to_string()),
            claims_dir: var("CLAIMLENS_CLAIMS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| base_dir.clone()),
            results_dir: var("CLAIMLENS_RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| base_dir.join("results")),
            system_prompt_file: var("CLAIMLENS_SYSTEM_PROMPT_FILE").map(PathBuf::from),
            tesseract_bin: var("TESSERACT_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("tesseract")),
            tessdata_dir: var("CLAIMLENS_TESSDATA_DIR").map(PathBuf::from),
            max_claim_id: parse_or("CLAIMLENS_MAX_CLAIM_ID", var("CLAIMLENS_MAX_CLAIM_ID"), DEFAULT_MAX_CLAIM_ID)?,
            pacing: secs_or("CLAIMLENS_PACING_SECS", var("CLAIMLENS_PACING_SECS"), DEFAULT_PACING_SECS)?,
            vision_timeout: secs_or(
                "CLAIMLENS_VISION_TIMEOUT_SECS",
                var("CLAIMLENS_VISION_TIMEOUT_SECS"),
                DEFAULT_VISION_TIMEOUT_SECS,
            )?,
            decision_timeout: secs_or(
                "CLAIMLENS_DECISION_TIMEOUT_SECS",
                var("CLAIMLENS_DECISION_TIMEOUT_SECS"),
                DEFAULT_DECISION_TIMEOUT_SECS,
            )?,
            verification_timeout: secs_or(
                "CLAIMLENS_VERIFICATION_TIMEOUT_SECS",
                var("CLAIMLENS_VERIFICATION_TIMEOUT_SECS"),
                DEFAULT_VERIFICATION_TIMEOUT_SECS,
            )?,
            search_timeout: secs_or(
                "CLAIMLENS_SEARCH_TIMEOUT_SECS",
                var("CLAIMLENS_SEARCH_TIMEOUT_SECS"),
                DEFAULT_SEARCH_TIMEOUT_SECS,
            )?,
            host: var("APP_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or("APP_PORT", var("APP_PORT"), DEFAULT_PORT)?,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
    }
}

fn secs_or(name: &'static str, raw: Option<String>, default: u64) -> Result<Duration, ConfigError> {
    parse_or(name, raw, default).map(Duration::from_secs)
}
