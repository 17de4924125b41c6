//! Application Configuration Module
//!
//! Centralizes the configuration for the Remi service. Settings load from
//! environment variables (and a local `.env` during development) into a
//! single struct that is constructed once in `main` and passed down; nothing
//! reads ambient global state after startup.

use remi_core::prompt::PromptTemplate;
use std::env;
use std::path::PathBuf;
use tracing::Level;

// --- Application Constants ---

/// The size of each audio chunk read from the microphone input stream.
pub const INPUT_CHUNK_SIZE: usize = 1024;
/// The size of each audio chunk for the audio output stream.
pub const OUTPUT_CHUNK_SIZE: usize = 1024;
/// The latency for the output audio buffer in milliseconds.
pub const OUTPUT_LATENCY_MS: usize = 1000;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment.
///
/// *   `ACCESS_TOKEN`: The login token verified against the auth endpoint. Required.
/// *   `AUTH_BASE_URL`: Base URL of the token-verification endpoint. Required.
/// *   `THEME_BASE_URL`: (Optional) Base URL of the theme endpoint; the built-in catalog is used when unset.
/// *   `THEME_ID`: (Optional) The 3-digit theme to load. Defaults to "001".
/// *   `BOT_NAME`: (Optional) The companion's spoken name. Defaults to "Remi".
/// *   `VOICE`: (Optional) The realtime voice. Defaults to "shimmer".
/// *   `PROMPT_TEMPLATE`: (Optional) Prompt variant selector. Defaults to "default".
/// *   `REALTIME_MODEL`: (Optional) The realtime model name.
/// *   `SUMMARY_MODEL`: (Optional) The completion model used for summaries. Defaults to "gpt-4-turbo-preview".
/// *   `DATA_DIR`: (Optional) Where credentials and summaries are stored. Defaults to "./data".
/// *   `SESSION_PHASE_MINUTES`: (Optional) Minutes before the instructions rotate to the closing prompt. Defaults to 30.
/// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
#[derive(Debug, Clone)]
pub struct Config {
    pub access_token: String,
    pub auth_base_url: String,
    pub theme_base_url: Option<String>,
    pub theme_id: String,
    pub bot_name: String,
    pub voice: String,
    pub template: PromptTemplate,
    pub realtime_model: Option<String>,
    pub summary_model: String,
    pub data_dir: PathBuf,
    pub session_phase_minutes: u64,
    pub log_level: Level,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env for local development; ignored if not present.
        dotenvy::dotenv().ok();

        let access_token = env::var("ACCESS_TOKEN")
            .map_err(|_| ConfigError::MissingVar("ACCESS_TOKEN".to_string()))?;
        let auth_base_url = env::var("AUTH_BASE_URL")
            .map_err(|_| ConfigError::MissingVar("AUTH_BASE_URL".to_string()))?;

        let theme_base_url = env::var("THEME_BASE_URL").ok();
        let theme_id = env::var("THEME_ID").unwrap_or_else(|_| "001".to_string());
        if theme_id.len() != 3 || !theme_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidValue(
                "THEME_ID".to_string(),
                format!("'{}' is not a 3-digit theme id", theme_id),
            ));
        }

        let bot_name = env::var("BOT_NAME").unwrap_or_else(|_| "Remi".to_string());
        let voice = env::var("VOICE").unwrap_or_else(|_| "shimmer".to_string());

        let template_str = env::var("PROMPT_TEMPLATE").unwrap_or_else(|_| "default".to_string());
        let template = template_str
            .parse::<PromptTemplate>()
            .map_err(|e| ConfigError::InvalidValue("PROMPT_TEMPLATE".to_string(), e.to_string()))?;

        let realtime_model = env::var("REALTIME_MODEL").ok();
        let summary_model =
            env::var("SUMMARY_MODEL").unwrap_or_else(|_| "gpt-4-turbo-preview".to_string());

        let data_dir = PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()));

        let phase_str = env::var("SESSION_PHASE_MINUTES").unwrap_or_else(|_| "30".to_string());
        let session_phase_minutes = phase_str.parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(
                "SESSION_PHASE_MINUTES".to_string(),
                format!("'{}' is not a number of minutes", phase_str),
            )
        })?;

        let log_level_str = env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            access_token,
            auth_base_url,
            theme_base_url,
            theme_id,
            bot_name,
            voice,
            template,
            realtime_model,
            summary_model,
            data_dir,
            session_phase_minutes,
            log_level,
        })
    }
}
