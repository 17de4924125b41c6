use std::collections::HashSet;
use std::net::SocketAddr;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
///
/// *   `BIND_ADDRESS`: The address and port to bind the server to. Defaults to "0.0.0.0:3000".
/// *   `ACCESS_TOKENS`: Comma-separated list of accepted login tokens. Required.
/// *   `OPENAI_API_KEY`: The API key granted to verified clients. Required.
/// *   `IMG_BASE_URL`: The base URL topic images are served from. Required.
#[derive(Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub access_tokens: HashSet<String>,
    pub api_key: String,
    pub img_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let tokens_raw = std::env::var("ACCESS_TOKENS")
            .map_err(|_| ConfigError::MissingVar("ACCESS_TOKENS".to_string()))?;
        let access_tokens: HashSet<String> = tokens_raw
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if access_tokens.is_empty() {
            return Err(ConfigError::InvalidValue(
                "ACCESS_TOKENS".to_string(),
                "no usable tokens in the list".to_string(),
            ));
        }

        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;
        let img_base_url = std::env::var("IMG_BASE_URL")
            .map_err(|_| ConfigError::MissingVar("IMG_BASE_URL".to_string()))?;

        Ok(Self {
            bind_address,
            access_tokens,
            api_key,
            img_base_url,
        })
    }
}
