use crate::client::consts;
use secrecy::SecretString;

pub struct Config {
    base_url: String,
    api_key: SecretString,
    model: String,
}

pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.config.api_key = SecretString::from(api_key.to_string());
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.config.model = model.to_string();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            base_url: consts::BASE_URL.to_string(),
            api_key: std::env::var(consts::OPENAI_API_KEY)
                .unwrap_or_else(|_| "".to_string())
                .into(),
            model: consts::DEFAULT_MODEL.to_string(),
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
