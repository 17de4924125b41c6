//! Token verification against the auth endpoint, done once at login.

use crate::error::AuthError;
use serde::{Deserialize, Serialize};

/// What a verified token grants: the key for the realtime/completions API
/// and the base URL the topic images are served from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthGrant {
    pub api_key: String,
    pub img_base_url: String,
}

pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Verifies an access token against `GET /remi_oakey`.
    pub async fn verify_token(&self, token: &str) -> Result<AuthGrant, AuthError> {
        self.verify_at("remi_oakey", token).await
    }

    /// Verifies a voice-API token against `GET /vapi`.
    pub async fn verify_voice_token(&self, token: &str) -> Result<AuthGrant, AuthError> {
        self.verify_at("vapi", token).await
    }

    async fn verify_at(&self, path: &str, token: &str) -> Result<AuthGrant, AuthError> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self.http.get(&url).bearer_auth(token).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AuthError::InvalidToken(status.as_u16()));
        }

        resp.json::<AuthGrant>()
            .await
            .map_err(|_| AuthError::MalformedResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_shape_parses() {
        let raw = r#"{"api_key":"sk-abc","img_base_url":"https://imgs.example.org"}"#;
        let grant: AuthGrant = serde_json::from_str(raw).unwrap();
        assert_eq!(grant.api_key, "sk-abc");
        assert_eq!(grant.img_base_url, "https://imgs.example.org");
    }

    #[test]
    fn invalid_token_error_names_the_status() {
        let err = AuthError::InvalidToken(401);
        assert!(err.to_string().contains("401"));
    }
}
