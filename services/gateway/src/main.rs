//! Token-verification and theme endpoints for the companion.
//!
//! The client logs in once against `GET /remi_oakey` (or the `/vapi` alias)
//! with a bearer token and receives the API key and image base URL; themes
//! resolve through `GET /theme?themeId=<3-digit>`.

mod config;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use config::Config;
use remi_core::auth::AuthGrant;
use remi_core::theme::{Theme, ThemeEnvelope};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Shared by `/remi_oakey` and `/vapi`: a known token gets the grant.
async fn verify_handler(
    State(config): State<Arc<Config>>,
    headers: HeaderMap,
) -> Result<Json<AuthGrant>, StatusCode> {
    let token = bearer_token(&headers).ok_or(StatusCode::UNAUTHORIZED)?;
    if !config.access_tokens.contains(token) {
        info!("rejected unknown access token");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(AuthGrant {
        api_key: config.api_key.clone(),
        img_base_url: config.img_base_url.clone(),
    }))
}

#[derive(Deserialize)]
struct ThemeQuery {
    #[serde(rename = "themeId")]
    theme_id: String,
}

async fn theme_handler(
    Query(query): Query<ThemeQuery>,
) -> Result<Json<ThemeEnvelope>, StatusCode> {
    let theme = Theme::builtin(&query.theme_id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(ThemeEnvelope { theme }))
}

fn router(config: Arc<Config>) -> Router {
    // Permissive CORS: the browser front-end is served from another origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/remi_oakey", get(verify_handler))
        .route("/vapi", get(verify_handler))
        .route("/theme", get(theme_handler))
        .layer(cors)
        .with_state(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Arc::new(Config::from_env()?);
    let addr = config.bind_address;
    let app = router(config);

    info!("Starting gateway, listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::collections::HashSet;

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            access_tokens: HashSet::from(["letmein".to_string()]),
            api_key: "sk-granted".to_string(),
            img_base_url: "https://imgs.example.org".to_string(),
        })
    }

    fn headers_with(token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            headers.insert(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
            );
        }
        headers
    }

    #[tokio::test]
    async fn known_token_receives_the_grant() {
        let response = verify_handler(State(test_config()), headers_with(Some("letmein")))
            .await
            .unwrap();
        assert_eq!(response.0.api_key, "sk-granted");
        assert_eq!(response.0.img_base_url, "https://imgs.example.org");
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let status = verify_handler(State(test_config()), headers_with(Some("guess")))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let status = verify_handler(State(test_config()), headers_with(None))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn theme_endpoint_serves_the_catalog() {
        let response = theme_handler(Query(ThemeQuery {
            theme_id: "001".to_string(),
        }))
        .await
        .unwrap();
        assert_eq!(response.0.theme.topics[0], "Exercise and Fitness");
    }

    #[tokio::test]
    async fn unknown_theme_is_not_found() {
        let status = theme_handler(Query(ThemeQuery {
            theme_id: "999".to_string(),
        }))
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
