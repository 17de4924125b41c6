//! Error taxonomy for the companion.
//!
//! Propagation policy: auth and microphone-permission failures surface
//! immediately to the caller; connection failures revert the session to idle
//! and are retryable; summary and persistence failures leave the session
//! already ended and must not lose the transcript; tool failures are
//! returned to the remote model as tool-error results so the conversation
//! continues. None of these are fatal to the process.

/// Token verification against the auth endpoint failed.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("auth token was rejected (status {0})")]
    InvalidToken(u16),

    #[error("auth endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("auth endpoint returned an unexpected payload")]
    MalformedResponse,
}

/// The realtime session failed to open, or closed when it should not have.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("failed to open realtime session: {0}")]
    Open(String),

    #[error("realtime session closed unexpectedly: {}", .0.as_deref().unwrap_or("no reason given"))]
    ClosedUnexpectedly(Option<String>),
}

/// The platform refused access to an audio device.
#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    #[error("microphone access denied: {0}")]
    MicrophoneDenied(String),
}

/// Summary generation against the completion endpoint failed.
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("completion endpoint returned status {0}")]
    Status(u16),

    #[error("completion endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion endpoint returned an unexpected response shape")]
    MalformedResponse,
}

/// A read or write against the local document/key-value store failed.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored record could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A remote-invoked tool call could not be completed. Converted into a
/// tool-error result for the model, never into a session failure.
#[derive(Debug, thiserror::Error)]
pub enum ToolCallError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("tool failed: {0}")]
    Failed(String),
}

/// Prompt assembly was asked for a template this build does not know.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("unsupported prompt template: {0}")]
    UnsupportedTemplate(String),
}

/// Orchestrator-level failure, combining the connection-path causes.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error("realtime transport failed: {0}")]
    Transport(#[from] anyhow::Error),
}
