//! Post-session summarization: flatten the transcript, ask the completion
//! endpoint for a summary, persist it keyed by user and session number.

use crate::error::{PersistenceError, SummaryError};
use crate::store::{SessionSummary, SummaryStore};
use crate::transcript::{build_transcript, ConversationItem, TranscriptMessage};
use async_trait::async_trait;
use serde::Deserialize;

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MAX_TOKENS: u32 = 500;

const SUMMARY_SYSTEM_PROMPT: &str = "You are a helpful assistant that generates concise summaries of therapy sessions.\n\
Focus on:\n\
- Key topics discussed\n\
- Main emotions expressed\n\
- Important insights or breakthroughs\n\
- Any action items or goals set\n\
Format the summary with clear sections and bullet points for better readability.";

/// Ceiling for the prior-session context handed to the prompt builder.
pub const PRIOR_SUMMARIES_MAX_CHARS: usize = 6_000;

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: Message,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub content: String,
}

/// Anything that can turn a transcript into a natural-language summary.
/// Abstracting the endpoint keeps the service testable without the network.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, transcript: &[TranscriptMessage]) -> Result<String, SummaryError>;
}

/// Summarizer backed by a `/v1/chat/completions`-shaped endpoint.
pub struct ChatCompletionsSummarizer {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl ChatCompletionsSummarizer {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: COMPLETIONS_URL.to_string(),
            api_key,
            model,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl Summarizer for ChatCompletionsSummarizer {
    async fn summarize(&self, transcript: &[TranscriptMessage]) -> Result<String, SummaryError> {
        let rendered = serde_json::to_string_pretty(transcript)
            .map_err(|_| SummaryError::MalformedResponse)?;
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SUMMARY_SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!(
                        "Please summarize this therapy session in a structured way:\n\n{rendered}"
                    )
                }
            ],
            "max_tokens": self.max_tokens
        });

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SummaryError::Status(status.as_u16()));
        }

        let parsed = resp
            .json::<LlmResponse>()
            .await
            .map_err(|_| SummaryError::MalformedResponse)?;

        parsed
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .ok_or(SummaryError::MalformedResponse)
    }
}

/// What finishing a session produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryOutcome {
    /// The filtered transcript was empty; no network call was made.
    NothingToSummarize,
    /// A summary was generated and persisted.
    Saved(SessionSummary),
}

#[derive(Debug, thiserror::Error)]
pub enum FinishSessionError {
    #[error(transparent)]
    Summary(#[from] SummaryError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

pub struct SummaryService<S, T> {
    summarizer: S,
    store: T,
}

impl<S: Summarizer, T: SummaryStore> SummaryService<S, T> {
    pub fn new(summarizer: S, store: T) -> Self {
        Self { summarizer, store }
    }

    /// Summarizes a finished session and persists the result.
    ///
    /// Takes the items by reference: on failure the caller still holds the
    /// raw transcript and can retry.
    pub async fn finish_session(
        &self,
        user_id: &str,
        items: &[ConversationItem],
    ) -> Result<SummaryOutcome, FinishSessionError> {
        let transcript = build_transcript(items);
        if transcript.is_empty() {
            tracing::info!("nothing to summarize for user {}", user_id);
            return Ok(SummaryOutcome::NothingToSummarize);
        }

        let summary_text = self.summarizer.summarize(&transcript).await?;
        let record = self.store.append(user_id, &summary_text).await?;
        tracing::info!(
            "saved summary for user {} as session {}",
            user_id,
            record.session_number
        );
        Ok(SummaryOutcome::Saved(record))
    }

    /// Formats prior summaries into a single context block for the prompt
    /// builder, oldest first. When the block exceeds `max_chars`, whole
    /// sessions are dropped oldest-first until it fits.
    pub async fn prior_summaries_context(
        &self,
        user_id: &str,
        max_chars: usize,
    ) -> Result<Option<String>, PersistenceError> {
        let records = self.store.list(user_id).await?;
        if records.is_empty() {
            return Ok(None);
        }

        let mut entries: Vec<String> = records
            .iter()
            .map(|r| {
                format!(
                    "Session {} ({}):\n{}",
                    r.session_number,
                    r.timestamp.format("%Y-%m-%d"),
                    r.summary
                )
            })
            .collect();

        let render = |entries: &[String], total: usize| {
            format!(
                "Previous sessions history:\n\n{}\n\n\
                 Context instructions:\n\
                 - Session numbers indicate chronological order (1 is first, {} is most recent)\n\
                 - Maintain continuity between sessions and reference specific past sessions when relevant\n\
                 - Avoid repeating previously covered topics; build on insights from earlier sessions",
                entries.join("\n\n---\n\n"),
                total,
            )
        };

        let total = records.len();
        let mut context = render(&entries, total);
        while context.len() > max_chars && entries.len() > 1 {
            entries.remove(0);
            context = render(&entries, total);
        }
        Ok(Some(context))
    }
}
