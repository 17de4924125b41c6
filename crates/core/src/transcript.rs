//! The conversation transcript: an append-only item sequence owned by the
//! session orchestrator, in the order the remote client delivered the turns.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemRole {
    User,
    Assistant,
    Tool,
}

/// A structured function invocation issued by the remote model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    /// JSON-encoded argument object, as delivered.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationItem {
    pub id: String,
    pub role: ItemRole,

    /// Typed text or the completed audio transcript.
    pub text: Option<String>,

    /// Present on tool-call items.
    pub tool: Option<ToolInvocation>,

    /// Present on tool-output items.
    pub tool_output: Option<String>,
}

impl ConversationItem {
    pub fn user_text(id: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            role: ItemRole::User,
            text: Some(text.to_string()),
            tool: None,
            tool_output: None,
        }
    }

    pub fn assistant_text(id: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            role: ItemRole::Assistant,
            text: Some(text.to_string()),
            tool: None,
            tool_output: None,
        }
    }

    pub fn tool_call(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            role: ItemRole::Tool,
            text: None,
            tool: Some(ToolInvocation {
                name: name.to_string(),
                arguments: arguments.to_string(),
            }),
            tool_output: None,
        }
    }

    pub fn tool_result(id: &str, output: &str) -> Self {
        Self {
            id: id.to_string(),
            role: ItemRole::Tool,
            text: None,
            tool: None,
            tool_output: Some(output.to_string()),
        }
    }
}

/// One line of the flattened transcript sent to the summarizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: TranscriptRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    User,
    Assistant,
}

/// Flattens conversation items into summarizable messages.
///
/// Items with nothing to say are dropped: tool outputs with no textual
/// result, and items carrying neither text nor a tool invocation. Tool
/// invocations are coalesced into a readable `name(args)` line attributed to
/// the assistant. An empty return value is the "nothing to summarize"
/// sentinel; callers must short-circuit on it before any network call.
pub fn build_transcript(items: &[ConversationItem]) -> Vec<TranscriptMessage> {
    items
        .iter()
        .filter_map(|item| {
            if let Some(output) = &item.tool_output {
                if output.trim().is_empty() {
                    return None;
                }
                return Some(TranscriptMessage {
                    role: TranscriptRole::Assistant,
                    content: output.clone(),
                });
            }
            if let Some(tool) = &item.tool {
                return Some(TranscriptMessage {
                    role: TranscriptRole::Assistant,
                    content: format!("{}({})", tool.name, tool.arguments),
                });
            }
            let text = item.text.as_deref().unwrap_or("").trim();
            if text.is_empty() {
                return None;
            }
            Some(TranscriptMessage {
                role: match item.role {
                    ItemRole::Assistant => TranscriptRole::Assistant,
                    _ => TranscriptRole::User,
                },
                content: text.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_the_empty_sentinel() {
        assert!(build_transcript(&[]).is_empty());
    }

    #[test]
    fn items_with_only_empty_tool_outputs_yield_the_empty_sentinel() {
        let items = vec![
            ConversationItem::tool_result("item_1", ""),
            ConversationItem::tool_result("item_2", "   "),
        ];
        assert!(build_transcript(&items).is_empty());
    }

    #[test]
    fn blank_messages_are_dropped() {
        let items = vec![
            ConversationItem::user_text("item_1", "  "),
            ConversationItem::user_text("item_2", "Hello"),
        ];
        let transcript = build_transcript(&items);
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].content, "Hello");
        assert_eq!(transcript[0].role, TranscriptRole::User);
    }

    #[test]
    fn tool_calls_coalesce_into_assistant_lines() {
        let items = vec![ConversationItem::tool_call(
            "item_1",
            "select_topic",
            r#"{"id":"2"}"#,
        )];
        let transcript = build_transcript(&items);
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].role, TranscriptRole::Assistant);
        assert_eq!(transcript[0].content, r#"select_topic({"id":"2"})"#);
    }

    #[test]
    fn turn_order_is_preserved() {
        let items = vec![
            ConversationItem::user_text("item_1", "Hello"),
            ConversationItem::assistant_text("item_2", "Hi there"),
            ConversationItem::user_text("item_3", "Nice to meet you"),
        ];
        let transcript = build_transcript(&items);
        let contents: Vec<&str> = transcript.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Hello", "Hi there", "Nice to meet you"]);
    }
}
