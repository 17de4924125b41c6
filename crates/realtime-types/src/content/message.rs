use crate::content::items::_Item;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageItem {
    #[serde(flatten)]
    item: _Item,

    /// The role of the message sender: "user", "assistant", "system".
    role: MessageRole,

    /// The content of the message.
    content: Vec<Content>,
}

impl MessageItem {
    pub fn builder() -> MessageItemBuilder {
        MessageItemBuilder::new()
    }

    pub fn id(&self) -> Option<&str> {
        self.item.id.as_deref()
    }

    pub fn role(&self) -> MessageRole {
        self.role.clone()
    }

    pub fn content(&self) -> &[Content] {
        &self.content
    }
}

pub struct MessageItemBuilder {
    item: MessageItem,
}

impl Default for MessageItemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageItemBuilder {
    pub fn new() -> Self {
        Self {
            item: MessageItem {
                item: _Item::default(),
                role: MessageRole::User,
                content: Vec::new(),
            },
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.item.item.id = Some(id.to_string());
        self
    }

    pub fn with_role(mut self, role: MessageRole) -> Self {
        self.item.role = role;
        self
    }

    pub fn with_input_text(mut self, text: &str) -> Self {
        self.item.content.push(Content::input_text(text));
        self
    }

    pub fn build(self) -> MessageItem {
        self.item
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MessageRole {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "system")]
    System,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum Content {
    #[serde(rename = "input_text")]
    InputText(TextPart),
    #[serde(rename = "input_audio")]
    InputAudio(TranscriptPart),
    #[serde(rename = "text")]
    Text(TextPart),
    #[serde(rename = "audio")]
    Audio(TranscriptPart),
}

impl Content {
    pub fn input_text(text: &str) -> Self {
        Content::InputText(TextPart::new(text))
    }

    /// The human-readable text carried by this part, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Content::InputText(part) | Content::Text(part) => Some(part.text()),
            Content::InputAudio(part) | Content::Audio(part) => part.transcript(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextPart {
    text: String,
}

impl TextPart {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Audio parts only carry the transcript on the wire; the PCM itself arrives
/// through `response.audio.delta` events.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TranscriptPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    transcript: Option<String>,
}

impl TranscriptPart {
    pub fn transcript(&self) -> Option<&str> {
        self.transcript.as_deref()
    }
}
