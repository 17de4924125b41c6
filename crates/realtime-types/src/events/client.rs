use crate::audio::Base64EncodedAudioBytes;
use crate::content::items::Item;
use crate::session::Session;

/// `session.update` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionUpdateEvent {
    session: Session,
}

impl SessionUpdateEvent {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

/// `input_audio_buffer.append` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InputAudioBufferAppendEvent {
    audio: Base64EncodedAudioBytes,
}

impl InputAudioBufferAppendEvent {
    pub fn new(audio: Base64EncodedAudioBytes) -> Self {
        Self { audio }
    }
}

/// `input_audio_buffer.commit` event
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct InputAudioBufferCommitEvent {}

/// `input_audio_buffer.clear` event
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct InputAudioBufferClearEvent {}

/// `conversation.item.create` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConversationItemCreateEvent {
    item: Item,
}

impl ConversationItemCreateEvent {
    pub fn new(item: Item) -> Self {
        Self { item }
    }
}

/// `response.create` event
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ResponseCreateEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<Session>,
}

impl ResponseCreateEvent {
    pub fn new() -> Self {
        Self { response: None }
    }

    pub fn with_update_session(mut self, session: Session) -> Self {
        self.response = Some(session);
        self
    }
}

/// `response.cancel` event
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ResponseCancelEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_id: Option<String>,
}

impl ResponseCancelEvent {
    pub fn new() -> Self {
        Self { response_id: None }
    }

    pub fn with_response_id(mut self, response_id: &str) -> Self {
        self.response_id = Some(response_id.to_string());
        self
    }
}
