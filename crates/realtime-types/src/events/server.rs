use crate::content::items::Item;

/// Details carried by an `error` event.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorDetails {
    /// The type of error, e.g. "invalid_request_error", "server_error".
    #[serde(rename = "type")]
    kind: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,

    message: String,

    /// The client event id that caused the error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,
}

impl ErrorDetails {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// `error` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorEvent {
    event_id: String,
    error: ErrorDetails,
}

impl ErrorEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn error(&self) -> &ErrorDetails {
        &self.error
    }
}

/// The session resource echoed back by `session.created`/`session.updated`.
/// Fields the orchestrator does not inspect stay untyped.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionResource {
    #[serde(default)]
    id: Option<String>,

    #[serde(default)]
    model: Option<String>,

    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

impl SessionResource {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

/// `session.created` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionCreatedEvent {
    event_id: String,
    session: SessionResource,
}

impl SessionCreatedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn session(&self) -> &SessionResource {
        &self.session
    }
}

/// `session.updated` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionUpdatedEvent {
    event_id: String,
    session: SessionResource,
}

impl SessionUpdatedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn session(&self) -> &SessionResource {
        &self.session
    }
}

/// `input_audio_buffer.speech_started` / `speech_stopped` events share a shape:
/// a millisecond offset into the session and the item the speech belongs to.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SpeechBoundaryEvent {
    event_id: String,

    #[serde(alias = "audio_start_ms", alias = "audio_end_ms")]
    offset_ms: i32,

    item_id: String,
}

impl SpeechBoundaryEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn offset_ms(&self) -> i32 {
        self.offset_ms
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }
}

/// `conversation.item.created` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConversationItemCreatedEvent {
    event_id: String,

    previous_item_id: Option<String>,

    item: Item,
}

impl ConversationItemCreatedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn previous_item_id(&self) -> Option<&str> {
        self.previous_item_id.as_deref()
    }

    pub fn item(&self) -> &Item {
        &self.item
    }
}

/// `conversation.item.input_audio_transcription.completed` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InputAudioTranscriptionCompletedEvent {
    event_id: String,

    item_id: String,

    content_index: i32,

    transcript: String,
}

impl InputAudioTranscriptionCompletedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }
}

/// `conversation.item.input_audio_transcription.failed` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InputAudioTranscriptionFailedEvent {
    event_id: String,

    item_id: String,

    error: ErrorDetails,
}

impl InputAudioTranscriptionFailedEvent {
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn error(&self) -> &ErrorDetails {
        &self.error
    }
}

/// The response resource carried by `response.created` / `response.done`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseResource {
    #[serde(default)]
    id: Option<String>,

    #[serde(default)]
    status: Option<String>,

    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

impl ResponseResource {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

/// `response.created` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseCreatedEvent {
    event_id: String,
    response: ResponseResource,
}

impl ResponseCreatedEvent {
    pub fn response(&self) -> &ResponseResource {
        &self.response
    }
}

/// `response.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseDoneEvent {
    event_id: String,
    response: ResponseResource,
}

impl ResponseDoneEvent {
    pub fn response(&self) -> &ResponseResource {
        &self.response
    }
}

/// `response.audio.delta` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseAudioDeltaEvent {
    event_id: String,

    response_id: String,

    item_id: String,

    /// Base64-encoded PCM16 audio chunk.
    delta: String,
}

impl ResponseAudioDeltaEvent {
    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn delta(&self) -> &str {
        &self.delta
    }
}

/// `response.audio.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseAudioDoneEvent {
    event_id: String,

    response_id: String,

    item_id: String,
}

impl ResponseAudioDoneEvent {
    pub fn item_id(&self) -> &str {
        &self.item_id
    }
}

/// `response.audio_transcript.delta` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseAudioTranscriptDeltaEvent {
    event_id: String,

    response_id: String,

    item_id: String,

    delta: String,
}

impl ResponseAudioTranscriptDeltaEvent {
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn delta(&self) -> &str {
        &self.delta
    }
}

/// `response.audio_transcript.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseAudioTranscriptDoneEvent {
    event_id: String,

    response_id: String,

    item_id: String,

    transcript: String,
}

impl ResponseAudioTranscriptDoneEvent {
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }
}

/// `response.function_call_arguments.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionCallArgumentsDoneEvent {
    event_id: String,

    response_id: String,

    item_id: String,

    call_id: String,

    name: String,

    /// The completed arguments as a JSON-encoded string.
    arguments: String,
}

impl FunctionCallArgumentsDoneEvent {
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &str {
        &self.arguments
    }
}

#[cfg(test)]
mod tests {
    use crate::events::ServerEvent;

    #[test]
    fn deserializes_function_call_arguments_done() {
        let raw = r#"{
            "type": "response.function_call_arguments.done",
            "event_id": "event_123",
            "response_id": "resp_1",
            "item_id": "item_9",
            "call_id": "call_42",
            "name": "select_topic",
            "arguments": "{\"id\":\"2\"}"
        }"#;

        let event: ServerEvent = serde_json::from_str(raw).expect("should deserialize");
        match event {
            ServerEvent::ResponseFunctionCallArgumentsDone(data) => {
                assert_eq!(data.call_id(), "call_42");
                assert_eq!(data.name(), "select_topic");
                assert_eq!(data.arguments(), "{\"id\":\"2\"}");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn deserializes_speech_boundaries() {
        let raw = r#"{
            "type": "input_audio_buffer.speech_started",
            "event_id": "event_1",
            "audio_start_ms": 1200,
            "item_id": "item_1"
        }"#;

        let event: ServerEvent = serde_json::from_str(raw).expect("should deserialize");
        match event {
            ServerEvent::InputAudioBufferSpeechStarted(data) => {
                assert_eq!(data.offset_ms(), 1200);
                assert_eq!(data.item_id(), "item_1");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
