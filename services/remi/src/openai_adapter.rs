//! Adapter between the core session seams and the OpenAI realtime client.
//!
//! The connector opens the WebSocket and pumps wire events into the typed
//! [`SessionEvent`] stream the orchestrator consumes; the session wrapper
//! translates provider-neutral calls into wire payloads.

use anyhow::Result;
use async_trait::async_trait;
use remi_core::error::ConnectionError;
use remi_core::session::{
    RealtimeSession, SessionConfig, SessionConnector, SessionEvent, TurnDetectionMode,
};
use remi_native_utils::audio;
use remi_realtime::types::audio::{
    ServerVadTurnDetection, TranscriptionModel, TurnDetection, Voice,
};
use remi_realtime::types::tools::{FunctionTool, Tool};
use remi_realtime::types::{
    FunctionCallOutputItem, Item, MessageItem, MessageRole, ServerEvent, Session,
};
use remi_realtime::RealtimeApi;

pub struct OpenAiConnector {
    api_key: String,
    model: Option<String>,
    event_tx: tokio::sync::mpsc::Sender<SessionEvent>,
    audio_tx: tokio::sync::mpsc::Sender<Vec<f32>>,
}

impl OpenAiConnector {
    pub fn new(
        api_key: String,
        model: Option<String>,
        event_tx: tokio::sync::mpsc::Sender<SessionEvent>,
        audio_tx: tokio::sync::mpsc::Sender<Vec<f32>>,
    ) -> Self {
        Self {
            api_key,
            model,
            event_tx,
            audio_tx,
        }
    }
}

#[async_trait]
impl SessionConnector for OpenAiConnector {
    async fn open(&mut self) -> Result<Box<dyn RealtimeSession>, ConnectionError> {
        let mut builder = remi_realtime::Config::builder().with_api_key(&self.api_key);
        if let Some(model) = &self.model {
            builder = builder.with_model(model);
        }
        let mut client = remi_realtime::connect_with_config(1024, builder.build())
            .await
            .map_err(|e| ConnectionError::Open(e.to_string()))?;

        let server_rx = client
            .server_events()
            .await
            .map_err(|e| ConnectionError::Open(e.to_string()))?;
        tokio::spawn(pump_server_events(
            server_rx,
            self.event_tx.clone(),
            self.audio_tx.clone(),
        ));

        Ok(Box::new(OpenAiSession {
            client,
            current: None,
        }))
    }
}

/// Forwards wire events as typed session events; audio deltas are decoded
/// and routed straight to the playback pipeline.
async fn pump_server_events(
    mut server_rx: remi_realtime::ServerRx,
    event_tx: tokio::sync::mpsc::Sender<SessionEvent>,
    audio_tx: tokio::sync::mpsc::Sender<Vec<f32>>,
) {
    loop {
        let event = match server_rx.recv().await {
            Ok(event) => event,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("server event stream lagged, skipped {} events", skipped);
                continue;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        };

        let mapped = match event {
            ServerEvent::SessionCreated(_) => vec![SessionEvent::Ready],
            ServerEvent::SessionUpdated(_) => vec![SessionEvent::ConfigApplied],
            // Detected user speech doubles as barge-in: queued playback must
            // drop and the in-flight response gets cancelled.
            ServerEvent::InputAudioBufferSpeechStarted(_) => {
                vec![SessionEvent::Interrupted, SessionEvent::SpeechStarted]
            }
            ServerEvent::InputAudioBufferSpeechStopped(_) => vec![SessionEvent::SpeechStopped],
            ServerEvent::ConversationItemInputAudioTranscriptionCompleted(data) => {
                vec![SessionEvent::UserTranscript {
                    item_id: data.item_id().to_string(),
                    transcript: data.transcript().trim().to_string(),
                }]
            }
            ServerEvent::ConversationItemInputAudioTranscriptionFailed(data) => {
                vec![SessionEvent::RemoteError {
                    message: format!("transcription failed: {}", data.error().message()),
                }]
            }
            ServerEvent::ResponseAudioDelta(data) => {
                let samples = audio::decode(data.delta());
                if !samples.is_empty() {
                    if let Err(e) = audio_tx.send(samples).await {
                        tracing::warn!("failed to forward playback audio: {:?}", e);
                    }
                }
                vec![]
            }
            ServerEvent::ResponseAudioTranscriptDone(data) => {
                vec![SessionEvent::AssistantTranscript {
                    item_id: data.item_id().to_string(),
                    transcript: data.transcript().to_string(),
                }]
            }
            ServerEvent::ResponseFunctionCallArgumentsDone(data) => {
                vec![SessionEvent::ToolCall {
                    call_id: data.call_id().to_string(),
                    name: data.name().to_string(),
                    arguments: data.arguments().to_string(),
                }]
            }
            ServerEvent::ResponseDone(_) => vec![SessionEvent::ResponseDone],
            ServerEvent::Error(data) => vec![SessionEvent::RemoteError {
                message: data.error().message().to_string(),
            }],
            ServerEvent::Close { reason } => {
                let _ = event_tx.send(SessionEvent::Closed { reason }).await;
                break;
            }
            _ => vec![],
        };

        for session_event in mapped {
            if event_tx.send(session_event).await.is_err() {
                tracing::debug!("session event receiver dropped, stopping pump");
                return;
            }
        }
    }
}

pub struct OpenAiSession<C: RealtimeApi> {
    client: C,
    /// The last full configuration sent; partial updates re-send the whole
    /// session object with the changed field.
    current: Option<SessionConfig>,
}

fn to_wire(config: &SessionConfig) -> Session {
    let voice = config.voice.parse::<Voice>().unwrap_or_else(|e| {
        tracing::warn!("{}; falling back to shimmer", e);
        Voice::Shimmer
    });

    let tools = config
        .tools
        .iter()
        .map(|spec| {
            Tool::Function(FunctionTool::new(
                &spec.name,
                &spec.description,
                spec.parameters.clone(),
            ))
        })
        .collect();

    let builder = Session::new()
        .with_modalities_enable_audio()
        .with_instructions(&config.instructions)
        .with_voice(voice)
        .with_input_audio_transcription_enable(TranscriptionModel::Whisper)
        .with_tools(tools);

    match config.turn_detection {
        TurnDetectionMode::Auto => builder
            .with_turn_detection_enable(TurnDetection::ServerVad(
                ServerVadTurnDetection::default().with_interrupt_response(true),
            ))
            .build(),
        TurnDetectionMode::Manual => builder.with_turn_detection_disable().build(),
    }
}

#[async_trait]
impl<C: RealtimeApi> RealtimeSession for OpenAiSession<C> {
    async fn configure(&mut self, config: SessionConfig) -> Result<()> {
        let session = to_wire(&config);
        self.current = Some(config);
        self.client.update_session(session).await
    }

    async fn update_instructions(&mut self, instructions: String) -> Result<()> {
        let config = match self.current.as_mut() {
            Some(config) => {
                config.instructions = instructions;
                config.clone()
            }
            None => return Err(anyhow::anyhow!("session was never configured")),
        };
        self.client.update_session(to_wire(&config)).await
    }

    async fn set_turn_detection(&mut self, mode: TurnDetectionMode) -> Result<()> {
        let config = match self.current.as_mut() {
            Some(config) => {
                config.turn_detection = mode;
                config.clone()
            }
            None => return Err(anyhow::anyhow!("session was never configured")),
        };
        self.client.update_session(to_wire(&config)).await
    }

    async fn append_audio(&mut self, samples: Vec<f32>) -> Result<()> {
        let encoded = audio::encode(&samples);
        self.client.append_input_audio_buffer(encoded).await
    }

    async fn commit_audio(&mut self) -> Result<()> {
        self.client.commit_input_audio_buffer().await
    }

    async fn send_user_text(&mut self, text: String) -> Result<()> {
        let item = MessageItem::builder()
            .with_role(MessageRole::User)
            .with_input_text(&text)
            .build();
        self.client
            .create_conversation_item(Item::Message(item))
            .await
    }

    async fn create_response(&mut self) -> Result<()> {
        self.client.create_response().await
    }

    async fn cancel_response(&mut self) -> Result<()> {
        self.client.cancel_response().await
    }

    async fn send_tool_result(&mut self, call_id: String, output: String) -> Result<()> {
        let item = FunctionCallOutputItem::new(&call_id, &output);
        self.client
            .create_conversation_item(Item::FunctionCallOutput(item))
            .await
    }

    async fn close(&mut self) -> Result<()> {
        self.client.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use remi_core::session::{builtin_tool_specs, ToolSpec};

    mock! {
        pub WireClient {}
        #[async_trait]
        impl RealtimeApi for WireClient {
            async fn update_session(&mut self, config: Session) -> Result<()>;
            async fn append_input_audio_buffer(&mut self, audio: String) -> Result<()>;
            async fn commit_input_audio_buffer(&mut self) -> Result<()>;
            async fn clear_input_audio_buffer(&mut self) -> Result<()>;
            async fn create_conversation_item(&mut self, item: Item) -> Result<()>;
            async fn create_response(&mut self) -> Result<()>;
            async fn cancel_response(&mut self) -> Result<()>;
            async fn server_events(&mut self) -> Result<remi_realtime::ServerRx>;
            async fn close(&mut self) -> Result<()>;
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            instructions: "You are Remi.".to_string(),
            voice: "shimmer".to_string(),
            turn_detection: TurnDetectionMode::Auto,
            tools: builtin_tool_specs(),
        }
    }

    #[tokio::test]
    async fn configure_sends_instructions_and_all_tools() {
        let mut client = MockWireClient::new();
        client
            .expect_update_session()
            .withf(|session: &Session| {
                session.instructions() == Some("You are Remi.")
                    && session.tools().len() == 3
                    && session.turn_detection().is_some()
            })
            .times(1)
            .returning(|_| Ok(()));

        let mut session = OpenAiSession {
            client,
            current: None,
        };
        session.configure(config()).await.unwrap();
    }

    #[tokio::test]
    async fn manual_mode_disables_turn_detection_on_the_wire() {
        let mut client = MockWireClient::new();
        client
            .expect_update_session()
            .times(1)
            .returning(|_| Ok(()));
        client
            .expect_update_session()
            .withf(|session: &Session| session.turn_detection().is_none())
            .times(1)
            .returning(|_| Ok(()));

        let mut session = OpenAiSession {
            client,
            current: None,
        };
        session.configure(config()).await.unwrap();
        session
            .set_turn_detection(TurnDetectionMode::Manual)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_instructions_keeps_the_registered_tools() {
        let mut client = MockWireClient::new();
        client
            .expect_update_session()
            .withf(|session: &Session| session.tools().len() == 3)
            .times(2)
            .returning(|_| Ok(()));

        let mut session = OpenAiSession {
            client,
            current: None,
        };
        session.configure(config()).await.unwrap();
        session
            .update_instructions("Wind the conversation down.".to_string())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn tool_results_become_function_call_output_items() {
        let mut client = MockWireClient::new();
        client
            .expect_create_conversation_item()
            .withf(|item: &Item| match item {
                Item::FunctionCallOutput(output) => {
                    output.call_id() == Some("call_7")
                        && output.output() == Some(r#"{"ok":true}"#)
                }
                _ => false,
            })
            .times(1)
            .returning(|_| Ok(()));

        let mut session = OpenAiSession {
            client,
            current: None,
        };
        session
            .send_tool_result("call_7".to_string(), r#"{"ok":true}"#.to_string())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_voice_falls_back_instead_of_failing() {
        let spec = SessionConfig {
            voice: "baritone".to_string(),
            ..config()
        };
        // to_wire must not panic or error on the unknown voice name.
        let session = to_wire(&spec);
        assert_eq!(session.instructions(), Some("You are Remi."));
    }

    #[tokio::test]
    async fn tool_spec_parameters_survive_translation() {
        let spec = ToolSpec {
            name: "select_topic".to_string(),
            description: "Specify a topic".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        };
        let wire = to_wire(&SessionConfig {
            tools: vec![spec],
            ..config()
        });
        match &wire.tools()[0] {
            Tool::Function(f) => {
                assert_eq!(f.name(), "select_topic");
                assert_eq!(f.parameters(), &serde_json::json!({"type": "object"}));
            }
        }
    }
}
