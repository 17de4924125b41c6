//! The session orchestrator: lifecycle of one realtime conversation and its
//! audio pipeline.
//!
//! States: `idle → connecting → connected → (paused ⇄ connected) → ending →
//! idle`. The orchestrator owns the realtime session handle, the audio
//! capture/playback handles and the conversation transcript. Remote events
//! arrive as typed [`SessionEvent`] messages and are applied in delivery
//! order on a single event loop.

use crate::error::{ConnectionError, PermissionError, SessionError, ToolCallError};
use crate::memory::MemoryStore;
use crate::prompt::{self, PromptInputs, PromptTemplate};
use crate::theme::Theme;
use crate::transcript::{ConversationItem, ItemRole};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Paused,
    Ending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDetectionMode {
    /// Push-to-talk: explicit start/stop recording; a response is requested
    /// only at stop.
    Manual,
    /// Server-side voice activity detection over a continuous audio stream.
    Auto,
}

/// Schema of one remote-invocable tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Provider-neutral session configuration the adapter translates to the
/// wire format.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub instructions: String,
    pub voice: String,
    pub turn_detection: TurnDetectionMode,
    pub tools: Vec<ToolSpec>,
}

/// Typed messages the remote client integration delivers to the
/// orchestrator's state machine.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The remote reports the session exists.
    Ready,
    /// The remote acknowledged the session configuration.
    ConfigApplied,
    SpeechStarted,
    SpeechStopped,
    UserTranscript {
        item_id: String,
        transcript: String,
    },
    AssistantTranscript {
        item_id: String,
        transcript: String,
    },
    ToolCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    /// The user barged in over assistant playback.
    Interrupted,
    ResponseDone,
    /// A mid-session error that does not close the channel.
    RemoteError { message: String },
    Closed { reason: Option<String> },
}

/// An open realtime session, as the orchestrator sees it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RealtimeSession: Send {
    async fn configure(&mut self, config: SessionConfig) -> anyhow::Result<()>;
    async fn update_instructions(&mut self, instructions: String) -> anyhow::Result<()>;
    async fn set_turn_detection(&mut self, mode: TurnDetectionMode) -> anyhow::Result<()>;
    async fn append_audio(&mut self, samples: Vec<f32>) -> anyhow::Result<()>;
    async fn commit_audio(&mut self) -> anyhow::Result<()>;
    async fn send_user_text(&mut self, text: String) -> anyhow::Result<()>;
    async fn create_response(&mut self) -> anyhow::Result<()>;
    async fn cancel_response(&mut self) -> anyhow::Result<()>;
    async fn send_tool_result(&mut self, call_id: String, output: String) -> anyhow::Result<()>;
    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Opens realtime sessions. Connection failures are typed so the caller can
/// present a retryable error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionConnector: Send {
    async fn open(&mut self) -> Result<Box<dyn RealtimeSession>, ConnectionError>;
}

/// Microphone capture. `begin` acquires the device (and is where a platform
/// permission denial surfaces); `record`/`pause` gate frame delivery;
/// `end` releases the device.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioCapture: Send {
    async fn begin(&mut self) -> Result<(), PermissionError>;
    async fn record(&mut self) -> anyhow::Result<()>;
    async fn pause(&mut self) -> anyhow::Result<()>;
    async fn end(&mut self) -> anyhow::Result<()>;
}

/// Speaker-side playback control. Interrupt drops queued assistant audio.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioPlayback: Send {
    async fn interrupt(&mut self) -> anyhow::Result<()>;
}

/// Static settings the orchestrator is constructed with; ambient browser
/// storage from the original deployment became this explicit object.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub bot_name: String,
    pub voice: String,
    pub template: PromptTemplate,
}

pub const TOOL_RECORD_MEMORY_FACT: &str = "record_memory_fact";
pub const TOOL_REVEAL_TOPIC_IMAGES: &str = "reveal_topic_images";
pub const TOOL_SELECT_TOPIC: &str = "select_topic";

/// The three tools every session registers with the remote model.
pub fn builtin_tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: TOOL_RECORD_MEMORY_FACT.to_string(),
            description: "Saves important data about the user into memory.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "key": {
                        "type": "string",
                        "description": "The key of the memory value. Always use lowercase and underscores, no other characters."
                    },
                    "value": {
                        "type": "string",
                        "description": "Value can be anything represented as a string"
                    }
                },
                "required": ["key", "value"]
            }),
        },
        ToolSpec {
            name: TOOL_REVEAL_TOPIC_IMAGES.to_string(),
            description: "Display all three topic images on the screen".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
        },
        ToolSpec {
            name: TOOL_SELECT_TOPIC.to_string(),
            description: "Specify a topic to talk about".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "id": {
                        "type": "string",
                        "enum": ["1", "2", "3"],
                        "description": "topic ID"
                    }
                },
                "required": ["id"]
            }),
        },
    ]
}

pub struct SessionOrchestrator<C, A, P> {
    connector: C,
    capture: A,
    playback: P,
    settings: SessionSettings,
    theme: Theme,
    memory: MemoryStore,
    prior_summaries: Option<String>,

    state: ConnectionState,
    mode: TurnDetectionMode,
    /// Bumped by every connect attempt and every disconnect. An async
    /// completion carrying an older value is stale and gets discarded.
    epoch: u64,
    session: Option<Box<dyn RealtimeSession>>,
    session_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,

    items: Vec<ConversationItem>,
    displayed_topics: Vec<String>,
    last_error: Option<String>,

    capture_acquired: bool,
    capturing: bool,
}

impl<C, A, P> SessionOrchestrator<C, A, P>
where
    C: SessionConnector,
    A: AudioCapture,
    P: AudioPlayback,
{
    pub fn new(
        connector: C,
        capture: A,
        playback: P,
        settings: SessionSettings,
        theme: Theme,
        memory: MemoryStore,
    ) -> Self {
        Self {
            connector,
            capture,
            playback,
            settings,
            theme,
            memory,
            prior_summaries: None,
            state: ConnectionState::Idle,
            mode: TurnDetectionMode::Auto,
            epoch: 0,
            session: None,
            session_id: None,
            started_at: None,
            items: Vec::new(),
            displayed_topics: Vec::new(),
            last_error: None,
            capture_acquired: false,
            capturing: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn mode(&self) -> TurnDetectionMode {
        self.mode
    }

    pub fn items(&self) -> &[ConversationItem] {
        &self.items
    }

    pub fn displayed_topics(&self) -> &[String] {
        &self.displayed_topics
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Prior-session context injected into the next instruction build.
    pub fn set_prior_summaries(&mut self, prior_summaries: Option<String>) {
        self.prior_summaries = prior_summaries;
    }

    /// Acquires the microphone, opens the remote session, and configures it
    /// with instructions, voice and tools. Idempotent: a call while already
    /// connecting or connected is a no-op.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        let token = match self.begin_connect() {
            Some(token) => token,
            None => return Ok(()),
        };

        // Microphone first: a denied permission must propagate, never
        // silently continue voiceless.
        if let Err(e) = self.capture.begin().await {
            self.state = ConnectionState::Idle;
            return Err(e.into());
        }
        self.capture_acquired = true;

        let opened = self.connector.open().await;
        self.finish_connect(token, opened).await
    }

    /// First phase of `connect`: claims the connecting state and returns the
    /// epoch token the completion must present. `None` means connect is
    /// already in progress (or done) and the call is a no-op.
    pub fn begin_connect(&mut self) -> Option<u64> {
        match self.state {
            ConnectionState::Idle => {
                self.epoch += 1;
                self.state = ConnectionState::Connecting;
                self.last_error = None;
                Some(self.epoch)
            }
            _ => None,
        }
    }

    /// Second phase of `connect`: applies the result of the remote open.
    /// A completion whose token no longer matches the current epoch lost a
    /// race with `disconnect` and is discarded without touching state.
    pub async fn finish_connect(
        &mut self,
        token: u64,
        opened: Result<Box<dyn RealtimeSession>, ConnectionError>,
    ) -> Result<(), SessionError> {
        if token != self.epoch {
            tracing::debug!("discarding stale connect completion (token {})", token);
            if let Ok(mut session) = opened {
                let _ = session.close().await;
            }
            return Ok(());
        }

        let mut session = match opened {
            Ok(session) => session,
            Err(e) => {
                self.rollback_connect().await;
                return Err(e.into());
            }
        };

        let config = SessionConfig {
            instructions: self.build_instructions(),
            voice: self.settings.voice.clone(),
            turn_detection: self.mode,
            tools: builtin_tool_specs(),
        };
        if let Err(e) = session.configure(config).await {
            let _ = session.close().await;
            self.rollback_connect().await;
            return Err(SessionError::Connection(ConnectionError::Open(
                e.to_string(),
            )));
        }

        self.session = Some(session);
        self.session_id = Some(Uuid::new_v4());
        self.started_at = Some(Utc::now());
        self.state = ConnectionState::Connected;
        tracing::info!("session {} connected", self.session_id.unwrap_or_default());

        if self.mode == TurnDetectionMode::Auto {
            self.capture.record().await?;
            self.capturing = true;
        }
        Ok(())
    }

    async fn rollback_connect(&mut self) {
        if self.capture_acquired {
            if let Err(e) = self.capture.end().await {
                tracing::warn!("failed to release capture during rollback: {}", e);
            }
            self.capture_acquired = false;
        }
        self.capturing = false;
        self.state = ConnectionState::Idle;
    }

    /// Always-safe teardown: stops capture, interrupts playback, closes the
    /// remote session, returns to idle. Callable from any state, including
    /// idle (no-op), and never double-releases audio resources.
    pub async fn disconnect(&mut self) {
        self.epoch += 1;

        if self.capturing {
            if let Err(e) = self.capture.pause().await {
                tracing::warn!("failed to stop capture: {}", e);
            }
            self.capturing = false;
        }
        if self.capture_acquired {
            if let Err(e) = self.capture.end().await {
                tracing::warn!("failed to release capture: {}", e);
            }
            self.capture_acquired = false;
        }
        if let Some(mut session) = self.session.take() {
            if let Err(e) = self.playback.interrupt().await {
                tracing::warn!("failed to interrupt playback: {}", e);
            }
            if let Err(e) = session.close().await {
                tracing::warn!("failed to close session: {}", e);
            }
        }
        self.state = ConnectionState::Idle;
    }

    /// Stops capture and cancels the in-flight response without closing the
    /// underlying session. Reentrant: a second pause is a no-op.
    pub async fn pause(&mut self) -> Result<(), SessionError> {
        if self.state != ConnectionState::Connected {
            return Ok(());
        }
        if self.capturing {
            self.capture.pause().await?;
            self.capturing = false;
        }
        self.playback.interrupt().await?;
        if let Some(session) = self.session.as_mut() {
            session.cancel_response().await?;
        }
        self.state = ConnectionState::Paused;
        Ok(())
    }

    /// Re-arms capture (auto mode only) and returns to connected.
    pub async fn resume(&mut self) -> Result<(), SessionError> {
        if self.state != ConnectionState::Paused {
            return Ok(());
        }
        if self.mode == TurnDetectionMode::Auto && !self.capturing {
            self.capture.record().await?;
            self.capturing = true;
        }
        self.state = ConnectionState::Connected;
        Ok(())
    }

    /// Switches between manual push-to-talk and automatic voice-activity
    /// detection. The old mode's capture stops before the new one starts,
    /// so two capture streams never run at once.
    pub async fn set_turn_detection_mode(
        &mut self,
        mode: TurnDetectionMode,
    ) -> Result<(), SessionError> {
        if self.mode == mode {
            return Ok(());
        }
        if self.capturing {
            self.capture.pause().await?;
            self.capturing = false;
        }
        self.mode = mode;
        if let Some(session) = self.session.as_mut() {
            session.set_turn_detection(mode).await?;
        }
        if mode == TurnDetectionMode::Auto && self.state == ConnectionState::Connected {
            self.capture.record().await?;
            self.capturing = true;
        }
        Ok(())
    }

    /// Manual mode: begin a push-to-talk turn. Any in-flight playback is
    /// interrupted and the pending response cancelled before capture starts
    /// (barge-in).
    pub async fn start_recording(&mut self) -> Result<(), SessionError> {
        if self.state != ConnectionState::Connected || self.capturing {
            return Ok(());
        }
        self.playback.interrupt().await?;
        if let Some(session) = self.session.as_mut() {
            session.cancel_response().await?;
        }
        self.capture.record().await?;
        self.capturing = true;
        Ok(())
    }

    /// Manual mode: end the push-to-talk turn and request a response.
    pub async fn stop_recording(&mut self) -> Result<(), SessionError> {
        if !self.capturing {
            return Ok(());
        }
        self.capture.pause().await?;
        self.capturing = false;
        if let Some(session) = self.session.as_mut() {
            session.commit_audio().await?;
            session.create_response().await?;
        }
        Ok(())
    }

    /// Streams one captured frame to the remote session. Frames are appended
    /// in call order; a frame arriving while not capturing is dropped.
    pub async fn handle_audio_frame(&mut self, samples: Vec<f32>) -> Result<(), SessionError> {
        if !self.capturing || self.state != ConnectionState::Connected {
            return Ok(());
        }
        if let Some(session) = self.session.as_mut() {
            session.append_audio(samples).await?;
        }
        Ok(())
    }

    /// Sends a typed user message and requests a response.
    pub async fn send_text(&mut self, text: &str) -> Result<(), SessionError> {
        if self.state != ConnectionState::Connected {
            return Ok(());
        }
        if let Some(session) = self.session.as_mut() {
            session.send_user_text(text.to_string()).await?;
            session.create_response().await?;
        }
        Ok(())
    }

    /// Replaces the session instructions mid-conversation (session phase
    /// rotation, e.g. switching to the closing prompt).
    pub async fn update_instructions(&mut self, instructions: String) -> Result<(), SessionError> {
        if let Some(session) = self.session.as_mut() {
            session.update_instructions(instructions).await?;
        }
        Ok(())
    }

    /// Applies one remote event. Events must be fed in delivery order.
    pub async fn apply_event(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        match event {
            SessionEvent::Ready => {
                tracing::debug!("remote session created");
            }
            SessionEvent::ConfigApplied => {
                tracing::debug!("remote session configuration applied");
            }
            SessionEvent::SpeechStarted => {
                tracing::debug!("user speech started");
            }
            SessionEvent::SpeechStopped => {
                tracing::debug!("user speech stopped");
            }
            SessionEvent::UserTranscript {
                item_id,
                transcript,
            } => {
                tracing::info!("user said: \"{}\"", transcript);
                self.upsert_text_item(&item_id, ItemRole::User, &transcript);
            }
            SessionEvent::AssistantTranscript {
                item_id,
                transcript,
            } => {
                tracing::info!("assistant said: \"{}\"", transcript);
                self.upsert_text_item(&item_id, ItemRole::Assistant, &transcript);
            }
            SessionEvent::ToolCall {
                call_id,
                name,
                arguments,
            } => {
                self.items
                    .push(ConversationItem::tool_call(&call_id, &name, &arguments));

                // A failing tool becomes a tool-error result for the model,
                // never a session failure.
                let output = match self.dispatch_tool(&name, &arguments) {
                    Ok(value) => value.to_string(),
                    Err(e) => {
                        tracing::warn!("tool call {} failed: {}", name, e);
                        serde_json::json!({ "error": e.to_string() }).to_string()
                    }
                };
                self.items
                    .push(ConversationItem::tool_result(&call_id, &output));

                if let Some(session) = self.session.as_mut() {
                    session.send_tool_result(call_id, output).await?;
                    session.create_response().await?;
                }
            }
            SessionEvent::Interrupted => {
                // Barge-in: drop queued playback and cancel the response so
                // output and input do not overlap.
                self.playback.interrupt().await?;
                if let Some(session) = self.session.as_mut() {
                    session.cancel_response().await?;
                }
            }
            SessionEvent::ResponseDone => {
                tracing::debug!("response done");
            }
            SessionEvent::RemoteError { message } => {
                tracing::error!("remote session error: {}", message);
                self.last_error = Some(message);
            }
            SessionEvent::Closed { reason } => {
                let was_active = matches!(
                    self.state,
                    ConnectionState::Connecting
                        | ConnectionState::Connected
                        | ConnectionState::Paused
                );
                self.disconnect().await;
                if was_active {
                    let message = reason.clone().unwrap_or_else(|| "channel closed".to_string());
                    self.last_error = Some(message);
                    return Err(ConnectionError::ClosedUnexpectedly(reason).into());
                }
            }
        }
        Ok(())
    }

    /// Ends the session: tears the connection down, clears per-session
    /// caches, and hands the accumulated transcript to the caller (for the
    /// summary service). The transcript drains once.
    pub async fn end(&mut self) -> Vec<ConversationItem> {
        self.state = ConnectionState::Ending;
        self.disconnect().await;
        self.displayed_topics.clear();
        self.prior_summaries = None;
        self.session_id = None;
        self.started_at = None;
        std::mem::take(&mut self.items)
    }

    fn build_instructions(&self) -> String {
        let memory_json = self.memory.snapshot_json();
        let inputs = PromptInputs {
            bot_name: &self.settings.bot_name,
            memory_json: &memory_json,
            topics: &self.theme.topics,
            prior_summaries: self.prior_summaries.as_deref(),
            theme_id: Some(&self.theme.id),
        };
        prompt::build_instructions(self.settings.template, &inputs)
    }

    fn upsert_text_item(&mut self, item_id: &str, role: ItemRole, text: &str) {
        match self.items.iter_mut().find(|i| i.id == item_id) {
            Some(item) => item.text = Some(text.to_string()),
            None => self.items.push(ConversationItem {
                id: item_id.to_string(),
                role,
                text: Some(text.to_string()),
                tool: None,
                tool_output: None,
            }),
        }
    }

    fn dispatch_tool(
        &mut self,
        name: &str,
        arguments: &str,
    ) -> Result<serde_json::Value, ToolCallError> {
        match name {
            TOOL_RECORD_MEMORY_FACT => {
                #[derive(serde::Deserialize)]
                struct Args {
                    key: String,
                    value: String,
                }
                let args: Args = serde_json::from_str(arguments)
                    .map_err(|e| ToolCallError::InvalidArguments(e.to_string()))?;
                self.memory
                    .remember(&args.key, &args.value)
                    .map_err(|e| ToolCallError::Failed(e.to_string()))?;
                Ok(serde_json::json!({ "ok": true }))
            }
            TOOL_REVEAL_TOPIC_IMAGES => {
                self.displayed_topics =
                    vec!["1".to_string(), "2".to_string(), "3".to_string()];
                Ok(serde_json::json!({ "ok": true, "displayed": ["1", "2", "3"] }))
            }
            TOOL_SELECT_TOPIC => {
                #[derive(serde::Deserialize)]
                struct Args {
                    id: String,
                }
                let args: Args = serde_json::from_str(arguments)
                    .map_err(|e| ToolCallError::InvalidArguments(e.to_string()))?;
                if !matches!(args.id.as_str(), "1" | "2" | "3") {
                    return Err(ToolCallError::InvalidArguments(format!(
                        "topic id must be '1', '2' or '3', got '{}'",
                        args.id
                    )));
                }
                self.displayed_topics = vec![args.id.clone()];
                Ok(serde_json::json!({ "ok": true, "displayed": [args.id] }))
            }
            other => Err(ToolCallError::UnknownTool(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::CredentialStore;
    use mockall::Sequence;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        dir: TempDir,
        connector: MockSessionConnector,
        capture: MockAudioCapture,
        playback: MockAudioPlayback,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempdir().unwrap(),
                connector: MockSessionConnector::new(),
                capture: MockAudioCapture::new(),
                playback: MockAudioPlayback::new(),
            }
        }

        fn memory(&self) -> MemoryStore {
            let store =
                CredentialStore::open(self.dir.path().join("credentials.json")).unwrap();
            MemoryStore::load(store)
        }

        fn orchestrator(
            self,
        ) -> (
            SessionOrchestrator<MockSessionConnector, MockAudioCapture, MockAudioPlayback>,
            TempDir,
        ) {
            let memory = self.memory();
            let settings = SessionSettings {
                bot_name: "Remi".to_string(),
                voice: "shimmer".to_string(),
                template: PromptTemplate::Default,
            };
            let theme = Theme::builtin("001").unwrap();
            (
                SessionOrchestrator::new(
                    self.connector,
                    self.capture,
                    self.playback,
                    settings,
                    theme,
                    memory,
                ),
                self.dir,
            )
        }
    }

    fn quiet_session() -> MockRealtimeSession {
        let mut session = MockRealtimeSession::new();
        session.expect_configure().returning(|_| Ok(()));
        session.expect_close().returning(|| Ok(()));
        session
    }

    async fn connected_fixture(
        mut fixture: Fixture,
        session: MockRealtimeSession,
    ) -> (
        SessionOrchestrator<MockSessionConnector, MockAudioCapture, MockAudioPlayback>,
        TempDir,
    ) {
        fixture.capture.expect_begin().returning(|| Ok(()));
        fixture.capture.expect_record().returning(|| Ok(()));
        let mut session = Some(session);
        fixture
            .connector
            .expect_open()
            .times(1)
            .returning(move || Ok(Box::new(session.take().expect("open called once"))));

        let (mut orchestrator, dir) = fixture.orchestrator();
        orchestrator.connect().await.unwrap();
        assert_eq!(orchestrator.state(), ConnectionState::Connected);
        (orchestrator, dir)
    }

    #[tokio::test]
    async fn connect_configures_the_session_with_all_three_topics() {
        let fixture = Fixture::new();
        let mut session = MockRealtimeSession::new();
        session
            .expect_configure()
            .withf(|config: &SessionConfig| {
                config.instructions.contains("Exercise and Fitness")
                    && config.instructions.contains("Nutrition and Cooking")
                    && config.instructions.contains("Mental Well-being")
                    && config.tools.len() == 3
                    && config.voice == "shimmer"
            })
            .times(1)
            .returning(|_| Ok(()));
        session.expect_close().returning(|| Ok(()));

        let (orchestrator, _dir) = connected_fixture(fixture, session).await;
        assert_eq!(orchestrator.mode(), TurnDetectionMode::Auto);
    }

    #[tokio::test]
    async fn connect_is_idempotent_against_double_invocation() {
        let fixture = Fixture::new();
        let (mut orchestrator, _dir) = connected_fixture(fixture, quiet_session()).await;

        // connector.expect_open is times(1): a second open would panic.
        orchestrator.connect().await.unwrap();
        assert_eq!(orchestrator.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn microphone_denial_propagates_and_reverts_to_idle() {
        let mut fixture = Fixture::new();
        fixture.capture.expect_begin().times(1).returning(|| {
            Err(PermissionError::MicrophoneDenied(
                "user dismissed the prompt".to_string(),
            ))
        });

        let (mut orchestrator, _dir) = fixture.orchestrator();
        let err = orchestrator.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Permission(_)));
        assert_eq!(orchestrator.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn remote_open_failure_reverts_to_idle_and_releases_capture() {
        let mut fixture = Fixture::new();
        fixture.capture.expect_begin().times(1).returning(|| Ok(()));
        fixture.capture.expect_end().times(1).returning(|| Ok(()));
        fixture
            .connector
            .expect_open()
            .times(1)
            .returning(|| Err(ConnectionError::Open("dns failure".to_string())));

        let (mut orchestrator, _dir) = fixture.orchestrator();
        let err = orchestrator.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Connection(_)));
        assert_eq!(orchestrator.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn disconnect_from_idle_is_a_noop() {
        let fixture = Fixture::new();
        let (mut orchestrator, _dir) = fixture.orchestrator();

        // No expectations set: any touched audio or session resource panics.
        orchestrator.disconnect().await;
        assert_eq!(orchestrator.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn stale_connect_completion_is_discarded() {
        let fixture = Fixture::new();
        let (mut orchestrator, _dir) = fixture.orchestrator();

        let token = orchestrator.begin_connect().expect("idle accepts connect");
        orchestrator.disconnect().await;
        assert_eq!(orchestrator.state(), ConnectionState::Idle);

        // The late success must be thrown away, closing the fresh session.
        let mut late_session = MockRealtimeSession::new();
        late_session.expect_close().times(1).returning(|| Ok(()));
        orchestrator
            .finish_connect(token, Ok(Box::new(late_session)))
            .await
            .unwrap();
        assert_eq!(orchestrator.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn double_pause_releases_capture_exactly_once() {
        let mut fixture = Fixture::new();
        fixture.capture.expect_pause().times(1).returning(|| Ok(()));
        fixture
            .playback
            .expect_interrupt()
            .times(1)
            .returning(|| Ok(()));

        let mut session = quiet_session();
        session.expect_cancel_response().times(1).returning(|| Ok(()));

        let (mut orchestrator, _dir) = connected_fixture(fixture, session).await;
        orchestrator.pause().await.unwrap();
        orchestrator.pause().await.unwrap();
        assert_eq!(orchestrator.state(), ConnectionState::Paused);
    }

    #[tokio::test]
    async fn resume_rearms_capture_in_auto_mode() {
        let mut fixture = Fixture::new();
        fixture.capture.expect_pause().returning(|| Ok(()));
        fixture.playback.expect_interrupt().returning(|| Ok(()));

        let mut session = quiet_session();
        session.expect_cancel_response().returning(|| Ok(()));

        let (mut orchestrator, _dir) = connected_fixture(fixture, session).await;
        orchestrator.pause().await.unwrap();
        // connected_fixture's record expectation has no call-count cap, so
        // the re-arm on resume is allowed; state is what we assert on.
        orchestrator.resume().await.unwrap();
        assert_eq!(orchestrator.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn mode_switch_stops_old_capture_before_starting_new() {
        let mut fixture = Fixture::new();
        let mut seq = Sequence::new();
        fixture.capture.expect_begin().times(1).returning(|| Ok(()));
        // connect() in auto mode starts capture...
        fixture
            .capture
            .expect_record()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        // ...switching to manual stops it...
        fixture
            .capture
            .expect_pause()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        // ...and switching back to auto starts a fresh stream, strictly after
        // the pause.
        fixture
            .capture
            .expect_record()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let mut session = quiet_session();
        session.expect_set_turn_detection().times(2).returning(|_| Ok(()));

        let mut session = Some(session);
        fixture
            .connector
            .expect_open()
            .times(1)
            .returning(move || Ok(Box::new(session.take().unwrap())));

        let (mut orchestrator, _dir) = fixture.orchestrator();
        orchestrator.connect().await.unwrap();

        orchestrator
            .set_turn_detection_mode(TurnDetectionMode::Manual)
            .await
            .unwrap();
        orchestrator
            .set_turn_detection_mode(TurnDetectionMode::Auto)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reveal_topic_images_displays_all_three() {
        let fixture = Fixture::new();
        let mut session = quiet_session();
        session
            .expect_send_tool_result()
            .withf(|_, output| output.contains("\"ok\":true"))
            .times(1)
            .returning(|_, _| Ok(()));
        session.expect_create_response().times(1).returning(|| Ok(()));

        let (mut orchestrator, _dir) = connected_fixture(fixture, session).await;
        orchestrator
            .apply_event(SessionEvent::ToolCall {
                call_id: "call_1".to_string(),
                name: TOOL_REVEAL_TOPIC_IMAGES.to_string(),
                arguments: "{}".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(orchestrator.displayed_topics(), ["1", "2", "3"]);
    }

    #[tokio::test]
    async fn select_topic_narrows_the_display_to_one() {
        let fixture = Fixture::new();
        let mut session = quiet_session();
        session.expect_send_tool_result().returning(|_, _| Ok(()));
        session.expect_create_response().returning(|| Ok(()));

        let (mut orchestrator, _dir) = connected_fixture(fixture, session).await;
        orchestrator
            .apply_event(SessionEvent::ToolCall {
                call_id: "call_1".to_string(),
                name: TOOL_REVEAL_TOPIC_IMAGES.to_string(),
                arguments: "{}".to_string(),
            })
            .await
            .unwrap();
        orchestrator
            .apply_event(SessionEvent::ToolCall {
                call_id: "call_2".to_string(),
                name: TOOL_SELECT_TOPIC.to_string(),
                arguments: r#"{"id":"2"}"#.to_string(),
            })
            .await
            .unwrap();

        assert_eq!(orchestrator.displayed_topics(), ["2"]);
    }

    #[tokio::test]
    async fn record_memory_fact_persists_immediately() {
        let fixture = Fixture::new();
        let mut session = quiet_session();
        session.expect_send_tool_result().returning(|_, _| Ok(()));
        session.expect_create_response().returning(|| Ok(()));

        let (mut orchestrator, dir) = connected_fixture(fixture, session).await;
        orchestrator
            .apply_event(SessionEvent::ToolCall {
                call_id: "call_1".to_string(),
                name: TOOL_RECORD_MEMORY_FACT.to_string(),
                arguments: r#"{"key":"name","value":"Grace"}"#.to_string(),
            })
            .await
            .unwrap();

        assert_eq!(orchestrator.memory().get("name"), Some("Grace"));

        // The mutation reached disk, not just the cache.
        let reloaded = MemoryStore::load(
            CredentialStore::open(dir.path().join("credentials.json")).unwrap(),
        );
        assert_eq!(reloaded.get("name"), Some("Grace"));
    }

    #[tokio::test]
    async fn failing_tool_returns_an_error_result_and_keeps_the_session() {
        let fixture = Fixture::new();
        let mut session = quiet_session();
        session
            .expect_send_tool_result()
            .withf(|_, output| output.contains("error"))
            .times(1)
            .returning(|_, _| Ok(()));
        session.expect_create_response().returning(|| Ok(()));

        let (mut orchestrator, _dir) = connected_fixture(fixture, session).await;
        orchestrator
            .apply_event(SessionEvent::ToolCall {
                call_id: "call_1".to_string(),
                name: "get_weather".to_string(),
                arguments: "{}".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(orchestrator.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn transcript_items_keep_delivery_order() {
        let fixture = Fixture::new();
        let (mut orchestrator, _dir) = connected_fixture(fixture, quiet_session()).await;

        orchestrator
            .apply_event(SessionEvent::UserTranscript {
                item_id: "item_1".to_string(),
                transcript: "Hello".to_string(),
            })
            .await
            .unwrap();
        orchestrator
            .apply_event(SessionEvent::AssistantTranscript {
                item_id: "item_2".to_string(),
                transcript: "Hi there".to_string(),
            })
            .await
            .unwrap();

        let texts: Vec<&str> = orchestrator
            .items()
            .iter()
            .filter_map(|i| i.text.as_deref())
            .collect();
        assert_eq!(texts, vec!["Hello", "Hi there"]);
    }

    #[tokio::test]
    async fn audio_frames_only_stream_while_capturing() {
        let mut fixture = Fixture::new();
        fixture.capture.expect_pause().returning(|| Ok(()));
        fixture.playback.expect_interrupt().returning(|| Ok(()));

        let mut session = quiet_session();
        session.expect_append_audio().times(1).returning(|_| Ok(()));
        session.expect_cancel_response().returning(|| Ok(()));

        let (mut orchestrator, _dir) = connected_fixture(fixture, session).await;
        orchestrator
            .handle_audio_frame(vec![0.0; 128])
            .await
            .unwrap();

        orchestrator.pause().await.unwrap();
        // Paused: this frame must be dropped (append_audio is times(1)).
        orchestrator
            .handle_audio_frame(vec![0.0; 128])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unexpected_close_surfaces_a_connection_error() {
        let mut fixture = Fixture::new();
        fixture.capture.expect_pause().returning(|| Ok(()));
        fixture.capture.expect_end().returning(|| Ok(()));
        fixture.playback.expect_interrupt().returning(|| Ok(()));

        let (mut orchestrator, _dir) = connected_fixture(fixture, quiet_session()).await;
        let err = orchestrator
            .apply_event(SessionEvent::Closed {
                reason: Some("going away".to_string()),
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Connection(ConnectionError::ClosedUnexpectedly(_))
        ));
        assert_eq!(orchestrator.state(), ConnectionState::Idle);
        assert_eq!(orchestrator.last_error(), Some("going away"));
    }

    #[tokio::test]
    async fn remote_error_is_surfaced_without_disconnecting() {
        let fixture = Fixture::new();
        let (mut orchestrator, _dir) = connected_fixture(fixture, quiet_session()).await;

        orchestrator
            .apply_event(SessionEvent::RemoteError {
                message: "rate limited".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(orchestrator.state(), ConnectionState::Connected);
        assert_eq!(orchestrator.last_error(), Some("rate limited"));
    }

    #[tokio::test]
    async fn end_drains_the_transcript_once() {
        let mut fixture = Fixture::new();
        fixture.capture.expect_pause().returning(|| Ok(()));
        fixture.capture.expect_end().returning(|| Ok(()));
        fixture.playback.expect_interrupt().returning(|| Ok(()));

        let (mut orchestrator, _dir) = connected_fixture(fixture, quiet_session()).await;
        orchestrator
            .apply_event(SessionEvent::UserTranscript {
                item_id: "item_1".to_string(),
                transcript: "Hello".to_string(),
            })
            .await
            .unwrap();

        let transcript = orchestrator.end().await;
        assert_eq!(transcript.len(), 1);
        assert_eq!(orchestrator.state(), ConnectionState::Idle);

        let again = orchestrator.end().await;
        assert!(again.is_empty());
    }
}
