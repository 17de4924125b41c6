use crate::audio::{AudioFormat, InputAudioTranscription, TranscriptionModel, TurnDetection, Voice};
use crate::tools::{Tool, ToolChoice};

/// Session configuration sent with `session.update`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Session {
    /// The set of modalities the model can respond with.
    modalities: Vec<String>,

    /// The default system instructions prepended to model calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,

    /// The voice the model uses to respond. Cannot be changed once the model
    /// has responded with audio at least once.
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<Voice>,

    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_format: Option<AudioFormat>,

    #[serde(skip_serializing_if = "Option::is_none")]
    output_audio_format: Option<AudioFormat>,

    /// Input transcription config. `null` leaves transcription off.
    input_audio_transcription: Option<InputAudioTranscription>,

    /// Turn detection config. `null` means manual turn handling.
    turn_detection: Option<TurnDetection>,

    /// Tools (functions) available to the model.
    tools: Vec<Tool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,

    temperature: f32,

    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<MaxOutputTokens>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum MaxOutputTokens {
    Number(i32),
    Infinity(String),
}

impl Session {
    pub fn new() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn turn_detection(&self) -> Option<&TurnDetection> {
        self.turn_detection.as_ref()
    }
}

pub struct SessionBuilder {
    session: Session,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            session: Session {
                modalities: vec!["text".to_string(), "audio".to_string()],
                instructions: None,
                voice: None,
                input_audio_format: None,
                output_audio_format: None,
                input_audio_transcription: None,
                turn_detection: None,
                tools: vec![],
                tool_choice: Some(ToolChoice::Auto),
                temperature: 0.8,
                max_output_tokens: None,
            },
        }
    }

    pub fn with_modalities_enable_audio(mut self) -> Self {
        self.session.modalities = vec!["text".to_string(), "audio".to_string()];
        self
    }

    pub fn with_modalities_disable_audio(mut self) -> Self {
        self.session.modalities = vec!["text".to_string()];
        self
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.session.instructions = Some(instructions.to_string());
        self
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.session.voice = Some(voice);
        self
    }

    pub fn with_input_audio_format(mut self, format: AudioFormat) -> Self {
        self.session.input_audio_format = Some(format);
        self
    }

    pub fn with_output_audio_format(mut self, format: AudioFormat) -> Self {
        self.session.output_audio_format = Some(format);
        self
    }

    pub fn with_input_audio_transcription_enable(mut self, model: TranscriptionModel) -> Self {
        self.session.input_audio_transcription = Some(InputAudioTranscription::new(model));
        self
    }

    pub fn with_turn_detection_enable(mut self, turn_detection: TurnDetection) -> Self {
        self.session.turn_detection = Some(turn_detection);
        self
    }

    pub fn with_turn_detection_disable(mut self) -> Self {
        self.session.turn_detection = None;
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.session.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.session.tool_choice = Some(tool_choice);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.session.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: MaxOutputTokens) -> Self {
        self.session.max_output_tokens = Some(max_output_tokens);
        self
    }

    pub fn build(self) -> Session {
        self.session
    }
}
