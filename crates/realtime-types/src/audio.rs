mod turn_detection;

pub use turn_detection::{ServerVadTurnDetection, TurnDetection};

/// Sample rate the realtime endpoint expects for PCM16 audio, in hertz.
pub const PCM16_SAMPLE_RATE: f64 = 24_000.0;

/// Audio payloads travel as base64-encoded little-endian PCM16.
pub type Base64EncodedAudioBytes = String;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum AudioFormat {
    #[serde(rename = "pcm16")]
    Pcm16,
    #[serde(rename = "g711_ulaw")]
    G711Ulaw,
    #[serde(rename = "g711_alaw")]
    G711Alaw,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Voice {
    #[serde(rename = "alloy")]
    Alloy,
    #[serde(rename = "echo")]
    Echo,
    #[serde(rename = "shimmer")]
    Shimmer,
}

impl std::str::FromStr for Voice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alloy" => Ok(Voice::Alloy),
            "echo" => Ok(Voice::Echo),
            "shimmer" => Ok(Voice::Shimmer),
            other => Err(format!("unknown voice: {other}")),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum TranscriptionModel {
    #[serde(rename = "whisper-1")]
    Whisper,
}

/// Configuration for transcribing the user's input audio.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InputAudioTranscription {
    model: TranscriptionModel,
}

impl InputAudioTranscription {
    pub fn new(model: TranscriptionModel) -> Self {
        Self { model }
    }
}
