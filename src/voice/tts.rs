//! Text-to-speech (TTS) processing

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// TTS provider backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TtsProvider {
    #[default]
    OpenAI,
    ElevenLabs,
}

impl TtsProvider {
    /// Default model for this provider
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::OpenAI => "tts-1",
            Self::ElevenLabs => "eleven_monolingual_v1",
        }
    }

    /// Default voice for this provider
    #[must_use]
    pub const fn default_voice(self) -> &'static str {
        match self {
            Self::OpenAI => "onyx",
            // "Adam"
            Self::ElevenLabs => "pNInz6obpgDQGcFmaJgB",
        }
    }
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "elevenlabs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

impl fmt::Display for TtsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAI => f.write_str("openai"),
            Self::ElevenLabs => f.write_str("elevenlabs"),
        }
    }
}

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    speed: f32,
    model: String,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Create a new TTS client
    ///
    /// `speed` is ignored by ElevenLabs.
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(
        provider: TtsProvider,
        api_key: String,
        voice: String,
        model: String,
        speed: f32,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(format!("{provider} API key required for TTS")));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            speed,
            model,
            provider,
        })
    }

    /// Synthesize text to speech
    ///
    /// # Returns
    ///
    /// Audio bytes (MP3 format)
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let request = match self.provider {
            TtsProvider::OpenAI => self.openai_request(text),
            TtsProvider::ElevenLabs => self.elevenlabs_request(text),
        };

        let response = request
            .send()
            .await
            .map_err(|e| Error::Playback(format!("{} TTS request failed: {e}", self.provider)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Playback(format!(
                "{} TTS error {status}: {body}",
                self.provider
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Playback(e.to_string()))?;
        tracing::debug!(audio_bytes = audio.len(), "speech synthesized");
        Ok(audio.to_vec())
    }

    fn openai_request(&self, text: &str) -> reqwest::RequestBuilder {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        self.client
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&TtsRequest {
                model: &self.model,
                input: text,
                voice: &self.voice,
                speed: self.speed,
            })
    }

    fn elevenlabs_request(&self, text: &str) -> reqwest::RequestBuilder {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}",
            self.voice
        );

        self.client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&ElevenLabsRequest {
                text,
                model_id: &self.model,
            })
    }
}
