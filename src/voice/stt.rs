//! Speech-to-text (STT) processing

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use super::vad::CapturedAudio;
use crate::{Error, Result};

/// Converts captured audio to text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a captured buffer
    ///
    /// # Errors
    ///
    /// Returns `Error::Transcription` on decode or model failure
    async fn transcribe(&self, audio: &CapturedAudio) -> Result<String>;
}

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// STT provider backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SttProvider {
    #[default]
    Whisper,
    Deepgram,
}

impl SttProvider {
    /// Default model for this provider
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Whisper => "whisper-1",
            Self::Deepgram => "nova-2",
        }
    }
}

impl FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }
}

impl fmt::Display for SttProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whisper => f.write_str("whisper"),
            Self::Deepgram => f.write_str("deepgram"),
        }
    }
}

/// Transcribes speech to text over HTTP
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: String,
    model: String,
    provider: SttProvider,
}

impl SpeechToText {
    /// Create a new STT client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(provider: SttProvider, api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(format!("{provider} API key required for STT")));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            provider,
        })
    }

    /// Transcribe using OpenAI Whisper
    async fn transcribe_whisper(&self, wav: Vec<u8>) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("command.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Transcription(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Transcription(format!("Whisper request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Transcription(format!(
                "Whisper API error {status}: {body}"
            )));
        }

        let result: WhisperResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("invalid Whisper response: {e}")))?;

        Ok(result.text)
    }

    /// Transcribe using Deepgram
    async fn transcribe_deepgram(&self, wav: Vec<u8>) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), "starting Deepgram transcription");

        let url = format!(
            "https://api.deepgram.com/v1/listen?model={}&punctuate=true",
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(wav)
            .send()
            .await
            .map_err(|e| Error::Transcription(format!("Deepgram request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(Error::Transcription(format!(
                "Deepgram API error {status}: {body}"
            )));
        }

        let result: DeepgramResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("invalid Deepgram response: {e}")))?;

        Ok(result
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, audio: &CapturedAudio) -> Result<String> {
        // Encoded in memory; the command audio never touches disk
        let wav = audio
            .to_wav()
            .map_err(|e| Error::Transcription(e.to_string()))?;

        let text = match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(wav).await?,
            SttProvider::Deepgram => self.transcribe_deepgram(wav).await?,
        };

        let text = text.trim().to_string();
        tracing::debug!(transcript = %text, "transcription complete");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_from_str() {
        assert_eq!("whisper".parse::<SttProvider>().unwrap(), SttProvider::Whisper);
        assert_eq!("OpenAI".parse::<SttProvider>().unwrap(), SttProvider::Whisper);
        assert_eq!(
            " deepgram ".parse::<SttProvider>().unwrap(),
            SttProvider::Deepgram
        );
        assert!("vosk".parse::<SttProvider>().is_err());
    }

    #[test]
    fn missing_key_rejected() {
        let result = SpeechToText::new(SttProvider::Whisper, String::new(), "whisper-1".into());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn parses_deepgram_payload() {
        let body = r#"{"results":{"channels":[{"alternatives":[{"transcript":"open safari"}]}]}}"#;
        let parsed: DeepgramResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results.channels[0].alternatives[0].transcript, "open safari");
    }
}
