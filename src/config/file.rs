//! TOML configuration file loading
//!
//! Supports `~/.config/jarvis/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Wake phrase configuration
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Conversation phrases and shutdown handling
    #[serde(default)]
    pub conversation: ConversationFileConfig,

    /// Microphone and voice-activity detection
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Reasoning service configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Speech-to-text configuration
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Text-to-speech and playback configuration
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Wake phrase configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    /// Phrases that wake the assistant (e.g. `["jarvis"]`)
    pub phrases: Option<Vec<String>>,

    /// RMS level above which a frame may contain the wake phrase
    pub energy_threshold: Option<f32>,
}

/// Spoken phrases used by the conversation loop
#[derive(Debug, Default, Deserialize)]
pub struct ConversationFileConfig {
    /// Phrase that ends the conversation (e.g. "goodbye")
    pub shutdown_phrase: Option<String>,
    pub acknowledgement: Option<String>,
    pub farewell: Option<String>,
    pub unknown_tool: Option<String>,
    pub reasoning_failure: Option<String>,
    pub transcription_failure: Option<String>,
    pub playback_failure: Option<String>,
}

/// Microphone and VAD configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    pub sample_rate: Option<u32>,
    /// Samples per frame
    pub frame_size: Option<usize>,
    /// RMS threshold in 16-bit sample units
    pub silence_threshold: Option<f32>,
    pub silence_duration_secs: Option<f32>,
    pub max_duration_secs: Option<f32>,
}

/// Reasoning service configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Base URL of an OpenAI-compatible chat completions API
    pub url: Option<String>,
    /// Model identifier (e.g. "gpt-4o-mini")
    pub model: Option<String>,
    /// Reply strategy ("plain", "json", "function")
    pub strategy: Option<String>,
    /// Assistant name used in the system prompt
    pub assistant_name: Option<String>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
}

/// Speech-to-text configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// Provider ("whisper" or "deepgram")
    pub provider: Option<String>,
    pub model: Option<String>,
}

/// Text-to-speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// Provider ("openai" or "elevenlabs")
    pub provider: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub speed: Option<f32>,
    /// External player command (e.g. "afplay"); omit to play on the default device
    pub player: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub wake: Option<String>,
    pub llm: Option<String>,
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    let Some(path) = config_file_path() else {
        return ConfigFile::default();
    };

    if !path.exists() {
        return ConfigFile::default();
    }

    match load_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            ConfigFile::default()
        }
    }
}

/// Load a TOML config file from an explicit path
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_from(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/jarvis/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("jarvis").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let toml = r#"
            [wake]
            phrases = ["jarvis", "computer"]

            [audio]
            silence_threshold = 450.0

            [llm]
            strategy = "function"
        "#;

        let config: ConfigFile = toml::from_str(toml).unwrap();
        assert_eq!(
            config.wake.phrases,
            Some(vec!["jarvis".to_string(), "computer".to_string()])
        );
        assert_eq!(config.audio.silence_threshold, Some(450.0));
        assert_eq!(config.llm.strategy.as_deref(), Some("function"));
        assert!(config.tts.player.is_none());
    }

    #[test]
    fn empty_file_is_default() {
        let config: ConfigFile = toml::from_str("").unwrap();
        assert!(config.wake.phrases.is_none());
        assert!(config.api_keys.llm.is_none());
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[audio\nsample_rate = ").unwrap();

        assert!(load_from(&path).is_err());
    }
}
