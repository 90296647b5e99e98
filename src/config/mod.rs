//! Configuration management for the assistant
//!
//! Sources, lowest precedence first: built-in defaults, the TOML file,
//! environment variables (a `.env` file is loaded first). The resulting
//! [`Config`] is read once at startup and never changes.

pub mod file;

use std::path::Path;
use std::time::Duration;

use crate::agent::{ReplyStrategy, RetryPolicy};
use crate::voice::{FRAME_SIZE, SAMPLE_RATE, SttProvider, TtsProvider, VadSettings};
use crate::{Error, Result};

use self::file::ConfigFile;

const DEFAULT_LLM_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Wake, shutdown and spoken phrases
    pub phrases: Phrases,

    /// Microphone and voice-activity detection
    pub audio: AudioConfig,

    /// Reasoning service
    pub reasoning: ReasoningConfig,

    /// Speech-to-text and text-to-speech
    pub voice: VoiceConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Phrases the session listens for and speaks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrases {
    /// Any of these wakes the assistant
    pub wake: Vec<String>,
    /// Ends the conversation when contained in a transcript
    pub shutdown: String,
    pub acknowledgement: String,
    pub farewell: String,
    pub unknown_tool: String,
    pub reasoning_failure: String,
    pub transcription_failure: String,
    pub playback_failure: String,
}

impl Default for Phrases {
    fn default() -> Self {
        Self {
            wake: vec!["jarvis".to_string()],
            shutdown: "goodbye".to_string(),
            acknowledgement: "Yes, sir?".to_string(),
            farewell: "Goodbye, sir. Returning to standby.".to_string(),
            unknown_tool: "An unknown tool was requested. I am unable to perform that action."
                .to_string(),
            reasoning_failure:
                "My apologies, sir. My cognitive circuits are experiencing a malfunction."
                    .to_string(),
            transcription_failure: "Sorry, I didn't catch that.".to_string(),
            playback_failure: "Apologies, sir. I could not say that aloud.".to_string(),
        }
    }
}

/// Microphone and VAD configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub frame_size: usize,
    /// RMS threshold in 16-bit sample units
    pub silence_threshold: f32,
    pub silence_duration_secs: f32,
    pub max_duration_secs: f32,
    /// RMS level at which the wake detector starts a candidate segment
    pub wake_energy_threshold: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            frame_size: FRAME_SIZE,
            silence_threshold: 300.0,
            silence_duration_secs: 1.5,
            max_duration_secs: 15.0,
            wake_energy_threshold: 300.0,
        }
    }
}

impl AudioConfig {
    /// Settings for one command capture
    #[must_use]
    pub const fn vad_settings(&self) -> VadSettings {
        VadSettings {
            sample_rate: self.sample_rate,
            frame_size: self.frame_size,
            silence_threshold: self.silence_threshold,
            silence_duration_secs: self.silence_duration_secs,
            max_duration_secs: self.max_duration_secs,
        }
    }
}

/// Reasoning service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningConfig {
    /// Base URL of an OpenAI-compatible API
    pub url: String,
    pub model: String,
    pub strategy: ReplyStrategy,
    /// Name the assistant answers to in its system prompt
    pub assistant_name: String,
    pub max_tokens: u32,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retries after a timeout, connection failure, 429 or 5xx
    pub max_retries: u32,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_LLM_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            strategy: ReplyStrategy::default(),
            assistant_name: "Jarvis".to_string(),
            max_tokens: 300,
            timeout: Duration::from_secs(30),
            max_retries: 2,
        }
    }
}

impl ReasoningConfig {
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_retries(self.max_retries)
    }
}

/// Speech-to-text and text-to-speech configuration
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    pub stt_provider: SttProvider,
    /// Provider default when unset
    pub stt_model: Option<String>,
    pub tts_provider: TtsProvider,
    /// Provider default when unset
    pub tts_model: Option<String>,
    /// Provider default when unset
    pub tts_voice: Option<String>,
    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,
    /// External player program; `None` plays on the default output device
    pub player: Option<String>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            stt_provider: SttProvider::default(),
            stt_model: None,
            tts_provider: TtsProvider::default(),
            tts_model: None,
            tts_voice: None,
            tts_speed: 1.0,
            player: None,
        }
    }
}

impl VoiceConfig {
    #[must_use]
    pub fn stt_model(&self) -> String {
        self.stt_model
            .clone()
            .unwrap_or_else(|| self.stt_provider.default_model().to_string())
    }

    #[must_use]
    pub fn tts_model(&self) -> String {
        self.tts_model
            .clone()
            .unwrap_or_else(|| self.tts_provider.default_model().to_string())
    }

    #[must_use]
    pub fn tts_voice(&self) -> String {
        self.tts_voice
            .clone()
            .unwrap_or_else(|| self.tts_provider.default_voice().to_string())
    }
}

/// API keys for external services
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ApiKeys {
    /// Dedicated credential for the wake phrase engine
    pub wake: Option<String>,
    /// Reasoning service credential
    pub llm: Option<String>,
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

impl ApiKeys {
    /// Key for the configured speech-to-text provider
    #[must_use]
    pub fn stt(&self, provider: SttProvider) -> Option<&str> {
        match provider {
            SttProvider::Whisper => self.openai.as_deref(),
            SttProvider::Deepgram => self.deepgram.as_deref(),
        }
    }

    /// Key for the configured text-to-speech provider
    #[must_use]
    pub fn tts(&self, provider: TtsProvider) -> Option<&str> {
        match provider {
            TtsProvider::OpenAI => self.openai.as_deref(),
            TtsProvider::ElevenLabs => self.elevenlabs.as_deref(),
        }
    }
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set = |k: &Option<String>| if k.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("ApiKeys")
            .field("wake", &set(&self.wake))
            .field("llm", &set(&self.llm))
            .field("openai", &set(&self.openai))
            .field("deepgram", &set(&self.deepgram))
            .field("elevenlabs", &set(&self.elevenlabs))
            .finish()
    }
}

impl Config {
    /// Load and validate configuration
    ///
    /// Reads `path` when given, otherwise `~/.config/jarvis/config.toml` if
    /// present. An explicit file that cannot be read is an error.
    ///
    /// # Errors
    ///
    /// Returns error if the explicit file is unreadable, a value does not
    /// parse, or validation fails
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::trace!(error = %e, "no .env file loaded");
        }

        let fc = match path {
            Some(path) => file::load_from(path)?,
            None => file::load_config_file(),
        };

        let config = Self::from_sources(fc, |key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Merge a config file with environment lookups (env > toml > default)
    ///
    /// Empty environment values count as unset. Does not validate.
    ///
    /// # Errors
    ///
    /// Returns error if a strategy or provider name is not recognized
    pub fn from_sources<F>(fc: ConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let openai = env("OPENAI_API_KEY").or(fc.api_keys.openai);
        let api_keys = ApiKeys {
            wake: env("JARVIS_WAKE_ACCESS_KEY").or(fc.api_keys.wake),
            llm: env("JARVIS_LLM_API_KEY")
                .or(fc.api_keys.llm)
                .or_else(|| openai.clone()),
            openai,
            deepgram: env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram),
            elevenlabs: env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs),
        };

        let defaults = Phrases::default();
        let conv = fc.conversation;
        let phrases = Phrases {
            wake: env("JARVIS_WAKE_PHRASES")
                .map(|v| v.split(',').map(str::to_string).collect())
                .or(fc.wake.phrases)
                .unwrap_or(defaults.wake),
            shutdown: env("JARVIS_SHUTDOWN_PHRASE")
                .or(conv.shutdown_phrase)
                .unwrap_or(defaults.shutdown),
            acknowledgement: conv.acknowledgement.unwrap_or(defaults.acknowledgement),
            farewell: conv.farewell.unwrap_or(defaults.farewell),
            unknown_tool: conv.unknown_tool.unwrap_or(defaults.unknown_tool),
            reasoning_failure: conv.reasoning_failure.unwrap_or(defaults.reasoning_failure),
            transcription_failure: conv
                .transcription_failure
                .unwrap_or(defaults.transcription_failure),
            playback_failure: conv.playback_failure.unwrap_or(defaults.playback_failure),
        };
        let phrases = Phrases {
            wake: crate::voice::normalize_phrases(phrases.wake),
            shutdown: phrases.shutdown.trim().to_string(),
            ..phrases
        };

        let audio_defaults = AudioConfig::default();
        let audio = AudioConfig {
            sample_rate: fc.audio.sample_rate.unwrap_or(audio_defaults.sample_rate),
            frame_size: fc.audio.frame_size.unwrap_or(audio_defaults.frame_size),
            silence_threshold: fc
                .audio
                .silence_threshold
                .unwrap_or(audio_defaults.silence_threshold),
            silence_duration_secs: fc
                .audio
                .silence_duration_secs
                .unwrap_or(audio_defaults.silence_duration_secs),
            max_duration_secs: fc
                .audio
                .max_duration_secs
                .unwrap_or(audio_defaults.max_duration_secs),
            wake_energy_threshold: fc
                .wake
                .energy_threshold
                .unwrap_or(audio_defaults.wake_energy_threshold),
        };

        let reasoning_defaults = ReasoningConfig::default();
        let strategy = match env("JARVIS_REPLY_STRATEGY").or(fc.llm.strategy) {
            Some(s) => s.parse()?,
            None => reasoning_defaults.strategy,
        };
        let reasoning = ReasoningConfig {
            url: env("JARVIS_LLM_URL")
                .or(fc.llm.url)
                .unwrap_or(reasoning_defaults.url),
            model: env("JARVIS_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or(reasoning_defaults.model),
            strategy,
            assistant_name: fc
                .llm
                .assistant_name
                .unwrap_or(reasoning_defaults.assistant_name),
            max_tokens: fc.llm.max_tokens.unwrap_or(reasoning_defaults.max_tokens),
            timeout: fc
                .llm
                .timeout_secs
                .map_or(reasoning_defaults.timeout, Duration::from_secs),
            max_retries: fc.llm.max_retries.unwrap_or(reasoning_defaults.max_retries),
        };

        let voice_defaults = VoiceConfig::default();
        let stt_provider = match env("JARVIS_STT_PROVIDER").or(fc.stt.provider) {
            Some(p) => p.parse()?,
            None => voice_defaults.stt_provider,
        };
        let tts_provider = match env("JARVIS_TTS_PROVIDER").or(fc.tts.provider) {
            Some(p) => p.parse()?,
            None => voice_defaults.tts_provider,
        };
        let voice = VoiceConfig {
            stt_provider,
            stt_model: env("JARVIS_STT_MODEL").or(fc.stt.model),
            tts_provider,
            tts_model: env("JARVIS_TTS_MODEL").or(fc.tts.model),
            tts_voice: env("JARVIS_TTS_VOICE").or(fc.tts.voice),
            tts_speed: fc.tts.speed.unwrap_or(voice_defaults.tts_speed),
            player: env("JARVIS_PLAYER").or(fc.tts.player),
        };

        Ok(Self {
            phrases,
            audio,
            reasoning,
            voice,
            api_keys,
        })
    }

    /// Check that the configuration can drive a session
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first problem found
    pub fn validate(&self) -> Result<()> {
        let audio = &self.audio;

        if audio.sample_rate == 0 {
            return Err(Error::Config("sample rate must be positive".to_string()));
        }
        if audio.frame_size == 0 {
            return Err(Error::Config("frame size must be positive".to_string()));
        }
        if audio.silence_duration_secs <= 0.0 || audio.max_duration_secs <= 0.0 {
            return Err(Error::Config(
                "silence and max capture durations must be positive".to_string(),
            ));
        }
        if audio.silence_duration_secs > audio.max_duration_secs {
            return Err(Error::Config(format!(
                "silence duration ({}s) exceeds max capture duration ({}s)",
                audio.silence_duration_secs, audio.max_duration_secs
            )));
        }
        // A zero-frame window would let capture return without ever awaiting the device
        if audio.vad_settings().max_frames() == 0 {
            return Err(Error::Config(format!(
                "max capture duration ({}s) is shorter than one {}-sample frame",
                audio.max_duration_secs, audio.frame_size
            )));
        }
        if audio.silence_threshold < 0.0 || audio.wake_energy_threshold < 0.0 {
            return Err(Error::Config("RMS thresholds must not be negative".to_string()));
        }
        if self.phrases.wake.is_empty() {
            return Err(Error::Config("at least one wake phrase is required".to_string()));
        }
        if self.phrases.shutdown.is_empty() {
            return Err(Error::Config("shutdown phrase must not be empty".to_string()));
        }
        if self.api_keys.llm.is_none() {
            return Err(Error::Config(
                "reasoning service key required (set JARVIS_LLM_API_KEY or OPENAI_API_KEY)"
                    .to_string(),
            ));
        }
        if self.reasoning.timeout.is_zero() {
            return Err(Error::Config("reasoning timeout must be positive".to_string()));
        }

        Ok(())
    }
}
