//! Voice processing module
//!
//! Handles audio capture, voice activity detection, wake phrase detection,
//! speech-to-text, text-to-speech and playback.

mod capture;
mod playback;
mod speech;
mod stt;
mod tts;
mod vad;
mod wake_word;

pub use capture::{AudioFrame, FRAME_SIZE, FrameSource, Microphone, SAMPLE_RATE, rms, samples_to_wav};
pub use playback::{AudioPlayback, Player};
pub use speech::{SpeechOutput, VoiceOutput};
pub use stt::{SpeechToText, SttProvider, Transcriber};
pub use tts::{TextToSpeech, TtsProvider};
pub use vad::{CapturedAudio, CapturedCommand, VadSettings, capture};
pub use wake_word::{DetectorState, PhraseSpotter, WakeDetector, match_phrase, normalize_phrases};
