//! Wake word detection
//!
//! Detects wake phrases in the audio stream to activate the assistant.
//! Uses a hybrid approach: local energy segmentation picks out short
//! utterances, which are then verified by speech-to-text.

use std::sync::Arc;

use async_trait::async_trait;

use super::capture::AudioFrame;
use super::stt::Transcriber;
use super::vad::CapturedAudio;
use crate::Result;

/// Minimum speech before a segment is worth verifying (seconds)
const MIN_SPEECH_SECS: f32 = 0.3;

/// Silence that ends a candidate segment (seconds)
const SILENCE_SECS: f32 = 0.5;

/// Longest segment sent for verification (seconds)
const MAX_SEGMENT_SECS: f32 = 4.0;

/// Consumes raw frames and reports which configured phrase was heard
#[async_trait(?Send)]
pub trait WakeDetector {
    /// Feed one frame; returns the index of the matched wake phrase
    ///
    /// # Errors
    ///
    /// Returns error if the detector engine fails
    async fn process(&mut self, frame: &AudioFrame) -> Result<Option<usize>>;

    /// Forget any partially heard audio
    fn reset(&mut self) {}

    /// Release the detector engine; safe to call more than once
    ///
    /// # Errors
    ///
    /// Returns error if the engine could not be released cleanly
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// State of the phrase spotter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Idle,
    /// Detected potential speech, accumulating
    Listening,
}

/// Spots wake phrases by transcribing short speech segments
pub struct PhraseSpotter {
    phrases: Vec<String>,
    transcriber: Arc<dyn Transcriber>,
    energy_threshold: f32,
    sample_rate: u32,
    state: DetectorState,
    segment: Vec<AudioFrame>,
    speech_samples: usize,
    silence_samples: usize,
}

impl PhraseSpotter {
    /// Create a new phrase spotter
    ///
    /// # Arguments
    ///
    /// * `phrases` - Wake phrases to detect (e.g., "jarvis")
    /// * `transcriber` - Engine used to verify candidate segments
    /// * `energy_threshold` - RMS level that counts as speech
    /// * `sample_rate` - Sample rate of incoming frames
    #[must_use]
    pub fn new(
        phrases: Vec<String>,
        transcriber: Arc<dyn Transcriber>,
        energy_threshold: f32,
        sample_rate: u32,
    ) -> Self {
        let phrases = normalize_phrases(phrases);

        tracing::debug!(wake_phrases = ?phrases, "wake phrase spotter initialized");

        Self {
            phrases,
            transcriber,
            energy_threshold,
            sample_rate,
            state: DetectorState::Idle,
            segment: Vec::new(),
            speech_samples: 0,
            silence_samples: 0,
        }
    }

    /// Get the configured wake phrases
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Get current state
    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn samples_for(&self, secs: f32) -> usize {
        (self.sample_rate as f32 * secs) as usize
    }

    fn segment_len(&self) -> usize {
        self.segment.iter().map(AudioFrame::len).sum()
    }

    /// Accumulate a frame; returns true once a segment is ready to verify
    fn accumulate(&mut self, frame: &AudioFrame) -> bool {
        let is_speech = frame.rms() > self.energy_threshold;

        match self.state {
            DetectorState::Idle => {
                if is_speech {
                    self.state = DetectorState::Listening;
                    self.segment.clear();
                    self.segment.push(frame.clone());
                    self.speech_samples = frame.len();
                    self.silence_samples = 0;
                    tracing::trace!("speech detected, listening");
                }
                false
            }
            DetectorState::Listening => {
                self.segment.push(frame.clone());

                if is_speech {
                    self.speech_samples += frame.len();
                    self.silence_samples = 0;
                } else {
                    self.silence_samples += frame.len();
                }

                let ended = self.silence_samples > self.samples_for(SILENCE_SECS);
                let enough_speech = self.speech_samples > self.samples_for(MIN_SPEECH_SECS);

                if ended && !enough_speech {
                    tracing::trace!("too short - resetting");
                    self.reset();
                    return false;
                }

                (ended && enough_speech) || self.segment_len() > self.samples_for(MAX_SEGMENT_SECS)
            }
        }
    }
}

#[async_trait(?Send)]
impl WakeDetector for PhraseSpotter {
    async fn process(&mut self, frame: &AudioFrame) -> Result<Option<usize>> {
        if !self.accumulate(frame) {
            return Ok(None);
        }

        let segment = CapturedAudio::new(std::mem::take(&mut self.segment), self.sample_rate);
        self.reset();

        tracing::debug!(frames = segment.duration_frames(), "checking segment for wake phrase");

        let transcript = match self.transcriber.transcribe(&segment).await {
            Ok(text) => text,
            Err(e) => {
                // A flaky verification must not take down the idle loop
                tracing::warn!(error = %e, "wake phrase verification failed");
                return Ok(None);
            }
        };

        let matched = match_phrase(&self.phrases, &transcript);
        if let Some(index) = matched {
            tracing::info!(wake_phrase = %self.phrases[index], transcript, "wake phrase detected");
        } else {
            tracing::trace!(transcript, "no wake phrase in segment");
        }

        Ok(matched)
    }

    fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.segment.clear();
        self.speech_samples = 0;
        self.silence_samples = 0;
    }
}

/// Lowercase and trim wake phrases, dropping blanks
#[must_use]
pub fn normalize_phrases(phrases: Vec<String>) -> Vec<String> {
    phrases
        .into_iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Index of the first normalized phrase contained in `transcript`
#[must_use]
pub fn match_phrase(phrases: &[String], transcript: &str) -> Option<usize> {
    let normalized = transcript.to_lowercase();
    phrases.iter().position(|p| normalized.contains(p.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phrase_normalization() {
        let phrases = normalize_phrases(vec![
            "  Hey JARVIS  ".to_string(),
            String::new(),
            "Computer".to_string(),
        ]);
        assert_eq!(phrases, vec!["hey jarvis", "computer"]);
    }

    #[test]
    fn test_phrase_matching() {
        let phrases = vec!["jarvis".to_string(), "computer".to_string()];

        assert_eq!(match_phrase(&phrases, "Hey Jarvis, you there?"), Some(0));
        assert_eq!(match_phrase(&phrases, "COMPUTER"), Some(1));
        assert_eq!(match_phrase(&phrases, "hello world"), None);
    }
}
