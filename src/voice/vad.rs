//! RMS-threshold voice activity detection
//!
//! Records a spoken command from a live frame source. Capture ends once the
//! speaker has been silent for the configured duration, or when the hard
//! cap on recording length is reached.

use super::capture::{AudioFrame, FrameSource, samples_to_wav};
use crate::Result;

/// Thresholds controlling a single capture
#[derive(Debug, Clone, PartialEq)]
pub struct VadSettings {
    /// Samples per second
    pub sample_rate: u32,
    /// Samples per frame
    pub frame_size: usize,
    /// RMS level (16-bit sample units) at or below which a frame is silent
    pub silence_threshold: f32,
    /// Seconds of silence after speech that end the capture
    pub silence_duration_secs: f32,
    /// Hard cap on capture length in seconds
    pub max_duration_secs: f32,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            sample_rate: super::SAMPLE_RATE,
            frame_size: super::FRAME_SIZE,
            silence_threshold: 300.0,
            silence_duration_secs: 1.5,
            max_duration_secs: 15.0,
        }
    }
}

impl VadSettings {
    #[allow(clippy::cast_precision_loss)]
    fn frames_per_second(&self) -> f64 {
        f64::from(self.sample_rate) / self.frame_size as f64
    }

    /// Silent frames after speech that must be exceeded to stop
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn silence_frame_limit(&self) -> usize {
        (f64::from(self.silence_duration_secs) * self.frames_per_second()) as usize
    }

    /// Maximum number of frames read by one capture
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn max_frames(&self) -> usize {
        (f64::from(self.max_duration_secs) * self.frames_per_second()) as usize
    }
}

/// Audio recorded for one spoken command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedAudio {
    frames: Vec<AudioFrame>,
    sample_rate: u32,
}

impl CapturedAudio {
    /// Wrap recorded frames
    #[must_use]
    pub const fn new(frames: Vec<AudioFrame>, sample_rate: u32) -> Self {
        Self {
            frames,
            sample_rate,
        }
    }

    /// Recorded frames in capture order
    #[must_use]
    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    /// Number of frames recorded
    #[must_use]
    pub fn duration_frames(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// All samples concatenated
    #[must_use]
    pub fn samples(&self) -> Vec<i16> {
        self.frames
            .iter()
            .flat_map(|f| f.samples().iter().copied())
            .collect()
    }

    /// Encode as a mono 16-bit WAV file
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        samples_to_wav(&self.samples(), self.sample_rate)
    }
}

/// Outcome of a capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturedCommand {
    /// No frame rose above the silence threshold
    Empty,
    /// Speech was detected; holds every frame read
    Audio(CapturedAudio),
}

impl CapturedCommand {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Record one command from `source`
///
/// Leading silence is kept. When capture ends on silence, the silent frames
/// that crossed the threshold are included; when it ends on the cap, every
/// frame up to the cap is included.
///
/// # Errors
///
/// Returns error if reading from the source fails
pub async fn capture<S>(source: &mut S, settings: &VadSettings) -> Result<CapturedCommand>
where
    S: FrameSource + ?Sized,
{
    let silence_limit = settings.silence_frame_limit();
    let max_frames = settings.max_frames();

    let mut frames = Vec::new();
    let mut has_spoken = false;
    let mut silent_frames = 0usize;

    tracing::debug!(silence_limit, max_frames, "listening for command");

    while frames.len() < max_frames {
        let frame = source.next_frame().await?;
        let level = frame.rms();
        frames.push(frame);

        if level > settings.silence_threshold {
            has_spoken = true;
            silent_frames = 0;
        } else if has_spoken {
            silent_frames += 1;
        }

        tracing::trace!(level, has_spoken, silent_frames, "frame");

        if has_spoken && silent_frames > silence_limit {
            tracing::debug!(frames = frames.len(), "end of speech detected");
            break;
        }
    }

    if !has_spoken {
        tracing::debug!(frames = frames.len(), "no speech detected");
        return Ok(CapturedCommand::Empty);
    }

    tracing::debug!(frames = frames.len(), "recording complete");
    Ok(CapturedCommand::Audio(CapturedAudio::new(
        frames,
        settings.sample_rate,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_limits_truncate() {
        let settings = VadSettings {
            sample_rate: 16000,
            frame_size: 512,
            silence_threshold: 300.0,
            silence_duration_secs: 1.5,
            max_duration_secs: 15.0,
        };

        // 1.5 * 31.25 = 46.875, 15 * 31.25 = 468.75
        assert_eq!(settings.silence_frame_limit(), 46);
        assert_eq!(settings.max_frames(), 468);
    }

    #[test]
    fn captured_audio_concatenates_frames() {
        let audio = CapturedAudio::new(
            vec![AudioFrame::new(vec![1, 2]), AudioFrame::new(vec![3])],
            16000,
        );

        assert_eq!(audio.duration_frames(), 2);
        assert_eq!(audio.samples(), vec![1, 2, 3]);

        let wav = audio.to_wav().unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
    }
}
