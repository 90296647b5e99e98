//! Audio playback to speakers

use std::io::{Cursor, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Extra time allowed past the expected playback length
const PLAYBACK_GRACE: Duration = Duration::from_millis(500);

/// Plays audio to the default output device
pub struct AudioPlayback {
    device: Device,
    config: StreamConfig,
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports = |channels: u16| {
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == channels
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
        };

        // Prefer mono, fall back to stereo
        let supported_config = supports(1)
            .or_else(|| supports(2))
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { device, config })
    }

    /// Play audio from MP3 bytes, returning once playback has finished
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub async fn play_mp3(&self, mp3_data: &[u8]) -> Result<()> {
        let samples = decode_mp3(mp3_data)?;
        self.play(samples).await
    }

    /// Play mono f32 samples, returning once playback has finished
    ///
    /// # Errors
    ///
    /// Returns error if the output stream fails
    pub async fn play(&self, samples: Vec<f32>) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let channels = usize::from(self.config.channels);
        let sample_count = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);

            self.device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        for frame in data.chunks_mut(channels) {
                            let pos = position.load(Ordering::Relaxed);
                            let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Release);
                                0.0
                            });

                            frame.fill(sample);

                            if pos < samples.len() {
                                position.store(pos + 1, Ordering::Relaxed);
                            }
                        }
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Playback(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Playback(e.to_string()))?;

        let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
        let deadline = Instant::now() + Duration::from_millis(duration_ms) + PLAYBACK_GRACE;

        while !finished.load(Ordering::Acquire) {
            if Instant::now() > deadline {
                tracing::warn!("playback did not report completion in time");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        // Let the device drain its last buffer
        tokio::time::sleep(Duration::from_millis(100)).await;

        drop(stream);
        tracing::debug!(samples = sample_count, "playback complete");

        Ok(())
    }
}

/// Where synthesized speech is played
pub enum Player {
    /// Default output device via cpal
    Device(AudioPlayback),
    /// External player program invoked with a temporary audio file
    Command(String),
}

impl Player {
    /// Open the configured player
    ///
    /// # Errors
    ///
    /// Returns error if the output device cannot be opened or the player
    /// program cannot be found
    pub fn open(command: Option<&str>) -> Result<Self> {
        match command {
            Some(program) => {
                which::which(program)
                    .map_err(|e| Error::Audio(format!("player '{program}' not found: {e}")))?;
                tracing::debug!(program, "using external audio player");
                Ok(Self::Command(program.to_string()))
            }
            None => Ok(Self::Device(AudioPlayback::new()?)),
        }
    }

    /// Play MP3 audio, returning once playback has finished
    ///
    /// # Errors
    ///
    /// Returns error if playback fails
    pub async fn play_mp3(&self, mp3_data: &[u8]) -> Result<()> {
        match self {
            Self::Device(playback) => playback.play_mp3(mp3_data).await,
            Self::Command(program) => play_with_command(program, mp3_data).await,
        }
    }
}

/// Write the reply audio to a temp file and hand it to an external player
///
/// The temp file is removed when it goes out of scope, on every exit path.
async fn play_with_command(program: &str, mp3_data: &[u8]) -> Result<()> {
    let mut artifact = tempfile::Builder::new()
        .prefix("jarvis-reply-")
        .suffix(".mp3")
        .tempfile()?;
    artifact.write_all(mp3_data)?;
    artifact.flush()?;

    let status = tokio::process::Command::new(program)
        .arg(artifact.path())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|e| Error::Playback(format!("failed to run {program}: {e}")))?;

    if !status.success() {
        return Err(Error::Playback(format!("{program} exited with {status}")));
    }

    tracing::debug!(program, bytes = mp3_data.len(), "playback complete");
    Ok(())
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 2 {
                    // Stereo: average channels
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Playback(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}
