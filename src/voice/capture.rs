//! Audio capture from microphone

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Default sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Default samples per frame (32ms at 16kHz)
pub const FRAME_SIZE: usize = 512;

/// Frames buffered between the device callback and the reader
const FRAME_QUEUE_DEPTH: usize = 256;

/// How long a read waits before checking for a device fault
const STALL_CHECK: Duration = Duration::from_secs(1);

/// A fixed-size chunk of 16-bit mono PCM samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
}

impl AudioFrame {
    /// Wrap raw samples as a frame
    #[must_use]
    pub const fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    /// Samples in this frame
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of samples in this frame
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the frame holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Root-mean-square amplitude in 16-bit sample units
    #[must_use]
    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }
}

/// Root-mean-square amplitude of 16-bit samples
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let s = f64::from(s);
            s * s
        })
        .sum();
    (sum_squares / samples.len() as f64).sqrt() as f32
}

/// A live stream of audio frames
///
/// Reading blocks until the device delivers the next frame.
#[async_trait(?Send)]
pub trait FrameSource {
    /// Read the next frame
    ///
    /// # Errors
    ///
    /// Returns `Error::Capture` if the input device failed or was closed
    async fn next_frame(&mut self) -> Result<AudioFrame>;

    /// Drop frames buffered while nobody was reading
    fn discard_pending(&mut self) {}

    /// Release the input device; safe to call more than once
    ///
    /// # Errors
    ///
    /// Returns error if the device could not be released cleanly
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Captures frames from the default input device
pub struct Microphone {
    device: Device,
    config: StreamConfig,
    frame_size: usize,
    stream: Option<Stream>,
    frames: mpsc::Receiver<AudioFrame>,
    sender: Option<mpsc::Sender<AudioFrame>>,
    fault: Arc<Mutex<Option<String>>>,
}

impl Microphone {
    /// Open the default input device
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new(sample_rate: u32, frame_size: usize) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            frame_size,
            "microphone initialized"
        );

        let (sender, frames) = mpsc::channel(FRAME_QUEUE_DEPTH);

        Ok(Self {
            device,
            config,
            frame_size,
            stream: None,
            frames,
            sender: Some(sender),
            fault: Arc::new(Mutex::new(None)),
        })
    }

    /// Start delivering frames
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let sender = self
            .sender
            .clone()
            .ok_or_else(|| Error::Audio("microphone already closed".to_string()))?;
        let frame_size = self.frame_size;
        let mut pending: Vec<i16> = Vec::with_capacity(frame_size);
        let fault = Arc::clone(&self.fault);

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for &sample in data {
                        pending.push(to_i16(sample));
                        if pending.len() == frame_size {
                            let frame = AudioFrame::new(std::mem::replace(
                                &mut pending,
                                Vec::with_capacity(frame_size),
                            ));
                            // Nobody is reading: drop the frame like an overflowed buffer
                            if sender.try_send(frame).is_err() {
                                tracing::trace!("frame queue full, dropping frame");
                            }
                        }
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "audio capture error");
                    if let Ok(mut slot) = fault.lock() {
                        *slot = Some(err.to_string());
                    }
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("microphone started");
        Ok(())
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    fn take_fault(&self) -> Option<String> {
        self.fault.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[async_trait(?Send)]
impl FrameSource for Microphone {
    async fn next_frame(&mut self) -> Result<AudioFrame> {
        if self.stream.is_none() {
            return Err(Error::Capture("microphone is not running".to_string()));
        }

        loop {
            match tokio::time::timeout(STALL_CHECK, self.frames.recv()).await {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => return Err(Error::Capture("audio input stream closed".to_string())),
                Err(_) => {
                    if let Some(fault) = self.take_fault() {
                        return Err(Error::Capture(fault));
                    }
                }
            }
        }
    }

    fn discard_pending(&mut self) {
        let mut dropped = 0usize;
        while self.frames.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::trace!(dropped, "discarded buffered frames");
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("microphone stopped");
        }
        self.sender = None;
        self.frames.close();
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Encode 16-bit samples as WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_of_silence_is_zero() {
        assert!(rms(&[0; 512]) < f32::EPSILON);
        assert!(rms(&[]) < f32::EPSILON);
    }

    #[test]
    fn rms_of_constant_signal() {
        let frame = AudioFrame::new(vec![1000; 256]);
        assert!((frame.rms() - 1000.0).abs() < 0.01);

        let alternating = AudioFrame::new(vec![300, -300, 300, -300]);
        assert!((alternating.rms() - 300.0).abs() < 0.01);
    }

    #[test]
    fn float_conversion_clamps() {
        assert_eq!(to_i16(0.0), 0);
        assert_eq!(to_i16(1.0), 32767);
        assert_eq!(to_i16(-2.0), -32768);
    }
}
