//! Spoken replies: synthesis followed by playback

use async_trait::async_trait;

use super::playback::Player;
use super::tts::TextToSpeech;
use crate::Result;

/// Turns reply text into audible speech
#[async_trait(?Send)]
pub trait SpeechOutput {
    /// Speak `text`, returning once playback has finished
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if synthesis or playback fails
    async fn speak(&mut self, text: &str) -> Result<()>;

    /// Release the output device; safe to call more than once
    ///
    /// # Errors
    ///
    /// Returns error if the device could not be released cleanly
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Speech output backed by a TTS service and a local player
pub struct VoiceOutput {
    tts: TextToSpeech,
    player: Option<Player>,
}

impl VoiceOutput {
    #[must_use]
    pub const fn new(tts: TextToSpeech, player: Player) -> Self {
        Self {
            tts,
            player: Some(player),
        }
    }
}

#[async_trait(?Send)]
impl SpeechOutput for VoiceOutput {
    async fn speak(&mut self, text: &str) -> Result<()> {
        let Some(player) = self.player.as_ref() else {
            return Err(crate::Error::Playback("speech output already closed".to_string()));
        };

        let audio = self.tts.synthesize(text).await?;
        player.play_mp3(&audio).await
    }

    fn close(&mut self) -> Result<()> {
        if self.player.take().is_some() {
            tracing::debug!("speech output released");
        }
        Ok(())
    }
}
