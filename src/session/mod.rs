//! Session controller
//!
//! Owns the audio devices and collaborators for one process run and drives
//! them through the wake/conversation cycle:
//!
//! ```text
//! Standby ──wake──▶ WakeAcknowledged ──ack──▶ Conversing ──shutdown phrase──▶ Standby
//!                                               │  ▲
//!                                               └──┘ turn / silence
//! any ──interrupt or fatal error──▶ Terminated
//! ```
//!
//! Everything runs on one task, strictly in order: a capture never starts
//! before the previous reply has finished playing.

mod state;

use std::future::Future;
use std::sync::Arc;

pub use state::{Event, State};

use crate::agent::Dispatcher;
use crate::config::Phrases;
use crate::voice::{
    CapturedCommand, FrameSource, SpeechOutput, Transcriber, VadSettings, WakeDetector, capture,
};
use crate::Result;

/// The devices and engines a session drives
pub struct Collaborators {
    pub source: Box<dyn FrameSource>,
    pub detector: Box<dyn WakeDetector>,
    pub transcriber: Arc<dyn Transcriber>,
    pub speech: Box<dyn SpeechOutput>,
}

/// One run of the assistant
pub struct Session {
    state: State,
    phrases: Phrases,
    vad: VadSettings,
    source: Box<dyn FrameSource>,
    detector: Box<dyn WakeDetector>,
    transcriber: Arc<dyn Transcriber>,
    speech: Box<dyn SpeechOutput>,
    dispatcher: Dispatcher,
    torn_down: bool,
}

impl Session {
    #[must_use]
    pub fn new(
        phrases: Phrases,
        vad: VadSettings,
        collaborators: Collaborators,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            state: State::Standby,
            phrases,
            vad,
            source: collaborators.source,
            detector: collaborators.detector,
            transcriber: collaborators.transcriber,
            speech: collaborators.speech,
            dispatcher,
            torn_down: false,
        }
    }

    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// Run until `shutdown` completes or a session-fatal error occurs
    ///
    /// Tears down exactly once on either path.
    ///
    /// # Errors
    ///
    /// Returns the session-fatal error (lost input device) that ended the run
    #[allow(clippy::future_not_send)]
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            wake_phrases = ?self.phrases.wake,
            shutdown_phrase = %self.phrases.shutdown,
            strategy = %self.dispatcher.strategy(),
            "session started"
        );

        let outcome = tokio::select! {
            result = self.drive() => result,
            () = shutdown => {
                tracing::info!("interrupt received");
                Ok(())
            }
        };

        match &outcome {
            Ok(()) => self.apply(Event::Interrupted),
            Err(e) => {
                tracing::error!(error = %e, "session-fatal error");
                self.apply(Event::FatalError);
            }
        }

        self.teardown();
        outcome
    }

    /// Release every device and engine
    ///
    /// Each resource is closed independently; a failure is logged and the
    /// rest are still released. Calling this again does nothing.
    pub fn teardown(&mut self) {
        if self.torn_down {
            tracing::debug!("teardown already done");
            return;
        }
        self.torn_down = true;
        if !self.state.is_terminal() {
            self.apply(Event::Interrupted);
        }

        let results = [
            ("audio input", self.source.close()),
            ("wake detector", self.detector.close()),
            ("speech output", self.speech.close()),
        ];
        for (resource, result) in results {
            match result {
                Ok(()) => tracing::debug!(resource, "released"),
                Err(e) => tracing::warn!(resource, error = %e, "failed to release"),
            }
        }

        tracing::info!("session torn down");
    }

    #[allow(clippy::future_not_send)]
    async fn drive(&mut self) -> Result<()> {
        loop {
            self.wait_for_wake().await?;
            self.converse().await?;
        }
    }

    /// Feed frames to the wake detector until a phrase matches, then acknowledge
    #[allow(clippy::future_not_send)]
    async fn wait_for_wake(&mut self) -> Result<()> {
        loop {
            let frame = self.source.next_frame().await?;

            match self.detector.process(&frame).await {
                Ok(Some(index)) => {
                    let phrase = self.phrases.wake.get(index).map_or("?", String::as_str);
                    tracing::info!(phrase, "wake phrase detected");
                    break;
                }
                Ok(None) => {}
                Err(e) if e.is_session_fatal() => return Err(e),
                Err(e) => tracing::warn!(error = %e, "wake detection failed"),
            }
        }

        self.apply(Event::WakeWordDetected);
        speak(
            self.speech.as_mut(),
            &self.phrases.acknowledgement,
            &self.phrases.playback_failure,
        )
        .await;
        self.source.discard_pending();
        self.apply(Event::Acknowledged);

        Ok(())
    }

    /// Capture, transcribe and answer commands until the shutdown phrase
    #[allow(clippy::future_not_send)]
    async fn converse(&mut self) -> Result<()> {
        loop {
            let CapturedCommand::Audio(audio) = capture(self.source.as_mut(), &self.vad).await?
            else {
                tracing::debug!("no speech captured");
                self.apply(Event::SilenceCaptured);
                continue;
            };
            tracing::debug!(
                frames = audio.duration_frames(),
                sample_rate = audio.sample_rate(),
                "command captured"
            );

            let transcript = match self.transcriber.transcribe(&audio).await {
                Ok(text) => text,
                Err(e) if e.is_session_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "transcription failed");
                    let apology = self.phrases.transcription_failure.clone();
                    self.reply(&apology).await;
                    self.apply(Event::TurnCompleted);
                    continue;
                }
            };
            drop(audio);

            if transcript.trim().is_empty() {
                tracing::debug!("transcript is empty");
                self.apply(Event::SilenceCaptured);
                continue;
            }
            tracing::info!(transcript = %transcript, "heard");

            if is_shutdown_phrase(&transcript, &self.phrases.shutdown) {
                self.apply(Event::ShutdownPhraseDetected);
                speak(
                    self.speech.as_mut(),
                    &self.phrases.farewell,
                    &self.phrases.playback_failure,
                )
                .await;
                self.source.discard_pending();
                self.detector.reset();
                return Ok(());
            }

            let reply = match self.dispatcher.dispatch(&transcript).await {
                Ok(turn) => turn.reply,
                Err(e) if e.is_session_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "reasoning service failed");
                    self.phrases.reasoning_failure.clone()
                }
            };

            self.reply(&reply).await;
            self.apply(Event::TurnCompleted);
        }
    }

    /// Speak a reply and drop audio that arrived while it played
    #[allow(clippy::future_not_send)]
    async fn reply(&mut self, text: &str) {
        tracing::info!(reply = %text, "replying");
        speak(self.speech.as_mut(), text, &self.phrases.playback_failure).await;
        self.source.discard_pending();
    }

    fn apply(&mut self, event: Event) {
        let from = self.state;
        if !from.accepts(event) {
            tracing::warn!(state = %from, ?event, "event ignored in this state");
            return;
        }

        let to = from.next(event);
        self.state = to;
        tracing::info!(from = %from, to = %to, ?event, "transition");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("phrases", &self.phrases)
            .field("vad", &self.vad)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

/// Whether `transcript` contains the shutdown phrase, ignoring case
#[must_use]
pub fn is_shutdown_phrase(transcript: &str, shutdown: &str) -> bool {
    let shutdown = shutdown.trim().to_lowercase();
    !shutdown.is_empty() && transcript.to_lowercase().contains(&shutdown)
}

/// Speak `text`, trying `apology` once if playback fails
#[allow(clippy::future_not_send)]
async fn speak(output: &mut dyn SpeechOutput, text: &str, apology: &str) {
    let Err(e) = output.speak(text).await else {
        return;
    };
    tracing::warn!(error = %e, "playback failed");

    if text != apology {
        if let Err(e) = output.speak(apology).await {
            tracing::warn!(error = %e, "could not speak playback apology");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_phrase_matching() {
        assert!(is_shutdown_phrase("Okay, Goodbye now", "goodbye"));
        assert!(is_shutdown_phrase("GOODBYE", "goodbye"));
        assert!(is_shutdown_phrase("goodbye", " Goodbye "));
        assert!(!is_shutdown_phrase("good bye", "goodbye"));
        assert!(!is_shutdown_phrase("anything", ""));
    }
}
