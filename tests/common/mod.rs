//! Shared test utilities
//!
//! Scripted stand-ins for the microphone, wake engine, transcription,
//! reasoning service and speaker, so sessions run without hardware or network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;

use jarvis_assistant::agent::{Exchange, RawReply, ReasoningService, ReplyStrategy};
use jarvis_assistant::config::Phrases;
use jarvis_assistant::tools::{Action, ActionRegistry, Parameters, ToolResult};
use jarvis_assistant::voice::{
    AudioFrame, CapturedAudio, FrameSource, SpeechOutput, Transcriber, VadSettings, WakeDetector,
};
use jarvis_assistant::{Collaborators, Dispatcher, Error, Result, Session};

/// Samples per test frame
pub const FRAME: usize = 512;

/// First sample of a frame the scripted wake detector treats as the wake phrase
pub const WAKE_MARKER: i16 = i16::MAX;

/// VAD settings small enough to script by hand: 3-frame silence limit, 31-frame cap
#[must_use]
pub fn test_vad() -> VadSettings {
    VadSettings {
        sample_rate: 16000,
        frame_size: FRAME,
        silence_threshold: 300.0,
        silence_duration_secs: 0.1,
        max_duration_secs: 1.0,
    }
}

#[must_use]
pub fn silent_frame() -> AudioFrame {
    AudioFrame::new(vec![0; FRAME])
}

#[must_use]
pub fn loud_frame() -> AudioFrame {
    AudioFrame::new(vec![2000; FRAME])
}

#[must_use]
pub fn wake_frame() -> AudioFrame {
    let mut samples = vec![0; FRAME];
    samples[0] = WAKE_MARKER;
    AudioFrame::new(samples)
}

/// One spoken command under [`test_vad`]: speech, then enough silence to end it
#[must_use]
pub fn command_frames() -> Vec<AudioFrame> {
    let mut frames = vec![loud_frame(); 3];
    frames.extend(vec![silent_frame(); 4]);
    frames
}

/// A full capture window with no speech under [`test_vad`]
#[must_use]
pub fn silent_window() -> Vec<AudioFrame> {
    vec![silent_frame(); 31]
}

/// Counts `close` calls across every fake of a session
#[derive(Debug, Clone, Default)]
pub struct CloseCounter(Arc<AtomicUsize>);

impl CloseCounter {
    fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Frame source replaying a fixed script
///
/// When the script runs out it either signals and then blocks forever
/// (so a session can be interrupted), or fails like a lost device.
pub struct ScriptedFrames {
    frames: VecDeque<AudioFrame>,
    exhausted: Option<oneshot::Sender<()>>,
    signal_on_exhaustion: bool,
    closes: CloseCounter,
}

impl ScriptedFrames {
    /// Fails with a capture error once the script is exhausted
    #[must_use]
    pub fn new(frames: Vec<AudioFrame>) -> Self {
        Self {
            frames: frames.into(),
            exhausted: None,
            signal_on_exhaustion: false,
            closes: CloseCounter::default(),
        }
    }

    /// Signals the returned receiver once the script is exhausted, then blocks
    #[must_use]
    pub fn signalling(frames: Vec<AudioFrame>) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let source = Self {
            frames: frames.into(),
            exhausted: Some(tx),
            signal_on_exhaustion: true,
            closes: CloseCounter::default(),
        };
        (source, rx)
    }

    #[must_use]
    pub fn with_closes(mut self, closes: CloseCounter) -> Self {
        self.closes = closes;
        self
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait(?Send)]
impl FrameSource for ScriptedFrames {
    async fn next_frame(&mut self) -> Result<AudioFrame> {
        if let Some(frame) = self.frames.pop_front() {
            return Ok(frame);
        }

        if !self.signal_on_exhaustion {
            return Err(Error::Capture("script exhausted".to_string()));
        }
        if let Some(tx) = self.exhausted.take() {
            let _ = tx.send(());
        }
        std::future::pending().await
    }

    fn close(&mut self) -> Result<()> {
        self.closes.hit();
        Ok(())
    }
}

/// Wake detector firing on frames that start with [`WAKE_MARKER`]
#[derive(Default)]
pub struct MarkerDetector {
    closes: CloseCounter,
}

impl MarkerDetector {
    #[must_use]
    pub fn new(closes: CloseCounter) -> Self {
        Self { closes }
    }
}

#[async_trait(?Send)]
impl WakeDetector for MarkerDetector {
    async fn process(&mut self, frame: &AudioFrame) -> Result<Option<usize>> {
        Ok((frame.samples().first() == Some(&WAKE_MARKER)).then_some(0))
    }

    fn close(&mut self) -> Result<()> {
        self.closes.hit();
        Ok(())
    }
}

/// Transcriber returning scripted transcripts in order
///
/// `Err` entries become transcription errors.
#[derive(Default)]
pub struct ScriptedTranscriber {
    transcripts: Mutex<VecDeque<std::result::Result<String, String>>>,
    calls: AtomicUsize,
}

impl ScriptedTranscriber {
    #[must_use]
    pub fn new(transcripts: Vec<std::result::Result<&str, &str>>) -> Self {
        Self {
            transcripts: Mutex::new(
                transcripts
                    .into_iter()
                    .map(|t| t.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _audio: &CapturedAudio) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.transcripts.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(reason)) => Err(Error::Transcription(reason)),
            None => Ok(String::new()),
        }
    }
}

/// Reasoning service replaying scripted replies
///
/// Records the tool result carried by each follow-up exchange.
#[derive(Default)]
pub struct ScriptedReasoning {
    replies: Mutex<VecDeque<std::result::Result<RawReply, String>>>,
    follow_ups: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedReasoning {
    #[must_use]
    pub fn new(replies: Vec<RawReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            ..Self::default()
        }
    }

    /// Fail the next call with a service error
    pub fn fail_next(&self, reason: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_front(Err(reason.to_string()));
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn follow_ups(&self) -> Vec<String> {
        self.follow_ups.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoning {
    async fn complete(&self, exchange: &Exchange<'_>) -> Result<RawReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(follow_up) = exchange.follow_up {
            self.follow_ups
                .lock()
                .unwrap()
                .push(follow_up.result.to_string());
        }

        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(reason)) => Err(Error::ReasoningService(reason)),
            None => Err(Error::ReasoningService("no reply scripted".to_string())),
        }
    }
}

/// Speech output recording what was said
#[derive(Default)]
pub struct RecordingSpeech {
    spoken: Arc<Mutex<Vec<String>>>,
    fail_on: Option<String>,
    closes: CloseCounter,
}

impl RecordingSpeech {
    #[must_use]
    pub fn new(spoken: Arc<Mutex<Vec<String>>>, closes: CloseCounter) -> Self {
        Self {
            spoken,
            fail_on: None,
            closes,
        }
    }

    /// Fail with a playback error whenever `text` is spoken
    #[must_use]
    pub fn failing_on(mut self, text: &str) -> Self {
        self.fail_on = Some(text.to_string());
        self
    }
}

#[async_trait(?Send)]
impl SpeechOutput for RecordingSpeech {
    async fn speak(&mut self, text: &str) -> Result<()> {
        if self.fail_on.as_deref() == Some(text) {
            return Err(Error::Playback("speaker unplugged".to_string()));
        }
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closes.hit();
        Ok(())
    }
}

/// Action returning a fixed output and counting its runs
pub struct CountingAction {
    name: &'static str,
    output: &'static str,
    runs: Arc<AtomicUsize>,
}

impl CountingAction {
    #[must_use]
    pub fn new(name: &'static str, output: &'static str) -> (Self, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let action = Self {
            name,
            output,
            runs: Arc::clone(&runs),
        };
        (action, runs)
    }
}

#[async_trait]
impl Action for CountingAction {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        "Test action."
    }

    async fn execute(&self, _parameters: &Parameters) -> ToolResult {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.to_string())
    }
}

/// Shorthand for a text reply
#[must_use]
pub fn text(s: &str) -> RawReply {
    RawReply::Text(s.to_string())
}

/// A session wired to scripted fakes, plus handles to inspect them
pub struct Harness {
    pub session: Session,
    pub spoken: Arc<Mutex<Vec<String>>>,
    pub transcriber: Arc<ScriptedTranscriber>,
    pub reasoning: Arc<ScriptedReasoning>,
    pub closes: CloseCounter,
    exhausted: Option<oneshot::Receiver<()>>,
}

/// Builder for [`Harness`]
pub struct HarnessBuilder {
    frames: Vec<AudioFrame>,
    transcripts: Vec<std::result::Result<&'static str, &'static str>>,
    replies: Vec<RawReply>,
    registry: ActionRegistry,
    fail_speech_on: Option<String>,
    interrupt_when_done: bool,
}

impl Harness {
    #[must_use]
    pub fn builder(frames: Vec<AudioFrame>) -> HarnessBuilder {
        HarnessBuilder {
            frames,
            transcripts: Vec::new(),
            replies: Vec::new(),
            registry: ActionRegistry::with_builtin_actions(),
            fail_speech_on: None,
            interrupt_when_done: true,
        }
    }

    /// Run until the frame script is exhausted (interrupt) or fails (fatal)
    pub async fn run(&mut self) -> Result<()> {
        let exhausted = self.exhausted.take();
        self.session
            .run(async move {
                match exhausted {
                    Some(rx) => {
                        let _ = rx.await;
                    }
                    None => std::future::pending().await,
                }
            })
            .await
    }

    #[must_use]
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

impl HarnessBuilder {
    #[must_use]
    pub fn transcripts(mut self, transcripts: Vec<&'static str>) -> Self {
        self.transcripts = transcripts.into_iter().map(Ok).collect();
        self
    }

    #[must_use]
    pub fn transcript_results(
        mut self,
        transcripts: Vec<std::result::Result<&'static str, &'static str>>,
    ) -> Self {
        self.transcripts = transcripts;
        self
    }

    #[must_use]
    pub fn replies(mut self, replies: Vec<RawReply>) -> Self {
        self.replies = replies;
        self
    }

    #[must_use]
    pub fn registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn fail_speech_on(mut self, text: &str) -> Self {
        self.fail_speech_on = Some(text.to_string());
        self
    }

    /// End with a lost-device error instead of an interrupt
    #[must_use]
    pub const fn fail_when_done(mut self) -> Self {
        self.interrupt_when_done = false;
        self
    }

    #[must_use]
    pub fn build(self) -> Harness {
        let closes = CloseCounter::default();
        let spoken = Arc::new(Mutex::new(Vec::new()));

        let (source, exhausted) = if self.interrupt_when_done {
            let (source, rx) = ScriptedFrames::signalling(self.frames);
            (source, Some(rx))
        } else {
            (ScriptedFrames::new(self.frames), None)
        };

        let transcriber = Arc::new(ScriptedTranscriber {
            transcripts: Mutex::new(
                self.transcripts
                    .into_iter()
                    .map(|t| t.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        });
        let reasoning = Arc::new(ScriptedReasoning::new(self.replies));

        let mut speech = RecordingSpeech::new(Arc::clone(&spoken), closes.clone());
        if let Some(text) = &self.fail_speech_on {
            speech = speech.failing_on(text);
        }

        let phrases = Phrases::default();
        let dispatcher = Dispatcher::new(
            Arc::clone(&reasoning) as Arc<dyn ReasoningService>,
            self.registry,
            ReplyStrategy::JsonProtocol,
            "Jarvis",
            phrases.unknown_tool.clone(),
        );

        let session = Session::new(
            phrases,
            test_vad(),
            Collaborators {
                source: Box::new(source.with_closes(closes.clone())),
                detector: Box::new(MarkerDetector::new(closes.clone())),
                transcriber: Arc::clone(&transcriber) as Arc<dyn Transcriber>,
                speech: Box::new(speech),
            },
            dispatcher,
        );

        Harness {
            session,
            spoken,
            transcriber,
            reasoning,
            closes,
            exhausted,
        }
    }
}
