//! Jarvis - a voice-driven personal assistant
//!
//! This library provides the pieces of the assistant:
//! - Voice input (microphone frames, wake phrase spotting, VAD capture, STT)
//! - Dialogue with a reasoning service, with optional tool calling
//! - Local actions (applications, files, calendar, battery, clock)
//! - Voice output (TTS and playback)
//! - The session state machine tying them together
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      Session                         │
//! │   Standby → WakeAcknowledged → Conversing → ...     │
//! └──────┬──────────────┬───────────────┬───────────────┘
//!        │              │               │
//! ┌──────▼──────┐ ┌─────▼──────┐ ┌──────▼──────────────┐
//! │    Voice    │ │   Agent    │ │       Voice         │
//! │ mic · wake  │ │ dispatcher │ │   TTS · playback    │
//! │ VAD · STT   │ │ reasoning  │ └─────────────────────┘
//! └─────────────┘ └─────┬──────┘
//!                 ┌─────▼──────┐
//!                 │   Tools    │
//!                 │  registry  │
//!                 └────────────┘
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod session;
pub mod tools;
pub mod voice;

pub use agent::{Dispatcher, ReplyStrategy};
pub use config::Config;
pub use error::{Error, Result};
pub use session::{Collaborators, Session, State};
pub use tools::{Action, ActionRegistry, ToolError};
