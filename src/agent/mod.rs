//! Dialogue with the reasoning service

mod dispatcher;
mod reasoning;
mod response;
mod retry;

pub use dispatcher::{ConversationTurn, Dispatcher, ReplyStrategy, system_prompt};
pub use reasoning::{ChatCompletionsClient, Exchange, FollowUp, ReasoningService, build_messages, parse_completion};
pub use response::{DialogueResponse, RawReply, ToolInvocation, clean_for_speech, parse_reply};
pub use retry::RetryPolicy;
