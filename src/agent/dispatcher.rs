//! Dialogue dispatch: one utterance in, one spoken reply out

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::reasoning::{Exchange, FollowUp, ReasoningService};
use super::response::{DialogueResponse, RawReply, ToolInvocation, clean_for_speech, parse_reply};
use crate::tools::{ActionRegistry, ToolError, ToolManifest, ToolResult};
use crate::{Error, Result};

/// How tools are offered to the reasoning service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplyStrategy {
    /// No tools; every reply is conversational
    Plain,
    /// Tools described in the system prompt, requested as a JSON object
    #[default]
    JsonProtocol,
    /// Tools declared as native functions
    FunctionCalling,
}

impl FromStr for ReplyStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "json" | "json_protocol" => Ok(Self::JsonProtocol),
            "function" | "function_calling" | "functions" => Ok(Self::FunctionCalling),
            other => Err(Error::Config(format!(
                "unknown reply strategy '{other}' (expected plain, json or function)"
            ))),
        }
    }
}

impl fmt::Display for ReplyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::JsonProtocol => write!(f, "json"),
            Self::FunctionCalling => write!(f, "function"),
        }
    }
}

/// Build the system prompt for a strategy
#[must_use]
pub fn system_prompt(assistant_name: &str, strategy: ReplyStrategy, manifest: &ToolManifest) -> String {
    let persona = format!(
        "You are {assistant_name}, a witty and brilliant AI assistant. \
         Your replies are spoken aloud, so keep them short and avoid Markdown."
    );

    match strategy {
        ReplyStrategy::Plain => persona,
        ReplyStrategy::JsonProtocol => format!(
            "{persona}\n\n\
             You have access to the following tools:\n{tools}\n\n\
             - If the request matches a tool's capability, respond with ONLY a JSON object:\n  \
             {{\"tool_name\": \"function_name\", \"parameters\": {{\"arg_name\": \"value\"}}}}\n\
             - For tools without arguments, use empty parameters:\n  \
             {{\"tool_name\": \"function_name\", \"parameters\": {{}}}}\n\
             - If the request is conversational, respond naturally and in character, without JSON.\n\
             - When given a tool result, answer the original request in character using it.",
            tools = manifest.describe()
        ),
        ReplyStrategy::FunctionCalling => format!(
            "{persona}\n\n\
             If the request is a general question, answer it directly. \
             If it needs an action on the computer, call one of the available functions, \
             then answer in character using its result."
        ),
    }
}

/// Everything that happened while answering one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub utterance: String,
    pub response: DialogueResponse,
    pub tool_result: Option<ToolResult>,
    /// Text to speak, already cleaned for synthesis
    pub reply: String,
}

/// Sends utterances to the reasoning service and executes requested tools
pub struct Dispatcher {
    service: Arc<dyn ReasoningService>,
    registry: ActionRegistry,
    manifest: ToolManifest,
    strategy: ReplyStrategy,
    system_prompt: String,
    unknown_tool_reply: String,
}

impl Dispatcher {
    /// Create a dispatcher; the manifest is derived from `registry` once
    #[must_use]
    pub fn new(
        service: Arc<dyn ReasoningService>,
        registry: ActionRegistry,
        strategy: ReplyStrategy,
        assistant_name: &str,
        unknown_tool_reply: impl Into<String>,
    ) -> Self {
        let manifest = registry.manifest();
        let system_prompt = system_prompt(assistant_name, strategy, &manifest);

        Self {
            service,
            registry,
            manifest,
            strategy,
            system_prompt,
            unknown_tool_reply: unknown_tool_reply.into(),
        }
    }

    #[must_use]
    pub const fn strategy(&self) -> ReplyStrategy {
        self.strategy
    }

    #[must_use]
    pub const fn manifest(&self) -> &ToolManifest {
        &self.manifest
    }

    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Answer an utterance
    ///
    /// At most two round trips: one to classify the request and, when a
    /// registered tool ran, one to phrase its result.
    ///
    /// # Errors
    ///
    /// Returns `Error::ReasoningService` if either round trip fails
    pub async fn dispatch(&self, utterance: &str) -> Result<ConversationTurn> {
        let exchange = self.exchange(utterance);
        let raw = self.service.complete(&exchange).await?;

        let response = match self.strategy {
            ReplyStrategy::Plain => DialogueResponse::Conversational(raw_text(&raw)),
            ReplyStrategy::JsonProtocol | ReplyStrategy::FunctionCalling => parse_reply(&raw),
        };

        let (tool_result, reply) = match &response {
            DialogueResponse::Conversational(text) => (None, text.clone()),
            DialogueResponse::Malformed(text) => {
                tracing::debug!("malformed tool request, replying with raw text");
                (None, text.clone())
            }
            DialogueResponse::ToolInvocation(invocation) => {
                let (result, reply) = self.run_tool(&exchange, invocation, &raw).await?;
                (Some(result), reply)
            }
        };

        Ok(ConversationTurn {
            utterance: utterance.to_string(),
            response,
            tool_result,
            reply: clean_for_speech(&reply),
        })
    }

    fn exchange<'a>(&'a self, utterance: &'a str) -> Exchange<'a> {
        let exchange = Exchange::new(&self.system_prompt, utterance);
        match self.strategy {
            ReplyStrategy::FunctionCalling => exchange.with_tools(&self.manifest),
            ReplyStrategy::Plain | ReplyStrategy::JsonProtocol => exchange,
        }
    }

    async fn run_tool(
        &self,
        exchange: &Exchange<'_>,
        invocation: &ToolInvocation,
        raw: &RawReply,
    ) -> Result<(ToolResult, String)> {
        if !self.registry.contains(&invocation.name) {
            tracing::warn!(tool = %invocation.name, "reasoning service requested an unknown tool");
            return Ok((
                Err(ToolError::UnknownTool(invocation.name.clone())),
                self.unknown_tool_reply.clone(),
            ));
        }

        tracing::debug!(tool = %invocation.name, parameters = ?invocation.parameters, "tool invocation");
        let result = self
            .registry
            .execute(&invocation.name, &invocation.parameters)
            .await;

        let context = match &result {
            Ok(output) => output.clone(),
            Err(ToolError::ExecutionFailed(reason)) => format!("Error: {reason}"),
            Err(e) => format!("Error: {e}"),
        };
        tracing::debug!(tool = %invocation.name, result = %context, "tool result");

        let follow_up = exchange.with_follow_up(FollowUp {
            invocation,
            raw,
            result: &context,
        });
        let reply = raw_text(&self.service.complete(&follow_up).await?);

        Ok((result, reply))
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("strategy", &self.strategy)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Text of a reply that is spoken as-is
fn raw_text(raw: &RawReply) -> String {
    match raw {
        RawReply::Text(text) => text.trim().to_string(),
        RawReply::FunctionCall { name, arguments } => format!("{name}({arguments})"),
    }
}
