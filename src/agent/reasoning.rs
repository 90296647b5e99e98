//! Reasoning service port and its chat-completions client

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::response::{RawReply, ToolInvocation};
use super::retry::{
    RetryPolicy, delay_for_attempt, is_recoverable_error, is_recoverable_status,
    parse_retry_after,
};
use crate::tools::ToolManifest;
use crate::{Error, Result};

/// Identifier given to the single tool call of a function-calling follow-up
const FOLLOW_UP_CALL_ID: &str = "call_0";

/// Context for the second round trip after a tool ran
#[derive(Debug, Clone, Copy)]
pub struct FollowUp<'a> {
    /// The invocation that was executed
    pub invocation: &'a ToolInvocation,
    /// The reply that requested it, echoed back as the assistant turn
    pub raw: &'a RawReply,
    /// Tool output, or `Error: <reason>` on failure
    pub result: &'a str,
}

/// One request to the reasoning service
#[derive(Debug, Clone, Copy)]
pub struct Exchange<'a> {
    pub system_prompt: &'a str,
    pub utterance: &'a str,
    /// Tools to declare natively; `None` for text-only requests
    pub tools: Option<&'a ToolManifest>,
    pub follow_up: Option<FollowUp<'a>>,
}

impl<'a> Exchange<'a> {
    /// First round trip for an utterance
    #[must_use]
    pub const fn new(system_prompt: &'a str, utterance: &'a str) -> Self {
        Self {
            system_prompt,
            utterance,
            tools: None,
            follow_up: None,
        }
    }

    /// Declare tools as native functions
    #[must_use]
    pub const fn with_tools(mut self, tools: &'a ToolManifest) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Turn this into the follow-up carrying a tool result
    #[must_use]
    pub const fn with_follow_up(mut self, follow_up: FollowUp<'a>) -> Self {
        self.follow_up = Some(follow_up);
        self
    }
}

/// A remote service turning an exchange into a reply
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Perform one round trip
    ///
    /// # Errors
    ///
    /// Returns `Error::ReasoningService` on network, auth or format failures
    async fn complete(&self, exchange: &Exchange<'_>) -> Result<RawReply>;
}

/// Chat messages for an exchange
///
/// A text reply is echoed back verbatim as the assistant turn and the tool
/// result follows as a user turn. A native function call is echoed as an
/// assistant tool-call turn answered by a tool turn.
#[must_use]
pub fn build_messages(exchange: &Exchange<'_>) -> Vec<Value> {
    let mut messages = Vec::with_capacity(4);

    if !exchange.system_prompt.is_empty() {
        messages.push(json!({ "role": "system", "content": exchange.system_prompt }));
    }
    messages.push(json!({ "role": "user", "content": exchange.utterance }));

    let Some(follow_up) = exchange.follow_up else {
        return messages;
    };

    match follow_up.raw {
        RawReply::Text(text) => {
            messages.push(json!({ "role": "assistant", "content": text }));
            messages.push(json!({
                "role": "user",
                "content": format!(
                    "The tool {} returned: {}\nUse this to answer my request.",
                    follow_up.invocation.name, follow_up.result
                ),
            }));
        }
        RawReply::FunctionCall { name, arguments } => {
            messages.push(json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": FOLLOW_UP_CALL_ID,
                    "type": "function",
                    "function": { "name": name, "arguments": arguments },
                }],
            }));
            messages.push(json!({
                "role": "tool",
                "tool_call_id": FOLLOW_UP_CALL_ID,
                "content": follow_up.result,
            }));
        }
    }

    messages
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Extract the reply from a chat-completions response body
///
/// # Errors
///
/// Returns `Error::ReasoningService` if the body has no usable choice
pub fn parse_completion(body: &str) -> Result<RawReply> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| Error::ReasoningService(format!("unreadable response: {e}")))?;

    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| Error::ReasoningService("response has no choices".to_string()))?;

    if let Some(call) = message.tool_calls.into_iter().next() {
        return Ok(RawReply::FunctionCall {
            name: call.function.name,
            arguments: call.function.arguments,
        });
    }

    match message.content {
        Some(content) if !content.trim().is_empty() => Ok(RawReply::Text(content)),
        _ => Err(Error::ReasoningService("response is empty".to_string())),
    }
}

/// Client for an OpenAI-compatible chat-completions endpoint
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl ChatCompletionsClient {
    /// Create a client for `base_url` (e.g. `https://api.openai.com/v1`)
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty or the HTTP client cannot be built
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::Config("reasoning service API key is empty".to_string()));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: model.into(),
            max_tokens: 300,
            retry: RetryPolicy::default(),
        })
    }

    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, exchange: &Exchange<'_>) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": build_messages(exchange),
            "max_tokens": self.max_tokens,
        });

        if let Some(tools) = exchange.tools.filter(|t| !t.is_empty()) {
            body["tools"] = Value::Array(tools.function_declarations());
        }

        body
    }
}

impl std::fmt::Debug for ChatCompletionsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsClient")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ReasoningService for ChatCompletionsClient {
    async fn complete(&self, exchange: &Exchange<'_>) -> Result<RawReply> {
        let body = self.request_body(exchange);
        let mut attempt = 0;

        loop {
            let sent = self
                .client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            let delay = match sent {
                Ok(response) if response.status().is_success() => {
                    let text = response
                        .text()
                        .await
                        .map_err(|e| Error::ReasoningService(e.to_string()))?;
                    return parse_completion(&text);
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let retry_after = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_retry_after);
                    let text = response.text().await.unwrap_or_default();

                    if !is_recoverable_status(status) || attempt >= self.retry.max_retries {
                        return Err(Error::ReasoningService(format!("HTTP {status}: {text}")));
                    }
                    tracing::warn!(status, attempt, "reasoning service busy, retrying");
                    delay_for_attempt(&self.retry, attempt, retry_after)
                }
                Err(e) => {
                    if !is_recoverable_error(&e) || attempt >= self.retry.max_retries {
                        return Err(Error::ReasoningService(e.to_string()));
                    }
                    tracing::warn!(error = %e, attempt, "reasoning service unreachable, retrying");
                    delay_for_attempt(&self.retry, attempt, None)
                }
            };

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
