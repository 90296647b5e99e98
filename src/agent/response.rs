//! Classifying reasoning-service output
//!
//! [`parse_reply`] is the only place raw model output is inspected. Everything
//! downstream works with the resulting [`DialogueResponse`].

use serde_json::Value;

use crate::tools::Parameters;

/// Output of one reasoning-service round trip, before interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawReply {
    /// Free-form text (prose, or a JSON tool request in the text protocol)
    Text(String),
    /// A native function call
    FunctionCall {
        /// Function name chosen by the model
        name: String,
        /// Arguments as a JSON document
        arguments: String,
    },
}

/// A request to run a registered action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub name: String,
    pub parameters: Parameters,
}

/// What the reasoning service asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueResponse {
    /// A reply to speak
    Conversational(String),
    /// A tool to run before replying
    ToolInvocation(ToolInvocation),
    /// Structured output with an invalid shape; carries the raw text
    Malformed(String),
}

/// Classify a raw reply
///
/// A JSON object carrying `tool_name` and a flat string-to-string
/// `parameters` object is a tool invocation. A JSON object of any other
/// shape is malformed. Anything else is conversational text.
#[must_use]
pub fn parse_reply(raw: &RawReply) -> DialogueResponse {
    match raw {
        RawReply::Text(text) => parse_text(text),
        RawReply::FunctionCall { name, arguments } => parse_function_call(name, arguments),
    }
}

fn parse_text(text: &str) -> DialogueResponse {
    let text = text.trim();
    let body = strip_code_fence(text);

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(object)) => {
            let name = object.get("tool_name").and_then(Value::as_str);
            let parameters = object.get("parameters").map_or(Some(Parameters::new()), to_parameters);

            match (name, parameters) {
                (Some(name), Some(parameters)) if !name.trim().is_empty() => {
                    DialogueResponse::ToolInvocation(ToolInvocation {
                        name: name.trim().to_string(),
                        parameters,
                    })
                }
                _ => {
                    tracing::debug!(raw = text, "structured reply has an invalid shape");
                    DialogueResponse::Malformed(text.to_string())
                }
            }
        }
        _ => DialogueResponse::Conversational(text.to_string()),
    }
}

fn parse_function_call(name: &str, arguments: &str) -> DialogueResponse {
    let arguments = arguments.trim();
    let parameters = if arguments.is_empty() {
        Some(Parameters::new())
    } else {
        serde_json::from_str::<Value>(arguments)
            .ok()
            .as_ref()
            .and_then(to_parameters)
    };

    match parameters {
        Some(parameters) if !name.trim().is_empty() => {
            DialogueResponse::ToolInvocation(ToolInvocation {
                name: name.trim().to_string(),
                parameters,
            })
        }
        _ => {
            tracing::debug!(name, arguments, "function call has an invalid shape");
            DialogueResponse::Malformed(format!("{name}({arguments})"))
        }
    }
}

/// Flat string map from a JSON object; `null` counts as empty
fn to_parameters(value: &Value) -> Option<Parameters> {
    match value {
        Value::Null => Some(Parameters::new()),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
        _ => None,
    }
}

/// Remove a surrounding Markdown code fence (```` ```json ... ``` ````)
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return text;
    };

    // Drop the info string (e.g. "json") on the opening line
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.trim()
}

/// Make reply text safe to hand to speech synthesis
///
/// Synthesis engines read `%` unreliably, so it is spelled out.
#[must_use]
pub fn clean_for_speech(text: &str) -> String {
    text.replace('%', " percent")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> RawReply {
        RawReply::Text(s.to_string())
    }

    #[test]
    fn plain_text_is_conversational() {
        assert_eq!(
            parse_reply(&text("I'm doing splendidly, thank you for asking, sir.")),
            DialogueResponse::Conversational(
                "I'm doing splendidly, thank you for asking, sir.".to_string()
            )
        );
    }

    #[test]
    fn tool_invocation_with_parameters() {
        let reply = text(r#"{"tool_name":"open_application","parameters":{"app_name":"Safari"}}"#);

        let DialogueResponse::ToolInvocation(invocation) = parse_reply(&reply) else {
            panic!("expected tool invocation");
        };
        assert_eq!(invocation.name, "open_application");
        assert_eq!(invocation.parameters["app_name"], "Safari");
    }

    #[test]
    fn tool_invocation_without_parameters() {
        let reply = text(r#"{"tool_name":"get_battery_level","parameters":{}}"#);
        assert_eq!(
            parse_reply(&reply),
            DialogueResponse::ToolInvocation(ToolInvocation {
                name: "get_battery_level".to_string(),
                parameters: Parameters::new(),
            })
        );

        let reply = text(r#"{"tool_name":"get_battery_level"}"#);
        assert!(matches!(parse_reply(&reply), DialogueResponse::ToolInvocation(_)));
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let reply = text("```json\n{\"tool_name\": \"get_current_time\", \"parameters\": {}}\n```");
        assert!(matches!(parse_reply(&reply), DialogueResponse::ToolInvocation(_)));

        let reply = text("```\n{\"tool_name\": \"get_current_time\"}\n```");
        assert!(matches!(parse_reply(&reply), DialogueResponse::ToolInvocation(_)));
    }

    #[test]
    fn object_without_tool_name_is_malformed() {
        let raw = r#"{"answer": "42"}"#;
        assert_eq!(
            parse_reply(&text(raw)),
            DialogueResponse::Malformed(raw.to_string())
        );
    }

    #[test]
    fn wrong_parameter_types_are_malformed() {
        let raw = r#"{"tool_name":"search_files","parameters":{"query":42}}"#;
        assert!(matches!(parse_reply(&text(raw)), DialogueResponse::Malformed(_)));

        let raw = r#"{"tool_name":"search_files","parameters":["query"]}"#;
        assert!(matches!(parse_reply(&text(raw)), DialogueResponse::Malformed(_)));

        let raw = r#"{"tool_name":7,"parameters":{}}"#;
        assert!(matches!(parse_reply(&text(raw)), DialogueResponse::Malformed(_)));
    }

    #[test]
    fn non_object_json_is_conversational() {
        assert_eq!(
            parse_reply(&text("42")),
            DialogueResponse::Conversational("42".to_string())
        );
        assert!(matches!(
            parse_reply(&text("{not json")),
            DialogueResponse::Conversational(_)
        ));
    }

    #[test]
    fn native_function_call() {
        let reply = RawReply::FunctionCall {
            name: "open_application".to_string(),
            arguments: r#"{"app_name":"WhatsApp"}"#.to_string(),
        };
        let DialogueResponse::ToolInvocation(invocation) = parse_reply(&reply) else {
            panic!("expected tool invocation");
        };
        assert_eq!(invocation.parameters["app_name"], "WhatsApp");

        let reply = RawReply::FunctionCall {
            name: "get_current_time".to_string(),
            arguments: String::new(),
        };
        assert!(matches!(parse_reply(&reply), DialogueResponse::ToolInvocation(_)));
    }

    #[test]
    fn bad_function_arguments_are_malformed() {
        let reply = RawReply::FunctionCall {
            name: "open_application".to_string(),
            arguments: "{broken".to_string(),
        };
        assert_eq!(
            parse_reply(&reply),
            DialogueResponse::Malformed("open_application({broken)".to_string())
        );
    }

    #[test]
    fn percent_is_spelled_out() {
        assert_eq!(
            clean_for_speech("The battery is at 62%."),
            "The battery is at 62 percent."
        );
        assert_eq!(clean_for_speech("no symbols"), "no symbols");
    }
}
