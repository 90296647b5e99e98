//! Actions the assistant can perform on the local machine
//!
//! Every action implements [`Action`] and is registered once at startup
//! into an [`ActionRegistry`]. The registry is the only place a tool name is
//! resolved to code; the [`ToolManifest`] derived from it is what the
//! reasoning service is told about.

mod apps;
mod battery;
mod calendar;
mod clock;
mod files;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

pub use apps::OpenApplication;
pub use battery::{BatteryLevel, parse_pmset};
pub use calendar::CalendarEvents;
pub use clock::CurrentTime;
pub use files::SearchFiles;

/// Flat string-to-string parameters of a tool invocation
pub type Parameters = BTreeMap<String, String>;

/// Outcome of running a tool
pub type ToolResult = std::result::Result<String, ToolError>;

/// Time allowed for an action's helper process
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Why a tool produced no result
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// No action is registered under this name
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The action ran but its underlying operation failed
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

/// A named capability the reasoning service may invoke
#[async_trait]
pub trait Action: Send + Sync {
    /// Identifier used in tool invocations
    fn name(&self) -> &'static str;

    /// One-line description for the reasoning service
    fn description(&self) -> &'static str;

    /// JSON schema of the parameter object
    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    /// Run the action
    ///
    /// # Errors
    ///
    /// Returns `ToolError::ExecutionFailed` if the underlying operation fails
    async fn execute(&self, parameters: &Parameters) -> ToolResult;
}

/// Description of one tool as advertised to the reasoning service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    /// Parameter names declared by the schema, in declaration order
    #[must_use]
    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters
            .get("properties")
            .and_then(serde_json::Value::as_object)
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

/// The fixed set of tools for a session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolManifest {
    tools: Vec<ToolSpec>,
}

impl ToolManifest {
    #[must_use]
    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Numbered list of tool signatures for a text prompt
    ///
    /// e.g. `1. open_application(app_name): Opens an application.`
    #[must_use]
    pub fn describe(&self) -> String {
        self.tools
            .iter()
            .enumerate()
            .map(|(i, tool)| {
                format!(
                    "{}. {}({}): {}",
                    i + 1,
                    tool.name,
                    tool.parameter_names().join(", "),
                    tool.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tool declarations in the chat-completions `tools` format
    #[must_use]
    pub fn function_declarations(&self) -> Vec<serde_json::Value> {
        self.tools
            .iter()
            .map(|tool| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect()
    }
}

/// Immutable table from tool name to action
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in action
    #[must_use]
    pub fn with_builtin_actions() -> Self {
        Self::new()
            .with(OpenApplication)
            .with(SearchFiles)
            .with(CalendarEvents)
            .with(BatteryLevel)
            .with(CurrentTime)
    }

    /// Add an action, replacing any action with the same name
    #[must_use]
    pub fn with<A>(mut self, action: A) -> Self
    where
        A: Action + 'static,
    {
        let name = action.name().to_string();
        if self.actions.insert(name.clone(), Arc::new(action)).is_some() {
            tracing::warn!(tool = %name, "tool registered twice, keeping the last");
        }
        self
    }

    /// Whether `name` is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered tool names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Build the manifest advertised to the reasoning service
    #[must_use]
    pub fn manifest(&self) -> ToolManifest {
        ToolManifest {
            tools: self
                .actions
                .values()
                .map(|action| ToolSpec {
                    name: action.name().to_string(),
                    description: action.description().to_string(),
                    parameters: action.parameters(),
                })
                .collect(),
        }
    }

    /// Run the named action
    ///
    /// # Errors
    ///
    /// Returns `ToolError::UnknownTool` if nothing is registered under
    /// `name`, or the action's own failure
    pub async fn execute(&self, name: &str, parameters: &Parameters) -> ToolResult {
        let action = self
            .actions
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        tracing::debug!(tool = name, ?parameters, "executing tool");
        let result = action.execute(parameters).await;

        match &result {
            Ok(output) => tracing::debug!(tool = name, output = %output, "tool succeeded"),
            Err(e) => tracing::warn!(tool = name, error = %e, "tool failed"),
        }

        result
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .finish()
    }
}

/// Fetch a required, non-blank parameter
fn required<'a>(parameters: &'a Parameters, key: &str) -> std::result::Result<&'a str, ToolError> {
    parameters
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ToolError::ExecutionFailed(format!("missing parameter: {key}")))
}

/// Run a helper program and collect its output
async fn run_output(program: &str, args: &[&str]) -> Result<std::process::Output, ToolError> {
    let child = tokio::process::Command::new(program)
        .args(args)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ToolError::ExecutionFailed(format!("failed to run {program}: {e}")))?;

    tokio::time::timeout(COMMAND_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| {
            ToolError::ExecutionFailed(format!(
                "{program} timed out ({}s)",
                COMMAND_TIMEOUT.as_secs()
            ))
        })?
        .map_err(|e| ToolError::ExecutionFailed(format!("{program} failed: {e}")))
}

/// Run a helper program and return its trimmed stdout
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
async fn run_command(program: &str, args: &[&str]) -> ToolResult {
    let output = run_output(program, args).await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ToolError::ExecutionFailed(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Action for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "Repeats its text parameter."
        }

        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }

        async fn execute(&self, parameters: &Parameters) -> ToolResult {
            required(parameters, "text").map(ToString::to_string)
        }
    }

    #[tokio::test]
    async fn executes_registered_action() {
        let registry = ActionRegistry::new().with(Echo);
        let params = Parameters::from([("text".to_string(), "hi".to_string())]);

        assert_eq!(registry.execute("echo", &params).await, Ok("hi".to_string()));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let registry = ActionRegistry::new().with(Echo);

        assert_eq!(
            registry.execute("delete_everything", &Parameters::new()).await,
            Err(ToolError::UnknownTool("delete_everything".to_string()))
        );
    }

    #[tokio::test]
    async fn missing_parameter_fails_execution() {
        let registry = ActionRegistry::new().with(Echo);
        let params = Parameters::from([("text".to_string(), "   ".to_string())]);

        assert!(matches!(
            registry.execute("echo", &params).await,
            Err(ToolError::ExecutionFailed(_))
        ));
    }

    #[test]
    fn manifest_describes_tools() {
        let manifest = ActionRegistry::new().with(Echo).manifest();

        assert_eq!(manifest.tools().len(), 1);
        assert_eq!(manifest.describe(), "1. echo(text): Repeats its text parameter.");

        let declarations = manifest.function_declarations();
        assert_eq!(declarations[0]["function"]["name"], "echo");
        assert_eq!(declarations[0]["type"], "function");
    }

    #[test]
    fn builtin_registry_is_complete() {
        let registry = ActionRegistry::with_builtin_actions();

        assert_eq!(
            registry.names(),
            vec![
                "get_battery_level",
                "get_calendar_events",
                "get_current_time",
                "open_application",
                "search_files",
            ]
        );
        assert!(!registry.contains("delete_everything"));
    }

    #[tokio::test]
    async fn missing_program_fails_cleanly() {
        let result = run_command("definitely-not-a-real-program-xyz", &[]).await;
        assert!(matches!(result, Err(ToolError::ExecutionFailed(_))));
    }
}
