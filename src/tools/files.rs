//! File search

use async_trait::async_trait;

use super::{Action, Parameters, ToolError, ToolResult, required};
#[cfg(target_os = "macos")]
use super::run_command;
#[cfg(not(target_os = "macos"))]
use super::run_output;

/// Results included in a search summary
const MAX_RESULTS: usize = 5;

/// Searches the user's files by name or content
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchFiles;

#[async_trait]
impl Action for SearchFiles {
    fn name(&self) -> &'static str {
        "search_files"
    }

    fn description(&self) -> &'static str {
        "Searches for files on the user's computer."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search term for the files."
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, parameters: &Parameters) -> ToolResult {
        let query = required(parameters, "query")?;

        let output = search(query).await?;
        Ok(summarize_results(query, &output))
    }
}

#[cfg(target_os = "macos")]
async fn search(query: &str) -> Result<String, ToolError> {
    run_command("mdfind", &search_args(query)).await
}

#[cfg(not(target_os = "macos"))]
async fn search(query: &str) -> Result<String, ToolError> {
    let output = run_output("locate", &search_args(query)).await?;

    // locate exits 1 with no output when nothing matches
    if !output.status.success() && !output.stderr.is_empty() {
        return Err(ToolError::ExecutionFailed(format!(
            "locate exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Helper arguments; the query always follows `--` so it is never read as a flag
#[cfg(target_os = "macos")]
fn search_args(query: &str) -> Vec<&str> {
    vec!["--", query]
}

#[cfg(not(target_os = "macos"))]
fn search_args(query: &str) -> Vec<&str> {
    vec!["-i", "-l", "5", "--", query]
}

/// Summarize the first few result paths
#[must_use]
pub fn summarize_results(query: &str, output: &str) -> String {
    let paths: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(MAX_RESULTS)
        .collect();

    if paths.is_empty() {
        return format!("No files matching '{query}' were found.");
    }

    format!(
        "Found the following files related to '{query}':\n{}",
        paths.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_keeps_top_five() {
        let output = "/a\n/b\n\n/c\n/d\n/e\n/f\n";
        let summary = summarize_results("report", output);

        assert!(summary.starts_with("Found the following files related to 'report':"));
        assert!(summary.contains("/e"));
        assert!(!summary.contains("/f"));
    }

    #[test]
    fn dash_query_is_passed_as_operand() {
        let args = search_args("-rf notes");
        assert_eq!(args[args.len() - 2..], ["--", "-rf notes"]);
    }

    #[test]
    fn empty_output_is_not_found() {
        assert_eq!(
            summarize_results("taxes", "  \n"),
            "No files matching 'taxes' were found."
        );
    }
}
