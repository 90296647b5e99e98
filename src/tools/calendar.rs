//! Today's calendar events

use async_trait::async_trait;

use super::{Action, Parameters, ToolResult};

/// AppleScript listing today's events from the first calendar
#[cfg(target_os = "macos")]
const TODAY_EVENTS_SCRIPT: &str = r#"
set today to current date
set time of today to 0
set tomorrow to today + (1 * days)
tell application "Calendar"
    tell calendar 1
        set theEvents to (every event whose start date is greater than or equal to today and start date is less than tomorrow)
        set eventList to {}
        repeat with anEvent in theEvents
            set the end of eventList to summary of anEvent & " at " & time string of (start date of anEvent)
        end repeat
        return eventList
    end tell
end tell
"#;

/// Reads today's events from the system calendar
#[derive(Debug, Clone, Copy, Default)]
pub struct CalendarEvents;

#[async_trait]
impl Action for CalendarEvents {
    fn name(&self) -> &'static str {
        "get_calendar_events"
    }

    fn description(&self) -> &'static str {
        "Retrieves today's events from the calendar."
    }

    #[cfg(target_os = "macos")]
    async fn execute(&self, _parameters: &Parameters) -> ToolResult {
        let output = super::run_command("osascript", &["-e", TODAY_EVENTS_SCRIPT]).await?;
        Ok(format_events(&output))
    }

    #[cfg(not(target_os = "macos"))]
    async fn execute(&self, _parameters: &Parameters) -> ToolResult {
        Err(super::ToolError::ExecutionFailed(
            "calendar access is only supported on macOS".to_string(),
        ))
    }
}

/// Turn AppleScript's comma-separated list into a bulleted summary
#[must_use]
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub fn format_events(output: &str) -> String {
    let events: Vec<&str> = output
        .split(", ")
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .collect();

    if events.is_empty() {
        return "There are no events on the calendar today.".to_string();
    }

    format!("Today's events:\n- {}", events.join("\n- "))
}
