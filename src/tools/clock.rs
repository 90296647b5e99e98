//! Local time

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};

use super::{Action, Parameters, ToolResult};

/// Reports the current local time
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentTime;

#[async_trait]
impl Action for CurrentTime {
    fn name(&self) -> &'static str {
        "get_current_time"
    }

    fn description(&self) -> &'static str {
        "Gets the current time."
    }

    async fn execute(&self, _parameters: &Parameters) -> ToolResult {
        Ok(format_time(&Local::now()))
    }
}

/// e.g. `04:30 PM`
fn format_time<Tz>(now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    now.format("%I:%M %p").to_string()
}
