//! Battery status

use async_trait::async_trait;

use super::{Action, Parameters, ToolError, ToolResult};

/// Reports the battery charge level and charging state
#[derive(Debug, Clone, Copy, Default)]
pub struct BatteryLevel;

#[async_trait]
impl Action for BatteryLevel {
    fn name(&self) -> &'static str {
        "get_battery_level"
    }

    fn description(&self) -> &'static str {
        "Checks the current battery level and charging status."
    }

    async fn execute(&self, _parameters: &Parameters) -> ToolResult {
        let (level, status) = read_battery().await?;
        Ok(format!("{level}; {status}"))
    }
}

#[cfg(target_os = "macos")]
async fn read_battery() -> Result<(String, String), ToolError> {
    let output = super::run_command("pmset", &["-g", "batt"]).await?;
    parse_pmset(&output)
        .ok_or_else(|| ToolError::ExecutionFailed("unrecognized pmset output".to_string()))
}

#[cfg(not(target_os = "macos"))]
async fn read_battery() -> Result<(String, String), ToolError> {
    let mut entries = tokio::fs::read_dir("/sys/class/power_supply")
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("power supply info unavailable: {e}")))?;

    while let Ok(Some(entry)) = entries.next_entry().await {
        if !entry.file_name().to_string_lossy().starts_with("BAT") {
            continue;
        }

        let path = entry.path();
        let capacity = tokio::fs::read_to_string(path.join("capacity")).await;
        let status = tokio::fs::read_to_string(path.join("status")).await;

        if let (Ok(capacity), Ok(status)) = (capacity, status) {
            return Ok((
                format!("{}%", capacity.trim()),
                status.trim().to_lowercase(),
            ));
        }
    }

    Err(ToolError::ExecutionFailed("no battery found".to_string()))
}

/// Extract `("62%", "discharging")` from `pmset -g batt` output
///
/// ```text
/// Now drawing from 'Battery Power'
///  -InternalBattery-0 (id=1234)	62%; discharging; 4:01 remaining present: true
/// ```
#[must_use]
pub fn parse_pmset(output: &str) -> Option<(String, String)> {
    let line = output.lines().find(|l| l.contains('%'))?;
    let detail = line.split('\t').nth(1)?;
    let mut fields = detail.split(';').map(str::trim);

    let level = fields.next().filter(|l| l.ends_with('%'))?;
    let status = fields.next().filter(|s| !s.is_empty())?;

    Some((level.to_string(), status.to_string()))
}
