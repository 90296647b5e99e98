//! Launching desktop applications

#[cfg(not(target_os = "macos"))]
use std::path::PathBuf;

use async_trait::async_trait;

use super::{Action, Parameters, ToolError, ToolResult, required};

/// Opens an application by name
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenApplication;

#[async_trait]
impl Action for OpenApplication {
    fn name(&self) -> &'static str {
        "open_application"
    }

    fn description(&self) -> &'static str {
        "Opens an application on the user's computer."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "app_name": {
                    "type": "string",
                    "description": "The name of the application to open (e.g. 'Safari', 'Spotify')."
                }
            },
            "required": ["app_name"]
        })
    }

    async fn execute(&self, parameters: &Parameters) -> ToolResult {
        let app_name = required(parameters, "app_name")?.replace('"', "");
        launch(&app_name).await?;
        Ok(format!("Opened {app_name}."))
    }
}

#[cfg(target_os = "macos")]
async fn launch(app_name: &str) -> Result<(), ToolError> {
    super::run_command("open", &["-a", app_name]).await.map(|_| ())
}

#[cfg(not(target_os = "macos"))]
#[allow(clippy::unused_async)]
async fn launch(app_name: &str) -> Result<(), ToolError> {
    // Only installed desktop applications, never arbitrary programs on PATH
    let desktop_id = find_desktop_entry(app_name, &application_dirs()).ok_or_else(|| {
        ToolError::ExecutionFailed(format!("no application named {app_name} was found"))
    })?;
    let launcher = which::which("gtk-launch").map_err(|_| {
        ToolError::ExecutionFailed("gtk-launch is required to open applications".to_string())
    })?;

    let mut child = tokio::process::Command::new(&launcher)
        .arg(&desktop_id)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| ToolError::ExecutionFailed(format!("failed to launch {app_name}: {e}")))?;

    // The launcher exits once the application is up; reap it off the request path
    tokio::spawn(async move {
        if let Err(e) = child.wait().await {
            tracing::debug!(error = %e, "gtk-launch did not exit cleanly");
        }
    });

    tracing::debug!(desktop_id = %desktop_id, "application launched");
    Ok(())
}

/// `applications/` under the user and system XDG data directories
#[cfg(not(target_os = "macos"))]
fn application_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(base) = directories::BaseDirs::new() {
        dirs.push(base.data_dir().join("applications"));
    }

    let system = std::env::var("XDG_DATA_DIRS")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "/usr/local/share:/usr/share".to_string());
    dirs.extend(std::env::split_paths(&system).map(|d| d.join("applications")));
    dirs
}

/// Desktop entry id (file stem) of the application called `app_name`
#[cfg(not(target_os = "macos"))]
fn find_desktop_entry(app_name: &str, dirs: &[PathBuf]) -> Option<String> {
    let wanted = app_name.trim().to_lowercase();

    dirs.iter()
        .filter_map(|dir| std::fs::read_dir(dir).ok())
        .flatten()
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "desktop"))
        .find_map(|path| {
            let id = path.file_stem()?.to_str()?.to_string();
            let contents = std::fs::read_to_string(&path).ok()?;
            entry_matches(&id, &contents, &wanted).then_some(id)
        })
}

/// Match a visible application entry by `Name`, by id, or by the last
/// segment of a reverse-DNS id (`org.gnome.Nautilus` answers to "nautilus")
#[cfg(not(target_os = "macos"))]
fn entry_matches(id: &str, contents: &str, wanted: &str) -> bool {
    let mut in_main = false;
    let mut name = None;

    for line in contents.lines().map(str::trim) {
        if line.starts_with('[') {
            in_main = line == "[Desktop Entry]";
            continue;
        }
        if !in_main {
            continue;
        }
        match line.split_once('=').map(|(k, v)| (k.trim(), v.trim())) {
            Some(("Type", v)) if v != "Application" => return false,
            Some(("Hidden" | "NoDisplay", "true")) => return false,
            Some(("Name", v)) => name = Some(v.to_lowercase()),
            _ => {}
        }
    }

    let id = id.to_lowercase();
    name.as_deref() == Some(wanted) || id == wanted || id.rsplit('.').next() == Some(wanted)
}
