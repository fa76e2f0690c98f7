//! Text renderings of a completed result, plus file and clipboard sinks for them.

use crate::model::RunResult;
use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Markdown,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Markdown => f.write_str("markdown"),
            ExportFormat::Json => f.write_str("json"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("unknown export format '{other}' (expected markdown or json)")),
        }
    }
}

/// Deterministic Markdown: title, summary, one bulleted section per result section,
/// and a trailing quoted "Warnings" section when there are any.
pub fn to_markdown(result: &RunResult) -> String {
    let mut md = format!("# {}\n\n{}\n\n", result.title, result.summary);

    for section in &result.sections {
        md.push_str(&format!("## {}\n\n", section.heading));
        for item in &section.content {
            md.push_str(&format!("- {item}\n"));
        }
        md.push('\n');
    }

    if let Some(warnings) = result.warnings.as_ref().filter(|w| !w.is_empty()) {
        md.push_str("## Warnings\n\n");
        for warning in warnings {
            md.push_str(&format!("> {warning}\n"));
        }
    }

    md
}

/// Canonical JSON: declaration field order, 2-space indentation.
pub fn to_json(result: &RunResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("serialize run result")
}

pub fn from_json(json: &str) -> Result<RunResult> {
    serde_json::from_str(json).context("parse run result JSON")
}

pub fn render(result: &RunResult, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Markdown => Ok(to_markdown(result)),
        ExportFormat::Json => to_json(result),
    }
}

/// Default download name, e.g. `agent-run-2026-10-18_09-30-00Z-1a2b3c4d.md`.
pub fn default_file_name(result: &RunResult, format: ExportFormat) -> String {
    let short_id: String = result.run_id.chars().take(8).collect();
    format!(
        "agent-run-{}-{}.{}",
        result.created_at.replace(':', "-").replace('T', "_"),
        short_id,
        format.extension()
    )
}

/// Write a rendering to `path`, creating parent directories as needed.
pub fn export_to_file(path: &Path, result: &RunResult, format: ExportFormat) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
    }
    let text = render(result, format)?;
    std::fs::write(path, text).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Export into the current directory under [`default_file_name`]. Returns the absolute path.
pub fn export_to_current_dir(result: &RunResult, format: ExportFormat) -> Result<PathBuf> {
    let current_dir = std::env::current_dir().context("get current directory")?;
    let path = current_dir.join(default_file_name(result, format));
    export_to_file(&path, result, format)?;
    Ok(path)
}

/// Copy text to the system clipboard.
///
/// The clipboard instance is held for a short while after setting the text so that
/// clipboard managers on Linux get a chance to read it before this process exits.
#[cfg(feature = "clipboard")]
pub async fn copy_to_clipboard(text: String) -> Result<()> {
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut clipboard = arboard::Clipboard::new().context("open clipboard")?;
        clipboard.set_text(text).context("set clipboard text")?;
        std::thread::sleep(std::time::Duration::from_secs(2));
        Ok(())
    })
    .await
    .context("clipboard task failed")?
}
