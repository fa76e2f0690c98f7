//! Text summary builder for CLI output.
//!
//! Formats human-readable lines for results, progress and history listings.

use crate::model::{HistoryEntry, RunResult, RunStatus};

/// Pre-formatted lines for text output.
pub struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary of a completed result.
pub fn build_text_summary(result: &RunResult) -> TextSummary {
    let mut lines = vec![result.title.clone(), "=".repeat(result.title.chars().count())];
    lines.push(result.summary.clone());

    for section in &result.sections {
        lines.push(String::new());
        lines.push(section.heading.clone());
        for item in &section.content {
            lines.push(format!("  • {item}"));
        }
    }

    if let Some(warnings) = result.warnings.as_ref().filter(|w| !w.is_empty()) {
        lines.push(String::new());
        lines.push("Warnings".to_string());
        for warning in warnings {
            lines.push(format!("  ! {warning}"));
        }
    }

    lines.push(String::new());
    let confidence = result
        .confidence
        .map(|c| format!("{:.0}%", c * 100.0))
        .unwrap_or_else(|| "-".to_string());
    lines.push(format!(
        "Run {} | confidence {} | {}",
        result.run_id, confidence, result.created_at
    ));

    TextSummary { lines }
}

/// One progress line, e.g. `[ 40%] Calling agent`.
pub fn progress_line(status: &RunStatus) -> String {
    match status.error.as_ref() {
        Some(err) => format!("[{:>3}%] {}: {}", status.progress, status.current_step.label(), err),
        None => format!("[{:>3}%] {}", status.progress, status.current_step.label()),
    }
}

/// One line per entry, newest first.
pub fn history_lines(entries: &[HistoryEntry]) -> Vec<String> {
    if entries.is_empty() {
        return vec!["No runs in history.".to_string()];
    }
    entries
        .iter()
        .map(|e| {
            format!(
                "{}  {:<16} {:<40}  {}",
                e.result.created_at,
                e.request.output_format.as_str(),
                truncate(&e.result.title, 40),
                e.run_id()
            )
        })
        .collect()
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AgentError, ErrorKind};
    use crate::model::{ResultStatus, RunStep, Section};

    #[test]
    fn summary_lists_sections_and_warnings() {
        let result = RunResult {
            run_id: "r".into(),
            status: ResultStatus::Success,
            title: "Plan".into(),
            summary: "Short".into(),
            sections: vec![Section {
                heading: "Phase".into(),
                content: vec!["one".into()],
            }],
            warnings: Some(vec!["careful".into()]),
            confidence: Some(0.9),
            created_at: "t".into(),
        };
        let lines = build_text_summary(&result).lines;
        assert_eq!(lines[0], "Plan");
        assert!(lines.contains(&"  • one".to_string()));
        assert!(lines.contains(&"  ! careful".to_string()));
        assert_eq!(lines.last().unwrap(), "Run r | confidence 90% | t");
    }

    #[test]
    fn progress_lines() {
        assert_eq!(
            progress_line(&RunStatus::step(RunStep::Calling, 40)),
            "[ 40%] Calling agent"
        );
        let failed = RunStatus::failed(60, AgentError::new(ErrorKind::Timeout, "slow"));
        assert_eq!(progress_line(&failed), "[ 60%] Error: [TIMEOUT] slow");
    }

    #[test]
    fn long_titles_are_truncated() {
        assert_eq!(truncate("abcdef", 4), "abc…");
        assert_eq!(truncate("abc", 4), "abc");
        assert_eq!(history_lines(&[]), vec!["No runs in history."]);
    }
}
