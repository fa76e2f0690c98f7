//! Post-run processing utilities.
//!
//! Handles saving to history and exports after a run completes.

use crate::export::{self, ExportFormat};
use crate::model::{HistoryEntry, RunRequest, RunResult};
use crate::storage::{HistoryStorage, HistoryStore};
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct PostRunOptions {
    pub save: bool,
    pub export_markdown: Option<PathBuf>,
    pub export_json: Option<PathBuf>,
}

/// Result of post-run processing, ready for presentation layers.
#[derive(Debug, Default)]
pub struct ProcessedRun {
    pub saved: bool,
    pub messages: Vec<String>,
}

/// Save the run to history and write any requested exports.
///
/// Failures here never fail the run itself; they are reported as messages.
pub fn process_run_completion<S: HistoryStorage>(
    options: &PostRunOptions,
    store: &HistoryStore<S>,
    request: &RunRequest,
    result: &RunResult,
) -> ProcessedRun {
    let mut processed = ProcessedRun::default();

    if options.save {
        match store.append(HistoryEntry::new(request.clone(), result.clone())) {
            Ok(()) => {
                processed.saved = true;
                processed
                    .messages
                    .push(format!("Saved to history: {}", result.run_id));
            }
            Err(e) => processed.messages.push(format!("Save failed: {e:#}")),
        }
    }

    let exports = [
        (options.export_markdown.as_ref(), ExportFormat::Markdown),
        (options.export_json.as_ref(), ExportFormat::Json),
    ];
    for (path, format) in exports {
        let Some(path) = path else { continue };
        match export::export_to_file(path, result, format) {
            Ok(()) => processed
                .messages
                .push(format!("Exported {format}: {}", path.display())),
            Err(e) => processed
                .messages
                .push(format!("Export {format} failed: {e:#}")),
        }
    }

    processed
}
