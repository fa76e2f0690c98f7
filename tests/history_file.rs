use agent_run::engine::{Executor, SimulatorConfig};
use agent_run::export::ExportFormat;
use agent_run::model::{HistoryEntry, OutputFormat, RunRequest, Tone};
use agent_run::orchestrator::{
    process_run_completion, PostRunOptions, RunController, DEFAULT_RUN_TIMEOUT,
};
use agent_run::storage::{FormatFilter, HistoryStore};
use serde_json::Value;

async fn completed(request: &RunRequest) -> agent_run::model::RunResult {
    let controller = RunController::new(
        Executor::Simulated(SimulatorConfig::instant().with_seed(7)),
        DEFAULT_RUN_TIMEOUT,
    );
    controller.start(request.clone()).finish(|_| {}).await.unwrap()
}

#[tokio::test]
async fn history_survives_reopening_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("history.json");

    let request = RunRequest::new("Write a launch email", OutputFormat::Email, Tone::Friendly);
    let result = completed(&request).await;
    {
        let store = HistoryStore::open(&path);
        store.append(HistoryEntry::new(request.clone(), result.clone())).unwrap();
    }

    let reopened = HistoryStore::open(&path);
    let entries = reopened.list().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].result, result);
    assert_eq!(entries[0].request, request);

    // Flattened layout: result fields sit beside the request.
    let doc: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(doc[0]["runId"], result.run_id.as_str());
    assert_eq!(doc[0]["request"]["outputFormat"], "email");
}

#[tokio::test]
async fn post_run_saves_and_exports() {
    let dir = tempfile::tempdir().unwrap();
    let store = HistoryStore::open(dir.path().join("history.json"));
    let request = RunRequest::new("Summarize the quarter", OutputFormat::SummaryActions, Tone::Strict);
    let result = completed(&request).await;

    let md_path = dir.path().join("out").join("run.md");
    let options = PostRunOptions {
        save: true,
        export_markdown: Some(md_path.clone()),
        export_json: None,
    };
    let processed = process_run_completion(&options, &store, &request, &result);
    assert!(processed.saved, "{:?}", processed.messages);

    let markdown = std::fs::read_to_string(&md_path).unwrap();
    assert!(markdown.starts_with(&format!("# {}\n\n", result.title)));

    assert_eq!(
        store.query("quarter", FormatFilter::Only(OutputFormat::SummaryActions)).unwrap().len(),
        1
    );
    assert!(store.query("quarter", FormatFilter::Only(OutputFormat::Email)).unwrap().is_empty());
    let json = store.export(&result.run_id, ExportFormat::Json).unwrap().unwrap();
    assert_eq!(agent_run::export::from_json(&json).unwrap(), result);
}

#[test]
fn corrupt_document_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    std::fs::write(&path, "{not json").unwrap();
    let store = HistoryStore::open(&path);
    let err = store.list().unwrap_err();
    assert!(format!("{err:#}").contains("corrupt"));
}
