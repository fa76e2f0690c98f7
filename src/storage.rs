//! Bounded, persisted, newest-first log of completed runs.
//!
//! Every mutating call reads the whole document, applies the change, and writes the
//! whole document back. Writers in separate processes are not coordinated: the last
//! one to save wins.

use crate::export::{self, ExportFormat};
use crate::model::{HistoryEntry, OutputFormat};
use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

/// Maximum number of entries kept; appending beyond it evicts the oldest.
pub const HISTORY_CAPACITY: usize = 50;

/// Storage port for the serialized history document.
pub trait HistoryStorage: Send + Sync {
    /// Current document, or `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<String>>;
    fn save(&self, document: &str) -> Result<()>;
}

/// JSON document on disk, replaced atomically via a sibling temp file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStorage for FileStorage {
    fn load(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(doc) => Ok(Some(doc)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", self.path.display())),
        }
    }

    fn save(&self, document: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, document).with_context(|| format!("write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace {}", self.path.display()))?;
        Ok(())
    }
}

/// In-process document, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    document: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw document as last saved.
    pub fn document(&self) -> Option<String> {
        self.document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl HistoryStorage for MemoryStorage {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.document())
    }

    fn save(&self, document: &str) -> Result<()> {
        *self.document.lock().unwrap_or_else(PoisonError::into_inner) = Some(document.to_string());
        Ok(())
    }
}

/// Output-format filter for [`HistoryStore::query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatFilter {
    #[default]
    All,
    Only(OutputFormat),
}

impl FormatFilter {
    pub fn matches(self, format: OutputFormat) -> bool {
        match self {
            FormatFilter::All => true,
            FormatFilter::Only(wanted) => wanted == format,
        }
    }
}

impl fmt::Display for FormatFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatFilter::All => f.write_str("all"),
            FormatFilter::Only(format) => write!(f, "{format}"),
        }
    }
}

impl FromStr for FormatFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            Ok(FormatFilter::All)
        } else {
            s.parse().map(FormatFilter::Only)
        }
    }
}

/// Case-insensitive search over goal and title, then format filter. Order is preserved.
pub fn filter_entries(entries: &[HistoryEntry], search: &str, filter: FormatFilter) -> Vec<HistoryEntry> {
    let needle = search.to_lowercase();
    entries
        .iter()
        .filter(|e| filter.matches(e.request.output_format))
        .filter(|e| {
            needle.is_empty()
                || e.request.goal.to_lowercase().contains(&needle)
                || e.result.title.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}

pub struct HistoryStore<S: HistoryStorage> {
    storage: S,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl HistoryStore<FileStorage> {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(FileStorage::new(path))
    }
}

impl<S: HistoryStorage> HistoryStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Prepend an entry, evicting the oldest beyond [`HISTORY_CAPACITY`].
    ///
    /// An entry whose `runId` is already stored replaces the old one and moves to the front.
    pub fn append(&self, entry: HistoryEntry) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read()?;
        entries.retain(|e| e.run_id() != entry.run_id());
        tracing::debug!(run_id = entry.run_id(), "appending history entry");
        entries.insert(0, entry);
        if entries.len() > HISTORY_CAPACITY {
            let evicted = entries.len() - HISTORY_CAPACITY;
            entries.truncate(HISTORY_CAPACITY);
            tracing::debug!(evicted, "evicted oldest history entries");
        }
        self.write(&entries)
    }

    /// Snapshot, newest first.
    pub fn list(&self) -> Result<Vec<HistoryEntry>> {
        self.read()
    }

    pub fn get(&self, run_id: &str) -> Result<Option<HistoryEntry>> {
        Ok(self.read()?.into_iter().find(|e| e.run_id() == run_id))
    }

    /// Drop the matching entry. Returns whether anything was removed.
    pub fn remove(&self, run_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read()?;
        let before = entries.len();
        entries.retain(|e| e.run_id() != run_id);
        if entries.len() == before {
            return Ok(false);
        }
        self.write(&entries)?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write(&[])
    }

    pub fn query(&self, search: &str, filter: FormatFilter) -> Result<Vec<HistoryEntry>> {
        Ok(filter_entries(&self.read()?, search, filter))
    }

    /// Render a stored result; `None` when the `runId` is unknown.
    pub fn export(&self, run_id: &str, format: ExportFormat) -> Result<Option<String>> {
        match self.get(run_id)? {
            Some(entry) => export::render(&entry.result, format).map(Some),
            None => Ok(None),
        }
    }

    fn read(&self) -> Result<Vec<HistoryEntry>> {
        match self.storage.load()? {
            None => Ok(Vec::new()),
            Some(doc) if doc.trim().is_empty() => Ok(Vec::new()),
            Some(doc) => serde_json::from_str(&doc).context("history document is corrupt"),
        }
    }

    fn write(&self, entries: &[HistoryEntry]) -> Result<()> {
        let doc = serde_json::to_string_pretty(entries).context("serialize history")?;
        self.storage.save(&doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResultStatus, RunRequest, RunResult, Section, Tone};

    fn entry(n: usize, format: OutputFormat) -> HistoryEntry {
        HistoryEntry::new(
            RunRequest::new(format!("Goal number {n}"), format, Tone::Professional),
            RunResult {
                run_id: format!("run-{n}"),
                status: ResultStatus::Success,
                title: format!("Title {n}"),
                summary: "summary".into(),
                sections: vec![Section {
                    heading: "H".into(),
                    content: vec!["item".into()],
                }],
                warnings: None,
                confidence: Some(0.9),
                created_at: "2026-10-18T12:00:00Z".into(),
            },
        )
    }

    fn store() -> HistoryStore<MemoryStorage> {
        HistoryStore::new(MemoryStorage::new())
    }

    #[test]
    fn append_beyond_capacity_evicts_oldest() {
        let store = store();
        for n in 0..60 {
            store.append(entry(n, OutputFormat::Plan)).unwrap();
        }
        let list = store.list().unwrap();
        assert_eq!(list.len(), HISTORY_CAPACITY);
        assert_eq!(list[0].run_id(), "run-59");
        assert_eq!(list[HISTORY_CAPACITY - 1].run_id(), "run-10");
        for n in 0..10 {
            assert!(store.get(&format!("run-{n}")).unwrap().is_none());
        }
    }

    #[test]
    fn re_appending_keeps_run_ids_unique() {
        let store = store();
        store.append(entry(1, OutputFormat::Plan)).unwrap();
        store.append(entry(2, OutputFormat::Plan)).unwrap();
        store.append(entry(1, OutputFormat::Email)).unwrap();
        let ids: Vec<String> = store
            .list()
            .unwrap()
            .iter()
            .map(|e| e.run_id().to_string())
            .collect();
        assert_eq!(ids, vec!["run-1", "run-2"]);
        assert_eq!(
            store.get("run-1").unwrap().unwrap().request.output_format,
            OutputFormat::Email
        );
    }

    #[test]
    fn remove_and_clear() {
        let store = store();
        store.append(entry(1, OutputFormat::Plan)).unwrap();
        store.append(entry(2, OutputFormat::Plan)).unwrap();
        assert!(store.remove("run-1").unwrap());
        assert!(!store.remove("run-404").unwrap());
        assert_eq!(store.list().unwrap().len(), 1);
        store.clear().unwrap();
        assert!(store.list().unwrap().is_empty());
        assert_eq!(store.storage().document().as_deref(), Some("[]"));
    }

    #[test]
    fn query_filters_by_text_and_format() {
        let store = store();
        store.append(entry(1, OutputFormat::Plan)).unwrap();
        store.append(entry(2, OutputFormat::Email)).unwrap();
        store.append(entry(12, OutputFormat::Plan)).unwrap();

        let all = store.query("", FormatFilter::All).unwrap();
        assert_eq!(all, store.list().unwrap());

        let by_goal = store.query("GOAL NUMBER 1", FormatFilter::All).unwrap();
        let ids: Vec<&str> = by_goal.iter().map(|e| e.run_id()).collect();
        assert_eq!(ids, vec!["run-12", "run-1"]);

        let by_title = store
            .query("title 2", FormatFilter::Only(OutputFormat::Email))
            .unwrap();
        assert_eq!(by_title.len(), 1);

        let none = store
            .query("title 2", FormatFilter::Only(OutputFormat::Plan))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn corrupt_document_is_an_error() {
        let storage = MemoryStorage::new();
        storage.save("{ definitely not a list").unwrap();
        let store = HistoryStore::new(storage);
        assert!(store.list().is_err());
        assert!(store.append(entry(1, OutputFormat::Plan)).is_err());
    }

    #[test]
    fn export_unknown_run_is_none() {
        let store = store();
        store.append(entry(1, OutputFormat::Plan)).unwrap();
        assert!(store
            .export("run-1", ExportFormat::Markdown)
            .unwrap()
            .unwrap()
            .starts_with("# Title 1\n"));
        assert!(store.export("nope", ExportFormat::Json).unwrap().is_none());
    }

    #[test]
    fn format_filter_parses() {
        assert_eq!("all".parse::<FormatFilter>().unwrap(), FormatFilter::All);
        assert_eq!(
            "checklist".parse::<FormatFilter>().unwrap(),
            FormatFilter::Only(OutputFormat::Checklist)
        );
        assert!("poem".parse::<FormatFilter>().is_err());
    }
}
