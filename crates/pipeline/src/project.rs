//! Project state: every artifact of one novel, rooted at a directory.
//!
//! | Artifact | Path |
//! |----------|------|
//! | architecture | `Novel_architecture.txt` |
//! | blueprint | `Novel_directory.txt` |
//! | global summary | `global_summary.txt` |
//! | character state | `character_state.txt` |
//! | plot arcs | `plot_arcs.txt` |
//! | chapter N | `chapters/chapter_N.txt` |
//! | knowledge store | `vectorstore/` |
//! | finalize ledger | `finalize_log.json` |
//!
//! All writes go through `&mut ProjectState` and are atomic per file. Two
//! processes writing the same project root are not supported.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use storyloom_core::persist::{read_optional, write_atomic};
use storyloom_core::{Blueprint, Chapter, ChapterEntry, Error, Result, StateError};
use storyloom_knowledge::{FileBackend, KnowledgeStore, STORE_DIR};
use tracing::debug;

use crate::ledger::{content_hash, FinalizeLedger};

pub const ARCHITECTURE_FILE: &str = "Novel_architecture.txt";
pub const BLUEPRINT_FILE: &str = "Novel_directory.txt";
pub const GLOBAL_SUMMARY_FILE: &str = "global_summary.txt";
pub const CHARACTER_STATE_FILE: &str = "character_state.txt";
pub const PLOT_ARCS_FILE: &str = "plot_arcs.txt";
pub const CHAPTERS_DIR: &str = "chapters";
pub const LEDGER_FILE: &str = "finalize_log.json";

/// Which artifacts exist, for status displays.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStatus {
    pub architecture: bool,
    pub blueprint_entries: usize,
    pub chapters: Vec<u32>,
    pub finalized: Vec<u32>,
    pub global_summary: bool,
    pub character_state: bool,
    pub plot_arcs: bool,
    pub knowledge_entries: usize,
}

/// The root aggregate for one novel.
pub struct ProjectState {
    root: PathBuf,
    architecture: Option<String>,
    blueprint: Option<Blueprint>,
    global_summary: String,
    character_state: String,
    plot_arcs: String,
    ledger: FinalizeLedger,
    knowledge: KnowledgeStore,
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}

impl ProjectState {
    /// Open a project with an explicit knowledge store.
    ///
    /// A missing root is created; a root that is a regular file is rejected.
    pub fn open(root: impl Into<PathBuf>, knowledge: KnowledgeStore) -> Result<Self> {
        let root = root.into();
        if root.exists() && !root.is_dir() {
            return Err(StateError::InvalidProject(format!(
                "{} is not a directory",
                root.display()
            ))
            .into());
        }
        std::fs::create_dir_all(&root).map_err(|e| Error::storage(&root, e))?;

        let read = |name: &str| read_optional(&root.join(name)).map(non_empty);

        let architecture = read(ARCHITECTURE_FILE)?;
        let blueprint = read(BLUEPRINT_FILE)?
            .map(|text| Blueprint::parse(&text))
            .filter(|bp| !bp.is_empty());
        let global_summary = read(GLOBAL_SUMMARY_FILE)?.unwrap_or_default();
        let character_state = read(CHARACTER_STATE_FILE)?.unwrap_or_default();
        let plot_arcs = read(PLOT_ARCS_FILE)?.unwrap_or_default();
        let ledger = FinalizeLedger::load(&root.join(LEDGER_FILE))?;

        debug!(
            root = %root.display(),
            architecture = architecture.is_some(),
            blueprint_entries = blueprint.as_ref().map_or(0, Blueprint::len),
            "Project opened"
        );

        Ok(Self {
            root,
            architecture,
            blueprint,
            global_summary,
            character_state,
            plot_arcs,
            ledger,
            knowledge,
        })
    }

    /// Open with the on-disk knowledge store and no embedder.
    pub fn open_local(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let backend = FileBackend::open(root.join(STORE_DIR))?;
        Self::open(root, KnowledgeStore::new(Arc::new(backend)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // --- architecture ---

    pub fn architecture(&self) -> Option<&str> {
        self.architecture.as_deref()
    }

    pub fn require_architecture(&self) -> Result<&str> {
        self.architecture().ok_or_else(|| {
            StateError::MissingArtifact {
                artifact: "architecture",
            }
            .into()
        })
    }

    pub fn save_architecture(&mut self, text: &str) -> Result<PathBuf> {
        let path = self.root.join(ARCHITECTURE_FILE);
        write_atomic(&path, text)?;
        self.architecture = non_empty(Some(text.to_string()));
        Ok(path)
    }

    // --- blueprint ---

    pub fn blueprint(&self) -> Option<&Blueprint> {
        self.blueprint.as_ref()
    }

    pub fn require_blueprint(&self) -> Result<&Blueprint> {
        self.blueprint().ok_or_else(|| {
            StateError::MissingArtifact {
                artifact: "chapter blueprint",
            }
            .into()
        })
    }

    /// The blueprint entry for `chapter`, or why it cannot be used.
    pub fn require_entry(&self, chapter: u32) -> Result<&ChapterEntry> {
        let blueprint = self.require_blueprint()?;
        blueprint.entry(chapter).ok_or_else(|| {
            StateError::ChapterOutOfRange {
                chapter,
                available: blueprint.contiguous_prefix(),
            }
            .into()
        })
    }

    pub fn save_blueprint(&mut self, blueprint: Blueprint) -> Result<PathBuf> {
        let path = self.root.join(BLUEPRINT_FILE);
        write_atomic(&path, &blueprint.render())?;
        self.blueprint = Some(blueprint).filter(|bp| !bp.is_empty());
        Ok(path)
    }

    // --- long-term state ---

    pub fn global_summary(&self) -> &str {
        &self.global_summary
    }

    pub fn character_state(&self) -> &str {
        &self.character_state
    }

    pub fn plot_arcs(&self) -> &str {
        &self.plot_arcs
    }

    pub fn save_global_summary(&mut self, text: &str) -> Result<PathBuf> {
        let path = self.root.join(GLOBAL_SUMMARY_FILE);
        write_atomic(&path, text)?;
        self.global_summary = text.to_string();
        Ok(path)
    }

    pub fn save_character_state(&mut self, text: &str) -> Result<PathBuf> {
        let path = self.root.join(CHARACTER_STATE_FILE);
        write_atomic(&path, text)?;
        self.character_state = text.to_string();
        Ok(path)
    }

    pub fn save_plot_arcs(&mut self, text: &str) -> Result<PathBuf> {
        let path = self.root.join(PLOT_ARCS_FILE);
        write_atomic(&path, text)?;
        self.plot_arcs = text.to_string();
        Ok(path)
    }

    // --- chapters ---

    pub fn chapter_path(&self, chapter: u32) -> PathBuf {
        self.root
            .join(CHAPTERS_DIR)
            .join(format!("chapter_{chapter}.txt"))
    }

    /// Chapter text if the file exists.
    pub fn read_chapter_text(&self, chapter: u32) -> Result<Option<String>> {
        read_optional(&self.chapter_path(chapter))
    }

    /// Chapter text that must exist and be non-blank.
    pub fn require_chapter_text(&self, chapter: u32) -> Result<String> {
        let text = self
            .read_chapter_text(chapter)?
            .ok_or(StateError::ChapterMissing(chapter))?;
        if text.trim().is_empty() {
            return Err(StateError::EmptyChapter(chapter).into());
        }
        Ok(text)
    }

    pub fn chapter(&self, chapter: u32, target_words: u32) -> Result<Chapter> {
        let text = self
            .read_chapter_text(chapter)?
            .ok_or(StateError::ChapterMissing(chapter))?;
        let finalized = self.is_finalized(chapter, &text);
        Ok(Chapter {
            number: chapter,
            text,
            finalized,
            target_words,
        })
    }

    pub fn write_chapter(&mut self, chapter: u32, text: &str) -> Result<PathBuf> {
        let path = self.chapter_path(chapter);
        write_atomic(&path, text)?;
        Ok(path)
    }

    /// Chapter numbers with a file on disk, ascending.
    pub fn chapter_numbers(&self) -> Result<Vec<u32>> {
        let dir = self.root.join(CHAPTERS_DIR);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::storage(&dir, e)),
        };

        let mut numbers: Vec<u32> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.strip_prefix("chapter_")?
                    .strip_suffix(".txt")?
                    .parse()
                    .ok()
            })
            .collect();
        numbers.sort_unstable();
        Ok(numbers)
    }

    /// Whether the finalizer fully committed exactly this text.
    pub fn is_finalized(&self, chapter: u32, text: &str) -> bool {
        self.ledger.is_complete(chapter, &content_hash(text))
    }

    // --- ledger & knowledge ---

    pub fn ledger(&self) -> &FinalizeLedger {
        &self.ledger
    }

    pub(crate) fn ledger_mut(&mut self) -> &mut FinalizeLedger {
        &mut self.ledger
    }

    pub(crate) fn save_ledger(&self) -> Result<()> {
        self.ledger.save(&self.root.join(LEDGER_FILE))
    }

    pub fn knowledge(&self) -> &KnowledgeStore {
        &self.knowledge
    }

    pub async fn status(&self) -> Result<ArtifactStatus> {
        let chapters = self.chapter_numbers()?;
        let mut finalized = Vec::new();
        for &n in &chapters {
            if let Some(text) = self.read_chapter_text(n)? {
                if self.is_finalized(n, &text) {
                    finalized.push(n);
                }
            }
        }
        Ok(ArtifactStatus {
            architecture: self.architecture.is_some(),
            blueprint_entries: self.blueprint.as_ref().map_or(0, Blueprint::len),
            chapters,
            finalized,
            global_summary: !self.global_summary.trim().is_empty(),
            character_state: !self.character_state.trim().is_empty(),
            plot_arcs: !self.plot_arcs.trim().is_empty(),
            knowledge_entries: self.knowledge.len().await,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyloom_knowledge::InMemoryBackend;

    fn open(dir: &Path) -> ProjectState {
        ProjectState::open(dir, KnowledgeStore::new(Arc::new(InMemoryBackend::new()))).unwrap()
    }

    #[test]
    fn fresh_project_has_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let project = open(dir.path());
        assert!(project.architecture().is_none());
        assert!(matches!(
            project.require_architecture(),
            Err(Error::State(StateError::MissingArtifact { .. }))
        ));
        assert!(matches!(
            project.require_blueprint(),
            Err(Error::State(StateError::MissingArtifact { .. }))
        ));
        assert!(project.chapter_numbers().unwrap().is_empty());
    }

    #[test]
    fn artifacts_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = open(dir.path());
        project.save_architecture("Premise: a city that forgets").unwrap();
        project
            .save_blueprint(Blueprint::new(vec![
                ChapterEntry::new(1, "Waking", "Mara wakes."),
                ChapterEntry::new(2, "Market", "Mara trades a memory."),
            ]))
            .unwrap();
        project.save_global_summary("Mara woke.").unwrap();
        project.write_chapter(1, "Mara woke in the rain.").unwrap();

        let reopened = open(dir.path());
        assert_eq!(reopened.architecture(), Some("Premise: a city that forgets"));
        assert_eq!(reopened.require_blueprint().unwrap().len(), 2);
        assert_eq!(reopened.global_summary(), "Mara woke.");
        assert_eq!(reopened.chapter_numbers().unwrap(), vec![1]);
        assert!(dir.path().join("chapters").join("chapter_1.txt").exists());
        assert!(dir.path().join(BLUEPRINT_FILE).exists());
    }

    #[test]
    fn entry_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = open(dir.path());
        project
            .save_blueprint(Blueprint::new(vec![ChapterEntry::new(1, "Only", "x")]))
            .unwrap();
        let err = project.require_entry(4).unwrap_err();
        assert!(matches!(
            err,
            Error::State(StateError::ChapterOutOfRange { chapter: 4, available: 1 })
        ));
    }

    #[test]
    fn chapter_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = open(dir.path());
        assert!(matches!(
            project.require_chapter_text(2),
            Err(Error::State(StateError::ChapterMissing(2)))
        ));
        project.write_chapter(2, "   \n").unwrap();
        assert!(matches!(
            project.require_chapter_text(2),
            Err(Error::State(StateError::EmptyChapter(2)))
        ));
    }

    #[test]
    fn chapter_numbers_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = open(dir.path());
        for n in [10, 2, 1] {
            project.write_chapter(n, "text").unwrap();
        }
        std::fs::write(dir.path().join(CHAPTERS_DIR).join("notes.md"), "x").unwrap();
        assert_eq!(project.chapter_numbers().unwrap(), vec![1, 2, 10]);
    }

    #[test]
    fn file_root_is_invalid_project() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not_a_dir");
        std::fs::write(&file, "x").unwrap();
        let result = ProjectState::open(&file, KnowledgeStore::new(Arc::new(InMemoryBackend::new())));
        assert!(matches!(result, Err(Error::State(StateError::InvalidProject(_)))));
    }

    #[test]
    fn open_local_uses_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let project = ProjectState::open_local(dir.path()).unwrap();
        assert!(!project.knowledge().has_embedder());
    }

    #[tokio::test]
    async fn status_reports_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = open(dir.path());
        project.save_architecture("arch").unwrap();
        project.write_chapter(1, "text").unwrap();
        let status = project.status().await.unwrap();
        assert!(status.architecture);
        assert_eq!(status.chapters, vec![1]);
        assert!(status.finalized.is_empty());
        assert_eq!(status.knowledge_entries, 0);
    }
}
