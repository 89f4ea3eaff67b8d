//! File-based knowledge backend: a manifest plus JSON-lines entries.
//!
//! Layout under the store directory:
//! - `manifest.json`: embedding profile and next sequence number
//! - `chunks.jsonl`: one `KnowledgeEntry` per line
//!
//! Entries are loaded into memory on open. Appends go to the end of the
//! JSONL file; removals and replacements rewrite it atomically. The manifest
//! is written before the entries, so its sequence counter never trails the
//! file.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use storyloom_core::persist::write_atomic;
use storyloom_core::{Error, Result};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::store::{KnowledgeBackend, KnowledgeEntry, Manifest, SourceTag};

const MANIFEST_FILE: &str = "manifest.json";
const CHUNKS_FILE: &str = "chunks.jsonl";

#[derive(Default)]
struct Snapshot {
    manifest: Option<Manifest>,
    entries: Vec<KnowledgeEntry>,
}

/// A file-backed knowledge store.
pub struct FileBackend {
    dir: PathBuf,
    state: RwLock<Snapshot>,
}

impl FileBackend {
    /// Open the store in `dir`. A missing directory is an empty store.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let mut manifest = Self::load_manifest(&dir.join(MANIFEST_FILE))?;
        let entries = Self::load_entries(&dir.join(CHUNKS_FILE))?;
        if let (Some(m), Some(last)) = (manifest.as_mut(), entries.iter().map(|e| e.seq).max()) {
            if m.next_seq <= last {
                warn!(stored = m.next_seq, last, "Manifest sequence behind entries; advancing");
                m.next_seq = last + 1;
            }
        }
        debug!(path = %dir.display(), count = entries.len(), "Knowledge store loaded");
        Ok(Self {
            dir,
            state: RwLock::new(Snapshot { manifest, entries }),
        })
    }

    /// Cheap check used for status displays.
    pub fn has_entries(dir: &Path) -> bool {
        std::fs::read(dir.join(CHUNKS_FILE))
            .map(|bytes| bytes.split(|b| *b == b'\n').any(|l| !l.trim_ascii().is_empty()))
            .unwrap_or(false)
    }

    fn load_manifest(path: &Path) -> Result<Option<Manifest>> {
        match storyloom_core::persist::read_optional(path)? {
            None => Ok(None),
            Some(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| Error::storage(path, format!("corrupted manifest: {e}"))),
        }
    }

    /// Parse the JSONL file line by line. Lines that are not valid JSON,
    /// including a torn tail or invalid UTF-8, are skipped with a warning.
    fn load_entries(path: &Path) -> Result<Vec<KnowledgeEntry>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::storage(path, e)),
        };

        Ok(bytes
            .split(|b| *b == b'\n')
            .enumerate()
            .filter(|(_, line)| !line.trim_ascii().is_empty())
            .filter_map(|(n, line)| match serde_json::from_slice::<KnowledgeEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(line = n + 1, error = %e, "Skipping corrupted knowledge entry");
                    None
                }
            })
            .collect())
    }

    /// Whether the file exists, is non-empty, and lacks a trailing newline.
    fn missing_final_newline(path: &Path) -> Result<bool> {
        let mut file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(Error::storage(path, e)),
        };
        let len = file.metadata().map_err(|e| Error::storage(path, e))?.len();
        if len == 0 {
            return Ok(false);
        }
        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))
            .and_then(|_| file.read_exact(&mut last))
            .map_err(|e| Error::storage(path, e))?;
        Ok(last[0] != b'\n')
    }

    fn encode(entries: &[KnowledgeEntry]) -> Result<String> {
        let mut content = String::new();
        for entry in entries {
            content.push_str(&serde_json::to_string(entry)?);
            content.push('\n');
        }
        Ok(content)
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        let json = serde_json::to_string_pretty(manifest)?;
        write_atomic(&self.dir.join(MANIFEST_FILE), &json)
    }

    fn remove_file(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(path, e)),
        }
    }
}

#[async_trait]
impl KnowledgeBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn manifest(&self) -> Option<Manifest> {
        self.state.read().await.manifest.clone()
    }

    async fn entries(&self) -> Vec<KnowledgeEntry> {
        self.state.read().await.entries.clone()
    }

    async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    async fn append(&self, manifest: Manifest, entries: Vec<KnowledgeEntry>) -> Result<()> {
        let mut state = self.state.write().await;

        std::fs::create_dir_all(&self.dir).map_err(|e| Error::storage(&self.dir, e))?;
        let chunks_path = self.dir.join(CHUNKS_FILE);
        let mut content = Self::encode(&entries)?;
        if Self::missing_final_newline(&chunks_path)? {
            // Start on a fresh line after a torn write.
            content.insert(0, '\n');
        }

        self.write_manifest(&manifest)?;
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&chunks_path)
            .and_then(|mut f| f.write_all(content.as_bytes()))
            .map_err(|e| Error::storage(&chunks_path, e))?;

        state.manifest = Some(manifest);
        state.entries.extend(entries);
        Ok(())
    }

    async fn remove_source(&self, source: &SourceTag) -> Result<usize> {
        let mut state = self.state.write().await;
        let before = state.entries.len();
        state.entries.retain(|e| &e.source != source);
        let removed = before - state.entries.len();

        if removed > 0 {
            let content = Self::encode(&state.entries)?;
            write_atomic(&self.dir.join(CHUNKS_FILE), &content)?;
        }
        Ok(removed)
    }

    async fn replace_source(&self, source: &SourceTag, manifest: Manifest, entries: Vec<KnowledgeEntry>) -> Result<usize> {
        let mut state = self.state.write().await;
        let mut kept: Vec<KnowledgeEntry> = state.entries.iter().filter(|e| &e.source != source).cloned().collect();
        let replaced = state.entries.len() - kept.len();
        kept.extend(entries);

        std::fs::create_dir_all(&self.dir).map_err(|e| Error::storage(&self.dir, e))?;
        self.write_manifest(&manifest)?;
        write_atomic(&self.dir.join(CHUNKS_FILE), &Self::encode(&kept)?)?;

        state.manifest = Some(manifest);
        state.entries = kept;
        Ok(replaced)
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        Self::remove_file(&self.dir.join(CHUNKS_FILE))?;
        Self::remove_file(&self.dir.join(MANIFEST_FILE))?;
        *state = Snapshot::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EmbeddingProfile;
    use chrono::Utc;

    fn manifest(next_seq: u64) -> Manifest {
        Manifest {
            profile: EmbeddingProfile {
                provider: "openai".into(),
                model: "text-embedding-ada-002".into(),
                dimensions: 2,
            },
            next_seq,
        }
    }

    fn entry(seq: u64, source: SourceTag) -> KnowledgeEntry {
        KnowledgeEntry {
            id: format!("id-{seq}"),
            seq,
            source,
            text: format!("chunk {seq}"),
            embedding: vec![1.0, seq as f32],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn append_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend
            .append(manifest(2), vec![entry(0, SourceTag::chapter(1)), entry(1, SourceTag::chapter(2))])
            .await
            .unwrap();

        let reopened = FileBackend::open(dir.path()).unwrap();
        assert_eq!(reopened.len().await, 2);
        assert_eq!(reopened.manifest().await, Some(manifest(2)));
        assert!(FileBackend::has_entries(dir.path()));
    }

    #[tokio::test]
    async fn remove_source_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend
            .append(manifest(3), vec![
                entry(0, SourceTag::chapter(1)),
                entry(1, SourceTag::chapter(2)),
                entry(2, SourceTag::chapter(1)),
            ])
            .await
            .unwrap();

        assert_eq!(backend.remove_source(&SourceTag::chapter(1)).await.unwrap(), 2);
        let reopened = FileBackend::open(dir.path()).unwrap();
        let entries = reopened.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, SourceTag::chapter(2));
    }

    #[tokio::test]
    async fn clear_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend.append(manifest(1), vec![entry(0, SourceTag::chapter(1))]).await.unwrap();
        backend.clear().await.unwrap();

        assert!(!dir.path().join(CHUNKS_FILE).exists());
        assert!(!dir.path().join(MANIFEST_FILE).exists());
        let reopened = FileBackend::open(dir.path()).unwrap();
        assert!(reopened.manifest().await.is_none());
    }

    #[tokio::test]
    async fn corrupted_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = serde_json::to_string(&entry(0, SourceTag::imported("lore.txt"))).unwrap();
        std::fs::write(dir.path().join(CHUNKS_FILE), format!("{good}\nnot json\n\n")).unwrap();

        let backend = FileBackend::open(dir.path()).unwrap();
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn invalid_utf8_line_hides_only_itself() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend
            .append(manifest(2), vec![entry(0, SourceTag::chapter(1)), entry(1, SourceTag::chapter(2))])
            .await
            .unwrap();

        // A torn multibyte character with no newline after it.
        let path = dir.path().join(CHUNKS_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(&[b'{', 0xE8, 0x8B]);
        std::fs::write(&path, bytes).unwrap();

        let reopened = FileBackend::open(dir.path()).unwrap();
        assert_eq!(reopened.len().await, 2);

        reopened.append(manifest(3), vec![entry(2, SourceTag::chapter(3))]).await.unwrap();
        assert_eq!(reopened.len().await, 3);
        assert_eq!(FileBackend::open(dir.path()).unwrap().len().await, 3);
    }

    #[tokio::test]
    async fn stale_manifest_sequence_is_advanced() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend
            .append(manifest(2), vec![entry(0, SourceTag::chapter(1)), entry(1, SourceTag::chapter(1))])
            .await
            .unwrap();
        // Entries written by a run whose manifest update never landed.
        let extra = serde_json::to_string(&entry(2, SourceTag::chapter(2))).unwrap();
        let path = dir.path().join(CHUNKS_FILE);
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str(&extra);
        content.push('\n');
        std::fs::write(&path, content).unwrap();

        let reopened = FileBackend::open(dir.path()).unwrap();
        assert_eq!(reopened.manifest().await.unwrap().next_seq, 3);
    }

    #[tokio::test]
    async fn replace_source_swaps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend
            .append(manifest(2), vec![entry(0, SourceTag::imported("a.txt")), entry(1, SourceTag::chapter(1))])
            .await
            .unwrap();

        let replaced = backend
            .replace_source(&SourceTag::imported("a.txt"), manifest(4), vec![
                entry(2, SourceTag::imported("a.txt")),
                entry(3, SourceTag::imported("a.txt")),
            ])
            .await
            .unwrap();
        assert_eq!(replaced, 1);

        let reopened = FileBackend::open(dir.path()).unwrap();
        let seqs: Vec<u64> = reopened.entries().await.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(reopened.manifest().await.unwrap().next_seq, 4);
    }

    #[test]
    fn corrupted_manifest_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "{oops").unwrap();
        assert!(matches!(FileBackend::open(dir.path()), Err(Error::Storage { .. })));
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!FileBackend::has_entries(&dir.path().join("absent")));
    }
}
