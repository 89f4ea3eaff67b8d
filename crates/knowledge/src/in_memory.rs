//! In-memory backend: useful for testing and throwaway projects.

use async_trait::async_trait;
use storyloom_core::Result;
use tokio::sync::RwLock;

use crate::store::{KnowledgeBackend, KnowledgeEntry, Manifest, SourceTag};

/// Keeps entries in a Vec; nothing touches disk.
#[derive(Default)]
pub struct InMemoryBackend {
    manifest: RwLock<Option<Manifest>>,
    entries: RwLock<Vec<KnowledgeEntry>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KnowledgeBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn manifest(&self) -> Option<Manifest> {
        self.manifest.read().await.clone()
    }

    async fn entries(&self) -> Vec<KnowledgeEntry> {
        self.entries.read().await.clone()
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn append(&self, manifest: Manifest, entries: Vec<KnowledgeEntry>) -> Result<()> {
        *self.manifest.write().await = Some(manifest);
        self.entries.write().await.extend(entries);
        Ok(())
    }

    async fn remove_source(&self, source: &SourceTag) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| &e.source != source);
        Ok(before - entries.len())
    }

    async fn replace_source(&self, source: &SourceTag, manifest: Manifest, new: Vec<KnowledgeEntry>) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| &e.source != source);
        let replaced = before - entries.len();
        entries.extend(new);
        *self.manifest.write().await = Some(manifest);
        Ok(replaced)
    }

    async fn clear(&self) -> Result<()> {
        *self.manifest.write().await = None;
        self.entries.write().await.clear();
        Ok(())
    }
}
