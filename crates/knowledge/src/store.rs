//! The knowledge store: chunk, embed, persist, and search story material.
//!
//! A store is bound to one embedding space. The first successful insert
//! records the [`EmbeddingProfile`]; later inserts and queries from a
//! different provider/model fail with `EmbeddingError::ProfileMismatch`
//! instead of silently mixing incomparable vectors.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storyloom_core::{EmbeddingError, EmbeddingRequest, Error, Provider, ProviderError, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunking::{chunk_text, DEFAULT_CHUNK_CHARS};
use crate::vector;

/// Chunks per embedding request.
const EMBED_BATCH: usize = 16;

/// Where a chunk came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceTag {
    /// A user-imported reference file.
    Imported { file: String },
    /// A finalized chapter.
    Chapter { number: u32 },
}

impl SourceTag {
    pub fn chapter(number: u32) -> Self {
        Self::Chapter { number }
    }

    pub fn imported(file: impl Into<String>) -> Self {
        Self::Imported { file: file.into() }
    }
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imported { file } => write!(f, "import:{file}"),
            Self::Chapter { number } => write!(f, "chapter:{number}"),
        }
    }
}

/// Identifies one embedding space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingProfile {
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
}

impl EmbeddingProfile {
    fn label(provider: &str, model: &str) -> String {
        format!("{provider}/{model}")
    }

    fn same_model(&self, provider: &str, model: &str) -> bool {
        self.provider == provider && self.model == model
    }
}

impl std::fmt::Display for EmbeddingProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} ({} dims)", self.provider, self.model, self.dimensions)
    }
}

/// Store-level metadata persisted next to the entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub profile: EmbeddingProfile,
    /// Sequence number for the next inserted chunk.
    pub next_seq: u64,
}

/// One stored chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    /// Monotonic insertion order; breaks similarity ties.
    pub seq: u64,
    pub source: SourceTag,
    pub text: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// A search result.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeHit {
    pub text: String,
    pub source: SourceTag,
    pub score: f32,
    pub seq: u64,
}

/// A chunk that could not be embedded.
#[derive(Debug, Clone)]
pub struct SkippedChunk {
    pub index: usize,
    pub preview: String,
    pub reason: String,
}

/// Outcome of an insert.
#[derive(Debug, Clone, Default)]
pub struct InsertReport {
    pub inserted: usize,
    pub skipped: Vec<SkippedChunk>,
}

impl InsertReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Summary for status displays.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub entries: usize,
    pub profile: Option<EmbeddingProfile>,
    /// Chunk count per source.
    pub sources: BTreeMap<SourceTag, usize>,
}

/// Persistence for knowledge entries.
///
/// Implementations: [`FileBackend`](crate::FileBackend) for projects on
/// disk, [`InMemoryBackend`](crate::InMemoryBackend) for tests.
#[async_trait]
pub trait KnowledgeBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn manifest(&self) -> Option<Manifest>;

    async fn entries(&self) -> Vec<KnowledgeEntry>;

    async fn len(&self) -> usize;

    /// Append entries and replace the manifest in one step.
    async fn append(&self, manifest: Manifest, entries: Vec<KnowledgeEntry>) -> Result<()>;

    /// Remove all entries with this provenance; returns how many were removed.
    async fn remove_source(&self, source: &SourceTag) -> Result<usize>;

    /// Swap every entry with this provenance for `entries` in one step;
    /// returns how many old entries were replaced.
    async fn replace_source(&self, source: &SourceTag, manifest: Manifest, entries: Vec<KnowledgeEntry>) -> Result<usize>;

    /// Delete every entry and the manifest.
    async fn clear(&self) -> Result<()>;
}

/// The embedding side of the store.
#[derive(Clone)]
pub struct Embedder {
    pub provider: Arc<dyn Provider>,
    pub model: String,
}

/// Chunked, embedded, similarity-searchable story material.
pub struct KnowledgeStore {
    backend: Arc<dyn KnowledgeBackend>,
    embedder: Option<Embedder>,
    chunk_chars: usize,
}

impl KnowledgeStore {
    /// A store without an embedder supports inspection, removal, and
    /// clearing, but inserts and queries fail with a configuration error.
    pub fn new(backend: Arc<dyn KnowledgeBackend>) -> Self {
        Self {
            backend,
            embedder: None,
            chunk_chars: DEFAULT_CHUNK_CHARS,
        }
    }

    pub fn with_embedder(mut self, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        self.embedder = Some(Embedder {
            provider,
            model: model.into(),
        });
        self
    }

    pub fn with_chunk_chars(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = chunk_chars.max(1);
        self
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    /// Whether a project's on-disk store holds any entries, without loading it.
    pub fn has_content(root: &Path) -> bool {
        crate::file_backend::FileBackend::has_entries(&root.join(crate::STORE_DIR))
    }

    pub async fn is_empty(&self) -> bool {
        self.backend.len().await == 0
    }

    pub async fn len(&self) -> usize {
        self.backend.len().await
    }

    pub async fn stats(&self) -> StoreStats {
        let mut sources = BTreeMap::new();
        let entries = self.backend.entries().await;
        for entry in &entries {
            *sources.entry(entry.source.clone()).or_insert(0) += 1;
        }
        StoreStats {
            entries: entries.len(),
            profile: self.backend.manifest().await.map(|m| m.profile),
            sources,
        }
    }

    fn embedder(&self) -> Result<&Embedder> {
        self.embedder
            .as_ref()
            .ok_or_else(|| Error::config("no embedding provider is configured for the knowledge store"))
    }

    /// Fail early when the active provider/model is not the stored one.
    async fn check_profile(&self, embedder: &Embedder) -> Result<Option<Manifest>> {
        let manifest = self.backend.manifest().await;
        if let Some(m) = &manifest {
            if !m.profile.same_model(embedder.provider.name(), &embedder.model) {
                return Err(EmbeddingError::ProfileMismatch {
                    stored: m.profile.to_string(),
                    active: EmbeddingProfile::label(embedder.provider.name(), &embedder.model),
                }
                .into());
            }
        }
        Ok(manifest)
    }

    async fn embed_batch(
        embedder: &Embedder,
        inputs: Vec<String>,
    ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        let expected = inputs.len();
        let response = embedder
            .provider
            .embed(EmbeddingRequest {
                model: embedder.model.clone(),
                inputs,
            })
            .await?;
        if response.embeddings.len() != expected {
            return Err(EmbeddingError::CountMismatch {
                expected,
                actual: response.embeddings.len(),
            });
        }
        Ok(response.embeddings)
    }

    /// Chunk, embed, and append `text` under `source`.
    ///
    /// A failing batch is retried chunk by chunk so that only the chunks the
    /// provider rejects are skipped. If nothing could be embedded, the last
    /// error is returned.
    pub async fn insert(&self, text: &str, source: SourceTag) -> Result<InsertReport> {
        let Some(prepared) = self.prepare(text, &source).await? else {
            return Ok(InsertReport::default());
        };
        let inserted = prepared.entries.len();
        self.backend.append(prepared.manifest, prepared.entries).await?;

        if !prepared.skipped.is_empty() {
            warn!(%source, inserted, skipped = prepared.skipped.len(), "Some chunks could not be embedded");
        }
        info!(%source, inserted, backend = self.backend.name(), "Knowledge inserted");

        Ok(InsertReport {
            inserted,
            skipped: prepared.skipped,
        })
    }

    /// Embed `text` into entries without touching the backend.
    /// `None` when the text yields no chunks.
    async fn prepare(&self, text: &str, source: &SourceTag) -> Result<Option<Prepared>> {
        let embedder = self.embedder()?;
        let manifest = self.check_profile(embedder).await?;

        let chunks = chunk_text(text, self.chunk_chars);
        if chunks.is_empty() {
            return Ok(None);
        }

        let mut batch = Collector::new(&chunks, manifest.as_ref().map(|m| m.profile.dimensions));

        for (batch_no, group) in chunks.chunks(EMBED_BATCH).enumerate() {
            let offset = batch_no * EMBED_BATCH;
            match Self::embed_batch(embedder, group.to_vec()).await {
                Ok(embeddings) => {
                    for (i, embedding) in embeddings.into_iter().enumerate() {
                        batch.accept(offset + i, embedding);
                    }
                }
                Err(batch_err) => {
                    debug!(error = %batch_err, offset, "Embedding batch failed, isolating chunks");
                    for (i, chunk) in group.iter().enumerate() {
                        match Self::embed_batch(embedder, vec![chunk.clone()]).await {
                            Ok(mut one) => match one.pop() {
                                Some(embedding) => batch.accept(offset + i, embedding),
                                None => batch.reject(
                                    offset + i,
                                    EmbeddingError::CountMismatch { expected: 1, actual: 0 },
                                ),
                            },
                            Err(err) => batch.reject(offset + i, err),
                        }
                    }
                }
            }
        }

        let Collector {
            vectors,
            skipped,
            last_error,
            ..
        } = batch;

        let embedded: Vec<(usize, Vec<f32>)> = vectors
            .into_iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (i, v)))
            .collect();

        if embedded.is_empty() {
            let err = last_error.unwrap_or(EmbeddingError::Provider(ProviderError::MalformedResponse(
                "no embeddings returned".into(),
            )));
            return Err(err.into());
        }

        let dims = embedded[0].1.len();
        let mut manifest = manifest.unwrap_or(Manifest {
            profile: EmbeddingProfile {
                provider: embedder.provider.name().to_string(),
                model: embedder.model.clone(),
                dimensions: dims,
            },
            next_seq: 0,
        });

        let now = Utc::now();
        let entries: Vec<KnowledgeEntry> = embedded
            .into_iter()
            .map(|(i, embedding)| {
                let seq = manifest.next_seq;
                manifest.next_seq += 1;
                KnowledgeEntry {
                    id: Uuid::new_v4().to_string(),
                    seq,
                    source: source.clone(),
                    text: chunks[i].clone(),
                    embedding,
                    created_at: now,
                }
            })
            .collect();

        Ok(Some(Prepared {
            manifest,
            entries,
            skipped,
        }))
    }

    /// Return the `k` chunks most similar to `text`.
    ///
    /// An empty store answers immediately without contacting the provider.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<KnowledgeHit>> {
        if k == 0 || text.trim().is_empty() || self.is_empty().await {
            return Ok(Vec::new());
        }

        let embedder = self.embedder()?;
        let manifest = self.check_profile(embedder).await?;

        let mut embeddings = Self::embed_batch(embedder, vec![text.to_string()]).await?;
        let query = embeddings.pop().unwrap_or_default();
        if let Some(m) = &manifest {
            if query.len() != m.profile.dimensions {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: m.profile.dimensions,
                    actual: query.len(),
                }
                .into());
            }
        }

        let entries = self.backend.entries().await;
        let hits = vector::rank(&entries, &query, k);
        debug!(k, hits = hits.len(), "Knowledge query");
        Ok(hits)
    }

    /// Remove every chunk from `source`.
    pub async fn remove_source(&self, source: &SourceTag) -> Result<usize> {
        let removed = self.backend.remove_source(source).await?;
        if removed > 0 {
            debug!(%source, removed, "Knowledge entries removed");
        }
        Ok(removed)
    }

    /// Irreversibly delete all entries and the recorded profile.
    pub async fn clear(&self) -> Result<()> {
        self.backend.clear().await?;
        info!(backend = self.backend.name(), "Knowledge store cleared");
        Ok(())
    }

    /// Import a UTF-8 text file, replacing an earlier import of the same file.
    pub async fn import_file(&self, path: &Path) -> Result<InsertReport> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::storage(path, e))?;
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let tag = SourceTag::imported(file);

        // Embed first so a failing provider leaves the earlier import intact.
        let Some(prepared) = self.prepare(&text, &tag).await? else {
            self.backend.remove_source(&tag).await?;
            return Ok(InsertReport::default());
        };
        let inserted = prepared.entries.len();
        let previous = self.backend.replace_source(&tag, prepared.manifest, prepared.entries).await?;
        if previous > 0 {
            debug!(%tag, previous, "Replaced earlier import");
        }
        info!(%tag, inserted, backend = self.backend.name(), "Knowledge imported");

        Ok(InsertReport {
            inserted,
            skipped: prepared.skipped,
        })
    }
}

/// Embedded entries ready to hand to a backend.
struct Prepared {
    manifest: Manifest,
    entries: Vec<KnowledgeEntry>,
    skipped: Vec<SkippedChunk>,
}

/// Per-insert bookkeeping: accepted vectors, skipped chunks, last failure.
struct Collector<'a> {
    chunks: &'a [String],
    dimensions: Option<usize>,
    vectors: Vec<Option<Vec<f32>>>,
    skipped: Vec<SkippedChunk>,
    last_error: Option<EmbeddingError>,
}

impl<'a> Collector<'a> {
    fn new(chunks: &'a [String], dimensions: Option<usize>) -> Self {
        Self {
            chunks,
            dimensions,
            vectors: vec![None; chunks.len()],
            skipped: Vec::new(),
            last_error: None,
        }
    }

    /// The first vector fixes the dimension for the rest of the store.
    fn accept(&mut self, index: usize, embedding: Vec<f32>) {
        let expected = *self.dimensions.get_or_insert(embedding.len());
        if embedding.is_empty() || embedding.len() != expected {
            self.reject(
                index,
                EmbeddingError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                },
            );
        } else {
            self.vectors[index] = Some(embedding);
        }
    }

    fn reject(&mut self, index: usize, err: EmbeddingError) {
        self.skipped.push(SkippedChunk {
            index,
            preview: self.chunks[index].chars().take(40).collect(),
            reason: err.to_string(),
        });
        self.last_error = Some(err);
    }
}
