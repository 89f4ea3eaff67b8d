//! Knowledge store for Storyloom: chunked story material with embeddings.
//!
//! Chapters and imported reference files are split into bounded chunks,
//! embedded through the configured [`Provider`](storyloom_core::Provider),
//! and searched by cosine similarity when drafting later chapters.

pub mod chunking;
pub mod file_backend;
pub mod in_memory;
pub mod store;
pub mod vector;

pub use chunking::chunk_text;
pub use file_backend::FileBackend;
pub use in_memory::InMemoryBackend;
pub use store::{
    EmbeddingProfile, InsertReport, KnowledgeBackend, KnowledgeEntry, KnowledgeHit, KnowledgeStore,
    Manifest, SkippedChunk, SourceTag, StoreStats,
};
pub use vector::cosine_similarity;

/// Directory under a project root that holds the store.
pub const STORE_DIR: &str = "vectorstore";
