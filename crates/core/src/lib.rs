//! # Storyloom Core
//!
//! Domain types, traits, and error definitions for the Storyloom novel
//! generation pipeline. This crate has **no HTTP** and only the minimal file
//! helpers in [`persist`]; it defines the vocabulary every other crate speaks.
//!
//! ## Design Philosophy
//!
//! LLM and embedding backends are a trait ([`Provider`]) so that every stage
//! can be exercised against scripted fakes. Story artifacts ([`Blueprint`],
//! [`ChapterEntry`]) are plain values with their own parse/validate rules.

pub mod error;
pub mod event;
pub mod length;
pub mod message;
pub mod persist;
pub mod provider;
pub mod stage;
pub mod story;

// Re-export key types at crate root for ergonomics
pub use error::{EmbeddingError, Error, ProviderError, Result, StateError, ValidationError};
pub use event::{EventBus, PipelineEvent};
pub use message::{Message, Role};
pub use provider::{EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage};
pub use stage::Stage;
pub use story::{Blueprint, Chapter, ChapterEntry};
