//! LLM and embedding provider implementations for Storyloom.
//!
//! All providers implement the `storyloom_core::Provider` trait.
//! The router builds the configured backends.

pub mod anthropic;
mod http;
pub mod openai_compat;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{build_embedder, build_llm, Backend};
