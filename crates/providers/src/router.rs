//! Provider router: builds the LLM and embedding backends from config.
//!
//! Missing credentials surface here as `Error::Configuration`, before any
//! request is sent.

use std::sync::Arc;

use storyloom_config::{AppConfig, Endpoint};
use storyloom_core::provider::Provider;
use storyloom_core::Result;
use tracing::debug;

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// A provider plus the model it should be asked for.
#[derive(Clone)]
pub struct Backend {
    pub provider: Arc<dyn Provider>,
    pub model: String,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish()
    }
}

fn from_endpoint(endpoint: &Endpoint) -> Arc<dyn Provider> {
    debug!(provider = %endpoint.provider, base_url = %endpoint.base_url, "Building provider");
    if endpoint.provider == "anthropic" {
        Arc::new(
            AnthropicProvider::new(&endpoint.api_key)
                .with_base_url(&endpoint.base_url)
                .with_timeout(endpoint.timeout_secs),
        )
    } else {
        Arc::new(
            OpenAiCompatProvider::new(&endpoint.provider, &endpoint.base_url, &endpoint.api_key)
                .with_timeout(endpoint.timeout_secs),
        )
    }
}

/// Build the text-generation backend.
pub fn build_llm(config: &AppConfig) -> Result<Backend> {
    let endpoint = config.require_llm()?;
    Ok(Backend {
        provider: from_endpoint(&endpoint),
        model: endpoint.model,
    })
}

/// Build the embedding backend.
pub fn build_embedder(config: &AppConfig) -> Result<Backend> {
    let endpoint = config.require_embedding()?;
    if endpoint.provider == "anthropic" {
        return Err(storyloom_core::Error::config(
            "[embedding] provider 'anthropic' has no embeddings API; use an OpenAI-compatible provider",
        ));
    }
    Ok(Backend {
        provider: from_endpoint(&endpoint),
        model: endpoint.model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyloom_core::Error;

    #[test]
    fn missing_key_is_configuration_error() {
        let config = AppConfig::default();
        let err = build_llm(&config).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.is_precondition());
    }

    #[test]
    fn builds_openai_compat_by_default() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("sk-test-123456".into());
        let backend = build_llm(&config).unwrap();
        assert_eq!(backend.provider.name(), "openai");
        assert_eq!(backend.model, "gpt-4o-mini");
    }

    #[test]
    fn builds_anthropic_natively() {
        let mut config = AppConfig::default();
        config.llm.provider = "anthropic".into();
        config.llm.api_key = Some("sk-ant-123456".into());
        config.llm.model = "claude-sonnet-4-20250514".into();
        let backend = build_llm(&config).unwrap();
        assert_eq!(backend.provider.name(), "anthropic");
    }

    #[test]
    fn anthropic_embedder_rejected() {
        let mut config = AppConfig::default();
        config.embedding.provider = "anthropic".into();
        config.embedding.api_key = Some("sk-ant-123456".into());
        let err = build_embedder(&config).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn local_embedder_needs_no_key() {
        let mut config = AppConfig::default();
        config.embedding.provider = "ollama".into();
        config.embedding.model = "nomic-embed-text".into();
        let backend = build_embedder(&config).unwrap();
        assert_eq!(backend.provider.name(), "ollama");
        assert!(format!("{backend:?}").contains("nomic-embed-text"));
    }
}
