//! `storyloom doctor` — Validate config and check providers.

use std::path::Path;
use std::time::Duration;

use storyloom_config::AppConfig;
use storyloom_core::{EmbeddingRequest, Message, ProviderRequest};
use storyloom_providers::{build_embedder, build_llm};

use super::Session;

const CHECK_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run(session: &Session, config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Storyloom Doctor");
    println!("===================\n");

    let mut issues = 0;
    let config = &session.config;

    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    if path.exists() {
        println!("  ✅ Config file found: {}", path.display());
    } else {
        println!("  ⚠️  No config file at {}; using defaults and environment", path.display());
    }

    match config.validate() {
        Ok(()) => println!("  ✅ Config values valid"),
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            issues += 1;
        }
    }

    match build_llm(config) {
        Ok(backend) => {
            let request = ProviderRequest {
                model: backend.model.clone(),
                messages: vec![Message::user("Reply with the single word: ok")],
                temperature: 0.0,
                max_tokens: Some(8),
                stop: Vec::new(),
            };
            match tokio::time::timeout(CHECK_TIMEOUT, backend.provider.complete(request)).await {
                Ok(Ok(_)) => println!("  ✅ LLM reachable ({} / {})", backend.provider.name(), backend.model),
                Ok(Err(e)) => {
                    println!("  ❌ LLM request failed: {e}");
                    issues += 1;
                }
                Err(_) => {
                    println!("  ❌ LLM did not answer within {}s", CHECK_TIMEOUT.as_secs());
                    issues += 1;
                }
            }
        }
        Err(e) => {
            println!("  ❌ LLM not configured: {e}");
            issues += 1;
        }
    }

    match build_embedder(config) {
        Ok(backend) => {
            let request = EmbeddingRequest {
                model: backend.model.clone(),
                inputs: vec!["ping".into()],
            };
            match tokio::time::timeout(CHECK_TIMEOUT, backend.provider.embed(request)).await {
                Ok(Ok(response)) => {
                    let dims = response.embeddings.first().map(Vec::len).unwrap_or(0);
                    println!("  ✅ Embeddings reachable ({} / {}, {dims} dims)", backend.provider.name(), backend.model);
                }
                Ok(Err(e)) => {
                    println!("  ❌ Embedding request failed: {e}");
                    issues += 1;
                }
                Err(_) => {
                    println!("  ❌ Embedding provider did not answer within {}s", CHECK_TIMEOUT.as_secs());
                    issues += 1;
                }
            }
        }
        Err(e) => {
            println!("  ⚠️  Embeddings not configured: {e}");
            println!("     Drafting works without them; finalize and knowledge commands do not.");
            issues += 1;
        }
    }

    let project = session.open_project()?;
    if let Some(profile) = project.knowledge().stats().await.profile {
        println!("  ℹ️  Knowledge store built with {profile}");
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
