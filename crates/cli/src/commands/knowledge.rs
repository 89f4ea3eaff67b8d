//! `storyloom knowledge` — Knowledge store management.

use std::path::Path;

use chrono::Utc;
use storyloom_core::PipelineEvent;
use storyloom_providers::build_embedder;

use super::{preview, Session};

pub async fn import(session: &Session, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    build_embedder(&session.config)?;
    let project = session.open_project()?;

    println!("📥 Importing {}...", file.display());
    let report = project.knowledge().import_file(file).await?;
    session.events.publish(PipelineEvent::KnowledgeUpdated {
        operation: "insert".into(),
        inserted: report.inserted,
        skipped: report.skipped.len(),
        timestamp: Utc::now(),
    });

    println!("✅ Stored {} chunk(s)", report.inserted);
    for skipped in &report.skipped {
        println!("  ⚠️  Skipped chunk {} ({}): {}", skipped.index, skipped.preview, skipped.reason);
    }
    Ok(())
}

pub async fn query(session: &Session, text: &str, k: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    build_embedder(&session.config)?;
    let project = session.open_project()?;
    let k = k.unwrap_or(session.config.retrieval.top_k);

    println!("🔍 Searching knowledge for: \"{text}\"");
    println!();

    let hits = project.knowledge().query(text, k).await?;
    if hits.is_empty() {
        println!("   No matching entries.");
    } else {
        for (i, hit) in hits.iter().enumerate() {
            println!("  {:>2}. [score: {:.2}] {} {}", i + 1, hit.score, hit.source, preview(&hit.text, 80));
        }
    }
    Ok(())
}

pub async fn clear(session: &Session, confirm: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !confirm {
        println!("⚠️  This deletes every knowledge entry and the recorded embedding profile.");
        println!("   Re-run with --confirm to proceed.");
        return Ok(());
    }

    let project = session.open_project()?;
    project.knowledge().clear().await?;
    session.events.publish(PipelineEvent::KnowledgeUpdated {
        operation: "clear".into(),
        inserted: 0,
        skipped: 0,
        timestamp: Utc::now(),
    });
    println!("✅ Knowledge store cleared");
    Ok(())
}

pub async fn status(session: &Session) -> Result<(), Box<dyn std::error::Error>> {
    let project = session.open_project()?;
    let stats = project.knowledge().stats().await;

    println!("🧠 Knowledge Store");
    println!("==================");
    println!("  Entries:   {}", stats.entries);
    match &stats.profile {
        Some(profile) => println!("  Embedding: {profile}"),
        None => println!("  Embedding: (none recorded yet)"),
    }
    if !project.knowledge().has_embedder() {
        println!("  ⚠️  No embedding provider configured; import and query are unavailable");
    }
    if !stats.sources.is_empty() {
        println!("  Sources:");
        for (source, count) in &stats.sources {
            println!("    {:<24} {count} chunk(s)", source.to_string());
        }
    }
    Ok(())
}
