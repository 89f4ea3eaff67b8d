//! `storyloom status` — Show which artifacts exist.

use super::Session;

fn mark(present: bool) -> &'static str {
    if present { "✅" } else { "⬜" }
}

fn numbers(list: &[u32]) -> String {
    if list.is_empty() {
        return "none".into();
    }
    list.iter().map(u32::to_string).collect::<Vec<_>>().join(", ")
}

pub async fn run(session: &Session) -> Result<(), Box<dyn std::error::Error>> {
    let project = session.open_project()?;
    let status = project.status().await?;

    println!("🧵 Storyloom Status");
    println!("===================");
    println!("  Project:        {}", project.root().display());
    println!("  LLM:            {} / {}", session.config.llm.provider, session.config.llm.model);
    println!(
        "  Embedding:      {} / {}",
        session.config.embedding.provider, session.config.embedding.model
    );
    println!();
    println!("  {} Architecture", mark(status.architecture));
    println!("  {} Blueprint      {} entries", mark(status.blueprint_entries > 0), status.blueprint_entries);
    println!("  {} Chapters       {}", mark(!status.chapters.is_empty()), numbers(&status.chapters));
    println!("  {} Finalized      {}", mark(!status.finalized.is_empty()), numbers(&status.finalized));
    println!("  {} Global summary", mark(status.global_summary));
    println!("  {} Character state", mark(status.character_state));
    println!("  {} Plot arcs", mark(status.plot_arcs));
    println!("  {} Knowledge      {} entries", mark(status.knowledge_entries > 0), status.knowledge_entries);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_number_lists() {
        assert_eq!(numbers(&[]), "none");
        assert_eq!(numbers(&[1, 2, 5]), "1, 2, 5");
    }
}
