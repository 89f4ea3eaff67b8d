//! `storyloom chapters | plot-arcs`

use super::Session;

pub fn list(session: &Session, words: Option<u32>) -> Result<(), Box<dyn std::error::Error>> {
    let project = session.open_project()?;
    let target = session.words(words);
    let numbers = project.chapter_numbers()?;

    println!("📖 Chapters (target {target})");
    println!("==========================");
    if numbers.is_empty() {
        println!("   No chapter files yet. Run `storyloom draft --chapter 1`.");
        return Ok(());
    }

    for number in numbers {
        let chapter = project.chapter(number, target)?;
        let title = project
            .blueprint()
            .and_then(|b| b.entry(number))
            .map(|e| e.title.as_str())
            .unwrap_or("(not in blueprint)");
        let flag = if chapter.finalized { "✅" } else { "📝" };
        let short = if chapter.needs_enrichment() { "  ⚠️ short" } else { "" };
        println!("  {flag} {number:>3}. {title:<32} {:>6}{short}", chapter.measured_length());
    }
    Ok(())
}

pub fn plot_arcs(session: &Session) -> Result<(), Box<dyn std::error::Error>> {
    let project = session.open_project()?;
    let arcs = project.plot_arcs();
    if arcs.trim().is_empty() {
        println!("   No plot arcs recorded yet. They are written when a chapter is finalized.");
    } else {
        println!("🧶 Plot Arcs");
        println!("============");
        println!("{arcs}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use storyloom_config::AppConfig;
    use storyloom_core::EventBus;

    #[test]
    fn empty_project_lists_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session {
            config: AppConfig::default(),
            project: dir.path().to_path_buf(),
            events: Arc::new(EventBus::default()),
        };
        list(&session, None).unwrap();
        plot_arcs(&session).unwrap();
    }
}
