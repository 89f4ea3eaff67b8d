//! `storyloom architecture | blueprint | draft | enrich | finalize | check`

use clap::Args;
use storyloom_core::length;
use storyloom_pipeline::{
    ArchitectureRequest, BlueprintRequest, DraftRequest, EnrichOutcome, FinalizeRequest,
};

use super::{preview, Session};

#[derive(Debug, Args)]
pub struct ArchitectureArgs {
    /// What the novel is about
    #[arg(long)]
    pub topic: String,
    #[arg(long)]
    pub genre: Option<String>,
    /// Planned chapter count
    #[arg(long)]
    pub chapters: Option<u32>,
    /// Target words per chapter
    #[arg(long)]
    pub words: Option<u32>,
    /// Free-form author guidance
    #[arg(long, default_value = "")]
    pub guidance: String,
}

#[derive(Debug, Args)]
pub struct DraftArgs {
    #[arg(long)]
    pub chapter: u32,
    #[arg(long)]
    pub words: Option<u32>,
    #[arg(long, default_value = "")]
    pub guidance: String,
    /// Characters that must appear
    #[arg(long, default_value = "")]
    pub characters: String,
    /// Key items in play
    #[arg(long, default_value = "")]
    pub items: String,
    #[arg(long, default_value = "")]
    pub location: String,
    /// Time pressure or constraint
    #[arg(long, default_value = "")]
    pub time: String,
    /// Output language (default from [generation])
    #[arg(long)]
    pub language: Option<String>,
}

#[derive(Debug, Args)]
pub struct FinalizeArgs {
    #[arg(long)]
    pub chapter: u32,
    #[arg(long)]
    pub words: Option<u32>,
    /// Enrich the chapter first when it is under 80% of the target
    #[arg(long)]
    pub enrich: bool,
    /// Redo every step even if this text was already finalized
    #[arg(long)]
    pub force: bool,
}

pub async fn architecture(session: &Session, args: ArchitectureArgs) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = session.pipeline()?;
    let mut project = session.open_project()?;
    let defaults = pipeline.generation();

    let request = ArchitectureRequest {
        topic: args.topic,
        genre: args.genre.unwrap_or_else(|| defaults.genre.clone()),
        chapters: args.chapters.unwrap_or(defaults.chapters),
        words_per_chapter: args.words.unwrap_or(defaults.words_per_chapter),
        guidance: args.guidance,
        language: defaults.language.clone(),
    };

    println!("🏛️  Generating architecture for a {}-chapter {}...", request.chapters, request.genre);
    let text = pipeline.architecture(&mut project, &request).await?;
    println!("\n{}\n", preview(&text, 400));
    println!("✅ Architecture saved ({} units)", length::measure(&text));
    Ok(())
}

pub async fn blueprint(session: &Session, chapters: Option<u32>, fresh: bool) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = session.pipeline()?;
    let mut project = session.open_project()?;
    let total = chapters.unwrap_or(pipeline.generation().chapters);

    println!("🗺️  Generating blueprint for {total} chapters...");
    let outcome = pipeline.blueprint(&mut project, &BlueprintRequest { total, fresh }).await?;

    if outcome.generated == 0 {
        println!("✅ Blueprint already covers {} chapters", outcome.blueprint.len());
    } else {
        println!(
            "✅ Blueprint complete: {} chapters ({} kept, {} new in {} batch(es))",
            outcome.blueprint.len(),
            outcome.resumed,
            outcome.generated,
            outcome.batches
        );
    }
    Ok(())
}

pub async fn draft(session: &Session, args: DraftArgs) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = session.pipeline()?;
    let mut project = session.open_project()?;

    let request = DraftRequest {
        guidance: args.guidance,
        characters: args.characters,
        key_items: args.items,
        location: args.location,
        time_constraint: args.time,
        language: args.language.unwrap_or_else(|| pipeline.generation().language.clone()),
        ..DraftRequest::new(args.chapter, session.words(args.words))
    };

    println!("✍️  Drafting chapter {}...", request.chapter);
    let outcome = pipeline.draft(&mut project, &request).await?;

    if !outcome.hits.is_empty() {
        println!("  📚 {} knowledge excerpt(s) used:", outcome.hits.len());
        for hit in &outcome.hits {
            println!("     [{:.2}] {} {}", hit.score, hit.source, preview(&hit.text, 60));
        }
    }
    for drop in &outcome.drops {
        println!(
            "  ✂️  Dropped {} item(s) / {} chars from {}: {}",
            drop.items_dropped, drop.chars_dropped, drop.layer, drop.reason
        );
    }

    println!("✅ Chapter {} saved to {}", outcome.chapter, outcome.path.display());
    println!("   Length: {} / target {}", outcome.measured_length, request.target_words);
    if outcome.below_threshold {
        println!(
            "   ⚠️  Under 80% of target; run `storyloom enrich --chapter {}` or finalize with --enrich",
            outcome.chapter
        );
    }
    Ok(())
}

pub async fn enrich(session: &Session, chapter: u32, words: Option<u32>) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = session.pipeline()?;
    let mut project = session.open_project()?;

    match pipeline.enrich(&mut project, chapter, session.words(words)).await? {
        EnrichOutcome::Enriched { before, after, .. } => {
            println!("✅ Chapter {chapter} enriched: {before} → {after}");
        }
        EnrichOutcome::NotNeeded { measured, threshold } => {
            println!("✅ Chapter {chapter} is long enough ({measured} ≥ {threshold}); nothing to do");
        }
    }
    Ok(())
}

pub async fn finalize(session: &Session, args: FinalizeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = session.pipeline()?;
    let mut project = session.open_project()?;
    let target = session.words(args.words);

    let mut request = FinalizeRequest::new(args.chapter, target);
    request.force = args.force;

    println!("📌 Finalizing chapter {}...", args.chapter);
    let outcome = if args.enrich {
        let (enriched, outcome) = pipeline.finalize_enriched(&mut project, &request).await?;
        if let EnrichOutcome::Enriched { before, after, .. } = enriched {
            println!("  📈 Enriched before finalizing: {before} → {after}");
        }
        outcome
    } else {
        pipeline.finalize(&mut project, &request).await?
    };

    if outcome.was_noop() {
        println!("✅ Chapter {} was already finalized; nothing changed", outcome.chapter);
    } else {
        let run: Vec<_> = outcome.steps_run.iter().map(|s| s.as_str()).collect();
        println!("✅ Chapter {} finalized ({})", outcome.chapter, run.join(", "));
        if !outcome.steps_skipped.is_empty() {
            println!("   Resumed: {} step(s) were already done", outcome.steps_skipped.len());
        }
    }
    if let Some(report) = &outcome.knowledge {
        println!("   Knowledge: {} chunk(s) stored", report.inserted);
        for skipped in &report.skipped {
            println!("   ⚠️  Skipped chunk {} ({}): {}", skipped.index, skipped.preview, skipped.reason);
        }
    }
    println!("   Length: {} (threshold {})", outcome.measured_length, outcome.threshold);
    if outcome.below_threshold {
        println!("   ⚠️  Chapter is under 80% of its target length");
    }
    Ok(())
}

pub async fn check(session: &Session, chapter: u32) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = session.pipeline()?;
    let project = session.open_project()?;

    println!("🔎 Checking chapter {chapter}...");
    let report = pipeline.check(&project, chapter).await?;

    if report.is_clean() {
        println!("✅ No consistency issues found");
        return Ok(());
    }
    println!("⚠️  {} issue(s):", report.issues.len());
    for issue in &report.issues {
        println!("  [{}] {}", issue.category, issue.description);
    }
    Ok(())
}
