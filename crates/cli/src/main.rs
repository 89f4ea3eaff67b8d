//! Storyloom CLI — the main entry point.
//!
//! Commands:
//! - `init`          — Write a default config file
//! - `architecture`  — Generate the novel architecture
//! - `blueprint`     — Generate (or resume) the chapter blueprint
//! - `draft`         — Draft one chapter
//! - `enrich`        — Expand a short chapter
//! - `finalize`      — Commit a chapter and update long-term state
//! - `check`         — Review a chapter for continuity errors
//! - `knowledge`     — Manage the knowledge store
//! - `chapters`      — List chapter files
//! - `plot-arcs`     — Show recorded plot threads
//! - `status`        — Show which artifacts exist
//! - `doctor`        — Validate config and check providers

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use storyloom_core::EventBus;
use tracing::debug;

mod commands;

#[derive(Parser)]
#[command(
    name = "storyloom",
    about = "Storyloom — LLM-driven long-form novel generation",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (default: ~/.storyloom/config.toml)
    #[arg(long, global = true, env = "STORYLOOM_CONFIG")]
    config: Option<PathBuf>,

    /// Project directory
    #[arg(short, long, global = true, default_value = ".", env = "STORYLOOM_PROJECT")]
    project: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Generate the novel architecture from a topic
    Architecture(commands::generate::ArchitectureArgs),

    /// Generate the chapter blueprint, resuming a partial one
    Blueprint {
        #[arg(long)]
        chapters: Option<u32>,
        /// Regenerate from chapter 1 even if a blueprint exists
        #[arg(long)]
        fresh: bool,
    },

    /// Draft one chapter
    Draft(commands::generate::DraftArgs),

    /// Expand a chapter that is under 80% of its target length
    Enrich {
        #[arg(long)]
        chapter: u32,
        #[arg(long)]
        words: Option<u32>,
    },

    /// Commit a chapter and update summary, characters, plot arcs, and knowledge
    Finalize(commands::generate::FinalizeArgs),

    /// Review a chapter against the recorded story state
    Check {
        #[arg(long)]
        chapter: u32,
    },

    /// Manage the knowledge store
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeAction,
    },

    /// List chapter files with lengths and finalized flags
    Chapters {
        #[arg(long)]
        words: Option<u32>,
    },

    /// Show recorded plot threads
    PlotArcs,

    /// Show which artifacts exist
    Status,

    /// Validate config and check the LLM and embedding providers
    Doctor,
}

#[derive(Subcommand)]
enum KnowledgeAction {
    /// Import a UTF-8 text file
    Import { file: PathBuf },

    /// Search the store
    Query {
        text: String,
        #[arg(short)]
        k: Option<usize>,
    },

    /// Delete every entry and the recorded embedding profile
    Clear {
        #[arg(long)]
        confirm: bool,
    },

    /// Show entry counts and the embedding profile
    Status,
}

async fn dispatch(cli: Cli, events: Arc<EventBus>) -> Result<(), Box<dyn std::error::Error>> {
    use commands::{chapters, doctor, generate, init, knowledge, load_config, status, Session};

    if let Commands::Init { force } = cli.command {
        return init::run(cli.config.as_deref(), force).await;
    }

    let session = Session {
        config: load_config(cli.config.as_deref())?,
        project: cli.project,
        events,
    };
    debug!(project = %session.project.display(), llm = %session.config.llm.provider, "Session ready");

    match cli.command {
        Commands::Init { .. } => {}
        Commands::Architecture(args) => generate::architecture(&session, args).await?,
        Commands::Blueprint { chapters, fresh } => generate::blueprint(&session, chapters, fresh).await?,
        Commands::Draft(args) => generate::draft(&session, args).await?,
        Commands::Enrich { chapter, words } => generate::enrich(&session, chapter, words).await?,
        Commands::Finalize(args) => generate::finalize(&session, args).await?,
        Commands::Check { chapter } => generate::check(&session, chapter).await?,
        Commands::Knowledge { action } => match action {
            KnowledgeAction::Import { file } => knowledge::import(&session, &file).await?,
            KnowledgeAction::Query { text, k } => knowledge::query(&session, &text, k).await?,
            KnowledgeAction::Clear { confirm } => knowledge::clear(&session, confirm).await?,
            KnowledgeAction::Status => knowledge::status(&session).await?,
        },
        Commands::Chapters { words } => chapters::list(&session, words)?,
        Commands::PlotArcs => chapters::plot_arcs(&session)?,
        Commands::Status => status::run(&session).await?,
        Commands::Doctor => doctor::run(&session, cli.config.as_deref()).await?,
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let events = Arc::new(EventBus::default());
    let printer = commands::spawn_printer(&events);

    let result = dispatch(cli, events).await;
    // All senders are gone once dispatch returns; the printer drains and exits.
    let _ = printer.await;

    if let Err(e) = result {
        eprintln!("❌ {e}");
        std::process::exit(1);
    }
}
