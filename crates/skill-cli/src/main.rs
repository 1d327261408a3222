//! `skill` - the command-line collaborator for the agentic skill kernel:
//! routes natural-language queries, dispatches `skill.command` calls
//! directly, manages the registry, and reconciles the holographic index.

use clap::{Parser, Subcommand};
use skill_cli::app::App;
use skill_cli::commands::{dispatch, index, route, skill};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "skill", version, about = "Agentic skill kernel CLI")]
struct Cli {
    /// Path to `skill-kernel.toml`. Defaults to `./skill-kernel.toml` if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Completion provider backing `Inference::complete` (`ollama` or `openai`).
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Emit machine-readable JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a natural-language query to the best-matching skill.command.
    Route {
        /// The query text, e.g. "commit my staged changes".
        query: String,
    },
    /// Manage the skill registry.
    Skill {
        #[command(subcommand)]
        action: SkillAction,
    },
    /// Manage the holographic index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
    /// Dispatch `<skill>.<command>` directly, bypassing the router.
    #[command(external_subcommand)]
    Dispatch(Vec<String>),
}

#[derive(Subcommand)]
enum SkillAction {
    /// List skills. Defaults to every skill on disk; `--loaded` narrows to
    /// what's currently loaded in the registry.
    List {
        #[arg(long)]
        loaded: bool,
    },
    /// Load a skill by name.
    Load { name: String },
    /// Unload a skill by name.
    Unload { name: String },
    /// Reload a skill by name.
    Reload { name: String },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Reconcile the index against the skills currently on disk.
    Reconcile,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let app = match App::build(cli.config.as_ref(), cli.provider.as_deref()).await {
        Ok(app) => app,
        Err(err) => {
            eprintln!("error: failed to initialize kernel: {err:#}");
            return ExitCode::from(1);
        }
    };

    let code = match cli.command {
        Commands::Route { query } => route::run(&app, &query, cli.json).await,
        Commands::Skill { action } => match action {
            SkillAction::List { loaded } => skill::list(&app, loaded).await,
            SkillAction::Load { name } => skill::load(&app, &name).await,
            SkillAction::Unload { name } => skill::unload(&app, &name).await,
            SkillAction::Reload { name } => skill::reload(&app, &name).await,
        },
        Commands::Index { action } => match action {
            IndexAction::Reconcile => index::reconcile(&app).await,
        },
        Commands::Dispatch(raw) => run_dispatch(&app, raw, cli.json).await,
    };

    ExitCode::from(code as u8)
}

/// `skill <skill>.<command> [key=value...]` falls through clap's external
/// subcommand catch-all since the verb itself is a dynamic dotted identifier.
async fn run_dispatch(app: &App, raw: Vec<String>, json: bool) -> i32 {
    let Some(target) = raw.first() else {
        eprintln!("error: expected <skill>.<command>");
        return 3;
    };
    let Some((skill_name, command_name)) = target.split_once('.') else {
        eprintln!("error: {target:?} is not in <skill>.<command> form");
        return 3;
    };
    let args = &raw[1..];
    dispatch::run(app, skill_name, command_name, args, None, json).await
}
