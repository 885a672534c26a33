use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use anyhow::Result;

use crate::core::{Engine, HookKind};

#[derive(Parser)]
#[command(name = "archtrace")]
#[command(about = "Architecture traces that stay in step with the code")]
#[command(version)]
pub struct Cli {
    /// Project root (defaults to current directory)
    #[arg(short, long, global = true)]
    pub root: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Regenerate traces from source
    Generate {
        /// Only regenerate this module
        module: Option<String>,

        /// Skip the high-level graph
        #[arg(long)]
        low_level_only: bool,

        /// Infer a starter module config from directory conventions
        #[arg(long, conflicts_with_all = ["module", "low_level_only"])]
        bootstrap: bool,
    },

    /// Render trace stores into Markdown documents
    Render {
        /// Only render this module's low-level document
        module: Option<String>,
    },

    /// Apply hand edits in trace documents back to the stores
    Sync {
        /// Apply document values even over a regenerated store
        #[arg(long)]
        force: bool,

        /// Dry run - show what would be updated
        #[arg(long)]
        dry_run: bool,
    },

    /// Ask the traces about a module or a file
    Query {
        /// Module to describe
        #[arg(long, conflicts_with = "impact", required_unless_present = "impact")]
        module: Option<String>,

        /// Include the module's per-file inventory
        #[arg(long, requires = "module")]
        detail: bool,

        /// File whose change impact to analyze
        #[arg(long)]
        impact: Option<PathBuf>,
    },

    /// Check module config, graph consistency and documents
    Validate,

    /// Report modules whose traces are older than their source
    CheckStale {
        /// Files to check (defaults to staged files)
        files: Vec<String>,
    },

    /// Editor hooks; read one JSON event from stdin
    #[command(subcommand)]
    Hook(HookCommand),
}

#[derive(Subcommand, Clone, Copy)]
pub enum HookCommand {
    /// Record a read of a trace document
    RecordRead,
    /// Block edits to modules whose trace was not read recently
    Enforce,
    /// Block commits that touch modules with stale traces
    CheckCommit,
}

impl From<HookCommand> for HookKind {
    fn from(command: HookCommand) -> Self {
        match command {
            HookCommand::RecordRead => HookKind::RecordRead,
            HookCommand::Enforce => HookKind::Enforce,
            HookCommand::CheckCommit => HookKind::CheckCommit,
        }
    }
}

impl Cli {
    pub fn is_hook(&self) -> bool {
        matches!(self.command, Commands::Hook(_))
    }

    pub async fn execute(self) -> Result<ExitCode> {
        let root = self.root.as_deref();
        let engine = match Engine::new(root, self.config.as_deref()).await {
            Ok(engine) => engine,
            // Hooks must never fail the editor because of our own settings.
            Err(e) if self.is_hook() => {
                tracing::warn!("Falling back to default settings: {}", e);
                Engine::with_defaults(root)
            }
            Err(e) => return Err(e),
        };

        match self.command {
            Commands::Generate {
                module,
                low_level_only,
                bootstrap,
            } => engine.generate(module, low_level_only, bootstrap).await,
            Commands::Render { module } => engine.render(module).await,
            Commands::Sync { force, dry_run } => engine.sync(force, dry_run).await,
            Commands::Query {
                module,
                detail,
                impact,
            } => match (module, impact) {
                (Some(id), _) => engine.query_module(&id, detail).await,
                (None, Some(file)) => engine.query_impact(&file).await,
                (None, None) => Err(anyhow::anyhow!("pass --module <ID> or --impact <FILE>")),
            },
            Commands::Validate => engine.validate().await,
            Commands::CheckStale { files } => engine.check_stale(files).await,
            Commands::Hook(hook) => {
                let stdin = std::io::stdin();
                Ok(engine.hook(hook.into(), stdin.lock()).await)
            }
        }
    }
}
