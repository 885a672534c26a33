// src/core/engine.rs
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::Config;
use super::{
    commit_files, CodeParser, ConfigGraphBuilder, DocRenderer, HookEvent, HookOutcome,
    HookRunner, QueryEngine, StalenessChecker, SyncEngine, SyncOptions, SyncReport,
    TraceGenerator, TracePaths, TraceValidator, EXIT_ALLOW, EXIT_BLOCK,
};

/// Which editor hook to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    RecordRead,
    Enforce,
    CheckCommit,
}

/// Main orchestration engine behind every CLI command
pub struct Engine {
    config: Config,
    paths: TracePaths,
    settings_path: PathBuf,
}

impl Engine {
    /// Resolve the project root and load tool settings
    pub async fn new(root: Option<&Path>, config_path: Option<&Path>) -> Result<Self> {
        let root = resolve_root(root)?;
        let config = Config::load_or_default(config_path, &root)?;
        debug!("Loaded configuration: {:?}", config);
        let mut engine = Self::with_config(&root, config);
        engine.settings_path = Config::settings_path(config_path, &root);
        Ok(engine)
    }

    pub fn with_config(root: &Path, config: Config) -> Self {
        Self {
            paths: TracePaths::new(root, &config),
            settings_path: Config::settings_path(None, root),
            config,
        }
    }

    /// Fallback used by hooks when settings cannot be loaded
    pub fn with_defaults(root: Option<&Path>) -> Self {
        let root = resolve_root(root).unwrap_or_else(|_| PathBuf::from("."));
        Self::with_config(&root, Config::default())
    }

    fn parser(&self) -> Result<CodeParser> {
        Ok(CodeParser::new(&self.config.analysis)?)
    }

    pub async fn generate(
        &self,
        module: Option<String>,
        low_level_only: bool,
        bootstrap: bool,
    ) -> Result<ExitCode> {
        let generator = TraceGenerator::new(
            self.paths.clone(),
            self.parser()?,
            Box::new(ConfigGraphBuilder),
            self.config.bootstrap.clone(),
        );

        if bootstrap {
            info!("🔍 Inferring modules from directory layout...");
            let config = generator.bootstrap()?;
            println!(
                "Bootstrapped {} modules into {}",
                config.modules.len(),
                self.display(&self.paths.module_config)
            );
            for module in &config.modules {
                println!("  - {} ({})", module.id, module.file_globs.join(", "));
            }
            if !self.settings_path.exists() {
                self.config.save(&self.settings_path)?;
                println!("Wrote default settings to {}", self.display(&self.settings_path));
            }
            println!("Review the module config, then run `archtrace generate`.");
            return Ok(ExitCode::SUCCESS);
        }

        info!("🔄 Generating architecture traces...");
        let summary = generator
            .generate_all(module.as_deref(), low_level_only)
            .await?;

        println!(
            "Generated {} module traces covering {} files in {:.2?}",
            summary.modules_processed, summary.files_generated, summary.duration
        );
        match summary.high_level_version {
            Some(version) => println!("High-level trace is now at version {}", version),
            None => println!("High-level trace left unchanged"),
        }
        println!("Run `archtrace render` to refresh the documents.");
        Ok(ExitCode::SUCCESS)
    }

    pub async fn render(&self, module: Option<String>) -> Result<ExitCode> {
        info!("📝 Rendering trace documents...");
        let renderer = DocRenderer::new(self.paths.clone())?;
        let summary = renderer.render_all(module.as_deref())?;

        println!("Rendered {} documents", summary.documents_written);
        if summary.missing_stores.is_empty() {
            return Ok(ExitCode::SUCCESS);
        }
        for store in &summary.missing_stores {
            eprintln!("missing trace store: {} (run `archtrace generate`)", store);
        }
        Ok(ExitCode::FAILURE)
    }

    pub async fn sync(&self, force: bool, dry_run: bool) -> Result<ExitCode> {
        info!("🔄 Synchronizing documents into trace stores...");
        if dry_run {
            info!("📋 Dry run mode - showing what would be updated");
        }

        let engine = SyncEngine::new(self.paths.clone())?;
        let report = engine.sync_all(SyncOptions { force, dry_run })?;
        print_sync_report(&report, dry_run);

        Ok(if report.is_clean() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }

    pub async fn query_module(&self, id: &str, detail: bool) -> Result<ExitCode> {
        let report = QueryEngine::new(self.paths.clone()).query_module(id, detail)?;
        print!("{}", report.to_markdown());
        Ok(ExitCode::SUCCESS)
    }

    pub async fn query_impact(&self, file: &Path) -> Result<ExitCode> {
        let report = QueryEngine::new(self.paths.clone()).analyze_impact(file)?;
        print!("{}", report.to_markdown());
        Ok(ExitCode::SUCCESS)
    }

    pub async fn validate(&self) -> Result<ExitCode> {
        info!("✅ Validating architecture traces...");
        let validator = TraceValidator::new(self.paths.clone(), self.parser()?)?;
        let result = validator.validate_all()?;

        for warning in &result.warnings {
            warn!("  - {}", warning);
        }
        if result.is_valid() {
            info!("✅ Trace validation passed");
            return Ok(ExitCode::SUCCESS);
        }

        eprintln!("❌ Trace validation failed:");
        for error in &result.errors {
            eprintln!("  - {}", error);
        }
        Ok(ExitCode::FAILURE)
    }

    /// Check the given files, or the staged files when none are given
    pub async fn check_stale(&self, files: Vec<String>) -> Result<ExitCode> {
        let files = if files.is_empty() {
            commit_files(&self.paths.project_root, false, self.config.git_timeout()).await
        } else {
            files
        };

        let checker = StalenessChecker::new(self.paths.clone(), self.parser()?);
        let report = checker.check(&files)?;
        if report.is_stale() {
            eprint!("{}", report.message());
            return Ok(ExitCode::from(EXIT_BLOCK));
        }

        println!(
            "{} modules checked, traces up to date ({} untraced files ignored)",
            report.checked.len(),
            report.untraced.len()
        );
        Ok(ExitCode::SUCCESS)
    }

    /// Run one hook against an event read from `input`. Never fails:
    /// malformed input allows the operation.
    pub async fn hook<R: BufRead>(&self, kind: HookKind, input: R) -> ExitCode {
        let event = match HookEvent::read_from(input) {
            Ok(event) => event,
            Err(e) => {
                warn!("Ignoring hook input: {}", e);
                return ExitCode::from(EXIT_ALLOW);
            }
        };

        let runner = HookRunner::new(self.paths.clone(), self.config.clone());
        let outcome = match kind {
            HookKind::RecordRead => runner.record_read(&event),
            HookKind::Enforce => runner.enforce(&event),
            HookKind::CheckCommit => runner.check_commit(&event).await,
        };

        if let Some(message) = outcome.message() {
            eprintln!("{}", message);
        }
        if let HookOutcome::Block(_) = outcome {
            debug!("Hook {:?} blocked session {}", kind, event.session_id);
        }
        ExitCode::from(outcome.exit_code())
    }

    fn display(&self, path: &Path) -> String {
        self.paths
            .relative(path)
            .unwrap_or_else(|| path.display().to_string())
    }
}

fn resolve_root(root: Option<&Path>) -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    let root = match root {
        Some(root) => cwd.join(root),
        None => cwd,
    };
    Ok(root.canonicalize().unwrap_or(root))
}

fn print_sync_report(report: &SyncReport, dry_run: bool) {
    let verb = if dry_run { "would update" } else { "updated" };
    eprintln!(
        "Sync: {} traces checked, {} stores {}, {} fields changed, {} conflicts, {} parse errors",
        report.traces_checked,
        report.files_updated,
        verb,
        report.changes.len(),
        report.conflicts.len(),
        report.errors.len()
    );

    for change in &report.changes {
        eprintln!(
            "  ~ [{}] {} {}: {} -> {}",
            change.trace,
            change.entity,
            change.field,
            change.old_value.as_deref().unwrap_or("(new)"),
            change.new_value
        );
    }

    if !report.conflicts.is_empty() {
        eprintln!("\nConflicts (store regenerated since the document was rendered):");
        for conflict in &report.conflicts {
            eprintln!("  ! [{}] {} {}", conflict.trace, conflict.entity, conflict.field);
            eprintln!(
                "      store:    {}",
                conflict.store_value.as_deref().unwrap_or("(absent)")
            );
            eprintln!("      document: {}", conflict.document_value);
        }
        eprintln!("Re-render to accept the store, or rerun with --force to apply the documents.");
    }

    for error in &report.errors {
        eprintln!("  x {}", error);
    }
}
