// src/core/generator.rs
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::BootstrapConfig;
use crate::error::{ArchTraceError, Result};
use super::graph::GraphBuilder;
use super::modules::{Module, ModuleConfig, ModuleMatcher};
use super::parser::CodeParser;
use super::trace::{
    generator_identity, read_store, trace_now, write_store, HighLevelTrace, LowLevelTrace,
    TracePaths,
};

/// Outcome of a generate run
#[derive(Debug, Clone)]
pub struct GenerationSummary {
    pub modules_processed: usize,
    pub files_generated: usize,
    pub high_level_version: Option<u64>,
    pub duration: Duration,
}

/// Regenerates low-level traces from source and the high-level graph via a `GraphBuilder`
pub struct TraceGenerator {
    paths: TracePaths,
    parser: CodeParser,
    graph_builder: Box<dyn GraphBuilder>,
    bootstrap: BootstrapConfig,
}

impl TraceGenerator {
    pub fn new(
        paths: TracePaths,
        parser: CodeParser,
        graph_builder: Box<dyn GraphBuilder>,
        bootstrap: BootstrapConfig,
    ) -> Self {
        Self {
            paths,
            parser,
            graph_builder,
            bootstrap,
        }
    }

    /// Regenerate one module or all of them, plus the high-level graph unless skipped
    pub async fn generate_all(
        &self,
        target: Option<&str>,
        low_level_only: bool,
    ) -> Result<GenerationSummary> {
        let started = Instant::now();
        let config = ModuleConfig::load(&self.paths.module_config)?;
        let matcher = ModuleMatcher::new(&config)?;

        let selected: Vec<&Module> = match target {
            Some(id) => vec![config
                .module(id)
                .ok_or_else(|| ArchTraceError::ModuleNotFound(id.to_string()))?],
            None => config.modules.iter().collect(),
        };

        let files = self.parser.list_files(&self.paths.project_root)?;
        debug!("Enumerated {} project files", files.len());

        let mut files_generated = 0;
        for module in &selected {
            let trace = self.generate_module(module, &matcher, &files)?;
            files_generated += trace.files.len();
        }

        let high_level_version = if low_level_only {
            None
        } else {
            Some(self.generate_high_level(&config).await?.version)
        };

        Ok(GenerationSummary {
            modules_processed: selected.len(),
            files_generated,
            high_level_version,
            duration: started.elapsed(),
        })
    }

    /// Re-analyze every file owned by `module` and write its low-level trace.
    /// Files claimed by an earlier module in the config belong to that module.
    ///
    /// The previous trace is read only for its version number.
    pub fn generate_module(
        &self,
        module: &Module,
        matcher: &ModuleMatcher,
        files: &[String],
    ) -> Result<LowLevelTrace> {
        let store_path = self.paths.low_level_store(&module.id);
        let previous_version = read_store::<LowLevelTrace>(&store_path)?.map_or(0, |t| t.version);

        let root = &self.paths.project_root;
        let file_traces = files
            .iter()
            .filter(|file| matcher.owner(file) == Some(module.id.as_str()))
            .map(|file| self.parser.trace_file(root, file))
            .collect::<Vec<_>>();

        let trace = LowLevelTrace {
            module_id: module.id.clone(),
            version: previous_version + 1,
            last_generated: trace_now(),
            generated_by: generator_identity(),
            files: file_traces,
        };

        write_store(&store_path, &trace)?;
        info!(
            "Generated low-level trace for {} (v{}, {} files)",
            module.id,
            trace.version,
            trace.files.len()
        );
        Ok(trace)
    }

    pub async fn generate_high_level(&self, config: &ModuleConfig) -> Result<HighLevelTrace> {
        let store_path = self.paths.high_level_store();
        let previous = read_store::<HighLevelTrace>(&store_path)?;
        let trace = self.graph_builder.build(config, previous.as_ref()).await?;
        write_store(&store_path, &trace)?;
        info!(
            "Generated high-level trace (v{}, {} modules, builder: {})",
            trace.version,
            trace.modules.len(),
            self.graph_builder.builder_name()
        );
        Ok(trace)
    }

    /// Infer a starter module config from directory conventions.
    ///
    /// Refuses to run when a module config already exists.
    pub fn bootstrap(&self) -> Result<ModuleConfig> {
        if self.paths.module_config.exists() {
            return Err(ArchTraceError::Bootstrap(format!(
                "{} already exists; edit it instead",
                self.paths.module_config.display()
            )));
        }

        let root = &self.paths.project_root;
        let mut modules: Vec<Module> = Vec::new();

        for dir in &self.bootstrap.app_dirs {
            for name in subdirectories(&root.join(dir)) {
                modules.push(inferred_module(&name, &name, dir, "Application"));
            }
        }

        for dir in &self.bootstrap.package_dirs {
            for name in subdirectories(&root.join(dir)) {
                let id = if modules.iter().any(|m| m.id == name) {
                    format!("package-{}", name)
                } else {
                    name.clone()
                };
                modules.push(inferred_module(&id, &name, dir, "Package"));
            }
        }

        let scripts = &self.bootstrap.scripts_dir;
        if root.join(scripts).is_dir() && !modules.iter().any(|m| m.id == "scripts") {
            modules.push(Module {
                id: "scripts".to_string(),
                name: "Scripts".to_string(),
                description: "Tooling scripts".to_string(),
                file_globs: vec![format!("{}/**", scripts)],
            });
        }

        if modules.is_empty() && root.join("src").is_dir() {
            modules.push(Module {
                id: "src".to_string(),
                name: "Source".to_string(),
                description: "Main source tree".to_string(),
                file_globs: vec!["src/**".to_string()],
            });
        }

        if modules.is_empty() {
            return Err(ArchTraceError::Bootstrap(
                "no application, package or scripts directories found".to_string(),
            ));
        }

        let config = ModuleConfig::new(modules);
        config.validate()?;
        config.save(&self.paths.module_config)?;
        info!(
            "Bootstrapped {} modules into {}",
            config.modules.len(),
            self.paths.module_config.display()
        );
        Ok(config)
    }
}

/// Immediate child directories, sorted, hidden ones excluded
fn subdirectories(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| !name.starts_with('.') && is_valid_id(name))
        .collect();
    names.sort();
    names
}

fn is_valid_id(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn inferred_module(id: &str, name: &str, parent: &str, kind: &str) -> Module {
    Module {
        id: id.to_string(),
        name: title_case(name),
        description: format!("{} in {}/{}", kind, parent, name),
        file_globs: vec![format!("{}/{}/**", parent, name)],
    }
}

fn title_case(name: &str) -> String {
    name.split(|c| c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
