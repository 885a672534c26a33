use std::collections::HashSet;

use tracing::debug;

use crate::error::Result;
use super::document::DocumentParser;
use super::modules::{ModuleConfig, ModuleMatcher};
use super::parser::CodeParser;
use super::trace::{read_store, HighLevelTrace, LowLevelTrace, TracePaths};

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks module ownership, graph consistency and document structure
pub struct TraceValidator {
    paths: TracePaths,
    parser: CodeParser,
    documents: DocumentParser,
}

impl TraceValidator {
    pub fn new(paths: TracePaths, parser: CodeParser) -> Result<Self> {
        Ok(Self {
            paths,
            parser,
            documents: DocumentParser::new()?,
        })
    }

    pub fn validate_all(&self) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        let config = match ModuleConfig::load(&self.paths.module_config) {
            Ok(config) => config,
            Err(e) => {
                result.errors.push(e.to_string());
                return Ok(result);
            }
        };
        let matcher = ModuleMatcher::new(&config)?;

        let files = self.parser.list_files(&self.paths.project_root)?;
        for (file, owners) in matcher.overlaps(&files) {
            result.errors.push(format!(
                "{} is claimed by several modules: {} (first match wins)",
                file,
                owners.join(", ")
            ));
        }
        for module in &config.modules {
            if !files.iter().any(|f| matcher.matches(&module.id, f)) {
                result
                    .warnings
                    .push(format!("module '{}' matches no files", module.id));
            }
        }

        match read_store::<HighLevelTrace>(&self.paths.high_level_store()) {
            Ok(Some(trace)) => self.validate_graph(&config, &trace, &mut result),
            Ok(None) => result
                .warnings
                .push("high-level trace not generated yet".to_string()),
            Err(e) => result.errors.push(e.to_string()),
        }

        for module in &config.modules {
            if let Err(e) = read_store::<LowLevelTrace>(&self.paths.low_level_store(&module.id)) {
                result.errors.push(e.to_string());
            }
        }

        self.validate_documents(&config, &mut result)?;

        debug!(
            "Validation finished: {} errors, {} warnings",
            result.errors.len(),
            result.warnings.len()
        );
        Ok(result)
    }

    fn validate_graph(
        &self,
        config: &ModuleConfig,
        trace: &HighLevelTrace,
        result: &mut ValidationResult,
    ) {
        let known: HashSet<&str> = trace.modules.iter().map(|m| m.id.as_str()).collect();

        for module in &trace.modules {
            if config.module(&module.id).is_none() {
                result.warnings.push(format!(
                    "high-level module '{}' is not in the module config; regenerate",
                    module.id
                ));
            }

            let tables = [
                ("dependency", &module.dependencies),
                ("dependent", &module.dependents),
            ];
            for (kind, edges) in tables {
                for edge in edges {
                    if !known.contains(edge.target_id.as_str()) {
                        result.errors.push(format!(
                            "{} {} -> {} targets an unknown module",
                            kind, module.id, edge.target_id
                        ));
                    }
                }
            }

            for edge in &module.dependencies {
                let mirrored = trace
                    .module(&edge.target_id)
                    .map_or(true, |target| {
                        target.dependents.iter().any(|e| e.target_id == module.id)
                    });
                if !mirrored {
                    result.warnings.push(format!(
                        "{} depends on {} but {} does not list {} as a dependent",
                        module.id, edge.target_id, edge.target_id, module.id
                    ));
                }
            }
            for edge in &module.dependents {
                let mirrored = trace
                    .module(&edge.target_id)
                    .map_or(true, |target| {
                        target.dependencies.iter().any(|e| e.target_id == module.id)
                    });
                if !mirrored {
                    result.warnings.push(format!(
                        "{} lists {} as a dependent but {} does not depend on {}",
                        module.id, edge.target_id, edge.target_id, module.id
                    ));
                }
            }
        }
    }

    fn validate_documents(
        &self,
        config: &ModuleConfig,
        result: &mut ValidationResult,
    ) -> Result<()> {
        let high_level = self.paths.high_level_doc();
        if high_level.exists() {
            let content = std::fs::read_to_string(&high_level)?;
            let name = self.display(&high_level);
            let parsed = self.documents.parse_high_level(&name, &content);
            result
                .errors
                .extend(parsed.errors.iter().map(|e| e.to_string()));
        }

        for module in &config.modules {
            let doc = self.paths.low_level_doc(&module.id);
            if !doc.exists() {
                continue;
            }
            let content = std::fs::read_to_string(&doc)?;
            let parsed = self.documents.parse_low_level(&self.display(&doc), &content);
            result
                .errors
                .extend(parsed.errors.iter().map(|e| e.to_string()));
        }
        Ok(())
    }

    fn display(&self, path: &std::path::Path) -> String {
        self.paths
            .relative(path)
            .unwrap_or_else(|| path.display().to_string())
    }
}
