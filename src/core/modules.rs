// src/core/modules.rs
use std::collections::HashSet;
use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ArchTraceError, Result};
use super::trace::write_store;

/// Declarative map of module id to owned file globs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfig {
    #[serde(default = "default_config_version")]
    pub version: String,

    #[serde(default = "default_project_root")]
    pub project_root: String,

    pub modules: Vec<Module>,
}

fn default_config_version() -> String {
    "1.0".to_string()
}

fn default_project_root() -> String {
    ".".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub file_globs: Vec<String>,
}

impl ModuleConfig {
    pub fn new(modules: Vec<Module>) -> Self {
        Self {
            version: default_config_version(),
            project_root: default_project_root(),
            modules,
        }
    }

    /// Load and validate a module config file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ArchTraceError::ConfigMissing(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: ModuleConfig = serde_json::from_str(&content)
            .map_err(|e| ArchTraceError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        debug!("Loaded {} modules from {}", config.modules.len(), path.display());
        Ok(config)
    }

    /// Load the config if present; `Ok(None)` when the file does not exist
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        match Self::load(path) {
            Ok(config) => Ok(Some(config)),
            Err(ArchTraceError::ConfigMissing(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_store(path, self)
    }

    pub fn module(&self, id: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == id)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for module in &self.modules {
            if module.id.trim().is_empty() {
                return Err(ArchTraceError::Config("module with empty id".to_string()));
            }
            if !module
                .id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            {
                return Err(ArchTraceError::Config(format!(
                    "module id '{}' may only contain letters, digits, '-', '_' and '.'",
                    module.id
                )));
            }
            if !seen.insert(module.id.as_str()) {
                return Err(ArchTraceError::Config(format!(
                    "duplicate module id '{}'",
                    module.id
                )));
            }
            if module.file_globs.is_empty() {
                return Err(ArchTraceError::Config(format!(
                    "module '{}' has no fileGlobs",
                    module.id
                )));
            }
            compile_globs(&module.file_globs)?;
        }
        Ok(())
    }
}

fn compile_globs(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern.trim_start_matches("./"))
            .literal_separator(true)
            .build()
            .map_err(|e| ArchTraceError::Glob {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ArchTraceError::Glob {
        pattern: patterns.join(", "),
        message: e.to_string(),
    })
}

/// Compiled ownership globs, in config order
pub struct ModuleMatcher {
    entries: Vec<(String, GlobSet)>,
}

impl ModuleMatcher {
    pub fn new(config: &ModuleConfig) -> Result<Self> {
        let entries = config
            .modules
            .iter()
            .map(|m| Ok((m.id.clone(), compile_globs(&m.file_globs)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    /// Owning module of a project-relative path; the first matching module wins.
    pub fn owner(&self, relative_path: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, set)| set.is_match(relative_path))
            .map(|(id, _)| id.as_str())
    }

    /// Whether `relative_path` falls inside the given module's globs
    pub fn matches(&self, module_id: &str, relative_path: &str) -> bool {
        self.entries
            .iter()
            .any(|(id, set)| id == module_id && set.is_match(relative_path))
    }

    /// Files claimed by more than one module, with every claimant
    pub fn overlaps<'a>(&self, files: &'a [String]) -> Vec<(&'a str, Vec<String>)> {
        files
            .iter()
            .filter_map(|file| {
                let owners: Vec<String> = self
                    .entries
                    .iter()
                    .filter(|(_, set)| set.is_match(file.as_str()))
                    .map(|(id, _)| id.clone())
                    .collect();
                (owners.len() > 1).then_some((file.as_str(), owners))
            })
            .collect()
    }
}
