// src/core/staleness.rs
use std::collections::BTreeSet;
use std::time::SystemTime;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::debug;

use crate::error::Result;
use super::modules::{ModuleConfig, ModuleMatcher};
use super::parser::CodeParser;
use super::trace::{normalize_relative, read_store, LowLevelTrace, TracePaths};

#[derive(Debug, Clone, PartialEq)]
pub enum StaleReason {
    MissingTrace,
    SourceNewer {
        file: String,
        modified: DateTime<Utc>,
        generated: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaleModule {
    pub module_id: String,
    pub reason: StaleReason,
}

impl StaleModule {
    /// Command that brings the module's trace up to date
    pub fn regenerate_command(&self) -> String {
        format!("archtrace generate {} --low-level-only", self.module_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StalenessReport {
    /// Touched modules, in config order
    pub checked: Vec<String>,
    pub stale: Vec<StaleModule>,
    /// Touched files owned by no module
    pub untraced: Vec<String>,
}

impl StalenessReport {
    pub fn is_stale(&self) -> bool {
        !self.stale.is_empty()
    }

    pub fn message(&self) -> String {
        let mut out = String::from("Commit blocked: architecture traces are out of date.\n");
        for module in &self.stale {
            match &module.reason {
                StaleReason::MissingTrace => out.push_str(&format!(
                    "  - {}: no low-level trace has been generated\n",
                    module.module_id
                )),
                StaleReason::SourceNewer {
                    file,
                    modified,
                    generated,
                } => out.push_str(&format!(
                    "  - {}: {} modified {} after trace generated {}\n",
                    module.module_id,
                    file,
                    modified.to_rfc3339(),
                    generated.to_rfc3339()
                )),
            }
            out.push_str(&format!("    run: {}\n", module.regenerate_command()));
        }
        out
    }
}

/// Compares source modification times with trace generation times
pub struct StalenessChecker {
    paths: TracePaths,
    parser: CodeParser,
}

impl StalenessChecker {
    pub fn new(paths: TracePaths, parser: CodeParser) -> Self {
        Self { paths, parser }
    }

    /// Check the modules owning `touched` files. Without a module config
    /// nothing is stale.
    pub fn check(&self, touched: &[String]) -> Result<StalenessReport> {
        let mut report = StalenessReport::default();
        let Some(config) = ModuleConfig::load_optional(&self.paths.module_config)? else {
            debug!("No module config; staleness check skipped");
            return Ok(report);
        };
        let matcher = ModuleMatcher::new(&config)?;

        let mut touched_modules = BTreeSet::new();
        for file in touched {
            let Some(relative) = self.relative(file) else {
                continue;
            };
            match matcher.owner(&relative) {
                Some(owner) => {
                    touched_modules.insert(owner.to_string());
                }
                None => report.untraced.push(relative),
            }
        }
        if touched_modules.is_empty() {
            return Ok(report);
        }

        let files = self.parser.list_files(&self.paths.project_root)?;
        for module in config.modules.iter().filter(|m| touched_modules.contains(&m.id)) {
            report.checked.push(module.id.clone());

            let Some(trace) = read_store::<LowLevelTrace>(&self.paths.low_level_store(&module.id))?
            else {
                report.stale.push(StaleModule {
                    module_id: module.id.clone(),
                    reason: StaleReason::MissingTrace,
                });
                continue;
            };

            let newest = files
                .iter()
                .filter(|file| matcher.owner(file) == Some(module.id.as_str()))
                .filter_map(|file| {
                    let modified = modified_time(&self.paths.project_root.join(file))?;
                    Some((file, modified))
                })
                .max_by_key(|(_, modified)| *modified);

            if let Some((file, modified)) = newest {
                if modified > trace.last_generated {
                    report.stale.push(StaleModule {
                        module_id: module.id.clone(),
                        reason: StaleReason::SourceNewer {
                            file: file.clone(),
                            modified,
                            generated: trace.last_generated,
                        },
                    });
                }
            }
        }

        Ok(report)
    }

    fn relative(&self, file: &str) -> Option<String> {
        let path = std::path::Path::new(file);
        if path.is_absolute() {
            self.paths.relative(path)
        } else {
            normalize_relative(path).filter(|p| !p.is_empty())
        }
    }
}

/// Modification time at the precision traces record
fn modified_time(path: &std::path::Path) -> Option<DateTime<Utc>> {
    let modified: SystemTime = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified).trunc_subsecs(3))
}
