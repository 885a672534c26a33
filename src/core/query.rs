// src/core/query.rs
use std::path::Path;

use crate::error::{ArchTraceError, Result};
use super::modules::{ModuleConfig, ModuleMatcher};
use super::renderer::join_symbols;
use super::trace::{
    read_store, Edge, FileTrace, HighLevelTrace, LowLevelTrace, ModuleNode, TracePaths,
};

/// Answer to "what does this module depend on, and what depends on it"
#[derive(Debug, Clone)]
pub struct ModuleReport {
    pub module: ModuleNode,
    /// Low-level file inventory when detail was requested and a trace exists
    pub files: Option<Vec<FileTrace>>,
}

/// Answer to "what is affected if this file changes"
#[derive(Debug, Clone)]
pub struct ImpactReport {
    pub file: String,
    /// Owning module id and name; `None` for untraced files
    pub owner: Option<(String, String)>,
    /// Direct dependents of the owning module
    pub affected: Vec<Edge>,
    /// The file's entry in its module's low-level trace
    pub detail: Option<FileTrace>,
}

/// Read-only lookups against the trace stores
pub struct QueryEngine {
    paths: TracePaths,
}

impl QueryEngine {
    pub fn new(paths: TracePaths) -> Self {
        Self { paths }
    }

    pub fn query_module(&self, id: &str, detail: bool) -> Result<ModuleReport> {
        let high_level = self.high_level()?;
        let module = high_level
            .module(id)
            .cloned()
            .ok_or_else(|| ArchTraceError::ModuleNotFound(id.to_string()))?;

        let files = if detail {
            read_store::<LowLevelTrace>(&self.paths.low_level_store(id))?.map(|t| t.files)
        } else {
            None
        };

        Ok(ModuleReport { module, files })
    }

    pub fn analyze_impact(&self, file: &Path) -> Result<ImpactReport> {
        let config = ModuleConfig::load(&self.paths.module_config)?;
        let matcher = ModuleMatcher::new(&config)?;

        let absolute = if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.paths.project_root.join(file)
        };
        let relative = self.paths.relative(&absolute);
        let display = relative
            .clone()
            .unwrap_or_else(|| file.display().to_string());

        let Some(owner_id) = relative.as_deref().and_then(|r| matcher.owner(r)) else {
            return Ok(ImpactReport {
                file: display,
                owner: None,
                affected: Vec::new(),
                detail: None,
            });
        };
        let owner_id = owner_id.to_string();

        let high_level = read_store::<HighLevelTrace>(&self.paths.high_level_store())?;
        let node = high_level.as_ref().and_then(|h| h.module(&owner_id));
        let name = node
            .map(|n| n.name.clone())
            .or_else(|| config.module(&owner_id).map(|m| m.name.clone()))
            .unwrap_or_else(|| owner_id.clone());
        let affected = node.map(|n| n.dependents.clone()).unwrap_or_default();

        let detail = read_store::<LowLevelTrace>(&self.paths.low_level_store(&owner_id))?
            .and_then(|trace| trace.file(&display).cloned());

        Ok(ImpactReport {
            file: display,
            owner: Some((owner_id, name)),
            affected,
            detail,
        })
    }

    fn high_level(&self) -> Result<HighLevelTrace> {
        let path = self.paths.high_level_store();
        read_store(&path)?.ok_or_else(|| ArchTraceError::Store {
            path,
            message: "high-level trace not generated yet; run `archtrace generate`".to_string(),
        })
    }
}

impl ModuleReport {
    pub fn to_markdown(&self) -> String {
        let module = &self.module;
        let mut out = format!("# Module: {} (`{}`)\n\n", module.name, module.id);
        if !module.description.is_empty() {
            out.push_str(&format!("{}\n\n", module.description));
        }

        out.push_str("## Dependencies\n\n");
        push_edges(&mut out, &module.dependencies);
        out.push_str("\n## Dependents\n\n");
        push_edges(&mut out, &module.dependents);

        if let Some(files) = &self.files {
            out.push_str(&format!("\n## Files ({})\n", files.len()));
            for file in files {
                out.push('\n');
                push_file_detail(&mut out, file);
            }
        }
        out
    }
}

impl ImpactReport {
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# Impact of `{}`\n\n", self.file);

        let Some((id, name)) = &self.owner else {
            out.push_str("This file is not owned by any module; it is untraced.\n");
            return out;
        };

        out.push_str(&format!("**Owning module**: {} (`{}`)\n\n", name, id));
        out.push_str("## Affected modules\n\n");
        push_edges(&mut out, &self.affected);

        out.push('\n');
        match &self.detail {
            Some(file) => push_file_detail(&mut out, file),
            None => out.push_str(&format!(
                "No low-level entry for this file; run `archtrace generate {} --low-level-only`.\n",
                id
            )),
        }
        out
    }
}

fn push_edges(out: &mut String, edges: &[Edge]) {
    if edges.is_empty() {
        out.push_str("_None._\n");
        return;
    }
    for edge in edges {
        if edge.description.is_empty() {
            out.push_str(&format!("- `{}` ({})\n", edge.target_id, edge.relationship_type));
        } else {
            out.push_str(&format!(
                "- `{}` ({}): {}\n",
                edge.target_id, edge.relationship_type, edge.description
            ));
        }
    }
}

fn push_file_detail(out: &mut String, file: &FileTrace) {
    out.push_str(&format!("### `{}`\n\n", file.file_path));
    if file.exports.is_empty() {
        out.push_str("- Exports: _none_\n");
    } else {
        let exports: Vec<String> = file
            .exports
            .iter()
            .map(|e| format!("`{}` ({})", e.symbol, e.kind))
            .collect();
        out.push_str(&format!("- Exports: {}\n", exports.join(", ")));
    }
    if file.imports.is_empty() {
        out.push_str("- Imports: _none_\n");
    } else {
        out.push_str("- Imports:\n");
        for import in &file.imports {
            out.push_str(&format!(
                "  - `{}`: {}\n",
                import.source,
                join_symbols(&import.symbols)
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::modules::Module;
    use crate::core::trace::{generator_identity, trace_now, write_store, ExportEntry, ExportKind};

    fn fixture() -> (tempfile::TempDir, QueryEngine) {
        let dir = tempfile::tempdir().unwrap();
        let paths = TracePaths::new(dir.path(), &Config::default());

        ModuleConfig::new(vec![
            Module {
                id: "core".to_string(),
                name: "Core".to_string(),
                description: String::new(),
                file_globs: vec!["src/core/**".to_string()],
            },
            Module {
                id: "api".to_string(),
                name: "API".to_string(),
                description: String::new(),
                file_globs: vec!["src/api/**".to_string()],
            },
        ])
        .save(&paths.module_config)
        .unwrap();

        let uses = |target: &str| Edge {
            target_id: target.to_string(),
            relationship_type: "uses".to_string(),
            description: String::new(),
        };
        write_store(
            &paths.high_level_store(),
            &HighLevelTrace {
                version: 1,
                last_generated: trace_now(),
                generated_by: generator_identity(),
                modules: vec![
                    ModuleNode {
                        id: "core".to_string(),
                        name: "Core".to_string(),
                        description: "Domain logic".to_string(),
                        dependencies: vec![],
                        dependents: vec![uses("api")],
                    },
                    ModuleNode {
                        id: "api".to_string(),
                        name: "API".to_string(),
                        description: String::new(),
                        dependencies: vec![uses("core")],
                        dependents: vec![],
                    },
                ],
            },
        )
        .unwrap();

        write_store(
            &paths.low_level_store("core"),
            &LowLevelTrace {
                module_id: "core".to_string(),
                version: 1,
                last_generated: trace_now(),
                generated_by: generator_identity(),
                files: vec![FileTrace {
                    exports: vec![ExportEntry {
                        symbol: "total".to_string(),
                        kind: ExportKind::Function,
                    }],
                    ..FileTrace::empty("src/core/math.ts")
                }],
            },
        )
        .unwrap();

        (dir, QueryEngine::new(paths))
    }

    #[test]
    fn module_query_lists_both_directions() {
        let (_dir, engine) = fixture();
        let report = engine.query_module("core", true).unwrap();
        let markdown = report.to_markdown();
        assert!(markdown.contains("# Module: Core (`core`)"));
        assert!(markdown.contains("## Dependencies\n\n_None._"));
        assert!(markdown.contains("## Dependents\n\n- `api` (uses)"));
        assert!(markdown.contains("### `src/core/math.ts`"));

        assert!(engine.query_module("core", false).unwrap().files.is_none());
        assert!(matches!(
            engine.query_module("ghost", false),
            Err(ArchTraceError::ModuleNotFound(_))
        ));
    }

    #[test]
    fn impact_names_owner_dependents_and_symbols() {
        let (_dir, engine) = fixture();
        let report = engine.analyze_impact(Path::new("src/core/math.ts")).unwrap();
        assert_eq!(report.owner, Some(("core".to_string(), "Core".to_string())));
        assert_eq!(report.affected.len(), 1);
        assert_eq!(report.affected[0].target_id, "api");
        assert!(report.to_markdown().contains("`total` (function)"));
    }

    #[test]
    fn untraced_file_is_not_an_error() {
        let (_dir, engine) = fixture();
        let report = engine.analyze_impact(Path::new("README.md")).unwrap();
        assert!(report.owner.is_none());
        assert!(report.to_markdown().contains("untraced"));
    }
}
