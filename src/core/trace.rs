// src/core/trace.rs
//! Canonical trace store: data model, on-disk locations and atomic writes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{ArchTraceError, Result};

/// Identifier used for the high-level trace in reports and document metadata
pub const HIGH_LEVEL_TRACE_ID: &str = "high-level";

/// Generator identity stamped into every trace
pub fn generator_identity() -> String {
    format!("archtrace v{}", env!("CARGO_PKG_VERSION"))
}

/// Current time at the precision that survives a document round trip
pub fn trace_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Compare two generation timestamps at millisecond precision
pub fn same_generation(a: &DateTime<Utc>, b: &DateTime<Utc>) -> bool {
    a.trunc_subsecs(3) == b.trunc_subsecs(3)
}

/// The inter-module dependency graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighLevelTrace {
    pub version: u64,
    pub last_generated: DateTime<Utc>,
    pub generated_by: String,
    #[serde(default)]
    pub modules: Vec<ModuleNode>,
}

impl HighLevelTrace {
    pub fn module(&self, id: &str) -> Option<&ModuleNode> {
        self.modules.iter().find(|m| m.id == id)
    }

    pub fn module_mut(&mut self, id: &str) -> Option<&mut ModuleNode> {
        self.modules.iter_mut().find(|m| m.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleNode {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<Edge>,
    #[serde(default)]
    pub dependents: Vec<Edge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub target_id: String,
    pub relationship_type: String,
    #[serde(default)]
    pub description: String,
}

/// Per-file symbol inventory for one module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LowLevelTrace {
    pub module_id: String,
    pub version: u64,
    pub last_generated: DateTime<Utc>,
    pub generated_by: String,
    #[serde(default)]
    pub files: Vec<FileTrace>,
}

impl LowLevelTrace {
    pub fn file(&self, path: &str) -> Option<&FileTrace> {
        self.files.iter().find(|f| f.file_path == path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTrace {
    pub file_path: String,
    #[serde(default)]
    pub exports: Vec<ExportEntry>,
    #[serde(default)]
    pub imports: Vec<ImportEntry>,
    /// Reserved: call-graph extraction is not implemented.
    #[serde(default)]
    pub calls: Vec<CallEntry>,
    /// Reserved: event-bus extraction is not implemented.
    #[serde(default)]
    pub events: Vec<EventEntry>,
}

impl FileTrace {
    pub fn empty(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            exports: Vec::new(),
            imports: Vec::new(),
            calls: Vec::new(),
            events: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExportEntry {
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: ExportKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Function,
    Class,
    Interface,
    Type,
    Const,
    Enum,
    Default,
    Reexport,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Function => "function",
            ExportKind::Class => "class",
            ExportKind::Interface => "interface",
            ExportKind::Type => "type",
            ExportKind::Const => "const",
            ExportKind::Enum => "enum",
            ExportKind::Default => "default",
            ExportKind::Reexport => "reexport",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "function" => Some(ExportKind::Function),
            "class" => Some(ExportKind::Class),
            "interface" => Some(ExportKind::Interface),
            "type" => Some(ExportKind::Type),
            "const" | "let" | "var" => Some(ExportKind::Const),
            "enum" => Some(ExportKind::Enum),
            "default" => Some(ExportKind::Default),
            "reexport" => Some(ExportKind::Reexport),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportEntry {
    pub source: String,
    /// Named imports by local name, `Name (default)`, `* as ns`; empty for side-effect imports.
    #[serde(default)]
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEntry {
    pub caller: String,
    pub callee: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEntry {
    pub event: String,
    pub kind: String,
}

/// Resolved locations of every trace artifact for one project
#[derive(Debug, Clone)]
pub struct TracePaths {
    pub project_root: PathBuf,
    pub trace_dir: PathBuf,
    pub module_config: PathBuf,
    pub read_tracking: PathBuf,
}

impl TracePaths {
    pub fn new(project_root: &Path, config: &Config) -> Self {
        let trace_dir = project_root.join(&config.paths.trace_dir);
        Self {
            project_root: project_root.to_path_buf(),
            module_config: trace_dir.join(&config.paths.module_config),
            read_tracking: project_root.join(&config.paths.read_tracking_file),
            trace_dir,
        }
    }

    pub fn high_level_store(&self) -> PathBuf {
        self.trace_dir.join("high-level.json")
    }

    pub fn high_level_doc(&self) -> PathBuf {
        self.trace_dir.join("high-level.md")
    }

    pub fn low_level_dir(&self) -> PathBuf {
        self.trace_dir.join("low-level")
    }

    pub fn low_level_store(&self, module_id: &str) -> PathBuf {
        self.low_level_dir().join(format!("{}.json", module_id))
    }

    pub fn low_level_doc(&self, module_id: &str) -> PathBuf {
        self.low_level_dir().join(format!("{}.md", module_id))
    }

    /// Project-relative, `/`-separated form of `path`, if it lies inside the project.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.project_root).ok()?.to_path_buf()
        } else {
            path.to_path_buf()
        };
        let normalized = normalize_relative(&relative)?;
        if normalized.is_empty() {
            None
        } else {
            Some(normalized)
        }
    }
}

/// Join path components with `/`, resolving `.` and `..` lexically.
/// Returns `None` when the path escapes its base.
pub fn normalize_relative(path: &Path) -> Option<String> {
    use std::path::Component;

    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts.join("/"))
}

/// Read a JSON store file, returning `None` if it does not exist
pub fn read_store<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let value = serde_json::from_str(&content).map_err(|e| ArchTraceError::Store {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(Some(value))
}

/// Serialize `value` as pretty JSON and write it atomically
pub fn write_store<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}

/// Write to a sibling temporary file, then rename over the target.
/// There is no cross-process lock; the last rename wins.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "store".to_string());
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));
    std::fs::write(&tmp, bytes)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}
