// src/core/renderer.rs
//! Projects traces into Markdown documents.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tera::{Context, Tera, Value};
use tracing::info;

use crate::error::{ArchTraceError, Result};
use super::modules::ModuleConfig;
use super::protector::{EditProtector, NOTES_LABEL};
use super::trace::{
    read_store, write_atomic, Edge, HighLevelTrace, LowLevelTrace, TracePaths,
    HIGH_LEVEL_TRACE_ID,
};

/// Heading suffix that excludes a section from sync
pub const FREEFORM_MARKER: &str = "(freeform)";

/// Placeholder for an import without symbols
pub const NO_SYMBOLS: &str = "-";

const HEADER_TEMPLATE: &str = "<!--
Trace: {{ trace_id }}
Version: {{ version }}
Last-Generated: {{ last_generated }}
Generated-By: {{ generated_by }}
-->";

const HIGH_LEVEL_TEMPLATE: &str = r#"{% include "header.md" %}
# High-Level Architecture Trace

Structured sections are synchronized into `{{ store_file }}` by `archtrace sync`. The Notes section is not.
{% for module in modules %}
## Module: {{ module.name | cell }}

**ID**: {{ module.id }}
**Description**: {{ module.description | cell }}

### Dependencies

| Target | Relationship | Description |
|--------|--------------|-------------|
{% for row in module.dependencies -%}
| {{ row.target_id | cell }} | {{ row.relationship_type | cell }} | {{ row.description | cell }} |
{% endfor %}
### Dependents

| Target | Relationship | Description |
|--------|--------------|-------------|
{% for row in module.dependents -%}
| {{ row.target_id | cell }} | {{ row.relationship_type | cell }} | {{ row.description | cell }} |
{% endfor %}
{%- endfor %}
## Notes (freeform)

{{ notes }}
"#;

const LOW_LEVEL_TEMPLATE: &str = r#"{% include "header.md" %}
# Low-Level Trace: {{ module_name | cell }}

Structured sections are synchronized into `{{ store_file }}` by `archtrace sync`. The Notes section is not.
{% for file in files %}
## File: {{ file.path }}

### Exports

| Symbol | Type |
|--------|------|
{% for row in file.exports -%}
| {{ row.symbol | cell }} | {{ row.kind }} |
{% endfor %}
### Imports

| Source | Symbols |
|--------|---------|
{% for row in file.imports -%}
| {{ row.source | cell }} | {{ row.symbols | cell }} |
{% endfor %}
### Function Calls

| Caller | Callee |
|--------|--------|
{% for row in file.calls -%}
| {{ row.caller | cell }} | {{ row.callee | cell }} |
{% endfor %}
### Events

| Event | Kind |
|-------|------|
{% for row in file.events -%}
| {{ row.event | cell }} | {{ row.kind | cell }} |
{% endfor %}
{%- endfor %}
## Notes (freeform)

{{ notes }}
"#;

#[derive(Serialize)]
struct HighLevelView<'a> {
    trace_id: &'a str,
    version: u64,
    last_generated: String,
    generated_by: &'a str,
    store_file: String,
    modules: Vec<ModuleView<'a>>,
    notes: String,
}

#[derive(Serialize)]
struct ModuleView<'a> {
    id: &'a str,
    name: &'a str,
    description: &'a str,
    dependencies: Vec<EdgeView<'a>>,
    dependents: Vec<EdgeView<'a>>,
}

#[derive(Serialize)]
struct EdgeView<'a> {
    target_id: &'a str,
    relationship_type: &'a str,
    description: &'a str,
}

impl<'a> From<&'a Edge> for EdgeView<'a> {
    fn from(edge: &'a Edge) -> Self {
        Self {
            target_id: &edge.target_id,
            relationship_type: &edge.relationship_type,
            description: &edge.description,
        }
    }
}

#[derive(Serialize)]
struct LowLevelView<'a> {
    trace_id: &'a str,
    version: u64,
    last_generated: String,
    generated_by: &'a str,
    store_file: String,
    module_name: &'a str,
    files: Vec<FileView<'a>>,
    notes: String,
}

#[derive(Serialize)]
struct FileView<'a> {
    path: &'a str,
    exports: Vec<ExportView<'a>>,
    imports: Vec<ImportView<'a>>,
    calls: Vec<PairView<'a>>,
    events: Vec<EventView<'a>>,
}

#[derive(Serialize)]
struct ExportView<'a> {
    symbol: &'a str,
    kind: &'static str,
}

#[derive(Serialize)]
struct ImportView<'a> {
    source: &'a str,
    symbols: String,
}

#[derive(Serialize)]
struct PairView<'a> {
    caller: &'a str,
    callee: &'a str,
}

#[derive(Serialize)]
struct EventView<'a> {
    event: &'a str,
    kind: &'a str,
}

/// Outcome of a render run
#[derive(Debug, Clone, Default)]
pub struct RenderSummary {
    pub documents_written: usize,
    pub missing_stores: Vec<String>,
}

/// Renders trace stores into their Markdown documents
pub struct DocRenderer {
    tera: Tera,
    protector: EditProtector,
    paths: TracePaths,
}

impl DocRenderer {
    pub fn new(paths: TracePaths) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("header.md", HEADER_TEMPLATE),
            ("high_level.md", HIGH_LEVEL_TEMPLATE),
            ("low_level.md", LOW_LEVEL_TEMPLATE),
        ])?;
        tera.register_filter("cell", cell_filter);

        Ok(Self {
            tera,
            protector: EditProtector::new()?,
            paths,
        })
    }

    pub fn render_high_level(&self, trace: &HighLevelTrace) -> Result<String> {
        let view = HighLevelView {
            trace_id: HIGH_LEVEL_TRACE_ID,
            version: trace.version,
            last_generated: format_timestamp(&trace.last_generated),
            generated_by: &trace.generated_by,
            store_file: self.display_path(&self.paths.high_level_store()),
            modules: trace
                .modules
                .iter()
                .map(|m| ModuleView {
                    id: &m.id,
                    name: &m.name,
                    description: &m.description,
                    dependencies: m.dependencies.iter().map(EdgeView::from).collect(),
                    dependents: m.dependents.iter().map(EdgeView::from).collect(),
                })
                .collect(),
            notes: self.notes_placeholder(),
        };
        Ok(self
            .tera
            .render("high_level.md", &Context::from_serialize(&view)?)?)
    }

    pub fn render_low_level(&self, trace: &LowLevelTrace, module_name: &str) -> Result<String> {
        let view = LowLevelView {
            trace_id: &trace.module_id,
            version: trace.version,
            last_generated: format_timestamp(&trace.last_generated),
            generated_by: &trace.generated_by,
            store_file: self.display_path(&self.paths.low_level_store(&trace.module_id)),
            module_name,
            files: trace
                .files
                .iter()
                .map(|f| FileView {
                    path: &f.file_path,
                    exports: f
                        .exports
                        .iter()
                        .map(|e| ExportView {
                            symbol: &e.symbol,
                            kind: e.kind.as_str(),
                        })
                        .collect(),
                    imports: f
                        .imports
                        .iter()
                        .map(|i| ImportView {
                            source: &i.source,
                            symbols: join_symbols(&i.symbols),
                        })
                        .collect(),
                    calls: f
                        .calls
                        .iter()
                        .map(|c| PairView {
                            caller: &c.caller,
                            callee: &c.callee,
                        })
                        .collect(),
                    events: f
                        .events
                        .iter()
                        .map(|e| EventView {
                            event: &e.event,
                            kind: &e.kind,
                        })
                        .collect(),
                })
                .collect(),
            notes: self.notes_placeholder(),
        };
        Ok(self
            .tera
            .render("low_level.md", &Context::from_serialize(&view)?)?)
    }

    /// Write a rendered document, keeping the protected notes of any existing copy
    pub fn write_document(&self, path: &Path, rendered: &str) -> Result<()> {
        let content = if path.exists() {
            let existing = std::fs::read_to_string(path)?;
            self.protector.merge_with_existing(rendered, &existing)?
        } else {
            rendered.to_string()
        };
        write_atomic(path, content.as_bytes())
    }

    /// Render the high-level document and one or every low-level document
    pub fn render_all(&self, target: Option<&str>) -> Result<RenderSummary> {
        let config = ModuleConfig::load(&self.paths.module_config)?;
        if let Some(id) = target {
            if config.module(id).is_none() {
                return Err(ArchTraceError::ModuleNotFound(id.to_string()));
            }
        }

        let mut summary = RenderSummary::default();

        let high_level_store = self.paths.high_level_store();
        match read_store::<HighLevelTrace>(&high_level_store)? {
            Some(trace) => {
                let rendered = self.render_high_level(&trace)?;
                self.write_document(&self.paths.high_level_doc(), &rendered)?;
                summary.documents_written += 1;
            }
            None => summary
                .missing_stores
                .push(self.display_path(&high_level_store)),
        }

        for module in config
            .modules
            .iter()
            .filter(|m| target.map_or(true, |id| m.id == id))
        {
            let store = self.paths.low_level_store(&module.id);
            match read_store::<LowLevelTrace>(&store)? {
                Some(trace) => {
                    let rendered = self.render_low_level(&trace, &module.name)?;
                    self.write_document(&self.paths.low_level_doc(&module.id), &rendered)?;
                    summary.documents_written += 1;
                }
                None => summary.missing_stores.push(self.display_path(&store)),
            }
        }

        info!("Rendered {} trace documents", summary.documents_written);
        Ok(summary)
    }

    fn notes_placeholder(&self) -> String {
        self.protector.protect_content(
            "Hand-written notes. This section is never synchronized back into the store.",
            Some(NOTES_LABEL),
        )
    }

    fn display_path(&self, path: &Path) -> String {
        self.paths
            .relative(path)
            .unwrap_or_else(|| path.display().to_string())
    }
}

/// Timestamp form used in document metadata
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn join_symbols(symbols: &[String]) -> String {
    if symbols.is_empty() {
        NO_SYMBOLS.to_string()
    } else {
        symbols.join(", ")
    }
}

/// Single-line table cell text with `|` escaped
pub fn escape_cell(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "\\|")
}

fn cell_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    Ok(Value::String(escape_cell(&text)))
}
