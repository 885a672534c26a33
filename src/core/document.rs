// src/core/document.rs
//! Reads the structured sections of a trace document back into data.
//!
//! Freeform sections and protected regions are skipped entirely. Malformed
//! rows are reported as [`ParseError`]s and dropped; the rest of the
//! document is still parsed. Sections that lost rows this way are marked
//! damaged so their tables are not taken as complete.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::error::Result;
use super::protector::EditProtector;
use super::renderer::{FREEFORM_MARKER, NO_SYMBOLS};
use super::trace::{
    CallEntry, Edge, EventEntry, ExportEntry, ExportKind, FileTrace, ImportEntry,
};

/// A structural problem in a document or its store
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub document: String,
    /// 1-indexed; 0 when the problem concerns the whole file
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.line == 0 {
            write!(f, "{}: {}", self.document, self.message)
        } else {
            write!(f, "{}:{}: {}", self.document, self.line, self.message)
        }
    }
}

/// Values from the metadata comment at the top of a document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMetadata {
    pub trace: Option<String>,
    pub version: Option<u64>,
    pub last_generated: Option<DateTime<Utc>>,
    pub generated_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedModule {
    pub id: String,
    pub name: String,
    /// `None` when the document has no description line for the module
    pub description: Option<String>,
    pub dependencies: Vec<Edge>,
    pub dependents: Vec<Edge>,
    /// A row of this section was rejected
    pub damaged: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedHighLevel {
    pub metadata: DocumentMetadata,
    pub modules: Vec<ParsedModule>,
    pub errors: Vec<ParseError>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedLowLevel {
    pub metadata: DocumentMetadata,
    pub files: Vec<FileTrace>,
    /// Paths of file sections with a rejected row
    pub damaged_files: BTreeSet<String>,
    pub errors: Vec<ParseError>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Table {
    Dependencies,
    Dependents,
    Exports,
    Imports,
    Calls,
    Events,
}

impl Table {
    fn from_heading(heading: &str) -> Option<Self> {
        match heading.trim().to_ascii_lowercase().as_str() {
            "dependencies" => Some(Table::Dependencies),
            "dependents" => Some(Table::Dependents),
            "exports" => Some(Table::Exports),
            "imports" => Some(Table::Imports),
            "function calls" | "calls" => Some(Table::Calls),
            "events" => Some(Table::Events),
            _ => None,
        }
    }

    /// Column names; a `true` flag marks a column that may be blank
    fn columns(&self) -> &'static [(&'static str, bool)] {
        match self {
            Table::Dependencies | Table::Dependents => {
                &[("Target", false), ("Relationship", false), ("Description", true)]
            }
            Table::Exports => &[("Symbol", false), ("Type", false)],
            Table::Imports => &[("Source", false), ("Symbols", true)],
            Table::Calls => &[("Caller", false), ("Callee", false)],
            Table::Events => &[("Event", false), ("Kind", false)],
        }
    }
}

struct TableState {
    table: Table,
    header_seen: bool,
}

struct PendingModule {
    line: usize,
    name: String,
    id: Option<String>,
    description: Option<String>,
    dependencies: Vec<Edge>,
    dependents: Vec<Edge>,
    damaged: bool,
}

/// Parses rendered trace documents
pub struct DocumentParser {
    protector: EditProtector,
}

impl DocumentParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            protector: EditProtector::new()?,
        })
    }

    pub fn parse_high_level(&self, document: &str, content: &str) -> ParsedHighLevel {
        let mut errors = Vec::new();
        let (metadata, lines) = self.structured_lines(document, content, &mut errors);

        let mut modules = Vec::new();
        let mut current: Option<PendingModule> = None;
        let mut table: Option<TableState> = None;

        for (number, line) in lines {
            let trimmed = line.trim();

            if let Some(heading) = trimmed.strip_prefix("## ") {
                finish_module(current.take(), document, &mut modules, &mut errors);
                table = None;
                if let Some(name) = heading.strip_prefix("Module:") {
                    current = Some(PendingModule {
                        line: number,
                        name: unescape(name.trim()),
                        id: None,
                        description: None,
                        dependencies: Vec::new(),
                        dependents: Vec::new(),
                        damaged: false,
                    });
                }
                continue;
            }

            if let Some(heading) = trimmed.strip_prefix("### ") {
                table = Table::from_heading(heading).map(|table| TableState {
                    table,
                    header_seen: false,
                });
                continue;
            }

            let Some(module) = current.as_mut() else {
                continue;
            };

            if let Some(id) = trimmed.strip_prefix("**ID**:") {
                let id = id.trim();
                if id.is_empty() {
                    errors.push(error(document, number, "blank module ID"));
                } else {
                    module.id = Some(id.to_string());
                }
                continue;
            }

            if let Some(description) = trimmed.strip_prefix("**Description**:") {
                module.description = Some(unescape(description.trim()));
                continue;
            }

            let before = errors.len();
            let cells = table_cells(trimmed, table.as_mut(), document, number, &mut errors);
            module.damaged |= errors.len() > before;
            let Some(cells) = cells else {
                continue;
            };
            let Some(state) = table.as_ref() else {
                continue;
            };
            let edges = match state.table {
                Table::Dependencies => &mut module.dependencies,
                Table::Dependents => &mut module.dependents,
                _ => continue,
            };
            edges.push(Edge {
                target_id: cells[0].clone(),
                relationship_type: cells[1].clone(),
                description: cells[2].clone(),
            });
        }
        finish_module(current.take(), document, &mut modules, &mut errors);

        ParsedHighLevel {
            metadata,
            modules,
            errors,
        }
    }

    pub fn parse_low_level(&self, document: &str, content: &str) -> ParsedLowLevel {
        let mut errors = Vec::new();
        let (metadata, lines) = self.structured_lines(document, content, &mut errors);

        let mut files: Vec<FileTrace> = Vec::new();
        let mut damaged_files = BTreeSet::new();
        let mut current: Option<FileTrace> = None;
        let mut table: Option<TableState> = None;

        for (number, line) in lines {
            let trimmed = line.trim();

            if let Some(heading) = trimmed.strip_prefix("## ") {
                files.extend(current.take());
                table = None;
                if let Some(path) = heading.strip_prefix("File:") {
                    let path = path.trim();
                    if path.is_empty() {
                        errors.push(error(document, number, "file section without a path"));
                    } else {
                        current = Some(FileTrace::empty(path));
                    }
                }
                continue;
            }

            if let Some(heading) = trimmed.strip_prefix("### ") {
                table = Table::from_heading(heading).map(|table| TableState {
                    table,
                    header_seen: false,
                });
                continue;
            }

            let Some(file) = current.as_mut() else {
                continue;
            };
            let before = errors.len();
            let cells = table_cells(trimmed, table.as_mut(), document, number, &mut errors);
            if errors.len() > before {
                damaged_files.insert(file.file_path.clone());
            }
            let Some(cells) = cells else {
                continue;
            };
            let Some(state) = table.as_ref() else {
                continue;
            };

            match state.table {
                Table::Exports => match ExportKind::parse(&cells[1]) {
                    Some(kind) => file.exports.push(ExportEntry {
                        symbol: cells[0].clone(),
                        kind,
                    }),
                    None => {
                        errors.push(error(
                            document,
                            number,
                            &format!("unknown export type '{}'", cells[1]),
                        ));
                        damaged_files.insert(file.file_path.clone());
                    }
                },
                Table::Imports => file.imports.push(ImportEntry {
                    source: cells[0].clone(),
                    symbols: split_symbols(&cells[1]),
                }),
                Table::Calls => file.calls.push(CallEntry {
                    caller: cells[0].clone(),
                    callee: cells[1].clone(),
                }),
                Table::Events => file.events.push(EventEntry {
                    event: cells[0].clone(),
                    kind: cells[1].clone(),
                }),
                Table::Dependencies | Table::Dependents => {}
            }
        }
        files.extend(current.take());

        ParsedLowLevel {
            metadata,
            files,
            damaged_files,
            errors,
        }
    }

    /// Metadata plus every line that belongs to a structured section
    fn structured_lines<'a>(
        &self,
        document: &str,
        content: &'a str,
        errors: &mut Vec<ParseError>,
    ) -> (DocumentMetadata, Vec<(usize, &'a str)>) {
        let lines: Vec<&str> = content.lines().collect();
        let protected = match self.protector.protected_lines(content) {
            Ok(mask) => mask,
            Err(e) => {
                errors.push(error(document, 1, &e.to_string()));
                vec![false; lines.len()]
            }
        };

        let mut metadata = DocumentMetadata::default();
        let mut structured = Vec::new();
        let mut metadata_seen = false;
        let mut heading_seen = false;
        let mut in_freeform = false;

        let mut i = 0;
        while i < lines.len() {
            if protected.get(i).copied().unwrap_or(false) {
                i += 1;
                continue;
            }
            let trimmed = lines[i].trim();

            if !metadata_seen && !heading_seen && trimmed == "<!--" {
                metadata_seen = true;
                let mut j = i + 1;
                while j < lines.len() && lines[j].trim() != "-->" {
                    read_metadata_line(lines[j], j + 1, document, &mut metadata, errors);
                    j += 1;
                }
                i = j + 1;
                continue;
            }

            if trimmed.starts_with("# ") {
                heading_seen = true;
            } else if let Some(heading) = trimmed.strip_prefix("## ") {
                heading_seen = true;
                in_freeform = heading.contains(FREEFORM_MARKER);
            }

            if !in_freeform {
                structured.push((i + 1, lines[i]));
            }
            i += 1;
        }

        (metadata, structured)
    }
}

fn read_metadata_line(
    line: &str,
    number: usize,
    document: &str,
    metadata: &mut DocumentMetadata,
    errors: &mut Vec<ParseError>,
) {
    let Some((key, value)) = line.split_once(':') else {
        return;
    };
    let value = value.trim();
    match key.trim() {
        "Trace" => metadata.trace = Some(value.to_string()),
        "Version" => match value.parse() {
            Ok(version) => metadata.version = Some(version),
            Err(_) => errors.push(error(document, number, &format!("invalid version '{}'", value))),
        },
        "Last-Generated" => match DateTime::parse_from_rfc3339(value) {
            Ok(timestamp) => metadata.last_generated = Some(timestamp.with_timezone(&Utc)),
            Err(_) => errors.push(error(
                document,
                number,
                &format!("invalid Last-Generated timestamp '{}'", value),
            )),
        },
        "Generated-By" => metadata.generated_by = Some(value.to_string()),
        _ => {}
    }
}

fn finish_module(
    pending: Option<PendingModule>,
    document: &str,
    modules: &mut Vec<ParsedModule>,
    errors: &mut Vec<ParseError>,
) {
    let Some(pending) = pending else {
        return;
    };
    match pending.id {
        Some(id) => modules.push(ParsedModule {
            id,
            name: pending.name,
            description: pending.description,
            dependencies: pending.dependencies,
            dependents: pending.dependents,
            damaged: pending.damaged,
        }),
        None => errors.push(error(
            document,
            pending.line,
            &format!("module section '{}' has no **ID** line; skipped", pending.name),
        )),
    }
}

/// Cells of a data row in the current table; `None` for header, separator,
/// non-table lines and rejected rows
fn table_cells(
    line: &str,
    state: Option<&mut TableState>,
    document: &str,
    number: usize,
    errors: &mut Vec<ParseError>,
) -> Option<Vec<String>> {
    if !line.starts_with('|') {
        return None;
    }
    let state = state?;
    let cells = split_row(line);

    if !state.header_seen {
        state.header_seen = true;
        return None;
    }
    if is_separator(&cells) {
        return None;
    }

    let columns = state.table.columns();
    if cells.len() != columns.len() {
        errors.push(error(
            document,
            number,
            &format!("expected {} columns, found {}", columns.len(), cells.len()),
        ));
        return None;
    }
    for ((name, optional), cell) in columns.iter().zip(&cells) {
        if !optional && cell.is_empty() {
            errors.push(error(document, number, &format!("blank {} cell", name)));
            return None;
        }
    }
    Some(cells)
}

/// Split a table row on unescaped `|`, unescaping and trimming each cell
pub fn split_row(line: &str) -> Vec<String> {
    let mut inner = line.trim();
    inner = inner.strip_prefix('|').unwrap_or(inner);
    if inner.ends_with('|') && !inner.ends_with("\\|") {
        inner = &inner[..inner.len() - 1];
    }

    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'|') => {
                cell.push('|');
                chars.next();
            }
            '|' => cells.push(std::mem::take(&mut cell)),
            _ => cell.push(c),
        }
    }
    cells.push(cell);
    cells.into_iter().map(|c| c.trim().to_string()).collect()
}

fn is_separator(cells: &[String]) -> bool {
    cells
        .iter()
        .all(|c| !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':' | ' ')))
}

fn split_symbols(cell: &str) -> Vec<String> {
    if cell.is_empty() || cell == NO_SYMBOLS {
        return Vec::new();
    }
    cell.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn unescape(text: &str) -> String {
    text.replace("\\|", "|")
}

fn error(document: &str, line: usize, message: &str) -> ParseError {
    ParseError {
        document: document.to_string(),
        line,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HIGH_LEVEL: &str = r#"<!--
Trace: high-level
Version: 3
Last-Generated: 2026-10-16T09:30:00.250Z
Generated-By: archtrace v0.1.0
-->
# High-Level Architecture Trace

## Module: API

**ID**: api
**Description**: HTTP \| gRPC surface

### Dependencies

| Target | Relationship | Description |
|--------|--------------|-------------|
| core | uses |  |
| store | reads | too | many |
|  | uses | missing target |

### Dependents

| Target | Relationship | Description |
|--------|--------------|-------------|

## Module: Orphan

**Description**: no id here

## Notes (freeform)

<!-- PROTECTED: Notes -->
## Module: Fake
**ID**: fake
<!-- /PROTECTED -->
"#;

    #[test]
    fn parses_metadata_and_modules() {
        let parser = DocumentParser::new().unwrap();
        let parsed = parser.parse_high_level("high-level.md", HIGH_LEVEL);

        assert_eq!(parsed.metadata.trace.as_deref(), Some("high-level"));
        assert_eq!(parsed.metadata.version, Some(3));
        assert_eq!(
            parsed.metadata.last_generated.map(|t| t.timestamp_millis() % 1000),
            Some(250)
        );

        assert_eq!(parsed.modules.len(), 1);
        let api = &parsed.modules[0];
        assert_eq!(api.id, "api");
        assert_eq!(api.name, "API");
        assert_eq!(api.description.as_deref(), Some("HTTP | gRPC surface"));
        assert_eq!(api.dependencies.len(), 1);
        assert_eq!(api.dependencies[0].target_id, "core");
        assert_eq!(api.dependencies[0].description, "");
        assert!(api.dependents.is_empty());
        assert!(api.damaged);
    }

    #[test]
    fn malformed_rows_and_missing_ids_are_reported() {
        let parser = DocumentParser::new().unwrap();
        let parsed = parser.parse_high_level("high-level.md", HIGH_LEVEL);

        let messages: Vec<(usize, &str)> = parsed
            .errors
            .iter()
            .map(|e| (e.line, e.message.as_str()))
            .collect();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], (19, "expected 3 columns, found 4"));
        assert_eq!(messages[1], (20, "blank Target cell"));
        assert!(messages[2].1.contains("'Orphan' has no **ID** line"));
    }

    #[test]
    fn parses_low_level_tables() {
        let content = r#"<!--
Trace: core
Version: 1
Last-Generated: 2026-10-16T09:30:00.000Z
Generated-By: archtrace v0.1.0
-->
# Low-Level Trace: Core

## File: src/a.ts

### Exports

| Symbol | Type |
|--------|------|
| a | const |
| b | widget |

### Imports

| Source | Symbols |
|--------|---------|
| ./b | b, c (default) |
| ./polyfill | - |

### Function Calls

| Caller | Callee |
|--------|--------|

### Events

| Event | Kind |
|-------|------|

## File: src/b.ts

### Exports

| Symbol | Type |
|--------|------|
| b | function |

## Notes (freeform)

| not | a | table |
"#;
        let parser = DocumentParser::new().unwrap();
        let parsed = parser.parse_low_level("low-level/core.md", content);

        assert_eq!(parsed.files.len(), 2);
        let a = &parsed.files[0];
        assert_eq!(a.file_path, "src/a.ts");
        assert_eq!(
            a.exports,
            vec![ExportEntry {
                symbol: "a".to_string(),
                kind: ExportKind::Const
            }]
        );
        assert_eq!(a.imports[0].symbols, vec!["b".to_string(), "c (default)".to_string()]);
        assert!(a.imports[1].symbols.is_empty());
        assert_eq!(parsed.files[1].exports[0].kind, ExportKind::Function);

        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.errors[0].message.contains("unknown export type 'widget'"));
        assert_eq!(parsed.errors[0].line, 16);
        assert!(parsed.damaged_files.contains("src/a.ts"));
        assert!(!parsed.damaged_files.contains("src/b.ts"));
    }

    #[test]
    fn escaped_pipes_stay_inside_cells() {
        assert_eq!(
            split_row("| a \\| b | c |"),
            vec!["a | b".to_string(), "c".to_string()]
        );
        assert_eq!(split_row("| x |  |"), vec!["x".to_string(), String::new()]);
    }

    #[test]
    fn missing_metadata_leaves_timestamp_empty() {
        let parser = DocumentParser::new().unwrap();
        let parsed = parser.parse_low_level("x.md", "# Low-Level Trace: X\n\n## File: a.ts\n");
        assert_eq!(parsed.metadata.last_generated, None);
        assert_eq!(parsed.files, vec![FileTrace::empty("a.ts")]);
    }
}
