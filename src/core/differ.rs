// src/core/differ.rs
//! Field-level reconciliation of a parsed document against its store.
//!
//! Each function returns the store as it would look with the document
//! applied, plus every difference found. Within a module or file section
//! present in the document, each table ends up with exactly the document's
//! rows, so deleted rows are reported as removals. Sections the document
//! omits, and tables of damaged sections, keep their store rows.

use super::document::{ParsedHighLevel, ParsedLowLevel};
use super::renderer::join_symbols;
use super::trace::{
    CallEntry, Edge, EventEntry, ExportEntry, FileTrace, HighLevelTrace, ImportEntry,
    LowLevelTrace, ModuleNode,
};

/// Document value reported for a store row the document no longer has
pub const REMOVED: &str = "(removed)";

/// One disagreement between store and document
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDiff {
    pub entity: String,
    pub field: String,
    /// `None` when the entity does not exist in the store yet
    pub store_value: Option<String>,
    pub document_value: String,
}

impl FieldDiff {
    pub fn is_addition(&self) -> bool {
        self.store_value.is_none()
    }

    pub fn is_removal(&self) -> bool {
        self.store_value.is_some() && self.document_value == REMOVED
    }
}

/// Store with the document's edits applied, and what changed
#[derive(Debug, Clone)]
pub struct Reconciled<T> {
    pub merged: T,
    pub diffs: Vec<FieldDiff>,
}

/// Compare after collapsing whitespace runs
pub fn same_text(a: &str, b: &str) -> bool {
    a.split_whitespace().eq(b.split_whitespace())
}

pub fn reconcile_high_level(
    store: &HighLevelTrace,
    document: &ParsedHighLevel,
) -> Reconciled<HighLevelTrace> {
    let mut merged = store.clone();
    let mut diffs = Vec::new();

    for parsed in &document.modules {
        let entity = format!("module {}", parsed.id);

        let Some(module) = merged.module_mut(&parsed.id) else {
            diffs.push(FieldDiff {
                entity,
                field: "module".to_string(),
                store_value: None,
                document_value: parsed.name.clone(),
            });
            merged.modules.push(ModuleNode {
                id: parsed.id.clone(),
                name: parsed.name.clone(),
                description: parsed.description.clone().unwrap_or_default(),
                dependencies: parsed.dependencies.clone(),
                dependents: parsed.dependents.clone(),
            });
            continue;
        };

        if !same_text(&module.name, &parsed.name) {
            diffs.push(change(&entity, "name", &module.name, &parsed.name));
            module.name = parsed.name.clone();
        }
        if let Some(description) = &parsed.description {
            if !same_text(&module.description, description) {
                diffs.push(change(&entity, "description", &module.description, description));
                module.description = description.clone();
            }
        }

        let complete = !parsed.damaged;
        reconcile_entries(
            &format!("{} dependency", entity),
            &mut module.dependencies,
            &parsed.dependencies,
            &EDGE,
            complete,
            &mut diffs,
        );
        reconcile_entries(
            &format!("{} dependent", entity),
            &mut module.dependents,
            &parsed.dependents,
            &EDGE,
            complete,
            &mut diffs,
        );
    }

    Reconciled { merged, diffs }
}

pub fn reconcile_low_level(
    store: &LowLevelTrace,
    document: &ParsedLowLevel,
) -> Reconciled<LowLevelTrace> {
    let mut merged = store.clone();
    let mut diffs = Vec::new();

    for parsed in &document.files {
        let Some(file) = merged.files.iter_mut().find(|f| f.file_path == parsed.file_path) else {
            diffs.push(FieldDiff {
                entity: parsed.file_path.clone(),
                field: "file".to_string(),
                store_value: None,
                document_value: parsed.file_path.clone(),
            });
            merged.files.push(parsed.clone());
            continue;
        };
        let complete = !document.damaged_files.contains(&parsed.file_path);
        reconcile_file(file, parsed, complete, &mut diffs);
    }

    Reconciled { merged, diffs }
}

fn reconcile_file(
    file: &mut FileTrace,
    parsed: &FileTrace,
    complete: bool,
    diffs: &mut Vec<FieldDiff>,
) {
    let path = &parsed.file_path;
    let scope = |table: &str| format!("{} {}", path, table);
    reconcile_entries(
        &scope("export"),
        &mut file.exports,
        &parsed.exports,
        &EXPORT,
        complete,
        diffs,
    );
    reconcile_entries(
        &scope("import"),
        &mut file.imports,
        &parsed.imports,
        &IMPORT,
        complete,
        diffs,
    );
    reconcile_entries(
        &scope("call"),
        &mut file.calls,
        &parsed.calls,
        &CALL,
        complete,
        diffs,
    );
    reconcile_entries(
        &scope("event"),
        &mut file.events,
        &parsed.events,
        &EVENT,
        complete,
        diffs,
    );
}

/// How a table row is identified and which of its cells are editable
struct EntryShape<T> {
    key: fn(&T) -> String,
    fields: fn(&T) -> Vec<(&'static str, String)>,
}

const EDGE: EntryShape<Edge> = EntryShape {
    key: |e| e.target_id.clone(),
    fields: |e| {
        vec![
            ("relationshipType", e.relationship_type.clone()),
            ("description", e.description.clone()),
        ]
    },
};

const EXPORT: EntryShape<ExportEntry> = EntryShape {
    key: |e| e.symbol.clone(),
    fields: |e| vec![("type", e.kind.as_str().to_string())],
};

const IMPORT: EntryShape<ImportEntry> = EntryShape {
    key: |i| i.source.clone(),
    fields: |i| vec![("symbols", join_symbols(&i.symbols))],
};

const CALL: EntryShape<CallEntry> = EntryShape {
    key: |c| format!("{} -> {}", c.caller, c.callee),
    fields: |_| Vec::new(),
};

const EVENT: EntryShape<EventEntry> = EntryShape {
    key: |e| e.event.clone(),
    fields: |e| vec![("kind", e.kind.clone())],
};

/// Merge document rows into store rows.
///
/// Each store row pairs with at most one document row. A row equal to an
/// unpaired store row is a no-op. When its key occurs exactly once on each
/// side the store row is updated field by field; otherwise the row is
/// added. With a `complete` document table, unpaired store rows are
/// removed and the table follows the document's rows and order, keeping the
/// store's text for equal rows; otherwise unpaired rows stay.
fn reconcile_entries<T: Clone>(
    scope: &str,
    store: &mut Vec<T>,
    document: &[T],
    shape: &EntryShape<T>,
    complete: bool,
    diffs: &mut Vec<FieldDiff>,
) {
    let mut paired = vec![false; store.len()];
    let mut resolved = Vec::with_capacity(document.len());
    let mut updates = Vec::new();
    let mut additions = Vec::new();

    for row in document {
        let key = (shape.key)(row);
        let row_fields = (shape.fields)(row);

        let exact = (0..store.len()).find(|&i| {
            !paired[i]
                && (shape.key)(&store[i]) == key
                && same_fields(&(shape.fields)(&store[i]), &row_fields)
        });
        if let Some(index) = exact {
            paired[index] = true;
            resolved.push(store[index].clone());
            continue;
        }

        let store_matches: Vec<usize> = store
            .iter()
            .enumerate()
            .filter(|(_, s)| (shape.key)(s) == key)
            .map(|(i, _)| i)
            .collect();
        let document_matches = document.iter().filter(|d| (shape.key)(d) == key).count();
        let entity = format!("{} {}", scope, key);

        match (store_matches.as_slice(), document_matches) {
            ([index], 1) if !paired[*index] => {
                paired[*index] = true;
                let old_fields = (shape.fields)(&store[*index]);
                for ((field, old), (_, new)) in old_fields.iter().zip(&row_fields) {
                    if !same_text(old, new) {
                        diffs.push(change(&entity, field, old, new));
                    }
                }
                updates.push((*index, row.clone()));
                resolved.push(row.clone());
            }
            _ => {
                diffs.push(FieldDiff {
                    entity,
                    field: "entry".to_string(),
                    store_value: None,
                    document_value: describe(&key, &row_fields),
                });
                additions.push(row.clone());
                resolved.push(row.clone());
            }
        }
    }

    if complete {
        for (row, _) in store.iter().zip(&paired).filter(|(_, used)| !**used) {
            let key = (shape.key)(row);
            diffs.push(FieldDiff {
                entity: format!("{} {}", scope, key),
                field: "entry".to_string(),
                store_value: Some(describe(&key, &(shape.fields)(row))),
                document_value: REMOVED.to_string(),
            });
        }
        *store = resolved;
    } else {
        for (index, row) in updates {
            store[index] = row;
        }
        store.extend(additions);
    }
}

fn same_fields(a: &[(&'static str, String)], b: &[(&'static str, String)]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|((_, x), (_, y))| same_text(x, y))
}

fn describe(key: &str, fields: &[(&'static str, String)]) -> String {
    let mut parts = vec![key.to_string()];
    parts.extend(fields.iter().map(|(name, value)| format!("{}={}", name, value)));
    parts.join(", ")
}

fn change(entity: &str, field: &str, old: &str, new: &str) -> FieldDiff {
    FieldDiff {
        entity: entity.to_string(),
        field: field.to_string(),
        store_value: Some(old.to_string()),
        document_value: new.to_string(),
    }
}
