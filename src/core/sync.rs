// src/core/sync.rs
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::Result;
use super::differ::{reconcile_high_level, reconcile_low_level, FieldDiff, Reconciled};
use super::document::{DocumentMetadata, DocumentParser, ParseError};
use super::renderer::format_timestamp;
use super::trace::{
    read_store, same_generation, write_atomic, write_store, HighLevelTrace, LowLevelTrace,
    TracePaths, HIGH_LEVEL_TRACE_ID,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Apply document values even when the store was regenerated since rendering
    pub force: bool,
    /// Report without writing
    pub dry_run: bool,
}

/// A document edit applied (or, on a dry run, applicable) to a store
#[derive(Debug, Clone, PartialEq)]
pub struct SyncChange {
    pub trace: String,
    pub entity: String,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: String,
}

/// A difference found after the store diverged from its document
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConflict {
    pub trace: String,
    pub entity: String,
    pub field: String,
    pub store_value: Option<String>,
    pub document_value: String,
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub changes: Vec<SyncChange>,
    pub errors: Vec<ParseError>,
    pub conflicts: Vec<SyncConflict>,
    /// Stores rewritten (or that would be, on a dry run)
    pub files_updated: usize,
    pub traces_checked: usize,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.conflicts.is_empty()
    }
}

/// Applies hand edits from trace documents back into their stores
pub struct SyncEngine {
    paths: TracePaths,
    parser: DocumentParser,
}

impl SyncEngine {
    pub fn new(paths: TracePaths) -> Result<Self> {
        Ok(Self {
            paths,
            parser: DocumentParser::new()?,
        })
    }

    /// Sync the high-level trace and every low-level trace that has both a
    /// store and a document
    pub fn sync_all(&self, options: SyncOptions) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        self.sync_high_level(options, &mut report)?;
        for module_id in self.low_level_ids()? {
            self.sync_low_level(&module_id, options, &mut report)?;
        }

        info!(
            "Sync checked {} traces: {} changes, {} conflicts, {} errors",
            report.traces_checked,
            report.changes.len(),
            report.conflicts.len(),
            report.errors.len()
        );
        Ok(report)
    }

    fn sync_high_level(&self, options: SyncOptions, report: &mut SyncReport) -> Result<()> {
        let store_path = self.paths.high_level_store();
        let doc_path = self.paths.high_level_doc();
        let Some((store, content)) =
            self.load_pair::<HighLevelTrace>(&store_path, &doc_path, report)?
        else {
            return Ok(());
        };

        let parsed = self
            .parser
            .parse_high_level(&self.display(&doc_path), &content);
        report.errors.extend(parsed.errors.iter().cloned());
        let reconciled = reconcile_high_level(&store, &parsed);

        self.settle(
            HIGH_LEVEL_TRACE_ID,
            &store.last_generated,
            &parsed.metadata,
            reconciled,
            &store_path,
            &doc_path,
            &content,
            options,
            report,
        )
    }

    fn sync_low_level(
        &self,
        module_id: &str,
        options: SyncOptions,
        report: &mut SyncReport,
    ) -> Result<()> {
        let store_path = self.paths.low_level_store(module_id);
        let doc_path = self.paths.low_level_doc(module_id);
        let Some((store, content)) =
            self.load_pair::<LowLevelTrace>(&store_path, &doc_path, report)?
        else {
            return Ok(());
        };

        let parsed = self.parser.parse_low_level(&self.display(&doc_path), &content);
        report.errors.extend(parsed.errors.iter().cloned());
        let reconciled = reconcile_low_level(&store, &parsed);

        self.settle(
            module_id,
            &store.last_generated,
            &parsed.metadata,
            reconciled,
            &store_path,
            &doc_path,
            &content,
            options,
            report,
        )
    }

    /// Turn differences into changes or conflicts and write what may be written
    #[allow(clippy::too_many_arguments)]
    fn settle<T: serde::Serialize>(
        &self,
        trace: &str,
        store_generated: &DateTime<Utc>,
        metadata: &DocumentMetadata,
        reconciled: Reconciled<T>,
        store_path: &Path,
        doc_path: &Path,
        content: &str,
        options: SyncOptions,
        report: &mut SyncReport,
    ) -> Result<()> {
        let diverged = metadata
            .last_generated
            .map_or(true, |generated| !same_generation(&generated, store_generated));

        if reconciled.diffs.is_empty() {
            debug!("{}: document matches store", trace);
            return Ok(());
        }

        if diverged && !options.force {
            warn!(
                "{}: store was regenerated after its document was rendered; {} differences left unapplied",
                trace,
                reconciled.diffs.len()
            );
            report
                .conflicts
                .extend(reconciled.diffs.into_iter().map(|d| conflict(trace, d)));
            return Ok(());
        }

        report
            .changes
            .extend(reconciled.diffs.into_iter().map(|d| change(trace, d)));
        report.files_updated += 1;

        if options.dry_run {
            return Ok(());
        }

        write_store(store_path, &reconciled.merged)?;
        if diverged {
            // Forced: the document now agrees with the store's generation.
            if let Some(stamped) = restamp(content, store_generated) {
                write_atomic(doc_path, stamped.as_bytes())?;
            }
        }
        info!("{}: applied document edits to {}", trace, self.display(store_path));
        Ok(())
    }

    /// Read a store and its document; `None` unless both exist and the store parses
    fn load_pair<T: serde::de::DeserializeOwned>(
        &self,
        store_path: &Path,
        doc_path: &Path,
        report: &mut SyncReport,
    ) -> Result<Option<(T, String)>> {
        if !doc_path.exists() {
            return Ok(None);
        }
        let store = match read_store::<T>(store_path) {
            Ok(Some(store)) => store,
            Ok(None) => return Ok(None),
            Err(e) => {
                report.errors.push(ParseError {
                    document: self.display(store_path),
                    line: 0,
                    message: e.to_string(),
                });
                return Ok(None);
            }
        };
        let content = std::fs::read_to_string(doc_path)?;
        report.traces_checked += 1;
        Ok(Some((store, content)))
    }

    /// Module ids with a low-level store, sorted
    fn low_level_ids(&self) -> Result<Vec<String>> {
        let dir = self.paths.low_level_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<String> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().map_or(false, |ext| ext == "json"))
            .filter_map(|path| stem(&path))
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn display(&self, path: &Path) -> String {
        self.paths
            .relative(path)
            .unwrap_or_else(|| path.display().to_string())
    }
}

fn stem(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    (!stem.starts_with('.')).then(|| stem.to_string())
}

fn restamp(content: &str, generated: &DateTime<Utc>) -> Option<String> {
    let mut found = false;
    let lines: Vec<String> = content
        .lines()
        .map(|line| {
            if !found && line.trim_start().starts_with("Last-Generated:") {
                found = true;
                format!("Last-Generated: {}", format_timestamp(generated))
            } else {
                line.to_string()
            }
        })
        .collect();
    found.then(|| {
        let mut stamped = lines.join("\n");
        if content.ends_with('\n') {
            stamped.push('\n');
        }
        stamped
    })
}

fn change(trace: &str, diff: FieldDiff) -> SyncChange {
    SyncChange {
        trace: trace.to_string(),
        entity: diff.entity,
        field: diff.field,
        old_value: diff.store_value,
        new_value: diff.document_value,
    }
}

fn conflict(trace: &str, diff: FieldDiff) -> SyncConflict {
    SyncConflict {
        trace: trace.to_string(),
        entity: diff.entity,
        field: diff.field,
        store_value: diff.store_value,
        document_value: diff.document_value,
    }
}
