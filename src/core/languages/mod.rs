//! Language-specific source analyzers
//!
//! Each language gets its own module behind the same `SourceAnalyzer`
//! contract, so a lexical analyzer can later be replaced by a syntax-tree
//! based one without touching trace generation, rendering or sync.

mod typescript;

pub use typescript::TypeScriptAnalyzer;

use super::trace::{ExportEntry, ImportEntry};

/// Exported and imported symbols recovered from one source file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileAnalysis {
    pub exports: Vec<ExportEntry>,
    pub imports: Vec<ImportEntry>,
}

/// Trait that all language analyzers must implement
pub trait SourceAnalyzer: Send + Sync {
    /// Extract exports and imports from source text. Never fails; unrecognized
    /// input yields an empty analysis.
    fn analyze(&self, source: &str) -> FileAnalysis;

    /// Get the file extensions this analyzer handles
    fn file_extensions(&self) -> &[&str];

    /// Get the language name
    fn language_name(&self) -> &str;
}
