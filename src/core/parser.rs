use std::path::Path;

use ignore::WalkBuilder;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::error::{ArchTraceError, Result};
use super::languages::{FileAnalysis, SourceAnalyzer, TypeScriptAnalyzer};
use super::trace::{normalize_relative, FileTrace};

/// Multi-language source scanner that delegates to language-specific analyzers
pub struct CodeParser {
    config: AnalysisConfig,
    analyzers: Vec<Box<dyn SourceAnalyzer>>,
}

impl CodeParser {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let analyzers: Vec<Box<dyn SourceAnalyzer>> = vec![Box::new(TypeScriptAnalyzer::new()?)];

        Ok(Self {
            config: config.clone(),
            analyzers,
        })
    }

    /// Every file under `root`, as sorted `/`-separated relative paths.
    ///
    /// Honors `.gitignore` and skips the configured directories.
    pub fn list_files(&self, root: &Path) -> Result<Vec<String>> {
        let skip_dirs = self.config.skip_dirs.clone();
        let walker = WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(true)
            .require_git(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().map_or(false, |t| t.is_dir());
                !(is_dir
                    && entry.depth() > 0
                    && skip_dirs.iter().any(|d| entry.file_name() == d.as_str()))
            })
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| ArchTraceError::FileSystem(e.to_string()))?;
            if !entry.file_type().map_or(false, |t| t.is_file()) {
                continue;
            }
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            if let Some(relative) = normalize_relative(relative) {
                files.push(relative);
            }
        }

        files.sort();
        Ok(files)
    }

    /// Analyze one project file into its trace entry.
    ///
    /// Unreadable, oversized or non-UTF-8 files yield an empty entry.
    pub fn trace_file(&self, root: &Path, relative_path: &str) -> FileTrace {
        let analysis = self.analyze_file(&root.join(relative_path));
        FileTrace {
            file_path: relative_path.to_string(),
            exports: analysis.exports,
            imports: analysis.imports,
            calls: Vec::new(),
            events: Vec::new(),
        }
    }

    fn analyze_file(&self, path: &Path) -> FileAnalysis {
        let Some(analyzer) = self.analyzer_for(path) else {
            return FileAnalysis::default();
        };

        match std::fs::metadata(path) {
            Ok(metadata) if metadata.len() > self.config.max_file_size => {
                debug!("Skipping {}: exceeds maximum size limit", path.display());
                return FileAnalysis::default();
            }
            Err(e) => {
                debug!("Skipping {}: {}", path.display(), e);
                return FileAnalysis::default();
            }
            _ => {}
        }

        match std::fs::read_to_string(path) {
            Ok(source) => analyzer.analyze(&source),
            Err(e) => {
                debug!("Skipping {}: {}", path.display(), e);
                FileAnalysis::default()
            }
        }
    }

    fn analyzer_for(&self, path: &Path) -> Option<&dyn SourceAnalyzer> {
        let extension = path.extension().and_then(|ext| ext.to_str())?;
        self.analyzers
            .iter()
            .find(|a| a.file_extensions().contains(&extension))
            .map(|a| a.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_sorted_files_and_skips_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/b")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::write(root.join("src/b/z.ts"), "").unwrap();
        std::fs::write(root.join("src/a.ts"), "").unwrap();
        std::fs::write(root.join("node_modules/pkg/index.js"), "").unwrap();

        let parser = CodeParser::new(&AnalysisConfig::default()).unwrap();
        let files = parser.list_files(root).unwrap();
        assert_eq!(files, vec!["src/a.ts".to_string(), "src/b/z.ts".to_string()]);
    }

    #[test]
    fn unreadable_and_foreign_files_degrade_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("binary.ts"), [0xff, 0xfe, 0x00, 0x81]).unwrap();
        std::fs::write(root.join("notes.md"), "export function fake() {}").unwrap();

        let parser = CodeParser::new(&AnalysisConfig::default()).unwrap();
        assert_eq!(parser.trace_file(root, "binary.ts"), FileTrace::empty("binary.ts"));
        assert_eq!(parser.trace_file(root, "notes.md"), FileTrace::empty("notes.md"));
        assert_eq!(parser.trace_file(root, "missing.ts"), FileTrace::empty("missing.ts"));
    }

    #[test]
    fn oversized_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.ts"), "export const big = 1;").unwrap();
        let config = AnalysisConfig {
            max_file_size: 4,
            ..AnalysisConfig::default()
        };
        let parser = CodeParser::new(&config).unwrap();
        assert!(parser.trace_file(dir.path(), "big.ts").exports.is_empty());
    }
}
