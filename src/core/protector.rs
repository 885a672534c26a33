use regex::Regex;

use crate::error::{ArchTraceError, Result};

/// Label of the freeform notes region every trace document carries
pub const NOTES_LABEL: &str = "Notes";

const END_MARKER: &str = "<!-- /PROTECTED -->";

/// A hand-written region of a trace document that regeneration must keep
/// and sync must never read
#[derive(Debug, Clone, PartialEq)]
pub struct ProtectedRegion {
    /// Label from the start marker, if any
    pub label: Option<String>,

    /// Text between the markers
    pub content: String,

    /// 1-indexed line numbers of the start and end markers
    pub line_range: (usize, usize),
}

/// Finds protected regions and carries them across re-renders
pub struct EditProtector {
    protected_start_regex: Regex,
    protected_end_regex: Regex,
}

impl EditProtector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            protected_start_regex: Regex::new(r"<!--\s*PROTECTED(?::\s*(.+?))?\s*-->")?,
            protected_end_regex: Regex::new(r"<!--\s*/PROTECTED\s*-->")?,
        })
    }

    /// Extract all protected regions from a document
    pub fn extract_protected_regions(&self, content: &str) -> Result<Vec<ProtectedRegion>> {
        let mut regions = Vec::new();
        let lines: Vec<&str> = content.lines().collect();
        let mut i = 0;

        while i < lines.len() {
            let Some(caps) = self.protected_start_regex.captures(lines[i]) else {
                i += 1;
                continue;
            };
            let label = caps.get(1).map(|m| m.as_str().trim().to_string());

            let end = (i + 1..lines.len())
                .find(|&j| self.protected_end_regex.is_match(lines[j]))
                .ok_or_else(|| {
                    ArchTraceError::ProtectedRegion(format!(
                        "Unclosed protected region starting at line {}",
                        i + 1
                    ))
                })?;

            regions.push(ProtectedRegion {
                label,
                content: lines[i + 1..end].join("\n"),
                line_range: (i + 1, end + 1),
            });
            i = end + 1;
        }

        Ok(regions)
    }

    /// Lines (0-indexed) that sit inside protected regions, markers included
    pub fn protected_lines(&self, content: &str) -> Result<Vec<bool>> {
        let mut mask = vec![false; content.lines().count()];
        for region in self.extract_protected_regions(content)? {
            for line in region.line_range.0..=region.line_range.1 {
                if let Some(slot) = mask.get_mut(line - 1) {
                    *slot = true;
                }
            }
        }
        Ok(mask)
    }

    /// Carry protected regions of `existing` into freshly rendered `new_content`.
    ///
    /// Regions are matched by label; a region with no counterpart in the new
    /// content is appended at the end so hand-written text is never lost.
    pub fn merge_with_existing(&self, new_content: &str, existing: &str) -> Result<String> {
        let preserved = self.extract_protected_regions(existing)?;
        if preserved.is_empty() {
            return Ok(new_content.to_string());
        }

        let mut result = new_content.to_string();
        for region in &preserved {
            let start_marker = start_marker(region.label.as_deref());

            match result.find(&start_marker) {
                Some(start) => {
                    let Some(offset) = result[start..].find(END_MARKER) else {
                        continue;
                    };
                    let end = start + offset + END_MARKER.len();
                    result.replace_range(start..end, &self.format_protected_region(region));
                }
                None => {
                    result.push_str("\n\n");
                    result.push_str(&self.format_protected_region(region));
                    result.push('\n');
                }
            }
        }

        Ok(result)
    }

    /// Insert protected region markers around content
    pub fn protect_content(&self, content: &str, label: Option<&str>) -> String {
        format!("{}\n{}\n{}", start_marker(label), content, END_MARKER)
    }

    fn format_protected_region(&self, region: &ProtectedRegion) -> String {
        self.protect_content(&region.content, region.label.as_deref())
    }
}

fn start_marker(label: Option<&str>) -> String {
    match label {
        Some(label) => format!("<!-- PROTECTED: {} -->", label),
        None => "<!-- PROTECTED -->".to_string(),
    }
}
