// src/core/reads.rs
//! Session-scoped record of which module traces were read, and when.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use super::modules::ModuleConfig;
use super::trace::{read_store, write_atomic, TracePaths};

/// Persisted read record; only the latest session is kept
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceReadRecord {
    pub session_id: String,
    #[serde(default)]
    pub reads: BTreeMap<String, DateTime<Utc>>,
}

/// Which modules a read of some path unlocks
#[derive(Debug, Clone, PartialEq)]
pub enum ReadTarget {
    /// The high-level trace covers every module
    AllModules,
    Module(String),
}

pub struct ReadTracker {
    paths: TracePaths,
}

impl ReadTracker {
    pub fn new(paths: TracePaths) -> Self {
        Self { paths }
    }

    /// Classify a read path. Documents and stores both count.
    pub fn classify(&self, path: &Path) -> Option<ReadTarget> {
        let relative = self.project_relative(path)?;

        let high_level = [self.paths.high_level_doc(), self.paths.high_level_store()];
        if high_level
            .iter()
            .any(|p| self.paths.relative(p).as_deref() == Some(relative.as_str()))
        {
            return Some(ReadTarget::AllModules);
        }

        let low_level_dir = self.paths.relative(&self.paths.low_level_dir())?;
        let name = relative.strip_prefix(&format!("{}/", low_level_dir))?;
        if name.contains('/') {
            return None;
        }
        let module_id = name
            .strip_suffix(".md")
            .or_else(|| name.strip_suffix(".json"))?;
        (!module_id.is_empty() && !module_id.starts_with('.'))
            .then(|| ReadTarget::Module(module_id.to_string()))
    }

    /// Stamp the modules unlocked by reading `path`; returns the stamped ids.
    ///
    /// A different session id starts a fresh record.
    pub fn record_read(
        &self,
        session_id: &str,
        path: &Path,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let Some(target) = self.classify(path) else {
            debug!("{} is not a trace; nothing recorded", path.display());
            return Ok(Vec::new());
        };

        let module_ids = match target {
            ReadTarget::Module(id) => vec![id],
            ReadTarget::AllModules => {
                match ModuleConfig::load_optional(&self.paths.module_config)? {
                    Some(config) => config.modules.into_iter().map(|m| m.id).collect(),
                    None => Vec::new(),
                }
            }
        };
        if module_ids.is_empty() {
            return Ok(module_ids);
        }

        let mut record = match self.load() {
            Some(record) if record.session_id == session_id => record,
            _ => TraceReadRecord {
                session_id: session_id.to_string(),
                reads: BTreeMap::new(),
            },
        };
        for id in &module_ids {
            record.reads.insert(id.clone(), now);
        }

        let mut bytes = serde_json::to_vec_pretty(&record)?;
        bytes.push(b'\n');
        write_atomic(&self.paths.read_tracking, &bytes)?;
        debug!("Session {} read {:?}", session_id, module_ids);
        Ok(module_ids)
    }

    /// Current record; missing or malformed records read as `None`
    pub fn load(&self) -> Option<TraceReadRecord> {
        match self.read_record() {
            Ok(record) => record,
            Err(e) => {
                warn!("Ignoring unreadable read record: {}", e);
                None
            }
        }
    }

    /// Current record; `Ok(None)` when none has been written yet
    pub fn read_record(&self) -> Result<Option<TraceReadRecord>> {
        read_store::<TraceReadRecord>(&self.paths.read_tracking)
    }

    /// When `module_id` was last read in `session_id`. An unreadable record
    /// is an error, distinct from "never read".
    pub fn last_read(&self, session_id: &str, module_id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .read_record()?
            .filter(|record| record.session_id == session_id)
            .and_then(|record| record.reads.get(module_id).copied()))
    }

    fn project_relative(&self, path: &Path) -> Option<String> {
        if path.is_absolute() {
            self.paths.relative(path)
        } else {
            self.paths.relative(&self.paths.project_root.join(path))
        }
    }
}
