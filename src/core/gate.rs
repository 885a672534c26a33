// src/core/gate.rs
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use super::modules::{ModuleConfig, ModuleMatcher};
use super::reads::ReadTracker;
use super::trace::TracePaths;

#[derive(Debug, Clone, PartialEq)]
pub enum BlockReason {
    NeverRead,
    Expired { age: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Allow,
    /// The file belongs to no module; edits pass with an advisory notice
    AllowUntraced { file: String },
    Block {
        module: String,
        /// Trace document to read before editing
        document: String,
        reason: BlockReason,
    },
}

impl GateDecision {
    pub fn is_blocked(&self) -> bool {
        matches!(self, GateDecision::Block { .. })
    }

    /// Text for the hook's error stream, if any
    pub fn message(&self, ttl: Duration) -> Option<String> {
        match self {
            GateDecision::Allow => None,
            GateDecision::AllowUntraced { file } => Some(format!(
                "Note: {} is not covered by any module trace.",
                file
            )),
            GateDecision::Block {
                module,
                document,
                reason: BlockReason::NeverRead,
            } => Some(format!(
                "Edit blocked: module '{}' has not been read in this session. Read {} before editing its files.",
                module, document
            )),
            GateDecision::Block {
                module,
                document,
                reason: BlockReason::Expired { age },
            } => Some(format!(
                "Edit blocked: module '{}' was last read {}s ago, past the {}s limit. Read {} again before editing its files.",
                module,
                age.num_seconds(),
                ttl.num_seconds(),
                document
            )),
        }
    }
}

/// Permits edits to traced files only while their module's trace was recently read
pub struct EnforcementGate {
    paths: TracePaths,
    tracker: ReadTracker,
    ttl: Duration,
}

impl EnforcementGate {
    pub fn new(paths: TracePaths, ttl: Duration) -> Self {
        Self {
            tracker: ReadTracker::new(paths.clone()),
            paths,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Decide whether `session_id` may edit `path` at `now`. Never fails:
    /// configuration problems allow the edit.
    pub fn check_edit(&self, session_id: &str, path: &Path, now: DateTime<Utc>) -> GateDecision {
        let config = match ModuleConfig::load_optional(&self.paths.module_config) {
            Ok(Some(config)) => config,
            Ok(None) => return GateDecision::Allow,
            Err(e) => {
                warn!("Module config unusable, allowing edit: {}", e);
                return GateDecision::Allow;
            }
        };
        let matcher = match ModuleMatcher::new(&config) {
            Ok(matcher) => matcher,
            Err(e) => {
                warn!("Module globs unusable, allowing edit: {}", e);
                return GateDecision::Allow;
            }
        };

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.paths.project_root.join(path)
        };
        let Some(relative) = self.paths.relative(&absolute) else {
            debug!("{} is outside the project", path.display());
            return GateDecision::Allow;
        };
        let Some(module) = matcher.owner(&relative) else {
            return GateDecision::AllowUntraced { file: relative };
        };

        let document = self
            .paths
            .relative(&self.paths.low_level_doc(module))
            .unwrap_or_else(|| self.paths.low_level_doc(module).display().to_string());

        let last_read = match self.tracker.last_read(session_id, module) {
            Ok(last_read) => last_read,
            Err(e) => {
                warn!("Read record unusable, allowing edit: {}", e);
                return GateDecision::Allow;
            }
        };
        let reason = match last_read {
            None => BlockReason::NeverRead,
            Some(read_at) => {
                let age = now - read_at;
                if age < self.ttl {
                    return GateDecision::Allow;
                }
                BlockReason::Expired { age }
            }
        };

        GateDecision::Block {
            module: module.to_string(),
            document,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::modules::Module;

    fn gate(root: &Path) -> (EnforcementGate, ReadTracker) {
        let paths = TracePaths::new(root, &Config::default());
        ModuleConfig::new(
            ["api", "core"]
                .iter()
                .map(|id| Module {
                    id: id.to_string(),
                    name: id.to_string(),
                    description: String::new(),
                    file_globs: vec![format!("src/{}/**", id)],
                })
                .collect(),
        )
        .save(&paths.module_config)
        .unwrap();
        (
            EnforcementGate::new(paths.clone(), Duration::seconds(300)),
            ReadTracker::new(paths),
        )
    }

    #[test]
    fn read_unlocks_until_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let (gate, tracker) = gate(dir.path());
        let file = Path::new("src/core/a.ts");
        let t = Utc::now();

        assert!(matches!(
            gate.check_edit("s1", file, t),
            GateDecision::Block {
                reason: BlockReason::NeverRead,
                ..
            }
        ));

        tracker
            .record_read("s1", Path::new("docs/architecture/low-level/core.md"), t)
            .unwrap();
        assert_eq!(
            gate.check_edit("s1", file, t + Duration::seconds(299)),
            GateDecision::Allow
        );

        let late = gate.check_edit("s1", file, t + Duration::seconds(301));
        match &late {
            GateDecision::Block {
                module,
                document,
                reason: BlockReason::Expired { age },
            } => {
                assert_eq!(module, "core");
                assert_eq!(document, "docs/architecture/low-level/core.md");
                assert_eq!(age.num_seconds(), 301);
            }
            other => panic!("unexpected decision {:?}", other),
        }
        assert!(late.message(gate.ttl()).unwrap().contains("301s ago"));

        assert!(gate.check_edit("s1", Path::new("src/api/x.ts"), t).is_blocked());
    }

    #[test]
    fn high_level_read_unlocks_all_modules() {
        let dir = tempfile::tempdir().unwrap();
        let (gate, tracker) = gate(dir.path());
        let t = Utc::now();
        tracker
            .record_read("s1", Path::new("docs/architecture/high-level.md"), t)
            .unwrap();
        assert_eq!(gate.check_edit("s1", Path::new("src/api/x.ts"), t), GateDecision::Allow);
        assert_eq!(gate.check_edit("s1", Path::new("src/core/y.ts"), t), GateDecision::Allow);
        assert!(gate.check_edit("s2", Path::new("src/core/y.ts"), t).is_blocked());
    }

    #[test]
    fn untraced_and_unconfigured_edits_pass() {
        let dir = tempfile::tempdir().unwrap();
        let (gate, _) = gate(dir.path());
        let t = Utc::now();
        assert_eq!(
            gate.check_edit("s1", Path::new("README.md"), t),
            GateDecision::AllowUntraced {
                file: "README.md".to_string()
            }
        );
        assert_eq!(gate.check_edit("s1", Path::new("/etc/hosts"), t), GateDecision::Allow);

        let empty = tempfile::tempdir().unwrap();
        let bare = EnforcementGate::new(
            TracePaths::new(empty.path(), &Config::default()),
            Duration::seconds(300),
        );
        assert_eq!(bare.check_edit("s1", Path::new("src/core/a.ts"), t), GateDecision::Allow);
    }

    #[test]
    fn malformed_config_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TracePaths::new(dir.path(), &Config::default());
        std::fs::create_dir_all(&paths.trace_dir).unwrap();
        std::fs::write(&paths.module_config, "{").unwrap();
        let gate = EnforcementGate::new(paths, Duration::seconds(300));
        assert_eq!(
            gate.check_edit("s1", Path::new("src/core/a.ts"), Utc::now()),
            GateDecision::Allow
        );
    }

    #[test]
    fn malformed_read_record_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let (gate, _) = gate(dir.path());
        let record = TracePaths::new(dir.path(), &Config::default()).read_tracking;
        std::fs::create_dir_all(record.parent().unwrap()).unwrap();
        std::fs::write(&record, "{ not json").unwrap();

        assert_eq!(
            gate.check_edit("s1", Path::new("src/core/a.ts"), Utc::now()),
            GateDecision::Allow
        );
    }
}
