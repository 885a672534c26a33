// src/core/hook.rs
//! Editor hook events: one JSON line in, an exit code and a message out.
//!
//! Every failure inside a hook allows the operation.

use std::io::BufRead;
use std::path::PathBuf;

use chrono::Utc;
use serde::Deserialize;
use tracing::warn;

use crate::config::Config;
use crate::error::{ArchTraceError, Result};
use super::gate::EnforcementGate;
use super::git::{commit_files, CommitCommand};
use super::parser::CodeParser;
use super::reads::ReadTracker;
use super::staleness::StalenessChecker;
use super::trace::TracePaths;

pub const EXIT_ALLOW: u8 = 0;
pub const EXIT_BLOCK: u8 = 2;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HookEvent {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: ToolInput,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToolInput {
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    #[serde(default)]
    pub command: Option<String>,
}

impl HookEvent {
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line.trim())
            .map_err(|e| ArchTraceError::HookInput(format!("invalid event JSON: {}", e)))
    }

    /// Read the first non-empty line of `reader` as an event
    pub fn read_from<R: BufRead>(reader: R) -> Result<Self> {
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                return Self::parse(&line);
            }
        }
        Err(ArchTraceError::HookInput("no event on input".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
    Continue,
    /// Allowed, with advisory text for the error stream
    Notice(String),
    Block(String),
}

impl HookOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            HookOutcome::Block(_) => EXIT_BLOCK,
            _ => EXIT_ALLOW,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            HookOutcome::Continue => None,
            HookOutcome::Notice(text) | HookOutcome::Block(text) => Some(text),
        }
    }
}

/// Runs the three hook entry points against one project
pub struct HookRunner {
    paths: TracePaths,
    config: Config,
}

impl HookRunner {
    pub fn new(paths: TracePaths, config: Config) -> Self {
        Self { paths, config }
    }

    /// Record a trace read; always continues
    pub fn record_read(&self, event: &HookEvent) -> HookOutcome {
        let Some(path) = &event.tool_input.file_path else {
            return HookOutcome::Continue;
        };
        let tracker = ReadTracker::new(self.paths.clone());
        if let Err(e) = tracker.record_read(&event.session_id, path, Utc::now()) {
            warn!("Could not record trace read: {}", e);
        }
        HookOutcome::Continue
    }

    /// Gate an edit on a recent read of the owning module's trace
    pub fn enforce(&self, event: &HookEvent) -> HookOutcome {
        let Some(path) = &event.tool_input.file_path else {
            return HookOutcome::Continue;
        };
        let gate = EnforcementGate::new(self.paths.clone(), self.config.read_ttl());
        let decision = gate.check_edit(&event.session_id, path, Utc::now());
        match decision.message(gate.ttl()) {
            Some(text) if decision.is_blocked() => HookOutcome::Block(text),
            Some(text) => HookOutcome::Notice(text),
            None => HookOutcome::Continue,
        }
    }

    /// Block a `git commit` whose modules have stale traces
    pub async fn check_commit(&self, event: &HookEvent) -> HookOutcome {
        let Some(command) = &event.tool_input.command else {
            return HookOutcome::Continue;
        };
        let matcher = match CommitCommand::new() {
            Ok(matcher) => matcher,
            Err(e) => {
                warn!("Commit matcher unavailable: {}", e);
                return HookOutcome::Continue;
            }
        };
        if !matcher.is_commit(command) {
            return HookOutcome::Continue;
        }

        let files = commit_files(
            &self.paths.project_root,
            matcher.commits_all(command),
            self.config.git_timeout(),
        )
        .await;
        if files.is_empty() {
            return HookOutcome::Continue;
        }

        let report = CodeParser::new(&self.config.analysis).and_then(|parser| {
            StalenessChecker::new(self.paths.clone(), parser).check(&files)
        });
        match report {
            Ok(report) if report.is_stale() => HookOutcome::Block(report.message()),
            Ok(_) => HookOutcome::Continue,
            Err(e) => {
                warn!("Staleness check failed, allowing commit: {}", e);
                HookOutcome::Continue
            }
        }
    }
}
