// src/core/git.rs
//! Recognizing commit commands and asking git which files they touch.

use std::path::Path;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::Result;

pub struct CommitCommand {
    pattern: Regex,
}

impl CommitCommand {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(
                r"(?:^|[\s;&|(])git(?:\s+-[Cc]\s+\S+|\s+--[\w-]+(?:=\S+)?)*\s+commit(?:\s|$)",
            )?,
        })
    }

    /// Whether the shell command text runs `git commit`
    pub fn is_commit(&self, command: &str) -> bool {
        self.pattern.is_match(command)
    }

    /// Whether the commit also stages tracked changes (`-a`, `--all`, `-am`, ...)
    pub fn commits_all(&self, command: &str) -> bool {
        let Some(found) = self.pattern.find(command) else {
            return false;
        };
        command[found.end()..]
            .split_whitespace()
            .take_while(|token| !matches!(*token, "&&" | "||" | ";" | "|"))
            .any(|token| {
                token == "--all"
                    || (token.starts_with('-')
                        && !token.starts_with("--")
                        && token[1..].chars().all(|c| c.is_ascii_alphabetic())
                        && token.contains('a'))
            })
    }
}

/// Files under `root` the commit will include, relative to `root`; empty
/// when git is unavailable or slow
pub async fn commit_files(root: &Path, include_unstaged: bool, limit: Duration) -> Vec<String> {
    let staged = ["diff", "--cached", "--name-only", "--relative"];
    let mut files = run_git(root, &staged, limit).await;
    if include_unstaged {
        files.extend(run_git(root, &["diff", "--name-only", "--relative"], limit).await);
    }
    files.sort();
    files.dedup();
    files
}

async fn run_git(root: &Path, args: &[&str], limit: Duration) -> Vec<String> {
    let output = timeout(
        limit,
        Command::new("git")
            .arg("-C")
            .arg(root)
            .args(["-c", "core.quotePath=false"])
            .args(args)
            .kill_on_drop(true)
            .output(),
    )
    .await;

    let output = match output {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(output)) => {
            debug!("git {:?} exited with {}", args, output.status);
            return Vec::new();
        }
        Ok(Err(e)) => {
            debug!("git {:?} failed to start: {}", args, e);
            return Vec::new();
        }
        Err(_) => {
            warn!("git {:?} timed out after {:?}", args, limit);
            return Vec::new();
        }
    };

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
