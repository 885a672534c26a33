use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ArchTraceError, Result};

/// Settings file names looked up in the project root, in order
pub const SETTINGS_FILES: [&str; 2] = ["archtrace.toml", ".archtrace.toml"];

/// Tool settings, read from `archtrace.toml` when present
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where traces, documents and session state live
    pub paths: PathsConfig,

    /// Static analysis limits
    pub analysis: AnalysisConfig,

    /// Read-before-edit gate settings
    pub enforcement: EnforcementConfig,

    /// Version-control subprocess settings
    pub git: GitConfig,

    /// Directory conventions scanned by `generate --bootstrap`
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding module config, stores and documents
    pub trace_dir: PathBuf,

    /// Module config file name inside `trace_dir`
    pub module_config: String,

    /// Session read-tracking file
    pub read_tracking_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Files larger than this degrade to an empty analysis
    pub max_file_size: u64,

    /// Directory names never descended into
    pub skip_dirs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcementConfig {
    /// How long a recorded read unlocks edits
    pub read_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Upper bound for any single git invocation
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub app_dirs: Vec<String>,
    pub package_dirs: Vec<String>,
    pub scripts_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            trace_dir: PathBuf::from("docs/architecture"),
            module_config: "modules.json".to_string(),
            read_tracking_file: PathBuf::from(".archtrace/trace-reads.json"),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_file_size: 1024 * 1024, // 1MB
            skip_dirs: vec![
                ".git".to_string(),
                "node_modules".to_string(),
                "target".to_string(),
            ],
        }
    }
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self { read_ttl_secs: 300 }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            app_dirs: vec!["apps".to_string()],
            package_dirs: vec!["packages".to_string()],
            scripts_dir: "scripts".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ArchTraceError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content =
            toml::to_string_pretty(self).map_err(|e| ArchTraceError::Config(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default when the file is absent
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>, project_root: &Path) -> Result<Self> {
        let path = Self::settings_path(path.as_ref().map(AsRef::as_ref), project_root);
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// The settings file in effect: the explicit path, else the first of
    /// [`SETTINGS_FILES`] present in `project_root`, else `archtrace.toml`
    /// there
    pub fn settings_path(explicit: Option<&Path>, project_root: &Path) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        SETTINGS_FILES
            .iter()
            .map(|name| project_root.join(name))
            .find(|candidate| candidate.exists())
            .unwrap_or_else(|| project_root.join(SETTINGS_FILES[0]))
    }

    fn check(&self) -> Result<()> {
        if self.paths.module_config.trim().is_empty() {
            return Err(ArchTraceError::Config(
                "paths.module_config must not be empty".to_string(),
            ));
        }
        if self.enforcement.read_ttl_secs == 0 {
            return Err(ArchTraceError::Config(
                "enforcement.read_ttl_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn read_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.enforcement.read_ttl_secs as i64)
    }

    pub fn git_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.git.timeout_secs.max(1))
    }
}
