use std::path::PathBuf;
use thiserror::Error;

/// Main error type for archtrace operations
#[derive(Error, Debug)]
pub enum ArchTraceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Module config not found at {0}")]
    ConfigMissing(PathBuf),

    #[error("Unknown module: {0}")]
    ModuleNotFound(String),

    #[error("Invalid glob pattern '{pattern}': {message}")]
    Glob { pattern: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Trace store error in {path}: {message}")]
    Store { path: PathBuf, message: String },

    #[error("Bootstrap refused: {0}")]
    Bootstrap(String),

    #[error("Protected region parse error: {0}")]
    ProtectedRegion(String),

    #[error("Hook input error: {0}")]
    HookInput(String),
}

pub type Result<T> = std::result::Result<T, ArchTraceError>;
