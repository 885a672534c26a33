// src/core/mod.rs
mod differ;
mod document;
mod engine;
mod gate;
mod generator;
mod git;
mod graph;
mod hook;
mod modules;
mod parser;
mod protector;
mod query;
mod reads;
mod renderer;
mod staleness;
mod sync;
mod trace;
mod validator;

// Language-specific analyzers
pub mod languages;

pub use differ::{reconcile_high_level, reconcile_low_level, same_text, FieldDiff, Reconciled};
pub use document::{
    DocumentMetadata, DocumentParser, ParseError, ParsedHighLevel, ParsedLowLevel, ParsedModule,
};
pub use gate::{BlockReason, EnforcementGate, GateDecision};
pub use generator::{GenerationSummary, TraceGenerator};
pub use git::{commit_files, CommitCommand};
pub use graph::{ConfigGraphBuilder, GraphBuilder};
pub use hook::{HookEvent, HookOutcome, HookRunner, ToolInput, EXIT_ALLOW, EXIT_BLOCK};
pub use modules::{Module, ModuleConfig, ModuleMatcher};
pub use parser::CodeParser;
pub use protector::{EditProtector, ProtectedRegion, NOTES_LABEL};
pub use query::{ImpactReport, ModuleReport, QueryEngine};
pub use reads::{ReadTarget, ReadTracker, TraceReadRecord};
pub use renderer::{escape_cell, format_timestamp, DocRenderer, RenderSummary};
pub use staleness::{StaleModule, StaleReason, StalenessChecker, StalenessReport};
pub use sync::{SyncChange, SyncConflict, SyncEngine, SyncOptions, SyncReport};
pub use trace::{
    generator_identity, read_store, same_generation, trace_now, write_atomic, write_store,
    CallEntry, Edge, EventEntry, ExportEntry, ExportKind, FileTrace, HighLevelTrace,
    ImportEntry, LowLevelTrace, ModuleNode, TracePaths, HIGH_LEVEL_TRACE_ID,
};
pub use validator::{TraceValidator, ValidationResult};

// Export the main engine
pub use engine::{Engine, HookKind};
