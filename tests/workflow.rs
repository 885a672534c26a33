use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

use archtrace::config::{AnalysisConfig, BootstrapConfig, Config};
use archtrace::core::{
    read_store, CodeParser, ConfigGraphBuilder, DocRenderer, DocumentParser, LowLevelTrace,
    Module, ModuleConfig, ModuleMatcher, SyncEngine, SyncOptions, TraceGenerator, TracePaths,
};

fn project() -> (TempDir, TracePaths) {
    let temp = TempDir::new().unwrap();
    temp.child("src/core/math.ts")
        .write_str(
            "/* export function hidden() {} */\n\
             import { round } from './round';\n\
             export function total(xs: number[]) {\n  return round(xs.reduce((a, b) => a + b, 0));\n}\n\
             export interface Totals { sum: number }\n",
        )
        .unwrap();
    temp.child("src/core/round.ts")
        .write_str("export const round = (n: number) => Math.round(n);\n")
        .unwrap();
    temp.child("src/api/server.ts")
        .write_str(
            "import express from 'express';\n\
             import {\n  total,\n  type Totals,\n} from '../core/math';\n\
             import './polyfills';\n\
             export default class Server {}\n",
        )
        .unwrap();
    temp.child("README.md").write_str("# demo\n").unwrap();

    let paths = TracePaths::new(temp.path(), &Config::default());
    ModuleConfig::new(vec![
        Module {
            id: "core".to_string(),
            name: "Core".to_string(),
            description: "Domain logic".to_string(),
            file_globs: vec!["src/core/**".to_string()],
        },
        Module {
            id: "api".to_string(),
            name: "API".to_string(),
            description: "HTTP | REST surface".to_string(),
            file_globs: vec!["src/api/**".to_string()],
        },
    ])
    .save(&paths.module_config)
    .unwrap();

    (temp, paths)
}

fn generator(paths: &TracePaths) -> TraceGenerator {
    TraceGenerator::new(
        paths.clone(),
        CodeParser::new(&AnalysisConfig::default()).unwrap(),
        Box::new(ConfigGraphBuilder),
        BootstrapConfig::default(),
    )
}

#[tokio::test]
async fn generate_render_sync_is_idempotent() {
    let (temp, paths) = project();
    generator(&paths).generate_all(None, false).await.unwrap();
    DocRenderer::new(paths.clone()).unwrap().render_all(None).unwrap();

    temp.child("docs/architecture/high-level.md")
        .assert(predicate::str::contains("**Description**: HTTP \\| REST surface"));
    temp.child("docs/architecture/low-level/api.md")
        .assert(predicate::str::contains("| ../core/math | total, Totals |"))
        .assert(predicate::str::contains("| ./polyfills | - |"))
        .assert(predicate::str::contains("| Server | default |"));
    temp.child("docs/architecture/low-level/core.md")
        .assert(predicate::str::contains("hidden").not());

    let sync = SyncEngine::new(paths.clone()).unwrap();
    let first = sync.sync_all(SyncOptions::default()).unwrap();
    assert_eq!(first.traces_checked, 3);
    assert!(first.changes.is_empty(), "{:?}", first.changes);
    assert!(first.is_clean(), "{:?} {:?}", first.conflicts, first.errors);

    let second = sync.sync_all(SyncOptions::default()).unwrap();
    assert!(second.changes.is_empty());
}

#[tokio::test]
async fn rendered_documents_parse_back_to_the_store() {
    let (temp, paths) = project();
    generator(&paths).generate_all(None, true).await.unwrap();

    let store: LowLevelTrace = read_store(&paths.low_level_store("api")).unwrap().unwrap();
    let renderer = DocRenderer::new(paths.clone()).unwrap();
    let rendered = renderer.render_low_level(&store, "API").unwrap();

    let parsed = DocumentParser::new()
        .unwrap()
        .parse_low_level("api.md", &rendered);
    assert!(parsed.errors.is_empty());
    assert_eq!(parsed.files, store.files);
    assert_eq!(parsed.metadata.last_generated, Some(store.last_generated));
    drop(temp);
}

#[tokio::test]
async fn notes_survive_regeneration_and_edits_sync_back() {
    let (temp, paths) = project();
    generator(&paths).generate_all(None, false).await.unwrap();
    let renderer = DocRenderer::new(paths.clone()).unwrap();
    renderer.render_all(None).unwrap();

    let doc = temp.child("docs/architecture/high-level.md");
    let content = std::fs::read_to_string(doc.path()).unwrap();
    let edited = content
        .replace(
            "Hand-written notes. This section is never synchronized back into the store.",
            "The API must only reach core through its public functions.",
        )
        .replace("**Description**: Domain logic", "**Description**: Pricing rules");
    std::fs::write(doc.path(), edited).unwrap();

    let report = SyncEngine::new(paths.clone())
        .unwrap()
        .sync_all(SyncOptions::default())
        .unwrap();
    assert_eq!(report.changes.len(), 1);
    assert_eq!(report.changes[0].new_value, "Pricing rules");

    renderer.render_all(None).unwrap();
    doc.assert(predicate::str::contains(
        "The API must only reach core through its public functions.",
    ));
    doc.assert(predicate::str::contains("**Description**: Pricing rules"));
}

#[tokio::test]
async fn regenerated_store_turns_edits_into_conflicts() {
    let (temp, paths) = project();
    let gen = generator(&paths);
    gen.generate_all(Some("core"), true).await.unwrap();
    DocRenderer::new(paths.clone()).unwrap().render_all(Some("core")).unwrap();

    let doc = temp.child("docs/architecture/low-level/core.md");
    let content = std::fs::read_to_string(doc.path()).unwrap();
    std::fs::write(doc.path(), content.replace("| Totals | interface |", "| Totals | type |"))
        .unwrap();

    // Regenerate without re-rendering: the document is now behind the store.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    gen.generate_all(Some("core"), true).await.unwrap();

    let sync = SyncEngine::new(paths.clone()).unwrap();
    let report = sync.sync_all(SyncOptions::default()).unwrap();
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].store_value.as_deref(), Some("interface"));
    assert_eq!(report.conflicts[0].document_value, "type");

    let store: LowLevelTrace = read_store(&paths.low_level_store("core")).unwrap().unwrap();
    let math = store.file("src/core/math.ts").unwrap();
    assert!(math.exports.iter().any(|e| e.symbol == "Totals" && e.kind.as_str() == "interface"));

    let forced = sync
        .sync_all(SyncOptions {
            force: true,
            dry_run: false,
        })
        .unwrap();
    assert_eq!(forced.changes.len(), 1);
    let store: LowLevelTrace = read_store(&paths.low_level_store("core")).unwrap().unwrap();
    let math = store.file("src/core/math.ts").unwrap();
    assert!(math.exports.iter().any(|e| e.symbol == "Totals" && e.kind.as_str() == "type"));
}

#[tokio::test]
async fn every_matched_file_appears_once_in_sorted_order() {
    let (temp, paths) = project();
    temp.child("src/core/nested/deep.ts").write_str("").unwrap();
    temp.child("src/core/notes.txt").write_str("plain").unwrap();

    let config = ModuleConfig::load(&paths.module_config).unwrap();
    let matcher = ModuleMatcher::new(&config).unwrap();
    let files = CodeParser::new(&AnalysisConfig::default())
        .unwrap()
        .list_files(temp.path())
        .unwrap();
    let trace = generator(&paths)
        .generate_module(&config.modules[0], &matcher, &files)
        .unwrap();

    let files: Vec<&str> = trace.files.iter().map(|f| f.file_path.as_str()).collect();
    assert_eq!(
        files,
        vec![
            "src/core/math.ts",
            "src/core/nested/deep.ts",
            "src/core/notes.txt",
            "src/core/round.ts"
        ]
    );
}
