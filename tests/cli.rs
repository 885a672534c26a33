use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, SystemTime};

use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

const MODULES: &str = r#"{
  "modules": [
    {
      "id": "core",
      "name": "Core",
      "description": "Domain logic",
      "fileGlobs": ["src/core/**"]
    }
  ]
}"#;

fn archtrace(root: &Path, args: &[&str], stdin: Option<&str>) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_archtrace"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn archtrace");

    {
        let mut pipe = child.stdin.take().expect("stdin");
        if let Some(input) = stdin {
            pipe.write_all(input.as_bytes()).expect("write stdin");
        }
    }
    child.wait_with_output().expect("wait for archtrace")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn traced_project() -> TempDir {
    let temp = TempDir::new().unwrap();
    temp.child("docs/architecture/modules.json")
        .write_str(MODULES)
        .unwrap();
    temp.child("src/core/math.ts")
        .write_str("export function total() { return 1; }\n")
        .unwrap();
    temp.child("tools/build.sh").write_str("echo build\n").unwrap();
    temp
}

fn edit_event(session: &str, file: &str) -> String {
    format!(
        r#"{{"session_id":"{}","tool_name":"Edit","tool_input":{{"file_path":"{}"}}}}"#,
        session, file
    )
}

fn read_event(session: &str, file: &str) -> String {
    format!(
        r#"{{"session_id":"{}","tool_name":"Read","tool_input":{{"file_path":"{}"}}}}"#,
        session, file
    )
}

#[test]
fn edit_is_blocked_until_the_trace_is_read() {
    let temp = traced_project();

    let blocked = archtrace(
        temp.path(),
        &["hook", "enforce"],
        Some(&edit_event("s1", "src/core/math.ts")),
    );
    assert_eq!(blocked.status.code(), Some(2));
    assert!(
        stderr(&blocked).contains("docs/architecture/low-level/core.md"),
        "{}",
        stderr(&blocked)
    );

    let read = archtrace(
        temp.path(),
        &["hook", "record-read"],
        Some(&read_event("s1", "docs/architecture/low-level/core.md")),
    );
    assert_eq!(read.status.code(), Some(0));
    temp.child(".archtrace/trace-reads.json")
        .assert(predicate::str::contains("\"core\""));

    let allowed = archtrace(
        temp.path(),
        &["hook", "enforce"],
        Some(&edit_event("s1", "src/core/math.ts")),
    );
    assert_eq!(allowed.status.code(), Some(0));

    // A new session starts without any reads.
    let other = archtrace(
        temp.path(),
        &["hook", "enforce"],
        Some(&edit_event("s2", "src/core/math.ts")),
    );
    assert_eq!(other.status.code(), Some(2));
}

#[test]
fn high_level_read_unlocks_every_module() {
    let temp = traced_project();
    let read = archtrace(
        temp.path(),
        &["hook", "record-read"],
        Some(&read_event("s1", "docs/architecture/high-level.md")),
    );
    assert_eq!(read.status.code(), Some(0));

    let allowed = archtrace(
        temp.path(),
        &["hook", "enforce"],
        Some(&edit_event("s1", "src/core/math.ts")),
    );
    assert_eq!(allowed.status.code(), Some(0));
}

#[test]
fn untraced_files_are_never_blocked() {
    let temp = traced_project();
    let output = archtrace(
        temp.path(),
        &["hook", "enforce"],
        Some(&edit_event("s1", "tools/build.sh")),
    );
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn hooks_fail_open() {
    let temp = traced_project();

    for args in [["hook", "enforce"], ["hook", "record-read"], ["hook", "check-commit"]] {
        let garbage = archtrace(temp.path(), &args, Some("not json at all"));
        assert_eq!(garbage.status.code(), Some(0), "{:?}", args);

        let empty = archtrace(temp.path(), &args, None);
        assert_eq!(empty.status.code(), Some(0), "{:?}", args);
    }

    temp.child("docs/architecture/modules.json")
        .write_str("{ broken")
        .unwrap();
    let output = archtrace(
        temp.path(),
        &["hook", "enforce"],
        Some(&edit_event("s1", "src/core/math.ts")),
    );
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn corrupt_read_record_allows_edits() {
    let temp = traced_project();
    temp.child(".archtrace/trace-reads.json")
        .write_str("{ not json")
        .unwrap();

    let output = archtrace(
        temp.path(),
        &["hook", "enforce"],
        Some(&edit_event("s1", "src/core/math.ts")),
    );
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
}

#[test]
fn bootstrap_writes_module_config_and_settings() {
    let temp = TempDir::new().unwrap();
    temp.child("src/main.ts").write_str("export const x = 1;\n").unwrap();

    let output = archtrace(temp.path(), &["generate", "--bootstrap"], None);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("archtrace.toml"));
    temp.child("docs/architecture/modules.json")
        .assert(predicate::str::contains("\"src/**\""));
    temp.child("archtrace.toml")
        .assert(predicate::str::contains("read_ttl_secs = 300"));

    let valid = archtrace(temp.path(), &["validate"], None);
    assert!(valid.status.success(), "{}", stderr(&valid));
}

#[test]
fn commit_hook_ignores_other_commands() {
    let temp = traced_project();
    let event = r#"{"session_id":"s1","tool_name":"Bash","tool_input":{"command":"git status"}}"#;
    let output = archtrace(temp.path(), &["hook", "check-commit"], Some(event));
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn check_stale_reports_missing_then_newer_sources() {
    let temp = traced_project();

    let missing = archtrace(temp.path(), &["check-stale", "src/core/math.ts"], None);
    assert_eq!(missing.status.code(), Some(2));
    assert!(stderr(&missing).contains("archtrace generate core --low-level-only"));

    let generated = archtrace(temp.path(), &["generate", "core", "--low-level-only"], None);
    assert!(generated.status.success(), "{}", stderr(&generated));
    temp.child("docs/architecture/low-level/core.json")
        .assert(predicate::path::exists());

    let fresh = archtrace(temp.path(), &["check-stale", "src/core/math.ts"], None);
    assert_eq!(fresh.status.code(), Some(0), "{}", stderr(&fresh));

    let future = SystemTime::now() + Duration::from_secs(3600);
    std::fs::File::options()
        .write(true)
        .open(temp.child("src/core/math.ts").path())
        .unwrap()
        .set_modified(future)
        .unwrap();

    let stale = archtrace(temp.path(), &["check-stale", "src/core/math.ts"], None);
    assert_eq!(stale.status.code(), Some(2));

    let untraced = archtrace(temp.path(), &["check-stale", "tools/build.sh"], None);
    assert_eq!(untraced.status.code(), Some(0));
}

#[test]
fn generate_render_query_round() {
    let temp = traced_project();

    let generated = archtrace(temp.path(), &["generate"], None);
    assert!(generated.status.success(), "{}", stderr(&generated));

    let rendered = archtrace(temp.path(), &["render"], None);
    assert!(rendered.status.success(), "{}", stderr(&rendered));
    temp.child("docs/architecture/high-level.md")
        .assert(predicate::str::contains("## Module: Core"));
    temp.child("docs/architecture/low-level/core.md")
        .assert(predicate::str::contains("| total | function |"));

    let synced = archtrace(temp.path(), &["sync"], None);
    assert!(synced.status.success(), "{}", stderr(&synced));

    let query = archtrace(temp.path(), &["query", "--module", "core", "--detail"], None);
    assert!(query.status.success(), "{}", stderr(&query));
    assert!(stdout(&query).contains("src/core/math.ts"));

    let impact = archtrace(temp.path(), &["query", "--impact", "tools/build.sh"], None);
    assert!(impact.status.success());
    assert!(stdout(&impact).contains("untraced"));

    let unknown = archtrace(temp.path(), &["query", "--module", "ghost"], None);
    assert!(!unknown.status.success());

    let valid = archtrace(temp.path(), &["validate"], None);
    assert!(valid.status.success(), "{}", stderr(&valid));
}
