// SPDX-License-Identifier: MIT OR Apache-2.0

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, content).expect("write file");
}

/// Workspace with a hash-embedding config and two documents.
fn workspace() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    write_file(
        &dir.path().join(".docragrc.toml"),
        r#"
[documents]
path = "data"

[embeddings]
provider = "hash"
dimension = 64

[llm]
api_key_env = "DOCRAG_TEST_MISSING_KEY"
"#,
    );
    write_file(
        &dir.path().join("data/library.txt"),
        "The library opens at 8 and closes at 22.\u{000C}Books can be renewed online.",
    );
    write_file(
        &dir.path().join("data/fees.md"),
        "Tuition fees are paid every semester at the finance office.",
    );
    dir
}

fn docrag(dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("docrag"));
    cmd.current_dir(dir.path()).env("NO_COLOR", "1");
    cmd
}

fn json_output(cmd: &mut Command) -> Value {
    let assert = cmd.assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    serde_json::from_str(&stdout).expect("json output")
}

#[test]
fn ingest_twice_inserts_nothing_new() {
    let dir = workspace();

    let first = json_output(docrag(&dir).args(["--format", "json", "ingest"]));
    assert_eq!(first["documents"], 2);
    assert_eq!(first["inserted"], 3);

    let second = json_output(docrag(&dir).args(["--format", "json", "ingest"]));
    assert_eq!(second["inserted"], 0);
    assert_eq!(second["skipped"], 3);

    assert!(dir.path().join(".docrag/index.sqlite").exists());
}

#[test]
fn search_reports_scored_matches() {
    let dir = workspace();
    docrag(&dir).arg("ingest").assert().success();

    let result = json_output(docrag(&dir).args(["--format", "json", "search", "tuition fees", "-k", "2"]));
    assert_eq!(result["query"], "tuition fees");
    assert_eq!(result["match_count"], 2);
    assert_eq!(result["top"][0]["source"], "fees.md");
    assert_eq!(result["top"][0]["chunk_id"], "fees.md:0:0");
    assert!(result["top"][0]["score"].as_f64().expect("score") > 0.0);
}

#[test]
fn search_text_output_lists_sources() {
    let dir = workspace();
    docrag(&dir).arg("ingest").assert().success();

    docrag(&dir)
        .args(["search", "library opens"])
        .assert()
        .success()
        .stdout(predicate::str::contains("library.txt"))
        .stdout(predicate::str::contains("library.txt:0:0"));
}

#[test]
fn status_and_reset() {
    let dir = workspace();
    docrag(&dir).arg("ingest").assert().success();

    let status = json_output(docrag(&dir).args(["--format", "json", "status"]));
    assert_eq!(status["entries"], 3);
    assert_eq!(status["model"], "hash-64");
    assert_eq!(status["sources"].as_array().expect("sources").len(), 2);

    docrag(&dir)
        .arg("reset")
        .assert()
        .success()
        .stdout(predicate::str::contains("Index cleared"));

    let status = json_output(docrag(&dir).args(["--format", "json", "status"]));
    assert_eq!(status["entries"], 0);
}

#[test]
fn rebuild_drops_removed_documents() {
    let dir = workspace();
    docrag(&dir).arg("ingest").assert().success();
    fs::remove_file(dir.path().join("data/fees.md")).expect("remove");

    let report = json_output(docrag(&dir).args(["--format", "json", "rebuild"]));
    assert_eq!(report["documents"], 1);
    assert_eq!(report["inserted"], 2);
}

#[test]
fn ask_without_api_key_returns_marked_answer() {
    let dir = workspace();
    docrag(&dir).arg("ingest").assert().success();

    let mut config = fs::read_to_string(dir.path().join(".docragrc.toml")).expect("read config");
    config.push_str("\n[prompt]\ntemplate_path = \"builtin\"\n");
    write_file(&dir.path().join(".docragrc.toml"), &config);

    let result = json_output(docrag(&dir).args(["--format", "json", "ask", "When does the library open?"]));
    assert_eq!(result["error"], true);
    assert!(result["answer"]
        .as_str()
        .expect("answer")
        .starts_with("Error calling the language model"));
}

#[test]
fn ask_without_any_template_fails() {
    let dir = workspace();
    docrag(&dir).arg("ingest").assert().success();

    docrag(&dir)
        .args(["ask", "When does the library open?"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no active prompt template"));
}

#[test]
fn ask_with_builtin_template_flag() {
    let dir = workspace();

    let result = json_output(docrag(&dir).args([
        "--format",
        "json",
        "ask",
        "hours?",
        "--template",
        "builtin",
    ]));
    assert_eq!(result["question"], "hours?");
    assert_eq!(result["error"], true);
}

#[test]
fn ask_with_invalid_template_fails() {
    let dir = workspace();
    write_file(&dir.path().join("bad_prompt.txt"), "Answer {question} please");

    docrag(&dir)
        .args(["ask", "hours?", "--template", "bad_prompt.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid prompt template"));
}

#[test]
fn ask_with_missing_template_file_fails() {
    let dir = workspace();

    docrag(&dir)
        .args(["ask", "hours?", "--template", "absent.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no active prompt template"));
}

#[test]
fn explicit_config_flag_is_used() {
    let dir = TempDir::new().expect("tempdir");
    write_file(
        &dir.path().join("custom.toml"),
        r#"
[documents]
path = "docs"

[embeddings]
provider = "hash"
dimension = 32

[index]
path = "state/rag.sqlite"
"#,
    );
    write_file(&dir.path().join("docs/notes.txt"), "Exams start in June.");

    let report = json_output(docrag(&dir).args(["--config", "custom.toml", "--format", "json", "ingest"]));
    assert_eq!(report["inserted"], 1);
    assert!(dir.path().join("state/rag.sqlite").exists());
}

#[test]
fn ingest_path_override_and_empty_folder() {
    let dir = workspace();
    fs::create_dir_all(dir.path().join("empty")).expect("mkdir");

    let report = json_output(docrag(&dir).args(["--format", "json", "ingest", "--path", "empty"]));
    assert_eq!(report["documents"], 0);
    assert_eq!(report["inserted"], 0);
}

#[test]
fn completions_are_generated() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("docrag"));
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("docrag"));
}
