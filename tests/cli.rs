//! End-to-end runs of the binary against a throwaway home and database.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::{tempdir, TempDir};

fn mousedrill(home: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("mousedrill").unwrap();
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env_remove("RUST_LOG")
        .arg("--db")
        .arg(home.path().join("progress.db"));
    cmd
}

fn write_script(dir: &Path, lines: &[&str]) -> PathBuf {
    let path = dir.join("events.jsonl");
    fs::write(&path, lines.join("\n")).unwrap();
    path
}

#[test]
fn list_shows_builtin_drills() {
    let home = tempdir().unwrap();
    mousedrill(&home)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("hover_01"))
        .stdout(predicate::str::contains("curve_01"))
        .stdout(predicate::str::contains("trace_star"))
        .stdout(predicate::str::contains("じゅんばんどおりクリックしよう"));

    mousedrill(&home)
        .args(["--script", "kanji", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("順番通りクリックしよう"));
}

#[test]
fn unreadable_task_file_falls_back() {
    let home = tempdir().unwrap();
    mousedrill(&home)
        .arg("--tasks")
        .arg(home.path().join("missing.json"))
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("doubleclick_01"))
        .stdout(predicate::str::contains("curve_01").not());
}

#[test]
fn replay_records_progress_and_exports() {
    let home = tempdir().unwrap();
    let script = write_script(
        home.path(),
        &[
            r#"{"at": 1000, "event": "click", "target": 1}"#,
            r#"{"at": 1500, "event": "click", "target": 3}"#,
            r#"{"at": 2000, "event": "click", "target": 2}"#,
            "",
            r#"{"at": 3000, "event": "click", "target": 3}"#,
            r#"{"at": 4000, "event": "click", "target": 4}"#,
            r#"{"at": 5000, "event": "click", "target": 5}"#,
        ],
    );

    mousedrill(&home)
        .arg("replay")
        .arg("click_01")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("wrong order: expected 2, got 3"))
        .stdout(predicate::str::contains("completed:"));

    mousedrill(&home)
        .arg("progress")
        .assert()
        .success()
        .stdout(predicate::str::contains("click_01"));

    let csv_path = home.path().join("attempts.csv");
    mousedrill(&home)
        .arg("export")
        .arg(&csv_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("exported 1 attempts"));

    let csv = fs::read_to_string(&csv_path).unwrap();
    assert_eq!(csv.lines().count(), 2);
    assert!(csv.starts_with("task_id,final_score"));
}

#[test]
fn replay_runs_out_the_clock_when_script_ends_early() {
    let home = tempdir().unwrap();
    let script = write_script(
        home.path(),
        &[r#"{"at": 1000, "event": "click", "target": 1}"#],
    );
    mousedrill(&home)
        .arg("replay")
        .arg("click_01")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("40000ms  completed: 12 points, 1 stars"));
}

#[test]
fn replay_rejects_bad_input() {
    let home = tempdir().unwrap();
    let script = write_script(home.path(), &[r#"{"at": 10, "event": "wave"}"#]);

    mousedrill(&home)
        .arg("replay")
        .arg("nope")
        .arg(&script)
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope"));

    mousedrill(&home)
        .arg("replay")
        .arg("click_01")
        .arg(&script)
        .assert()
        .failure()
        .stderr(predicate::str::contains(":1:"));
}

#[test]
fn progress_is_empty_before_any_attempt() {
    let home = tempdir().unwrap();
    mousedrill(&home)
        .arg("progress")
        .assert()
        .success()
        .stdout(predicate::str::contains("no results yet"));
}
