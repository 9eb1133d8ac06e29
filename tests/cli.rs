//! Integration tests that drive the vss2git-batch binary end to end with a shell converter.

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const CATALOG: &str = r#"{
  "projects": [
    { "path": "$", "physical_name": "AAAAAAAA" },
    { "path": "$/App", "physical_name": "BAAAAAAA" },
    { "path": "$/App", "physical_name": "CAAAAAAA", "deleted": true },
    { "path": "$/Tools", "physical_name": "DAAAAAAA" }
  ],
  "files": []
}"#;

const CONVERTER: &str = r#"out=""
project=""
while [ $# -gt 0 ]; do
  case "$1" in
    --out) out="$2"; shift ;;
    --project) project="$2"; shift ;;
  esac
  shift
done
mkdir -p "$out/.git"
echo "$project" > "$out/.git/description"
echo "progress files=2 revisions=5 changesets=1"
if [ "$project" = "$/Tools" ] && [ -n "$FAIL_TOOLS" ]; then
  echo "tools history is corrupt" >&2
  exit 4
fi
"#;

struct Workspace {
  dir: tempfile::TempDir,
}

impl Workspace {
  fn new() -> Self {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("catalog.json"), CATALOG).unwrap();
    fs::write(dir.path().join("convert.sh"), CONVERTER).unwrap();
    Self { dir }
  }

  fn path(&self, name: &str) -> PathBuf {
    self.dir.path().join(name)
  }

  fn settings(&self) -> PathBuf {
    self.path("vss2git.toml")
  }

  fn converter(&self) -> String {
    format!("sh {}", self.path("convert.sh").display())
  }

  fn command(&self, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_vss2git-batch"));
    cmd
      .arg("--settings")
      .arg(self.settings())
      .args(args)
      .current_dir(self.dir.path())
      .env_remove("VSS2GIT_SETTINGS")
      .env_remove("VSS2GIT_OUTPUT")
      .env_remove("VSS2GIT_CONVERTER")
      .env("RUST_LOG", "warn");
    cmd
  }

  fn run(&self, args: &[&str]) -> Output {
    self.command(args).output().unwrap()
  }

  fn migrate(&self, output: &Path, extra: &[&str]) -> Command {
    let catalog = self.path("catalog.json");
    let converter = self.converter();
    let mut args = vec![
      "migrate",
      "--catalog",
      catalog.to_str().unwrap(),
      "--output",
      output.to_str().unwrap(),
      "--converter",
      converter.as_str(),
    ];
    args.extend_from_slice(extra);
    self.command(&args)
  }
}

fn stdout(out: &Output) -> String {
  String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
  String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn select_edits_the_saved_selection() {
  let ws = Workspace::new();
  let out = ws.run(&["select", "add", "$/App|BAAAAAAA", "$/Tools"]);
  assert!(out.status.success(), "stderr={}", stderr(&out));
  assert!(stdout(&out).contains("Added 2 project(s); 2 selected"));

  let out = ws.run(&["select", "remove", "$/Tools"]);
  assert!(out.status.success());
  assert!(stdout(&out).contains("Removed 1 project(s); 1 selected"));

  let out = ws.run(&["select", "show"]);
  assert_eq!(stdout(&out).trim(), "$/App|BAAAAAAA");
  let saved = fs::read_to_string(ws.settings()).unwrap();
  assert!(saved.contains("$/App|BAAAAAAA"));
}

#[test]
fn select_rejects_malformed_key() {
  let ws = Workspace::new();
  let out = ws.run(&["select", "add", "$/App|a|b"]);
  assert_eq!(out.status.code(), Some(1));
  assert!(stderr(&out).contains("malformed project key"));
  assert!(!ws.settings().exists());
}

#[test]
fn migrate_reports_json_and_commits_repositories() {
  let ws = Workspace::new();
  let output = ws.path("out");
  let out = ws
    .migrate(&output, &["--json", "$/App|BAAAAAAA", "$/Tools"])
    .output()
    .unwrap();
  assert!(out.status.success(), "stderr={}", stderr(&out));

  let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
  assert_eq!(report["cancelled"], false);
  assert_eq!(report["error_log"], serde_json::Value::Null);
  let selections = report["selections"].as_array().unwrap();
  assert_eq!(selections.len(), 2);
  for s in selections {
    assert_eq!(s["status"], "succeeded");
    let dest = PathBuf::from(s["destination"].as_str().unwrap());
    assert!(dest.starts_with(output.join("_success")));
    assert!(dest.join(".git").is_dir());
    assert!(dest.join("_vss2git.log").is_file());
  }
}

#[test]
fn migrate_uses_saved_selection_and_flags_failures() {
  let ws = Workspace::new();
  let output = ws.path("out");
  ws.run(&["select", "add", "$/Tools"]);

  let out = ws.migrate(&output, &[]).env("FAIL_TOOLS", "1").output().unwrap();
  assert_eq!(out.status.code(), Some(2), "stderr={}", stderr(&out));
  let text = stdout(&out);
  assert!(text.contains("FAILED"));
  assert!(text.contains("$/Tools"));
  assert!(text.contains("0 succeeded, 1 failed, 0 skipped"));

  let fail_root = output.join("_fail");
  let entries: Vec<_> = fs::read_dir(&fail_root).unwrap().collect();
  assert_eq!(entries.len(), 1);
  let dest = entries[0].as_ref().unwrap().path();
  let run_log = fs::read_to_string(dest.join("_vss2git.log")).unwrap();
  assert!(run_log.contains("tools history is corrupt"));
  assert!(run_log.contains("converter exited with status 4"));
}

#[test]
fn list_marks_migrated_projects() {
  let ws = Workspace::new();
  let output = ws.path("out");
  let out = ws.migrate(&output, &["$/Tools"]).output().unwrap();
  assert!(out.status.success(), "stderr={}", stderr(&out));

  let catalog = ws.path("catalog.json");
  let out = ws.run(&[
    "list",
    "--catalog",
    catalog.to_str().unwrap(),
    "--output",
    output.to_str().unwrap(),
  ]);
  assert!(out.status.success(), "stderr={}", stderr(&out));
  let text = stdout(&out);
  assert!(text.contains("$/App|BAAAAAAA\t$/App (BAAAAAAA)\n"));
  assert!(text.contains("$/Tools\t$/Tools [done]\n"));
  assert!(text.contains("$\t$\n"));
}

#[test]
fn output_env_overrides_flag() {
  let ws = Workspace::new();
  let flagged = ws.path("flag-out");
  let env_out = ws.path("env-out");
  let out = ws
    .migrate(&flagged, &["$/Tools"])
    .env("VSS2GIT_OUTPUT", &env_out)
    .output()
    .unwrap();
  assert!(out.status.success(), "stderr={}", stderr(&out));
  assert!(env_out.join("_success").is_dir());
  assert!(!flagged.exists());
}

#[test]
fn migrate_without_catalog_fails() {
  let ws = Workspace::new();
  let out = ws.run(&["migrate", "--output", "out", "$/App"]);
  assert_eq!(out.status.code(), Some(1));
  assert!(stderr(&out).contains("no source catalog"));
}
