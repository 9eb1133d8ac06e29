//! Engine that delegates conversion to an external converter command.
//!
//! The analyzer and changeset builder only record what the run asks for; the exporter queues
//! one work item that runs the converter with every knob as a flag. The converter reports
//! progress on stdout as `progress files=N revisions=N changesets=N`; every other line (and
//! all of stderr) goes to the run log.

use std::ffi::OsString;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, instrument, warn};

use crate::engine::{
  ChangesetBuilder, ChangesetThresholds, EngineContext, EngineFactory, ExportOptions,
  GitExporter, RevisionAnalyzer,
};
use crate::error::EngineError;
use crate::logger::Logger;
use crate::types::{Progress, SourceProject};
use crate::work_queue::WorkContext;

/// Prefix of progress lines on the converter's stdout.
pub const PROGRESS_PREFIX: &str = "progress ";

/// Parses `progress files=N revisions=N changesets=N`. Missing counters are zero; unknown
/// keys are ignored.
pub fn parse_progress(line: &str) -> Option<Progress> {
  let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
  let mut progress = Progress::default();
  for pair in rest.split_whitespace() {
    let (k, v) = pair.split_once('=')?;
    let v: u64 = v.parse().ok()?;
    match k {
      "files" => progress.files = v,
      "revisions" => progress.revisions = v,
      "changesets" => progress.changesets = v,
      _ => {}
    }
  }
  Some(progress)
}

#[derive(Default)]
struct Counters {
  files: AtomicU64,
  revisions: AtomicU64,
  changesets: AtomicU64,
}

impl Counters {
  fn store(&self, p: Progress) {
    self.files.store(p.files, Ordering::Relaxed);
    self.revisions.store(p.revisions, Ordering::Relaxed);
    self.changesets.store(p.changesets, Ordering::Relaxed);
  }
}

/// What one run asked for, filled in phase by phase.
#[derive(Debug, Clone, Default)]
struct Plan {
  project: Option<SourceProject>,
  exclude: Option<String>,
  thresholds: ChangesetThresholds,
}

/// Per-run state shared by the three engine instances of a run.
#[derive(Default)]
struct RunPlan {
  plan: Mutex<Plan>,
  counters: Counters,
}

impl RunPlan {
  fn plan(&self) -> MutexGuard<'_, Plan> {
    self.plan.lock().unwrap_or_else(|e| e.into_inner())
  }
}

/// [EngineFactory] running an external converter once per project.
pub struct CommandEngine {
  program: String,
  base_args: Vec<String>,
  source: Option<PathBuf>,
  current: Mutex<Option<Arc<RunPlan>>>,
}

impl std::fmt::Debug for CommandEngine {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CommandEngine")
      .field("program", &self.program)
      .field("base_args", &self.base_args)
      .field("source", &self.source)
      .finish()
  }
}

impl CommandEngine {
  /// `command` is split on whitespace: program followed by fixed leading arguments.
  pub fn new(command: &str) -> Result<Self, EngineError> {
    let mut parts = command.split_whitespace().map(str::to_string);
    let program = parts
      .next()
      .ok_or_else(|| EngineError::new("converter command is empty"))?;
    Ok(Self {
      program,
      base_args: parts.collect(),
      source: None,
      current: Mutex::new(None),
    })
  }

  /// Source database passed to the converter as `--source`.
  pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
    self.source = Some(source.into());
    self
  }

  fn current(&self) -> MutexGuard<'_, Option<Arc<RunPlan>>> {
    self.current.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Plan of the run whose analyzer was created last.
  fn active_plan(&self) -> Arc<RunPlan> {
    self.current().get_or_insert_with(Default::default).clone()
  }
}

impl EngineFactory for CommandEngine {
  fn revision_analyzer(&self, _ctx: &EngineContext) -> Arc<dyn RevisionAnalyzer> {
    let plan = Arc::new(RunPlan::default());
    *self.current() = Some(plan.clone());
    Arc::new(CommandAnalyzer { plan })
  }

  fn changeset_builder(
    &self,
    _ctx: &EngineContext,
    _analyzer: Arc<dyn RevisionAnalyzer>,
  ) -> Arc<dyn ChangesetBuilder> {
    Arc::new(CommandBuilder {
      plan: self.active_plan(),
    })
  }

  fn git_exporter(
    &self,
    ctx: &EngineContext,
    _analyzer: Arc<dyn RevisionAnalyzer>,
    _builder: Arc<dyn ChangesetBuilder>,
  ) -> Arc<dyn GitExporter> {
    Arc::new(CommandExporter {
      program: self.program.clone(),
      base_args: self.base_args.clone(),
      source: self.source.clone(),
      plan: self.active_plan(),
      ctx: ctx.clone(),
    })
  }
}

struct CommandAnalyzer {
  plan: Arc<RunPlan>,
}

impl RevisionAnalyzer for CommandAnalyzer {
  fn add_item(
    &self,
    project: &SourceProject,
    exclude_pattern: Option<&str>,
  ) -> Result<(), EngineError> {
    let mut plan = self.plan.plan();
    plan.project = Some(project.clone());
    plan.exclude = exclude_pattern.map(str::to_string);
    Ok(())
  }

  fn file_count(&self) -> u64 {
    self.plan.counters.files.load(Ordering::Relaxed)
  }

  fn revision_count(&self) -> u64 {
    self.plan.counters.revisions.load(Ordering::Relaxed)
  }
}

struct CommandBuilder {
  plan: Arc<RunPlan>,
}

impl ChangesetBuilder for CommandBuilder {
  fn build_changesets(&self, thresholds: ChangesetThresholds) -> Result<(), EngineError> {
    self.plan.plan().thresholds = thresholds;
    Ok(())
  }

  fn changeset_count(&self) -> u64 {
    self.plan.counters.changesets.load(Ordering::Relaxed)
  }
}

struct CommandExporter {
  program: String,
  base_args: Vec<String>,
  source: Option<PathBuf>,
  plan: Arc<RunPlan>,
  ctx: EngineContext,
}

impl GitExporter for CommandExporter {
  fn export_to_git(&self, repo_dir: &Path, options: &ExportOptions) -> Result<(), EngineError> {
    let plan = self.plan.plan().clone();
    let project = plan
      .project
      .as_ref()
      .ok_or_else(|| EngineError::new("export requested before any project was added"))?;
    let mut args: Vec<OsString> = self.base_args.iter().map(OsString::from).collect();
    args.extend(converter_args(
      self.source.as_deref(),
      project,
      &plan,
      repo_dir,
      options,
    ));

    let description = format!("Exporting {}", project.path);
    let program = self.program.clone();
    let logger = self.ctx.logger.clone();
    let run_plan = self.plan.clone();
    self.ctx.queue.add_work(description, move |work| {
      run_converter(&program, &args, &logger, &run_plan.counters, work)
    });
    Ok(())
  }
}

/// Flags handed to the converter, after the configured leading arguments.
fn converter_args(
  source: Option<&Path>,
  project: &SourceProject,
  plan: &Plan,
  repo_dir: &Path,
  options: &ExportOptions,
) -> Vec<OsString> {
  let mut args: Vec<OsString> = Vec::new();
  let mut flag = |name: &str, value: OsString| {
    args.push(name.into());
    args.push(value);
  };
  if let Some(source) = source {
    flag("--source", source.into());
  }
  flag("--project", project.path.as_str().into());
  flag("--physical", project.physical_name.as_str().into());
  flag("--out", repo_dir.into());
  if let Some(exclude) = &plan.exclude {
    flag("--exclude", exclude.into());
  }
  flag(
    "--any-comment-secs",
    plan.thresholds.any_comment.as_secs().to_string().into(),
  );
  flag(
    "--same-comment-secs",
    plan.thresholds.same_comment.as_secs().to_string().into(),
  );
  if let Some(domain) = &options.email_domain {
    flag("--email-domain", domain.into());
  }
  if let Some(comment) = &options.default_comment {
    flag("--default-comment", comment.into());
  }
  if let Some(encoding) = &options.commit_encoding {
    flag("--encoding", encoding.into());
  }
  if options.ignore_errors {
    args.push("--ignore-errors".into());
  }
  args
}

/// Feeds each line of `source` to `f` until EOF or until `f` returns false.
///
/// Lines are split on raw bytes and decoded lossily; converter output in a legacy code page
/// must not end the read early, or the converter dies on a closed pipe.
fn for_each_line(source: impl Read, mut f: impl FnMut(&str) -> bool) {
  let mut reader = BufReader::new(source);
  let mut buf = Vec::new();
  loop {
    buf.clear();
    match reader.read_until(b'\n', &mut buf) {
      Ok(0) => break,
      Ok(_) => {}
      Err(e) if e.kind() == ErrorKind::Interrupted => continue,
      Err(e) => {
        warn!(error = %e, "could not read converter output");
        break;
      }
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
      buf.pop();
    }
    if !f(&String::from_utf8_lossy(&buf)) {
      break;
    }
  }
}

#[instrument(level = "debug", skip(args, logger, counters, work))]
fn run_converter(
  program: &str,
  args: &[OsString],
  logger: &Logger,
  counters: &Counters,
  work: &WorkContext,
) -> Result<(), EngineError> {
  let mut child = Command::new(program)
    .args(args)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn()
    .map_err(|e| EngineError::with_source(format!("failed to start converter '{program}'"), e))?;

  let stdout = child.stdout.take();
  let stderr = child.stderr.take();
  let mut aborted = false;
  std::thread::scope(|scope| {
    if let Some(stderr) = stderr {
      scope.spawn(move || {
        for_each_line(stderr, |line| {
          logger.write_line(line);
          true
        })
      });
    }
    let Some(stdout) = stdout else { return };
    for_each_line(stdout, |line| {
      if let Some(p) = parse_progress(line) {
        counters.store(p);
        work.set_status(format!(
          "Exporting: {} files, {} revisions, {} changesets",
          p.files, p.revisions, p.changesets
        ));
      } else {
        logger.write_line(line);
      }
      if work.is_aborted() {
        aborted = true;
      }
      !aborted
    });
    if aborted && let Err(e) = child.kill() {
      warn!(error = %e, "could not stop converter");
    }
  });

  let status = child
    .wait()
    .map_err(|e| EngineError::with_source("failed to wait for converter", e))?;
  if aborted {
    return Err(EngineError::new("converter stopped: batch cancelled"));
  }
  debug!(%status, "converter finished");
  if status.success() {
    Ok(())
  } else {
    Err(EngineError::new(match status.code() {
      Some(code) => format!("converter exited with status {code}"),
      None => "converter terminated by signal".to_string(),
    }))
  }
}
