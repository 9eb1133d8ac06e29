//! One project's end-to-end migration: stage, convert, commit.
//!
//! - [PipelineRun::process]: reset staging, open the run log, drive the engine phases.
//!   Engine failures are recorded, never propagated.
//! - [PipelineRun::post_process]: drain collected errors, commit staging into the success or
//!   fail root, move the run log next to the output. A commit failure is returned to the
//!   caller, because a staging directory left behind breaks the next run's reset.

use std::fs;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::engine::{EngineContext, EngineFactory, EngineHandles};
use crate::error::{EngineError, MigrationError};
use crate::layout::{OutputLayout, RUN_LOG_FILENAME};
use crate::logger::Logger;
use crate::report::RunOutcome;
use crate::settings::MigrationConfig;
use crate::staging::{self, keep_vcs_metadata};
use crate::types::{ErrorOrigin, ErrorPhase, ErrorRecord, Progress, ProjectKey, RunState, SourceProject};
use crate::work_queue::WorkQueue;

/// Batch-wide handles a run writes to and schedules on.
#[derive(Debug, Clone)]
pub struct RunServices {
  pub common_logger: Logger,
  pub error_logger: Logger,
  pub queue: WorkQueue,
  /// Run-scoped token; usually a child of the batch token.
  pub cancel: CancellationToken,
}

/// State of one project's migration. Never reused.
pub struct PipelineRun {
  key: ProjectKey,
  project: SourceProject,
  layout: OutputLayout,
  staging_dir: PathBuf,
  log_path: PathBuf,
  state: RunState,
  staged: bool,
  services: RunServices,
  run_logger: Option<Logger>,
  engines: Option<EngineHandles>,
  errors: Vec<ErrorRecord>,
}

impl std::fmt::Debug for PipelineRun {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PipelineRun")
      .field("key", &self.key)
      .field("state", &self.state)
      .field("cancelled", &self.is_cancelled())
      .field("errors", &self.errors.len())
      .finish()
  }
}

impl PipelineRun {
  pub fn new(
    key: ProjectKey,
    project: SourceProject,
    layout: &OutputLayout,
    services: RunServices,
  ) -> Self {
    Self {
      key,
      project,
      staging_dir: layout.staging_dir(),
      log_path: layout.staging_log(),
      layout: layout.clone(),
      state: RunState::Created,
      staged: false,
      services,
      run_logger: None,
      engines: None,
      errors: Vec::new(),
    }
  }

  pub fn key(&self) -> &ProjectKey {
    &self.key
  }

  pub fn state(&self) -> RunState {
    self.state
  }

  pub fn staging_dir(&self) -> &Path {
    &self.staging_dir
  }

  /// Errors recorded so far (synchronous and collected).
  pub fn errors(&self) -> &[ErrorRecord] {
    &self.errors
  }

  pub fn is_cancelled(&self) -> bool {
    self.services.cancel.is_cancelled()
  }

  /// Marks the run cancelled. Idempotent; safe to call from another task.
  pub fn set_cancelled(&self) {
    self.services.cancel.cancel();
  }

  /// Cloneable token for cancelling this run from outside its call stack.
  pub fn cancel_token(&self) -> CancellationToken {
    self.services.cancel.clone()
  }

  /// Current engine counters, once processing has started.
  pub fn progress(&self) -> Option<Progress> {
    self.engines.as_ref().map(EngineHandles::progress)
  }

  /// Stages and converts the project. Failures are recorded and end in
  /// [RunState::ProcessingFailed]; they never propagate.
  #[instrument(level = "info", skip_all, fields(project = %self.key))]
  pub fn process(&mut self, engine: &dyn EngineFactory, config: &MigrationConfig) {
    if self.state != RunState::Created {
      return;
    }
    if self.is_cancelled() {
      info!("cancelled before processing; staging left untouched");
      return;
    }
    self.state = RunState::Processing;
    match self.try_process(engine, config) {
      Ok(()) => self.state = RunState::ProcessingSucceeded,
      Err(e) => {
        self.report(ErrorPhase::Process, &e);
        self.state = RunState::ProcessingFailed;
      }
    }
  }

  fn try_process(
    &mut self,
    engine: &dyn EngineFactory,
    config: &MigrationConfig,
  ) -> Result<(), MigrationError> {
    staging::reset(&self.staging_dir, &self.log_path)?;
    let reset_err = |path: &Path| {
      let path = path.to_path_buf();
      move |source| MigrationError::StagingReset { path, source }
    };
    fs::create_dir_all(&self.staging_dir).map_err(reset_err(&self.staging_dir))?;
    let logger = Logger::open(&self.log_path, vec![self.services.common_logger.clone()])
      .map_err(reset_err(&self.log_path))?;
    self.staged = true;
    self.run_logger = Some(logger.clone());

    logger.write_section_separator();
    logger.write_line(&format!("Migrating {}", self.key.display_name()));

    let ctx = EngineContext {
      queue: self.services.queue.clone(),
      logger,
    };
    let engine_err = |key: &ProjectKey| {
      let project = key.display_name();
      move |source: EngineError| MigrationError::Engine { project, source }
    };

    let analyzer = engine.revision_analyzer(&ctx);
    self.engines = Some(EngineHandles {
      analyzer: analyzer.clone(),
      builder: None,
    });
    analyzer
      .add_item(&self.project, config.exclude_pattern.as_deref())
      .map_err(engine_err(&self.key))?;
    if self.stop_requested("changeset building") {
      return Ok(());
    }

    let builder = engine.changeset_builder(&ctx, analyzer.clone());
    self.engines = Some(EngineHandles {
      analyzer: analyzer.clone(),
      builder: Some(builder.clone()),
    });
    builder
      .build_changesets(config.thresholds)
      .map_err(engine_err(&self.key))?;
    if self.stop_requested("export") {
      return Ok(());
    }

    let exporter = engine.git_exporter(&ctx, analyzer, builder);
    exporter
      .export_to_git(&self.staging_dir, &config.export_options())
      .map_err(engine_err(&self.key))?;
    Ok(())
  }

  fn stop_requested(&self, phase: &str) -> bool {
    let cancelled = self.is_cancelled();
    if cancelled {
      info!(phase, "cancelled; not starting next phase");
      self.write_run_line(&format!("Cancelled before {phase}"));
    }
    cancelled
  }

  /// Commits the staging directory once engine work has finished.
  ///
  /// No-op unless [PipelineRun::process] ran. When cancelled the staging directory is left
  /// as-is. A commit failure is logged to both logs and returned.
  #[instrument(level = "info", skip_all, fields(project = %self.key))]
  pub fn post_process(&mut self) -> Result<RunOutcome, MigrationError> {
    if !self.state.is_processed() {
      return Ok(RunOutcome::NotProcessed);
    }
    self.state = RunState::PostProcessing;

    for e in self.services.queue.fetch_exceptions() {
      self.report(ErrorPhase::Collected, &e);
    }

    if self.is_cancelled() {
      info!(staging = %self.staging_dir.display(), "cancelled; leaving staging directory for inspection");
      self.write_run_line("Cancelled; staging directory left in place");
      self.release_logger();
      self.state = RunState::Disposed;
      return Ok(RunOutcome::Cancelled {
        staging_dir: self.staging_dir.clone(),
      });
    }

    if !self.staged {
      self.release_logger();
      self.state = RunState::Disposed;
      return Ok(RunOutcome::Unstaged);
    }

    match self.commit() {
      Ok(outcome) => {
        self.state = RunState::Committed;
        Ok(outcome)
      }
      Err(e) => {
        self.report(ErrorPhase::PostProcess, &e);
        self.release_logger();
        self.state = RunState::PostProcessFailed;
        Err(e)
      }
    }
  }

  fn commit(&mut self) -> Result<RunOutcome, MigrationError> {
    let success = self.errors.is_empty();
    let destination = self.layout.project_path(&self.key, success);
    self.write_run_line(&format!(
      "Committing as {} to {}",
      if success { "success" } else { "failure" },
      destination.display()
    ));

    // A project lives under exactly one root.
    let sibling = self.layout.project_path(&self.key, !success);
    if fs::symlink_metadata(&sibling).is_ok() {
      return Err(MigrationError::DestinationExists { path: sibling });
    }
    staging::commit(&self.staging_dir, &destination, &keep_vcs_metadata)?;
    self.release_logger();

    if fs::symlink_metadata(&self.log_path).is_ok() {
      let moved = destination.join(RUN_LOG_FILENAME);
      fs::rename(&self.log_path, &moved).map_err(|source| MigrationError::Commit {
        from: self.log_path.clone(),
        to: moved,
        source,
      })?;
    }
    info!(success, destination = %destination.display(), "run committed");
    Ok(RunOutcome::Committed {
      success,
      destination,
    })
  }

  /// Releases the run log and engine handles.
  pub fn dispose(mut self) {
    self.release_logger();
    self.engines = None;
    self.state = RunState::Disposed;
  }

  fn release_logger(&mut self) {
    if let Some(logger) = self.run_logger.take() {
      logger.close();
    }
  }

  fn write_run_line(&self, text: &str) {
    match &self.run_logger {
      Some(l) => l.write_line(text),
      None => self.services.common_logger.write_line(text),
    }
  }

  /// Writes an error to the aggregate error log and the run log, then records it.
  fn report(&mut self, phase: ErrorPhase, err: &(dyn std::error::Error + 'static)) {
    let record = ErrorRecord::from_error(phase, ErrorOrigin::Run(self.key.display_name()), err);
    let text = record.render();
    error!(project = %self.key, phase = phase.header(), "{}", record.message);
    self.services.error_logger.write_line(&text);
    self.write_run_line(&text);
    self.errors.push(record);
  }
}

impl Drop for PipelineRun {
  fn drop(&mut self) {
    self.release_logger();
  }
}
