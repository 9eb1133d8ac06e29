//! Batch controller: drains the selection queue one run at a time.
//!
//! Runs never overlap; the next run's staging reset is what guarantees the previous staging
//! directory is gone. Per-project failures are logged and the batch continues. A failed
//! staging commit stops the batch.

use std::collections::VecDeque;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::engine::{EngineFactory, SourceReader};
use crate::error::MigrationError;
use crate::identity::resolve_selection;
use crate::layout::OutputLayout;
use crate::logger::Logger;
use crate::pipeline_run::{PipelineRun, RunServices};
use crate::report::{BatchReport, SelectionOutcome};
use crate::settings::MigrationConfig;
use crate::types::{ErrorOrigin, ErrorPhase, ErrorRecord, ProjectKey};
use crate::work_queue::WorkQueue;

const MIN_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Cancels a batch from outside the controller (UI action, signal handler).
#[derive(Debug, Clone)]
pub struct ControllerHandle {
  cancel: CancellationToken,
  queue: WorkQueue,
}

impl ControllerHandle {
  /// Stops the batch after the active run and skips queued engine work.
  pub fn cancel(&self) {
    self.cancel.cancel();
    self.queue.abort();
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  pub fn queue(&self) -> &WorkQueue {
    &self.queue
  }
}

/// Batch-scoped log handles.
struct BatchLogs {
  common: Logger,
  errors: Logger,
}

impl BatchLogs {
  fn record(&self, record: &ErrorRecord) {
    let text = record.render();
    self.errors.write_line(&text);
    self.common.write_line(&text);
  }
}

/// Drives [PipelineRun]s sequentially over a queue of selections.
pub struct PipelineController {
  config: MigrationConfig,
  layout: OutputLayout,
  reader: Arc<dyn SourceReader>,
  engine: Arc<dyn EngineFactory>,
  queue: WorkQueue,
  cancel: CancellationToken,
}

impl PipelineController {
  /// Creates the controller and its work queue. Must be called inside a tokio runtime.
  pub fn new(
    config: MigrationConfig,
    layout: OutputLayout,
    reader: Arc<dyn SourceReader>,
    engine: Arc<dyn EngineFactory>,
  ) -> Self {
    Self {
      config,
      layout,
      reader,
      engine,
      queue: WorkQueue::new(),
      cancel: CancellationToken::new(),
    }
  }

  pub fn handle(&self) -> ControllerHandle {
    ControllerHandle {
      cancel: self.cancel.clone(),
      queue: self.queue.clone(),
    }
  }

  pub fn layout(&self) -> &OutputLayout {
    &self.layout
  }

  /// Migrates every selection in order and returns the batch report.
  ///
  /// Returns an error only when the staging protocol itself failed (commit failure) or the
  /// batch logs could not be opened; that error has already been written to the logs.
  #[instrument(level = "info", skip_all, fields(selections = selections.len()))]
  pub async fn run(
    &mut self,
    mut selections: VecDeque<ProjectKey>,
  ) -> Result<BatchReport, MigrationError> {
    fs::create_dir_all(self.layout.root())?;
    let started = Local::now();
    let error_log_path = self.layout.error_log(started);
    let logs = BatchLogs {
      common: Logger::open(&self.layout.common_log(started), Vec::new())?,
      errors: Logger::open(&error_log_path, Vec::new())?,
    };
    self.write_header(&logs.common);

    let mut report = BatchReport::new(started);
    let result = self.drain(&mut selections, &logs, &mut report).await;
    if let Err(e) = &result {
      logs.record(&ErrorRecord::from_error(ErrorPhase::Global, ErrorOrigin::Global, e));
    }

    logs.common.close();
    logs.errors.close();
    if logs.errors.bytes_written() == 0 {
      if let Err(e) = fs::remove_file(&error_log_path) {
        warn!(path = %error_log_path.display(), error = %e, "could not remove empty error log");
      }
    } else {
      report.error_log = Some(error_log_path);
    }

    report.cancelled = self.cancel.is_cancelled();
    report.finished_at = Some(Local::now());
    info!(
      succeeded = report.succeeded(),
      failed = report.failed(),
      skipped = report.skipped(),
      cancelled = report.cancelled,
      "batch finished"
    );
    result.map(|()| report)
  }

  fn write_header(&self, common: &Logger) {
    let on_off = |b: bool| if b { "enabled" } else { "disabled" };
    common.write_line(&format!(
      "{} version {}",
      env!("CARGO_PKG_NAME"),
      env!("CARGO_PKG_VERSION")
    ));
    common.write_line(&format!("Source encoding: {}", self.config.source_encoding));
    common.write_line(&format!(
      "Comment transcoding: {}",
      on_off(self.config.transcode)
    ));
    common.write_line(&format!(
      "Ignore errors: {}",
      on_off(self.config.ignore_errors)
    ));
  }

  async fn drain(
    &self,
    selections: &mut VecDeque<ProjectKey>,
    logs: &BatchLogs,
    report: &mut BatchReport,
  ) -> Result<(), MigrationError> {
    while let Some(key) = selections.pop_front() {
      if self.cancel.is_cancelled() {
        info!(remaining = selections.len() + 1, "cancellation requested; not starting more runs");
        break;
      }
      let outcome = self.run_one(&key, logs).await?;
      report.push(key, outcome);
    }
    Ok(())
  }

  async fn run_one(
    &self,
    key: &ProjectKey,
    logs: &BatchLogs,
  ) -> Result<SelectionOutcome, MigrationError> {
    let origin = ErrorOrigin::Run(key.display_name());

    if self.config.skip_migrated && self.layout.is_migrated(key) {
      info!(project = %key, "already migrated; skipping");
      logs
        .common
        .write_line(&format!("SKIP: {} already migrated", key.display_name()));
      return Ok(SelectionOutcome::Skipped {
        reason: "already migrated".to_string(),
      });
    }

    let fail_path = self.layout.project_path(key, false);
    if fs::symlink_metadata(&fail_path).is_ok() {
      let reason = format!(
        "previous failed output exists at '{}'; remove it to retry",
        fail_path.display()
      );
      logs.record(&ErrorRecord::from_message(ErrorPhase::Resolve, origin, reason.clone()));
      return Ok(SelectionOutcome::Skipped { reason });
    }

    let project = match resolve_selection(self.reader.as_ref(), key) {
      Ok(p) => p,
      Err(e) => {
        warn!(project = %key, error = %e, "selection skipped");
        logs.record(&ErrorRecord::from_error(ErrorPhase::Resolve, origin, &e));
        return Ok(SelectionOutcome::Unresolved {
          error: e.to_string(),
        });
      }
    };

    let services = RunServices {
      common_logger: logs.common.clone(),
      error_logger: logs.errors.clone(),
      queue: self.queue.clone(),
      cancel: self.cancel.child_token(),
    };
    let mut run = PipelineRun::new(key.clone(), project, &self.layout, services);
    run.process(self.engine.as_ref(), &self.config);
    self.wait_for_engine(&run).await;
    let outcome = match run.post_process() {
      Ok(outcome) => outcome.into(),
      Err(e) if e.is_fatal_to_batch() => return Err(e),
      Err(e) => {
        warn!(project = %key, error = %e, "post-processing failed; continuing batch");
        SelectionOutcome::Failed { destination: None }
      }
    };
    run.dispose();
    Ok(outcome)
  }

  /// Waits until the work queue drains, logging progress periodically.
  async fn wait_for_engine(&self, run: &PipelineRun) {
    let period = self.config.progress_interval.max(MIN_PROGRESS_INTERVAL);
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
      tokio::select! {
        _ = self.queue.wait_idle() => break,
        _ = ticker.tick() => {
          let progress = run.progress().unwrap_or_default();
          info!(
            project = %run.key(),
            status = self.queue.last_status().as_deref().unwrap_or("Idle"),
            elapsed_secs = self.queue.active_time().as_secs(),
            files = progress.files,
            revisions = progress.revisions,
            changesets = progress.changesets,
            "progress"
          );
        }
      }
    }
  }
}
