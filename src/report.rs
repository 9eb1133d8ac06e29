//! Batch report: what happened to every selection.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::types::ProjectKey;

/// Result of post-processing one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
  /// `process()` never ran (cancelled before start or run reused).
  NotProcessed,
  /// Cancelled; the staging directory was left in place for inspection.
  Cancelled { staging_dir: PathBuf },
  /// Staging could not be prepared; nothing was committed.
  Unstaged,
  /// Staging renamed into the success or fail root.
  Committed { success: bool, destination: PathBuf },
}

/// Outcome of one selection in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SelectionOutcome {
  Succeeded { destination: PathBuf },
  Failed { destination: Option<PathBuf> },
  Cancelled { staging_dir: Option<PathBuf> },
  Skipped { reason: String },
  Unresolved { error: String },
}

impl From<RunOutcome> for SelectionOutcome {
  fn from(outcome: RunOutcome) -> Self {
    match outcome {
      RunOutcome::NotProcessed => SelectionOutcome::Cancelled { staging_dir: None },
      RunOutcome::Cancelled { staging_dir } => SelectionOutcome::Cancelled {
        staging_dir: Some(staging_dir),
      },
      RunOutcome::Unstaged => SelectionOutcome::Failed { destination: None },
      RunOutcome::Committed {
        success: true,
        destination,
      } => SelectionOutcome::Succeeded { destination },
      RunOutcome::Committed {
        success: false,
        destination,
      } => SelectionOutcome::Failed {
        destination: Some(destination),
      },
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionReport {
  pub key: ProjectKey,
  #[serde(flatten)]
  pub outcome: SelectionOutcome,
}

/// Aggregated result of [crate::PipelineController::run].
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
  pub started_at: DateTime<Local>,
  pub finished_at: Option<DateTime<Local>>,
  /// True when the batch stopped because cancellation was requested.
  pub cancelled: bool,
  /// Aggregate error log, when it has content.
  pub error_log: Option<PathBuf>,
  pub selections: Vec<SelectionReport>,
}

impl BatchReport {
  pub fn new(started_at: DateTime<Local>) -> Self {
    Self {
      started_at,
      finished_at: None,
      cancelled: false,
      error_log: None,
      selections: Vec::new(),
    }
  }

  pub fn push(&mut self, key: ProjectKey, outcome: SelectionOutcome) {
    self.selections.push(SelectionReport { key, outcome });
  }

  pub fn succeeded(&self) -> usize {
    self.count(|o| matches!(o, SelectionOutcome::Succeeded { .. }))
  }

  pub fn failed(&self) -> usize {
    self.count(|o| {
      matches!(
        o,
        SelectionOutcome::Failed { .. } | SelectionOutcome::Unresolved { .. }
      )
    })
  }

  pub fn skipped(&self) -> usize {
    self.count(|o| matches!(o, SelectionOutcome::Skipped { .. }))
  }

  fn count(&self, f: impl Fn(&SelectionOutcome) -> bool) -> usize {
    self.selections.iter().filter(|s| f(&s.outcome)).count()
  }

  /// True when every selection succeeded or was skipped and the batch was not cancelled.
  pub fn is_clean(&self) -> bool {
    !self.cancelled && self.failed() == 0
  }
}
