//! Lifecycle state of a single pipeline run.

use std::fmt;

/// Lifecycle state of a [crate::PipelineRun].
///
/// Cancellation is tracked separately and checked at every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
  Created,
  Processing,
  ProcessingFailed,
  ProcessingSucceeded,
  PostProcessing,
  Committed,
  PostProcessFailed,
  Disposed,
}

impl RunState {
  /// True once `process()` has finished, whatever its result.
  pub fn is_processed(self) -> bool {
    matches!(
      self,
      RunState::ProcessingFailed | RunState::ProcessingSucceeded
    )
  }

  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      RunState::Committed | RunState::PostProcessFailed | RunState::Disposed
    )
  }
}

impl fmt::Display for RunState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RunState::Created => write!(f, "created"),
      RunState::Processing => write!(f, "processing"),
      RunState::ProcessingFailed => write!(f, "processing_failed"),
      RunState::ProcessingSucceeded => write!(f, "processing_succeeded"),
      RunState::PostProcessing => write!(f, "post_processing"),
      RunState::Committed => write!(f, "committed"),
      RunState::PostProcessFailed => write!(f, "post_process_failed"),
      RunState::Disposed => write!(f, "disposed"),
    }
  }
}
