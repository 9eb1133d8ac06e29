//! Error taxonomy for the migration pipeline.
//!
//! Failures local to one project's conversion (`Engine`, `PathNotFound`, `NotAProject`,
//! `StagingReset`) are recovered by the controller. Failures of the staging commit itself
//! (`DestinationExists`, `Commit`) abort the batch.

use std::path::PathBuf;

/// Error raised by an engine collaborator or by a work item on the [crate::WorkQueue].
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct EngineError {
  message: String,
  #[source]
  source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl EngineError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      source: None,
    }
  }

  /// Wraps an underlying cause under a context message.
  pub fn with_source(
    message: impl Into<String>,
    source: impl std::error::Error + Send + Sync + 'static,
  ) -> Self {
    Self {
      message: message.into(),
      source: Some(Box::new(source)),
    }
  }

  pub fn message(&self) -> &str {
    &self.message
  }
}

/// Errors produced by the pipeline core.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
  /// Stale staging state could not be cleared before a run.
  #[error("failed to clear staging state at '{}'", path.display())]
  StagingReset {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("path not found: {path}")]
  PathNotFound { path: String },

  #[error("{path} is not a project")]
  NotAProject { path: String },

  /// Conversion failure for one project.
  #[error("engine failure for {project}")]
  Engine {
    project: String,
    #[source]
    source: EngineError,
  },

  /// Commit target already exists; never overwritten.
  #[error("destination already exists: '{}'", path.display())]
  DestinationExists { path: PathBuf },

  #[error("failed to move '{}' to '{}'", from.display(), to.display())]
  Commit {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed project key '{text}'")]
  MalformedKey { text: String },

  #[error("unknown encoding label '{label}'")]
  UnknownEncoding { label: String },

  #[error("invalid settings file '{}'", path.display())]
  Settings {
    path: PathBuf,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("invalid catalog '{}'", path.display())]
  Catalog {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

impl MigrationError {
  /// True for failures that leave the staging protocol in an unknown state.
  pub fn is_fatal_to_batch(&self) -> bool {
    matches!(
      self,
      MigrationError::DestinationExists { .. } | MigrationError::Commit { .. }
    )
  }
}

pub type Result<T> = std::result::Result<T, MigrationError>;
