//! Interfaces of the external collaborators driven by a pipeline run.
//!
//! The source reader resolves logical paths; the revision analyzer, changeset builder and
//! git exporter perform the conversion. Engine instances are created fresh for every run by
//! an [EngineFactory] and dropped with the run. Heavy work is expected to be queued on the
//! [WorkQueue] from [EngineContext]; failures raised there are collected after processing.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{EngineError, MigrationError};
use crate::logger::Logger;
use crate::types::{Progress, SourceItem, SourceProject};
use crate::work_queue::WorkQueue;

/// Read access to the source repository.
pub trait SourceReader: Send + Sync {
  /// Root project, if the database has one.
  fn root(&self) -> Option<SourceProject>;

  /// Current item at `path`. Fails with [MigrationError::PathNotFound].
  fn get_item(&self, path: &str) -> Result<SourceItem, MigrationError>;

  /// Every project entity that shares the logical `path` (current and historical).
  fn projects_at(&self, path: &str) -> Vec<SourceProject>;

  /// Direct child projects of `project`.
  fn subprojects(&self, project: &SourceProject) -> Vec<SourceProject>;
}

/// Time windows deciding whether adjacent check-ins merge into one changeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangesetThresholds {
  pub any_comment: Duration,
  pub same_comment: Duration,
}

impl Default for ChangesetThresholds {
  fn default() -> Self {
    Self {
      any_comment: Duration::from_secs(30),
      same_comment: Duration::from_secs(600),
    }
  }
}

/// Overrides applied to the git exporter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOptions {
  pub email_domain: Option<String>,
  pub default_comment: Option<String>,
  /// Encoding recorded on commits; `None` when comments are transcoded to UTF-8.
  pub commit_encoding: Option<String>,
  pub ignore_errors: bool,
}

/// Per-run handles given to engine instances.
#[derive(Debug, Clone)]
pub struct EngineContext {
  pub queue: WorkQueue,
  pub logger: Logger,
}

/// Builds the revision model of a project.
pub trait RevisionAnalyzer: Send + Sync {
  fn add_item(
    &self,
    project: &SourceProject,
    exclude_pattern: Option<&str>,
  ) -> Result<(), EngineError>;

  fn file_count(&self) -> u64;

  fn revision_count(&self) -> u64;
}

/// Groups revisions into changesets.
pub trait ChangesetBuilder: Send + Sync {
  fn build_changesets(&self, thresholds: ChangesetThresholds) -> Result<(), EngineError>;

  fn changeset_count(&self) -> u64;
}

/// Writes the converted history into a git repository.
pub trait GitExporter: Send + Sync {
  fn export_to_git(&self, repo_dir: &Path, options: &ExportOptions) -> Result<(), EngineError>;
}

/// Creates the engine instances of one run.
pub trait EngineFactory: Send + Sync {
  fn revision_analyzer(&self, ctx: &EngineContext) -> Arc<dyn RevisionAnalyzer>;

  fn changeset_builder(
    &self,
    ctx: &EngineContext,
    analyzer: Arc<dyn RevisionAnalyzer>,
  ) -> Arc<dyn ChangesetBuilder>;

  fn git_exporter(
    &self,
    ctx: &EngineContext,
    analyzer: Arc<dyn RevisionAnalyzer>,
    builder: Arc<dyn ChangesetBuilder>,
  ) -> Arc<dyn GitExporter>;
}

/// Engine instances owned by one run.
#[derive(Clone)]
pub struct EngineHandles {
  pub analyzer: Arc<dyn RevisionAnalyzer>,
  pub builder: Option<Arc<dyn ChangesetBuilder>>,
}

impl EngineHandles {
  pub fn progress(&self) -> Progress {
    Progress {
      files: self.analyzer.file_count(),
      revisions: self.analyzer.revision_count(),
      changesets: self.builder.as_ref().map_or(0, |b| b.changeset_count()),
    }
  }
}
