//! Identity resolution: turn source entities into [ProjectKey]s and back.
//!
//! The source system lets several historical entities occupy the same logical path (for
//! example after a delete and recreate). Those get a physical id in their key so they never
//! collide; a unique entity keeps a plain logical key.

use std::collections::BTreeMap;

use tracing::instrument;

use crate::engine::SourceReader;
use crate::error::MigrationError;
use crate::types::{ProjectKey, SourceItem, SourceProject};

/// Key of `project` given every entity sharing its logical path.
///
/// Fails with [MigrationError::MalformedKey] when the path cannot be expressed as a key.
pub fn resolve(
  project: &SourceProject,
  candidates: &[SourceProject],
) -> Result<ProjectKey, MigrationError> {
  let shared = candidates
    .iter()
    .any(|c| c.path == project.path && c.physical_name != project.physical_name);
  if shared {
    ProjectKey::new(project.path.clone(), Some(project.physical_name.clone()))
  } else {
    ProjectKey::logical(project.path.clone())
  }
}

/// Turns a persisted key back into the project it names.
///
/// A key with a physical id must match one of the entities at its path. A plain key resolves
/// to the current item at the path, which must be a project.
#[instrument(level = "debug", skip(reader), fields(key = %key))]
pub fn resolve_selection(
  reader: &dyn SourceReader,
  key: &ProjectKey,
) -> Result<SourceProject, MigrationError> {
  match key.physical_id() {
    Some(phys) => reader
      .projects_at(key.logical_path())
      .into_iter()
      .find(|p| p.physical_name == phys)
      .ok_or_else(|| MigrationError::PathNotFound {
        path: key.display_name(),
      }),
    None => match reader.get_item(key.logical_path())? {
      SourceItem::Project(p) => Ok(p),
      SourceItem::File { path } => Err(MigrationError::NotAProject { path }),
    },
  }
}

/// Projects of a source tree grouped by logical path.
#[derive(Debug, Default, Clone)]
pub struct ProjectIndex {
  by_path: BTreeMap<String, Vec<SourceProject>>,
}

impl ProjectIndex {
  /// Walks the reader's tree from the root.
  #[instrument(level = "debug", skip(reader))]
  pub fn build(reader: &dyn SourceReader) -> Self {
    let mut index = Self::default();
    let mut stack: Vec<SourceProject> = reader.root().into_iter().collect();
    while let Some(project) = stack.pop() {
      let mut children = reader.subprojects(&project);
      children.reverse();
      stack.extend(children);
      index.insert(project);
    }
    index
  }

  pub fn insert(&mut self, project: SourceProject) {
    let entry = self.by_path.entry(project.path.clone()).or_default();
    if !entry.iter().any(|p| p.physical_name == project.physical_name) {
      entry.push(project);
    }
  }

  pub fn key_for(&self, project: &SourceProject) -> Result<ProjectKey, MigrationError> {
    let candidates = self
      .by_path
      .get(&project.path)
      .map(Vec::as_slice)
      .unwrap_or_default();
    resolve(project, candidates)
  }

  /// Every indexed project with its key, ordered by logical path.
  pub fn entries(&self) -> Result<Vec<(ProjectKey, &SourceProject)>, MigrationError> {
    self
      .by_path
      .values()
      .flatten()
      .map(|p| Ok((self.key_for(p)?, p)))
      .collect()
  }

  pub fn len(&self) -> usize {
    self.by_path.values().map(Vec::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.by_path.is_empty()
  }
}
