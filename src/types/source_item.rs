//! Items returned by a [crate::SourceReader].

use serde::{Deserialize, Serialize};

/// A project (directory-like item) in the source repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProject {
  /// Logical path, e.g. `$/Product/App`.
  pub path: String,
  /// Last path segment.
  pub name: String,
  /// Physical entity id; distinct for entities that share `path`.
  pub physical_name: String,
}

impl SourceProject {
  pub fn new(path: impl Into<String>, physical_name: impl Into<String>) -> Self {
    let path = path.into();
    let name = path
      .rsplit('/')
      .next()
      .filter(|s| !s.is_empty())
      .unwrap_or(&path)
      .to_string();
    Self {
      path,
      name,
      physical_name: physical_name.into(),
    }
  }
}

/// Result of looking up a logical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceItem {
  Project(SourceProject),
  File { path: String },
}
