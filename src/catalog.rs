//! JSON catalog of a source repository, used as the [SourceReader] of the CLI.
//!
//! ```json
//! {
//!   "projects": [
//!     { "path": "$", "physical_name": "AAAAAAAA" },
//!     { "path": "$/App", "physical_name": "BAAAAAAA" },
//!     { "path": "$/App", "physical_name": "CAAAAAAA", "deleted": true }
//!   ],
//!   "files": ["$/readme.txt"]
//! }
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::instrument;

use crate::engine::SourceReader;
use crate::error::MigrationError;
use crate::types::{SourceItem, SourceProject};

/// Logical path of the repository root.
pub const ROOT_PATH: &str = "$";

#[derive(Debug, Clone, Deserialize)]
struct CatalogProject {
  path: String,
  physical_name: String,
  #[serde(default)]
  deleted: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CatalogFile {
  #[serde(default)]
  projects: Vec<CatalogProject>,
  #[serde(default)]
  files: Vec<String>,
}

/// In-memory catalog reader.
#[derive(Debug, Clone, Default)]
pub struct CatalogReader {
  catalog: CatalogFile,
}

impl CatalogReader {
  #[instrument(level = "debug")]
  pub fn load(path: &Path) -> Result<Self, MigrationError> {
    let bytes = std::fs::read(path)?;
    Self::from_json(&bytes).map_err(|source| MigrationError::Catalog {
      path: path.to_path_buf(),
      source,
    })
  }

  pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
    Ok(Self {
      catalog: serde_json::from_slice(bytes)?,
    })
  }

  fn to_project(p: &CatalogProject) -> SourceProject {
    SourceProject::new(normalize(&p.path), p.physical_name.clone())
  }
}

/// Strips a trailing separator so `$/App/` and `$/App` name the same item.
fn normalize(path: &str) -> &str {
  if path.len() > 1 {
    path.trim_end_matches('/')
  } else {
    path
  }
}

fn parent_of(path: &str) -> Option<&str> {
  path.rfind('/').map(|i| if i == 0 { "/" } else { &path[..i] })
}

impl SourceReader for CatalogReader {
  fn root(&self) -> Option<SourceProject> {
    self
      .catalog
      .projects
      .iter()
      .find(|p| normalize(&p.path) == ROOT_PATH && !p.deleted)
      .map(Self::to_project)
  }

  fn get_item(&self, path: &str) -> Result<SourceItem, MigrationError> {
    let path = normalize(path);
    if let Some(p) = self
      .catalog
      .projects
      .iter()
      .find(|p| normalize(&p.path) == path && !p.deleted)
    {
      return Ok(SourceItem::Project(Self::to_project(p)));
    }
    if self.catalog.files.iter().any(|f| normalize(f) == path) {
      return Ok(SourceItem::File {
        path: path.to_string(),
      });
    }
    Err(MigrationError::PathNotFound {
      path: path.to_string(),
    })
  }

  fn projects_at(&self, path: &str) -> Vec<SourceProject> {
    let path = normalize(path);
    self
      .catalog
      .projects
      .iter()
      .filter(|p| normalize(&p.path) == path)
      .map(Self::to_project)
      .collect()
  }

  fn subprojects(&self, project: &SourceProject) -> Vec<SourceProject> {
    self
      .catalog
      .projects
      .iter()
      .filter(|p| {
        let path = normalize(&p.path);
        path != project.path && parent_of(path) == Some(project.path.as_str())
      })
      .map(Self::to_project)
      .collect()
  }
}
