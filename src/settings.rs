//! Operator settings (TOML) and the immutable configuration handed to a batch.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::engine::{ChangesetThresholds, ExportOptions};
use crate::error::MigrationError;
use crate::types::ProjectKey;

/// Default settings filename.
pub const SETTINGS_FILENAME: &str = "vss2git.toml";

/// Immutable per-batch configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
  /// Exclude pattern passed to the revision analyzer.
  pub exclude_pattern: Option<String>,
  pub email_domain: Option<String>,
  pub default_comment: Option<String>,
  /// Transcode comments to UTF-8 instead of recording the source encoding.
  pub transcode: bool,
  /// Canonical name of the source encoding.
  pub source_encoding: String,
  /// Encoding recorded on commits; set only when `transcode` is off.
  pub commit_encoding: Option<String>,
  pub ignore_errors: bool,
  pub thresholds: ChangesetThresholds,
  /// Skip selections already committed to the success root.
  pub skip_migrated: bool,
  pub progress_interval: Duration,
}

impl Default for MigrationConfig {
  fn default() -> Self {
    Self {
      exclude_pattern: None,
      email_domain: None,
      default_comment: None,
      transcode: true,
      source_encoding: encoding_rs::WINDOWS_1252.name().to_string(),
      commit_encoding: None,
      ignore_errors: false,
      thresholds: ChangesetThresholds::default(),
      skip_migrated: true,
      progress_interval: Duration::from_secs(5),
    }
  }
}

impl MigrationConfig {
  pub fn export_options(&self) -> ExportOptions {
    ExportOptions {
      email_domain: self.email_domain.clone(),
      default_comment: self.default_comment.clone(),
      commit_encoding: self.commit_encoding.clone(),
      ignore_errors: self.ignore_errors,
    }
  }
}

/// Canonical encoding name for a WHATWG label (`latin1`, `cp1251`, `utf-8`, ...).
pub fn canonical_encoding(label: &str) -> Result<String, MigrationError> {
  encoding_rs::Encoding::for_label(label.trim().as_bytes())
    .map(|e| e.name().to_string())
    .ok_or_else(|| MigrationError::UnknownEncoding {
      label: label.to_string(),
    })
}

/// Persisted operator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// Source catalog (JSON) describing the repository.
  pub source_catalog: Option<PathBuf>,
  pub output_dir: Option<PathBuf>,
  /// External converter command run for every project.
  pub converter_command: Option<String>,
  pub exclude_paths: String,
  pub email_domain: String,
  pub default_comment: String,
  pub transcode_comments: bool,
  pub ignore_errors: bool,
  pub any_comment_seconds: u64,
  pub same_comment_seconds: u64,
  pub encoding: String,
  pub skip_migrated: bool,
  pub progress_seconds: u64,
  /// Selected projects, as combined keys (`path` or `path|physicalId`).
  pub projects: Vec<String>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      source_catalog: None,
      output_dir: None,
      converter_command: None,
      exclude_paths: String::new(),
      email_domain: String::new(),
      default_comment: String::new(),
      transcode_comments: true,
      ignore_errors: false,
      any_comment_seconds: 30,
      same_comment_seconds: 600,
      encoding: encoding_rs::WINDOWS_1252.name().to_string(),
      skip_migrated: true,
      progress_seconds: 5,
      projects: Vec::new(),
    }
  }
}

fn non_empty(s: &str) -> Option<String> {
  let s = s.trim();
  (!s.is_empty()).then(|| s.to_string())
}

impl Settings {
  /// Loads settings; a missing file yields defaults.
  #[instrument(level = "debug")]
  pub fn load_or_default(path: &Path) -> Result<Self, MigrationError> {
    if !path.exists() {
      return Ok(Self::default());
    }
    Self::load(path)
  }

  /// Loads settings and validates the selection and encoding.
  #[instrument(level = "debug")]
  pub fn load(path: &Path) -> Result<Self, MigrationError> {
    let text = std::fs::read_to_string(path)?;
    let settings: Settings = toml::from_str(&text).map_err(|e| MigrationError::Settings {
      path: path.to_path_buf(),
      source: Box::new(e),
    })?;
    settings.selected_projects()?;
    canonical_encoding(&settings.encoding)?;
    Ok(settings)
  }

  /// Writes settings as TOML, creating the parent directory if needed.
  #[instrument(level = "debug", skip(self))]
  pub fn save(&self, path: &Path) -> Result<(), MigrationError> {
    let text = toml::to_string_pretty(self).map_err(|e| MigrationError::Settings {
      path: path.to_path_buf(),
      source: Box::new(e),
    })?;
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)?;
    Ok(())
  }

  /// Parses the persisted selection. Rejects malformed keys.
  pub fn selected_projects(&self) -> Result<Vec<ProjectKey>, MigrationError> {
    self
      .projects
      .iter()
      .map(|s| ProjectKey::from_combined(s.trim()))
      .collect()
  }

  /// Adds `key` to the selection; returns false if already selected.
  pub fn select(&mut self, key: &ProjectKey) -> bool {
    let combined = key.to_combined();
    if self.projects.contains(&combined) {
      return false;
    }
    self.projects.push(combined);
    true
  }

  /// Removes `key` from the selection; returns false if it was not selected.
  pub fn deselect(&mut self, key: &ProjectKey) -> bool {
    let combined = key.to_combined();
    let before = self.projects.len();
    self.projects.retain(|p| p != &combined);
    self.projects.len() != before
  }

  pub fn to_config(&self) -> Result<MigrationConfig, MigrationError> {
    let source_encoding = canonical_encoding(&self.encoding)?;
    let commit_encoding = (!self.transcode_comments).then(|| source_encoding.clone());
    Ok(MigrationConfig {
      exclude_pattern: non_empty(&self.exclude_paths),
      email_domain: non_empty(&self.email_domain),
      default_comment: non_empty(&self.default_comment),
      transcode: self.transcode_comments,
      source_encoding,
      commit_encoding,
      ignore_errors: self.ignore_errors,
      thresholds: ChangesetThresholds {
        any_comment: Duration::from_secs(self.any_comment_seconds),
        same_comment: Duration::from_secs(self.same_comment_seconds),
      },
      skip_migrated: self.skip_migrated,
      progress_interval: Duration::from_secs(self.progress_seconds.max(1)),
    })
  }
}
