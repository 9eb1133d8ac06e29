//! Fixed on-disk layout under the output root.
//!
//! ```text
//! <root>/_p/                       staging directory (one run at a time)
//! <root>/_p.log                    staging log of the active run
//! <root>/_success/<name>/          committed successful projects
//! <root>/_fail/<name>/             committed failed projects
//! <root>/_success/<name>/_vss2git.log
//! <root>/_log<timestamp>.log       common log of a batch
//! <root>/_errors<timestamp>.log    aggregate error log of a batch
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};

use crate::staging::safe_dir_name;
use crate::types::ProjectKey;

/// Staging name; staging paths never depend on the project key.
pub const STAGING_DIR_NAME: &str = "_p";
pub const SUCCESS_DIR_NAME: &str = "_success";
pub const FAIL_DIR_NAME: &str = "_fail";
/// Name of the run log inside a committed destination.
pub const RUN_LOG_FILENAME: &str = "_vss2git.log";

const KEY_HASH_LEN: usize = 8;

/// Paths derived from the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
  root: PathBuf,
}

impl OutputLayout {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn staging_dir(&self) -> PathBuf {
    self.root.join(STAGING_DIR_NAME)
  }

  pub fn staging_log(&self) -> PathBuf {
    self.root.join(format!("{STAGING_DIR_NAME}.log"))
  }

  pub fn success_root(&self) -> PathBuf {
    self.root.join(SUCCESS_DIR_NAME)
  }

  pub fn fail_root(&self) -> PathBuf {
    self.root.join(FAIL_DIR_NAME)
  }

  /// Common log path for a batch started at `started`.
  pub fn common_log(&self, started: DateTime<Local>) -> PathBuf {
    self.root.join(format!("_log{}.log", batch_stamp(started)))
  }

  /// Aggregate error log path for a batch started at `started`.
  pub fn error_log(&self, started: DateTime<Local>) -> PathBuf {
    self.root.join(format!("_errors{}.log", batch_stamp(started)))
  }

  /// Destination of a project under the success or fail root.
  pub fn project_path(&self, key: &ProjectKey, success: bool) -> PathBuf {
    let base = if success {
      self.success_root()
    } else {
      self.fail_root()
    };
    base.join(destination_name(key))
  }

  /// True when the project has already been committed to the success root.
  pub fn is_migrated(&self, key: &ProjectKey) -> bool {
    self.project_path(key, true).is_dir()
  }
}

/// `yyyyMMddHHmmssfff`.
fn batch_stamp(started: DateTime<Local>) -> String {
  started.format("%Y%m%d%H%M%S%3f").to_string()
}

/// Readable, collision-free directory name for a key:
/// `<safe path>[.<physical id>]-<first 8 hex of sha256(combined key)>`.
pub fn destination_name(key: &ProjectKey) -> String {
  let mut name = safe_dir_name(key.logical_path());
  if let Some(phys) = key.physical_id() {
    name.push('.');
    name.push_str(&safe_dir_name(phys));
  }
  let digest = Sha256::digest(key.to_combined().as_bytes());
  let hash: String = digest
    .iter()
    .take(KEY_HASH_LEN / 2)
    .map(|b| format!("{b:02x}"))
    .collect();
  format!("{name}-{hash}")
}
