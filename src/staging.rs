//! Staging directory protocol: clear stale state, then commit by rename.
//!
//! Output is never copied. A commit is a single `rename` of the staging directory into its
//! final home, so a destination is either absent or complete. Renames across filesystems
//! fail and are reported as [MigrationError::Commit]; there is no copy fallback.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::error::{MigrationError, Result};

/// Source-system root marker stripped from destination names.
pub const ROOT_MARKER: &str = "$/";

/// Prefix of the version-control metadata kept by [commit] (`.git`, `.gitattributes`, ...).
pub const VCS_METADATA_PREFIX: &str = ".git";

/// Default commit predicate: keep only version-control metadata.
pub fn keep_vcs_metadata(name: &str) -> bool {
  name.starts_with(VCS_METADATA_PREFIX)
}

/// Turns a logical path into a single filesystem segment: drops the root marker and
/// replaces path separators with underscores. Not injective (`$/A/B` and `$/A_B` collide);
/// see [crate::OutputLayout::project_path] for the collision-free destination name.
pub fn safe_dir_name(logical_path: &str) -> String {
  logical_path
    .replace(ROOT_MARKER, "")
    .replace(['/', '\\'], "_")
}

#[cfg(unix)]
fn make_writable(path: &Path, is_dir: bool) -> io::Result<()> {
  use std::os::unix::fs::PermissionsExt;
  let mut perms = fs::metadata(path)?.permissions();
  let extra = if is_dir { 0o700 } else { 0o600 };
  perms.set_mode(perms.mode() | extra);
  fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
#[allow(clippy::permissions_set_readonly_false)]
fn make_writable(path: &Path, _is_dir: bool) -> io::Result<()> {
  let mut perms = fs::metadata(path)?.permissions();
  perms.set_readonly(false);
  fs::set_permissions(path, perms)
}

/// Deletes `path` and everything below it, clearing read-only flags first.
#[instrument(level = "trace")]
pub(crate) fn remove_tree(path: &Path) -> io::Result<()> {
  let meta = fs::symlink_metadata(path)?;
  if !meta.is_dir() {
    if meta.is_file() {
      make_writable(path, false)?;
    }
    return fs::remove_file(path);
  }

  // Pass 1: make every directory and file writable so children can be unlinked.
  for entry in WalkDir::new(path) {
    let entry = entry.map_err(io::Error::from)?;
    let ft = entry.file_type();
    if !ft.is_symlink() {
      make_writable(entry.path(), ft.is_dir())?;
    }
  }

  // Pass 2: delete bottom-up.
  for entry in WalkDir::new(path).contents_first(true) {
    let entry = entry.map_err(io::Error::from)?;
    if entry.file_type().is_dir() {
      fs::remove_dir(entry.path())?;
    } else {
      fs::remove_file(entry.path())?;
    }
  }
  Ok(())
}

/// Deletes every direct child of `dir` whose name fails `keep`. Kept entries are untouched.
#[instrument(level = "trace", skip(keep))]
pub fn clear_dir(dir: &Path, keep: &dyn Fn(&str) -> bool) -> io::Result<()> {
  for entry in fs::read_dir(dir)? {
    let entry = entry?;
    let name = entry.file_name();
    if keep(&name.to_string_lossy()) {
      continue;
    }
    remove_tree(&entry.path())?;
  }
  Ok(())
}

/// Removes a stale staging directory and staging log left by a previous run.
///
/// Blocked deletion (locks, permissions) is fatal for the run and not retried.
#[instrument(level = "debug")]
pub fn reset(staging_dir: &Path, log_path: &Path) -> Result<()> {
  if fs::symlink_metadata(staging_dir).is_ok() {
    debug!(path = %staging_dir.display(), "removing stale staging directory");
    remove_tree(staging_dir).map_err(|source| MigrationError::StagingReset {
      path: staging_dir.to_path_buf(),
      source,
    })?;
  }
  if fs::symlink_metadata(log_path).is_ok() {
    debug!(path = %log_path.display(), "removing stale staging log");
    remove_tree(log_path).map_err(|source| MigrationError::StagingReset {
      path: log_path.to_path_buf(),
      source,
    })?;
  }
  Ok(())
}

/// Strips entries rejected by `keep` from `staging_dir`, then renames it to `destination`.
///
/// Creates the destination's parent when missing. An existing destination is never
/// overwritten: [MigrationError::DestinationExists] is returned before anything is touched.
#[instrument(level = "debug", skip(keep))]
pub fn commit(staging_dir: &Path, destination: &Path, keep: &dyn Fn(&str) -> bool) -> Result<()> {
  let commit_err = |source: io::Error| MigrationError::Commit {
    from: staging_dir.to_path_buf(),
    to: destination.to_path_buf(),
    source,
  };

  if fs::symlink_metadata(destination).is_ok() {
    return Err(MigrationError::DestinationExists {
      path: destination.to_path_buf(),
    });
  }

  clear_dir(staging_dir, keep).map_err(commit_err)?;

  if let Some(parent) = destination.parent()
    && !parent.as_os_str().is_empty()
  {
    fs::create_dir_all(parent).map_err(commit_err)?;
  }
  fs::rename(staging_dir, destination).map_err(commit_err)?;
  debug!(to = %destination.display(), "staging committed");
  Ok(())
}
