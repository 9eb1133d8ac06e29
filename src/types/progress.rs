//! Running counters reported by the conversion engine.

use serde::Serialize;

/// Snapshot of engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
  pub files: u64,
  pub revisions: u64,
  pub changesets: u64,
}
