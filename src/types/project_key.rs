//! Durable identity of a project in the source repository.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MigrationError;

/// Separator between the logical path and the physical id in the combined form.
pub const KEY_SEPARATOR: char = '|';

/// Logical path plus an optional physical disambiguator.
///
/// `physical_id` is only set when more than one entity shares `logical_path`
/// (see [crate::identity::resolve]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectKey {
  logical_path: String,
  physical_id: Option<String>,
}

impl ProjectKey {
  /// Builds a key, rejecting an empty path or one containing [KEY_SEPARATOR] so that the
  /// combined form always parses back to the same key.
  pub fn new(
    logical_path: impl Into<String>,
    physical_id: Option<String>,
  ) -> Result<Self, MigrationError> {
    let logical_path = logical_path.into();
    let physical_id = physical_id.filter(|p| !p.is_empty());
    let invalid = |s: &str| s.is_empty() || s.contains(KEY_SEPARATOR);
    if invalid(logical_path.as_str()) || physical_id.as_deref().is_some_and(invalid) {
      let text = match &physical_id {
        Some(id) => format!("{logical_path}{KEY_SEPARATOR}{id}"),
        None => logical_path,
      };
      return Err(MigrationError::MalformedKey { text });
    }
    Ok(Self {
      logical_path,
      physical_id,
    })
  }

  pub fn logical(logical_path: impl Into<String>) -> Result<Self, MigrationError> {
    Self::new(logical_path, None)
  }

  pub fn logical_path(&self) -> &str {
    &self.logical_path
  }

  pub fn physical_id(&self) -> Option<&str> {
    self.physical_id.as_deref()
  }

  /// `path` or `path|physicalId`.
  pub fn to_combined(&self) -> String {
    match &self.physical_id {
      Some(id) => format!("{}{}{}", self.logical_path, KEY_SEPARATOR, id),
      None => self.logical_path.clone(),
    }
  }

  /// Parses the combined form. More than one physical-id segment is rejected.
  pub fn from_combined(text: &str) -> Result<Self, MigrationError> {
    let malformed = || MigrationError::MalformedKey {
      text: text.to_string(),
    };
    let mut parts = text.split(KEY_SEPARATOR);
    let logical_path = parts.next().unwrap_or_default();
    let physical_id = parts.next();
    if parts.next().is_some() || physical_id == Some("") {
      return Err(malformed());
    }
    Self::new(logical_path, physical_id.map(String::from)).map_err(|_| malformed())
  }

  /// Human-facing name for logs: `path` or `path (physicalId)`. Never a lookup key.
  pub fn display_name(&self) -> String {
    match &self.physical_id {
      Some(id) => format!("{} ({})", self.logical_path, id),
      None => self.logical_path.clone(),
    }
  }
}

impl fmt::Display for ProjectKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.display_name())
  }
}

impl FromStr for ProjectKey {
  type Err = MigrationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::from_combined(s)
  }
}

impl Serialize for ProjectKey {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.to_combined())
  }
}

impl<'de> Deserialize<'de> for ProjectKey {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let text = String::deserialize(deserializer)?;
    ProjectKey::from_combined(&text).map_err(serde::de::Error::custom)
  }
}
