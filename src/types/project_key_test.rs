//! Tests for `ProjectKey`.

use proptest::prelude::*;

use super::ProjectKey;
use crate::error::MigrationError;

#[test]
fn combined_without_physical_id_is_plain_path() {
  let key = ProjectKey::logical("$/App").unwrap();
  assert_eq!(key.to_combined(), "$/App");
  assert_eq!(key.display_name(), "$/App");
}

#[test]
fn combined_with_physical_id() {
  let key = ProjectKey::new("$/App", Some("phys2".to_string())).unwrap();
  assert_eq!(key.to_combined(), "$/App|phys2");
  assert_eq!(key.display_name(), "$/App (phys2)");
  assert_eq!(key.to_string(), "$/App (phys2)");
}

#[test]
fn from_combined_parses_both_forms() {
  let plain = ProjectKey::from_combined("$/App").unwrap();
  assert_eq!(plain.logical_path(), "$/App");
  assert_eq!(plain.physical_id(), None);

  let phys = ProjectKey::from_combined("$/App|phys2").unwrap();
  assert_eq!(phys.logical_path(), "$/App");
  assert_eq!(phys.physical_id(), Some("phys2"));
}

#[test]
fn from_combined_rejects_extra_segments() {
  let r = ProjectKey::from_combined("$/App|a|b");
  assert!(matches!(r, Err(MigrationError::MalformedKey { text }) if text == "$/App|a|b"));
}

#[test]
fn from_combined_rejects_empty_parts() {
  assert!(ProjectKey::from_combined("").is_err());
  assert!(ProjectKey::from_combined("|phys").is_err());
  assert!(ProjectKey::from_combined("$/App|").is_err());
}

#[test]
fn separator_in_parts_is_rejected() {
  let r = ProjectKey::logical("$/A|B");
  assert!(matches!(r, Err(MigrationError::MalformedKey { text }) if text == "$/A|B"));
  assert!(ProjectKey::new("$/A|B", Some("phys".into())).is_err());
  assert!(ProjectKey::new("$/App", Some("a|b".into())).is_err());
  assert!(ProjectKey::logical("").is_err());
}

#[test]
fn empty_physical_id_is_treated_as_absent() {
  let key = ProjectKey::new("$/App", Some(String::new())).unwrap();
  assert_eq!(key, ProjectKey::logical("$/App").unwrap());
}

#[test]
fn keys_differ_by_physical_id() {
  let a = ProjectKey::logical("$/App").unwrap();
  let b = ProjectKey::new("$/App", Some("phys2".to_string())).unwrap();
  assert_ne!(a, b);
}

#[test]
fn serde_uses_combined_string() {
  let key = ProjectKey::new("$/App", Some("phys2".to_string())).unwrap();
  let json = serde_json::to_string(&key).unwrap();
  assert_eq!(json, "\"$/App|phys2\"");
  let back: ProjectKey = serde_json::from_str(&json).unwrap();
  assert_eq!(back, key);
  assert!(serde_json::from_str::<ProjectKey>("\"a|b|c\"").is_err());
}

proptest! {
  #[test]
  fn combined_roundtrip(path in "\\$/[A-Za-z0-9_ ./-]{0,24}", phys in proptest::option::of("[A-Z]{1,8}")) {
    let key = ProjectKey::new(path, phys).unwrap();
    let back = ProjectKey::from_combined(&key.to_combined()).unwrap();
    prop_assert_eq!(back, key);
  }

  #[test]
  fn constructed_keys_always_roundtrip(path in ".{0,16}", phys in proptest::option::of(".{0,8}")) {
    if let Ok(key) = ProjectKey::new(path, phys) {
      prop_assert_eq!(ProjectKey::from_combined(&key.to_combined()).unwrap(), key);
    }
  }
}
