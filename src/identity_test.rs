//! Tests for identity resolution.

use crate::catalog::CatalogReader;
use crate::error::MigrationError;
use crate::identity::{ProjectIndex, resolve, resolve_selection};
use crate::types::{ProjectKey, SourceProject};

const CATALOG: &str = r#"{
  "projects": [
    { "path": "$", "physical_name": "AAAAAAAA" },
    { "path": "$/App", "physical_name": "BAAAAAAA" },
    { "path": "$/App", "physical_name": "CAAAAAAA", "deleted": true },
    { "path": "$/Tools", "physical_name": "EAAAAAAA" }
  ],
  "files": ["$/readme.txt"]
}"#;

fn reader() -> CatalogReader {
  CatalogReader::from_json(CATALOG.as_bytes()).unwrap()
}

#[test]
fn unique_entity_gets_plain_key() {
  let p = SourceProject::new("$/Tools", "EAAAAAAA");
  let key = resolve(&p, std::slice::from_ref(&p)).unwrap();
  assert_eq!(key, ProjectKey::logical("$/Tools").unwrap());
}

#[test]
fn shared_path_gets_physical_id() {
  let a = SourceProject::new("$/App", "BAAAAAAA");
  let b = SourceProject::new("$/App", "CAAAAAAA");
  let candidates = vec![a.clone(), b.clone()];
  assert_eq!(
    resolve(&a, &candidates).unwrap(),
    ProjectKey::new("$/App", Some("BAAAAAAA".into())).unwrap()
  );
  assert_eq!(
    resolve(&b, &candidates).unwrap(),
    ProjectKey::new("$/App", Some("CAAAAAAA".into())).unwrap()
  );
}

#[test]
fn empty_candidates_yield_plain_key() {
  let p = SourceProject::new("$/App", "BAAAAAAA");
  assert_eq!(resolve(&p, &[]).unwrap(), ProjectKey::logical("$/App").unwrap());
}

#[test]
fn index_groups_by_path() {
  let index = ProjectIndex::build(&reader());
  assert_eq!(index.len(), 4);
  let keys: Vec<String> = index.entries().unwrap().into_iter().map(|(k, _)| k.to_combined()).collect();
  assert_eq!(keys, vec!["$", "$/App|BAAAAAAA", "$/App|CAAAAAAA", "$/Tools"]);
}

#[test]
fn resolve_selection_by_physical_id() {
  let p = resolve_selection(&reader(), &ProjectKey::new("$/App", Some("CAAAAAAA".into())).unwrap()).unwrap();
  assert_eq!(p.physical_name, "CAAAAAAA");
}

#[test]
fn resolve_selection_plain_key_uses_current_item() {
  let p = resolve_selection(&reader(), &ProjectKey::logical("$/App").unwrap()).unwrap();
  assert_eq!(p.physical_name, "BAAAAAAA");
}

#[test]
fn resolve_selection_errors() {
  let r = reader();
  assert!(matches!(
    resolve_selection(&r, &ProjectKey::new("$/App", Some("ZZZ".into())).unwrap()),
    Err(MigrationError::PathNotFound { path }) if path == "$/App (ZZZ)"
  ));
  assert!(matches!(
    resolve_selection(&r, &ProjectKey::logical("$/Missing").unwrap()),
    Err(MigrationError::PathNotFound { .. })
  ));
  assert!(matches!(
    resolve_selection(&r, &ProjectKey::logical("$/readme.txt").unwrap()),
    Err(MigrationError::NotAProject { .. })
  ));
}
