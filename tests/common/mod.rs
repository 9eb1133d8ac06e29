//! Shared fixtures for the batch integration tests: a catalog of source projects and a
//! scripted in-memory engine.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use vss2git_batch::engine::{
  ChangesetBuilder, ChangesetThresholds, EngineContext, ExportOptions, GitExporter,
  RevisionAnalyzer,
};
use vss2git_batch::{
  CatalogReader, ControllerHandle, EngineError, EngineFactory, MigrationConfig, OutputLayout,
  PipelineController, SourceProject,
};

pub const CATALOG: &str = r#"{
  "projects": [
    { "path": "$", "physical_name": "AAAAAAAA" },
    { "path": "$/App", "physical_name": "BAAAAAAA" },
    { "path": "$/App", "physical_name": "CAAAAAAA", "deleted": true },
    { "path": "$/Lib", "physical_name": "DAAAAAAA" },
    { "path": "$/Broken", "physical_name": "EAAAAAAA" },
    { "path": "$/Flaky", "physical_name": "FAAAAAAA" },
    { "path": "$/Tools", "physical_name": "GAAAAAAA" }
  ],
  "files": ["$/readme.txt"]
}"#;

/// What the engine does for one project path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
  /// Exports a small repository.
  Succeed,
  /// Writes partial output, then fails the export.
  FailExport,
  /// Exports, then raises an error from queued work.
  FailQueued,
  /// Requests batch cancellation while analyzing.
  CancelBatch,
}

/// Engine whose behavior is scripted per logical path.
#[derive(Default)]
pub struct ScriptedEngine {
  behaviors: HashMap<String, Behavior>,
  analyzed: Mutex<Vec<String>>,
  handle: OnceLock<ControllerHandle>,
}

impl ScriptedEngine {
  pub fn new(behaviors: &[(&str, Behavior)]) -> Arc<Self> {
    Arc::new(Self {
      behaviors: behaviors
        .iter()
        .map(|(p, b)| (p.to_string(), *b))
        .collect(),
      ..Self::default()
    })
  }

  pub fn attach(&self, handle: ControllerHandle) {
    let _ = self.handle.set(handle);
  }

  /// Physical names of the projects analyzed so far, in order.
  pub fn analyzed(&self) -> Vec<String> {
    self.analyzed.lock().unwrap().clone()
  }

  fn behavior(&self, project: &SourceProject) -> Behavior {
    self
      .behaviors
      .get(&project.path)
      .copied()
      .unwrap_or(Behavior::Succeed)
  }
}

struct ScriptedRun {
  engine: Arc<ScriptedEngine>,
  queue: vss2git_batch::WorkQueue,
  project: Mutex<Option<SourceProject>>,
}

impl RevisionAnalyzer for ScriptedRun {
  fn add_item(&self, project: &SourceProject, _exclude: Option<&str>) -> Result<(), EngineError> {
    self
      .engine
      .analyzed
      .lock()
      .unwrap()
      .push(project.physical_name.clone());
    *self.project.lock().unwrap() = Some(project.clone());
    if self.engine.behavior(project) == Behavior::CancelBatch
      && let Some(handle) = self.engine.handle.get()
    {
      handle.cancel();
    }
    Ok(())
  }

  fn file_count(&self) -> u64 {
    1
  }

  fn revision_count(&self) -> u64 {
    1
  }
}

impl ChangesetBuilder for ScriptedRun {
  fn build_changesets(&self, _thresholds: ChangesetThresholds) -> Result<(), EngineError> {
    Ok(())
  }

  fn changeset_count(&self) -> u64 {
    1
  }
}

impl GitExporter for ScriptedRun {
  fn export_to_git(&self, repo_dir: &Path, _options: &ExportOptions) -> Result<(), EngineError> {
    let project = self
      .project
      .lock()
      .unwrap()
      .clone()
      .ok_or_else(|| EngineError::new("no project"))?;
    let git = repo_dir.join(".git");
    fs::create_dir_all(git.join("objects")).unwrap();
    fs::write(git.join("description"), &project.physical_name).unwrap();
    fs::write(repo_dir.join("README.txt"), "working copy").unwrap();
    match self.engine.behavior(&project) {
      Behavior::FailExport => {
        fs::write(git.join("objects").join("partial"), "half written").unwrap();
        Err(EngineError::with_source(
          "export failed",
          std::io::Error::other("export exploded"),
        ))
      }
      Behavior::FailQueued => {
        self.queue.add_work("finishing export", |_| {
          Err(EngineError::new("background export step failed"))
        });
        Ok(())
      }
      Behavior::Succeed | Behavior::CancelBatch => Ok(()),
    }
  }
}

/// Factory handing out one shared [ScriptedRun] per run.
pub struct ScriptedFactory {
  engine: Arc<ScriptedEngine>,
  current: Mutex<Option<Arc<ScriptedRun>>>,
}

impl ScriptedFactory {
  pub fn new(engine: Arc<ScriptedEngine>) -> Arc<Self> {
    Arc::new(Self {
      engine,
      current: Mutex::new(None),
    })
  }

  fn current(&self) -> Arc<ScriptedRun> {
    self.current.lock().unwrap().clone().unwrap()
  }
}

impl EngineFactory for ScriptedFactory {
  fn revision_analyzer(&self, ctx: &EngineContext) -> Arc<dyn RevisionAnalyzer> {
    let run = Arc::new(ScriptedRun {
      engine: self.engine.clone(),
      queue: ctx.queue.clone(),
      project: Mutex::new(None),
    });
    *self.current.lock().unwrap() = Some(run.clone());
    run
  }

  fn changeset_builder(
    &self,
    _ctx: &EngineContext,
    _analyzer: Arc<dyn RevisionAnalyzer>,
  ) -> Arc<dyn ChangesetBuilder> {
    self.current()
  }

  fn git_exporter(
    &self,
    _ctx: &EngineContext,
    _analyzer: Arc<dyn RevisionAnalyzer>,
    _builder: Arc<dyn ChangesetBuilder>,
  ) -> Arc<dyn GitExporter> {
    self.current()
  }
}

/// Output root in a temp dir plus a controller wired to the catalog and a scripted engine.
pub struct Batch {
  pub dir: tempfile::TempDir,
  pub layout: OutputLayout,
  pub engine: Arc<ScriptedEngine>,
}

impl Batch {
  pub fn new(behaviors: &[(&str, Behavior)]) -> Self {
    let dir = tempfile::tempdir().unwrap();
    let layout = OutputLayout::new(dir.path().join("out"));
    Self {
      dir,
      layout,
      engine: ScriptedEngine::new(behaviors),
    }
  }

  pub fn controller(&self, config: MigrationConfig) -> PipelineController {
    let reader = Arc::new(CatalogReader::from_json(CATALOG.as_bytes()).unwrap());
    let factory = ScriptedFactory::new(self.engine.clone());
    let controller = PipelineController::new(config, self.layout.clone(), reader, factory);
    self.engine.attach(controller.handle());
    controller
  }

  /// Files at the output root whose name starts with `prefix`.
  pub fn root_files(&self, prefix: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(self.layout.root())
      .unwrap()
      .map(|e| e.unwrap().path())
      .filter(|p| {
        p.file_name()
          .and_then(|n| n.to_str())
          .is_some_and(|n| n.starts_with(prefix))
      })
      .collect();
    files.sort();
    files
  }
}

pub fn config() -> MigrationConfig {
  MigrationConfig::default()
}
