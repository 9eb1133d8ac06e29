//! Single-worker background queue that executes conversion work in FIFO order.
//!
//! Errors raised by work items are buffered and drained once per run with
//! [WorkQueue::fetch_exceptions]. `abort` skips everything still queued; the item in flight
//! is never interrupted, it can poll [WorkContext::is_aborted].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tracing::{debug, instrument, warn};

use crate::error::EngineError;

type Job = Box<dyn FnOnce(&WorkContext) -> Result<(), EngineError> + Send + 'static>;

struct WorkItem {
  description: String,
  job: Job,
}

#[derive(Default)]
struct QueueState {
  pending: usize,
  last_status: Option<String>,
  exceptions: Vec<EngineError>,
  active_since: Option<Instant>,
  active_total: Duration,
}

struct Shared {
  state: Mutex<QueueState>,
  aborted: AtomicBool,
  idle_tx: watch::Sender<bool>,
}

impl Shared {
  fn lock(&self) -> MutexGuard<'_, QueueState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn finish_item(&self, error: Option<EngineError>) {
    let mut state = self.lock();
    if let Some(e) = error {
      state.exceptions.push(e);
    }
    state.pending = state.pending.saturating_sub(1);
    if state.pending == 0 {
      if let Some(since) = state.active_since.take() {
        state.active_total += since.elapsed();
      }
      drop(state);
      self.idle_tx.send_replace(true);
    }
  }
}

/// Handle passed to a running work item.
pub struct WorkContext {
  shared: Arc<Shared>,
}

impl WorkContext {
  pub fn is_aborted(&self) -> bool {
    self.shared.aborted.load(Ordering::SeqCst)
  }

  pub fn set_status(&self, status: impl Into<String>) {
    self.shared.lock().last_status = Some(status.into());
  }
}

/// Cloneable handle to the background queue.
#[derive(Clone)]
pub struct WorkQueue {
  shared: Arc<Shared>,
  tx: mpsc::UnboundedSender<WorkItem>,
}

impl std::fmt::Debug for WorkQueue {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WorkQueue")
      .field("idle", &self.is_idle())
      .field("aborted", &self.is_aborted())
      .finish()
  }
}

impl Default for WorkQueue {
  fn default() -> Self {
    Self::new()
  }
}

impl WorkQueue {
  /// Starts the worker task. Must be called inside a tokio runtime.
  pub fn new() -> Self {
    let (idle_tx, _) = watch::channel(true);
    let shared = Arc::new(Shared {
      state: Mutex::new(QueueState::default()),
      aborted: AtomicBool::new(false),
      idle_tx,
    });
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_worker(shared.clone(), rx));
    Self { shared, tx }
  }

  /// Queues `job`; `description` becomes the last status while it runs.
  pub fn add_work<F>(&self, description: impl Into<String>, job: F)
  where
    F: FnOnce(&WorkContext) -> Result<(), EngineError> + Send + 'static,
  {
    {
      let mut state = self.shared.lock();
      state.pending += 1;
      if state.pending == 1 {
        state.active_since = Some(Instant::now());
      }
    }
    self.shared.idle_tx.send_replace(false);
    let item = WorkItem {
      description: description.into(),
      job: Box::new(job),
    };
    if self.tx.send(item).is_err() {
      warn!("work queue worker is gone; dropping work item");
      self
        .shared
        .finish_item(Some(EngineError::new("work queue worker stopped")));
    }
  }

  /// Skips every queued item. The item in flight runs to completion.
  pub fn abort(&self) {
    debug!("work queue abort requested");
    self.shared.aborted.store(true, Ordering::SeqCst);
  }

  pub fn is_aborted(&self) -> bool {
    self.shared.aborted.load(Ordering::SeqCst)
  }

  pub fn is_idle(&self) -> bool {
    *self.shared.idle_tx.borrow()
  }

  /// Resolves once no work is queued or running.
  #[instrument(level = "trace", skip(self))]
  pub async fn wait_idle(&self) {
    let mut rx = self.shared.idle_tx.subscribe();
    // The sender lives in `shared`, so the channel cannot close while we hold `self`.
    let _ = rx.wait_for(|idle| *idle).await;
  }

  /// Idle notification channel; `true` whenever the queue drains.
  pub fn subscribe_idle(&self) -> watch::Receiver<bool> {
    self.shared.idle_tx.subscribe()
  }

  pub fn last_status(&self) -> Option<String> {
    self.shared.lock().last_status.clone()
  }

  /// Total time spent with work pending.
  pub fn active_time(&self) -> Duration {
    let state = self.shared.lock();
    state.active_total + state.active_since.map_or(Duration::ZERO, |s| s.elapsed())
  }

  /// Drains collected errors without blocking. Empty when none were raised.
  pub fn fetch_exceptions(&self) -> Vec<EngineError> {
    std::mem::take(&mut self.shared.lock().exceptions)
  }
}

async fn run_worker(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<WorkItem>) {
  while let Some(item) = rx.recv().await {
    if shared.aborted.load(Ordering::SeqCst) {
      debug!(work = %item.description, "skipping aborted work item");
      shared.finish_item(None);
      continue;
    }
    shared.lock().last_status = Some(item.description.clone());
    let ctx = WorkContext {
      shared: shared.clone(),
    };
    let job = item.job;
    let outcome = tokio::task::spawn_blocking(move || job(&ctx)).await;
    let error = match outcome {
      Ok(Ok(())) => None,
      Ok(Err(e)) => Some(e),
      Err(join) => Some(EngineError::new(format!(
        "work item '{}' panicked: {join}",
        item.description
      ))),
    };
    shared.finish_item(error);
  }
}
