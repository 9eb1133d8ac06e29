//! # vss2git-batch
//!
//! Batch controller for migrating Visual SourceSafe projects to git repositories.
//!
//! ## Architecture
//!
//! A [PipelineController] drains a queue of [ProjectKey] selections, one [PipelineRun] at a
//! time. Each run stages its output in a single scratch directory, drives the conversion
//! engine (see [engine]), then commits the staging directory by rename into the success or
//! fail root chosen from the errors it collected. Logs form a [Logger] chain: run log, batch
//! common log, batch error log.
//!
//! Set RUST_LOG=vss2git_batch=debug for per-phase spans.

pub mod catalog;
pub mod command_engine;
pub mod controller;
pub mod engine;
pub mod error;
pub mod identity;
#[cfg(test)]
mod identity_test;
pub mod layout;
pub mod logger;
pub mod pipeline_run;
pub mod report;
pub mod settings;
pub mod staging;
pub mod types;
pub mod work_queue;

pub use catalog::CatalogReader;
pub use command_engine::CommandEngine;
pub use controller::{ControllerHandle, PipelineController};
pub use engine::{EngineFactory, SourceReader};
pub use error::{EngineError, MigrationError};
pub use identity::{ProjectIndex, resolve_selection};
pub use layout::OutputLayout;
pub use logger::Logger;
pub use pipeline_run::{PipelineRun, RunServices};
pub use report::{BatchReport, RunOutcome, SelectionOutcome};
pub use settings::{MigrationConfig, Settings};
pub use types::{ErrorRecord, ProjectKey, RunState, SourceItem, SourceProject};
pub use work_queue::WorkQueue;
