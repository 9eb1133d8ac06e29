//! Plain data types shared by the pipeline modules.

mod error_record;
mod progress;
mod project_key;
#[cfg(test)]
mod project_key_test;
mod run_state;
mod source_item;

pub use error_record::{ErrorOrigin, ErrorPhase, ErrorRecord};
pub use progress::Progress;
pub use project_key::{KEY_SEPARATOR, ProjectKey};
pub use run_state::RunState;
pub use source_item::{SourceItem, SourceProject};
