//! Flattened error text for the run log and the aggregate error log.

use std::error::Error;
use std::fmt;

/// Where an error was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorOrigin {
  /// A run, identified by its project display name.
  Run(String),
  Global,
}

impl fmt::Display for ErrorOrigin {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ErrorOrigin::Run(name) => f.write_str(name),
      ErrorOrigin::Global => f.write_str("global"),
    }
  }
}

/// Pipeline phase an error is reported from; selects the log header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPhase {
  Resolve,
  Process,
  /// Collected from the work queue after processing.
  Collected,
  PostProcess,
  Global,
}

impl ErrorPhase {
  pub fn header(self) -> &'static str {
    match self {
      ErrorPhase::Resolve => "SELECTION ERROR",
      ErrorPhase::Process => "ERROR",
      ErrorPhase::Collected => "[ERROR]",
      ErrorPhase::PostProcess => "POSTPROCESS ERROR",
      ErrorPhase::Global => "GLOBAL ERROR",
    }
  }
}

/// One reported failure. Only ever rendered to text.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
  pub phase: ErrorPhase,
  pub origin: ErrorOrigin,
  pub message: String,
  pub cause_chain: Vec<String>,
}

impl ErrorRecord {
  pub fn from_error(phase: ErrorPhase, origin: ErrorOrigin, err: &(dyn Error + 'static)) -> Self {
    let mut cause_chain = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
      cause_chain.push(cause.to_string());
      source = cause.source();
    }
    Self {
      phase,
      origin,
      message: err.to_string(),
      cause_chain,
    }
  }

  pub fn from_message(phase: ErrorPhase, origin: ErrorOrigin, message: impl Into<String>) -> Self {
    Self {
      phase,
      origin,
      message: message.into(),
      cause_chain: Vec::new(),
    }
  }

  /// Multi-line text: header with origin, message, then one `caused by:` line per cause.
  pub fn render(&self) -> String {
    let mut out = format!("{}: {}\n{}", self.phase.header(), self.origin, self.message);
    for cause in &self.cause_chain {
      out.push_str("\n  caused by: ");
      out.push_str(cause);
    }
    out
  }
}

impl fmt::Display for ErrorRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.render())
  }
}
