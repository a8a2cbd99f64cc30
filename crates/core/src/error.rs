use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::expand::ExpandError;

/// The tag of a [`FormatError`], for hosts that only need to branch on the kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum FormatErrorKind {
  ConfigMalformed,
  UnknownFormatter,
  ExecutableNotFound,
  PermissionDenied,
  UnresolvedVariable,
  CyclicReference,
  TimeoutError,
  Cancelled,
  ProcessError,
  EmptyOutput,
  Busy,
}

impl std::fmt::Display for FormatErrorKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let text = match self {
      FormatErrorKind::ConfigMalformed => "Malformed configuration",
      FormatErrorKind::UnknownFormatter => "Unknown formatter",
      FormatErrorKind::ExecutableNotFound => "Executable not found",
      FormatErrorKind::PermissionDenied => "Permission denied",
      FormatErrorKind::UnresolvedVariable => "Unresolved variable",
      FormatErrorKind::CyclicReference => "Cyclic variable reference",
      FormatErrorKind::TimeoutError => "Timed out",
      FormatErrorKind::Cancelled => "Cancelled",
      FormatErrorKind::ProcessError => "Formatter error",
      FormatErrorKind::EmptyOutput => "Empty output",
      FormatErrorKind::Busy => "Busy",
    };
    f.write_str(text)
  }
}

/// Every way a format request can fail. None of these mutate the buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
  #[error("Setting '{key}' is malformed. {message}")]
  ConfigMalformed { key: String, message: String },
  #[error("Unknown formatter '{0}'.")]
  UnknownFormatter(String),
  #[error("No formatter handles {}.", .0.display())]
  NoFormatter(PathBuf),
  #[error("Could not find an executable for {formatter} (looked for: {}).", .candidates.join(", "))]
  ExecutableNotFound { formatter: String, candidates: Vec<String> },
  #[error("Permission denied executing {}.", .0.display())]
  PermissionDenied(PathBuf),
  #[error("Environment variable '{name}' is not defined.")]
  UnresolvedVariable { name: String },
  #[error("Environment variable '{}' references itself ({}).", .chain[0], .chain.join(" -> "))]
  CyclicReference { chain: Vec<String> },
  #[error("Formatter did not finish within {}ms.", .0.as_millis())]
  Timeout(Duration),
  #[error("Formatting was cancelled.")]
  Cancelled,
  #[error("{message}")]
  ProcessError { exit_code: Option<i32>, message: String },
  #[error("Formatter exited successfully, but produced no output.")]
  EmptyOutput,
  #[error("A format is already in progress for {}.", .0.display())]
  Busy(PathBuf),
}

impl FormatError {
  pub fn kind(&self) -> FormatErrorKind {
    match self {
      FormatError::ConfigMalformed { .. } => FormatErrorKind::ConfigMalformed,
      FormatError::UnknownFormatter(_) | FormatError::NoFormatter(_) => FormatErrorKind::UnknownFormatter,
      FormatError::ExecutableNotFound { .. } => FormatErrorKind::ExecutableNotFound,
      FormatError::PermissionDenied(_) => FormatErrorKind::PermissionDenied,
      FormatError::UnresolvedVariable { .. } => FormatErrorKind::UnresolvedVariable,
      FormatError::CyclicReference { .. } => FormatErrorKind::CyclicReference,
      FormatError::Timeout(_) => FormatErrorKind::TimeoutError,
      FormatError::Cancelled => FormatErrorKind::Cancelled,
      FormatError::ProcessError { .. } => FormatErrorKind::ProcessError,
      FormatError::EmptyOutput => FormatErrorKind::EmptyOutput,
      FormatError::Busy(_) => FormatErrorKind::Busy,
    }
  }

  pub(crate) fn malformed(key: impl Into<String>, message: impl Into<String>) -> Self {
    FormatError::ConfigMalformed {
      key: key.into(),
      message: message.into(),
    }
  }
}

impl From<ExpandError> for FormatError {
  fn from(err: ExpandError) -> Self {
    match err {
      ExpandError::Unresolved { name } => FormatError::UnresolvedVariable { name },
      ExpandError::Cyclic { chain } => FormatError::CyclicReference { chain },
    }
  }
}
