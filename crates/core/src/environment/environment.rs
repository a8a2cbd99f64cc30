use std::ffi::OsStr;
use std::path::Path;
use std::path::PathBuf;

use indexmap::IndexMap;

/// Environment variables keyed by name.
pub type EnvVars = IndexMap<String, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
  Debug = 0,
  Info = 1,
  Warn = 2,
  Silent = 3,
}

impl LogLevel {
  pub fn is_debug(self) -> bool {
    self == LogLevel::Debug
  }

  pub fn is_info(self) -> bool {
    self <= LogLevel::Info
  }

  pub fn is_warn(self) -> bool {
    self <= LogLevel::Warn
  }
}

/// Everything the pipeline needs from the machine it runs on, other than
/// spawning the formatter process itself.
pub trait Environment: Clone + Send + Sync + 'static {
  /// The environment variables this process inherited.
  fn env_vars(&self) -> EnvVars;
  fn home_dir(&self) -> Option<PathBuf>;
  fn is_dir(&self, path: &Path) -> bool;
  fn is_file(&self, path: &Path) -> bool;
  /// Searches the `PATH`-style list of directories for an executable.
  fn which_in(&self, binary_name: &str, search_paths: &OsStr, cwd: &Path) -> Option<PathBuf>;
  fn log_level(&self) -> LogLevel;
  fn log_stderr(&self, text: &str) {
    self.log_stderr_with_context(text, "extfmt");
  }
  /// Logs to stderr providing the context name.
  /// The logger outputs the context name when it differs from the last one.
  /// Ex. the formatter name while a formatter is running.
  fn log_stderr_with_context(&self, text: &str, context_name: &str);
}

// use macros here so the expression provided is only evaluated when the log level allows it
#[macro_export]
macro_rules! log_debug {
  ($environment:expr, $($arg:tt)*) => {
    if $environment.log_level().is_debug() {
      let mut text = String::from("[DEBUG] ");
      text.push_str(&format!($($arg)*));
      $environment.log_stderr(&text);
    }
  }
}

#[macro_export]
macro_rules! log_warn {
  ($environment:expr, $($arg:tt)*) => {
    if $environment.log_level().is_warn() {
      $environment.log_stderr(&format!($($arg)*));
    }
  }
}
