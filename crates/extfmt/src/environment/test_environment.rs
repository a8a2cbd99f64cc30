use std::ffi::OsStr;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use extfmt_core::EnvVars;
use extfmt_core::Environment;
use extfmt_core::LogLevel;
use parking_lot::Mutex;

use super::CliEnvironment;
use super::RealEnvironment;
use super::RealEnvironmentOptions;

/// Uses the real file system and executables, but captures everything logged.
#[derive(Clone)]
pub struct TestEnvironment {
  real: RealEnvironment,
  log_level: LogLevel,
  logged_messages: Arc<Mutex<Vec<String>>>,
  logged_errors: Arc<Mutex<Vec<String>>>,
}

impl TestEnvironment {
  pub fn new() -> Self {
    Self {
      real: RealEnvironment::new(&RealEnvironmentOptions {
        log_level: LogLevel::Silent,
        is_stdout_machine_readable: true,
      }),
      log_level: LogLevel::Info,
      logged_messages: Default::default(),
      logged_errors: Default::default(),
    }
  }

  pub fn take_stdout_messages(&self) -> Vec<String> {
    std::mem::take(&mut *self.logged_messages.lock())
  }

  pub fn take_stderr_messages(&self) -> Vec<String> {
    std::mem::take(&mut *self.logged_errors.lock())
  }
}

impl Environment for TestEnvironment {
  fn env_vars(&self) -> EnvVars {
    self.real.env_vars()
  }

  fn home_dir(&self) -> Option<PathBuf> {
    self.real.home_dir()
  }

  fn is_dir(&self, path: &Path) -> bool {
    self.real.is_dir(path)
  }

  fn is_file(&self, path: &Path) -> bool {
    self.real.is_file(path)
  }

  fn which_in(&self, binary_name: &str, search_paths: &OsStr, cwd: &Path) -> Option<PathBuf> {
    self.real.which_in(binary_name, search_paths, cwd)
  }

  fn log_level(&self) -> LogLevel {
    self.log_level
  }

  fn log_stderr_with_context(&self, text: &str, _context_name: &str) {
    self.logged_errors.lock().push(text.to_string());
  }
}

impl CliEnvironment for TestEnvironment {
  fn log(&self, text: &str) {
    self.logged_messages.lock().push(text.to_string());
  }

  fn log_machine_readable(&self, text: &str) {
    self.logged_messages.lock().push(text.to_string());
  }
}
