use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use super::EnvVars;
use super::Environment;
use super::LogLevel;

#[derive(Default)]
struct TestEnvironmentState {
  env_vars: EnvVars,
  executables: HashSet<PathBuf>,
  dirs: HashSet<PathBuf>,
  home_dir: Option<PathBuf>,
  logged_errors: Vec<String>,
}

/// In-memory environment. Executables registered here may also exist on
/// disk, which lets tests spawn real scripts through the pipeline.
#[derive(Clone)]
pub struct TestEnvironment {
  state: Arc<Mutex<TestEnvironmentState>>,
  log_level: Arc<Mutex<LogLevel>>,
}

impl Default for TestEnvironment {
  fn default() -> Self {
    Self::new()
  }
}

impl TestEnvironment {
  pub fn new() -> Self {
    Self {
      state: Default::default(),
      log_level: Arc::new(Mutex::new(LogLevel::Info)),
    }
  }

  pub fn set_env_var(&self, name: &str, value: &str) {
    self.state.lock().env_vars.insert(name.to_string(), value.to_string());
  }

  pub fn set_home_dir(&self, path: impl AsRef<Path>) {
    self.state.lock().home_dir = Some(path.as_ref().to_path_buf());
  }

  /// Registers an executable file, also registering its ancestor directories.
  pub fn add_executable(&self, path: impl AsRef<Path>) {
    let path = path.as_ref();
    let mut state = self.state.lock();
    for ancestor in path.ancestors().skip(1) {
      if ancestor.as_os_str().is_empty() {
        break;
      }
      state.dirs.insert(ancestor.to_path_buf());
    }
    state.executables.insert(path.to_path_buf());
  }

  pub fn add_dir(&self, path: impl AsRef<Path>) {
    self.state.lock().dirs.insert(path.as_ref().to_path_buf());
  }

  pub fn set_log_level(&self, log_level: LogLevel) {
    *self.log_level.lock() = log_level;
  }

  pub fn take_logged_errors(&self) -> Vec<String> {
    std::mem::take(&mut self.state.lock().logged_errors)
  }
}

impl Environment for TestEnvironment {
  fn env_vars(&self) -> EnvVars {
    self.state.lock().env_vars.clone()
  }

  fn home_dir(&self) -> Option<PathBuf> {
    self.state.lock().home_dir.clone()
  }

  fn is_dir(&self, path: &Path) -> bool {
    self.state.lock().dirs.contains(path)
  }

  fn is_file(&self, path: &Path) -> bool {
    self.state.lock().executables.contains(path)
  }

  fn which_in(&self, binary_name: &str, search_paths: &OsStr, _cwd: &Path) -> Option<PathBuf> {
    let state = self.state.lock();
    std::env::split_paths(search_paths)
      .map(|dir| dir.join(binary_name))
      .find(|path| state.executables.contains(path))
  }

  fn log_level(&self) -> LogLevel {
    *self.log_level.lock()
  }

  fn log_stderr_with_context(&self, text: &str, _context_name: &str) {
    self.state.lock().logged_errors.push(text.to_string());
  }
}
