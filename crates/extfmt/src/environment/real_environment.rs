use std::ffi::OsStr;
use std::path::Path;
use std::path::PathBuf;

use extfmt_core::EnvVars;
use extfmt_core::Environment;
use extfmt_core::LogLevel;

use super::CliEnvironment;
use crate::utils::Logger;
use crate::utils::LoggerOptions;

pub struct RealEnvironmentOptions {
  pub log_level: LogLevel,
  /// Whether stdout will be read by a program.
  pub is_stdout_machine_readable: bool,
}

#[derive(Clone)]
pub struct RealEnvironment {
  logger: Logger,
  log_level: LogLevel,
}

impl RealEnvironment {
  pub fn new(options: &RealEnvironmentOptions) -> RealEnvironment {
    let logger = Logger::new(&LoggerOptions {
      initial_context_name: "extfmt".to_string(),
      is_stdout_machine_readable: options.is_stdout_machine_readable,
    });
    RealEnvironment {
      logger,
      log_level: options.log_level,
    }
  }
}

impl Environment for RealEnvironment {
  fn env_vars(&self) -> EnvVars {
    // variables that aren't unicode can't be referenced from the settings
    std::env::vars_os()
      .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
      .collect()
  }

  fn home_dir(&self) -> Option<PathBuf> {
    dirs::home_dir()
  }

  fn is_dir(&self, path: &Path) -> bool {
    path.is_dir()
  }

  fn is_file(&self, path: &Path) -> bool {
    path.is_file()
  }

  fn which_in(&self, binary_name: &str, search_paths: &OsStr, cwd: &Path) -> Option<PathBuf> {
    which::which_in(binary_name, Some(search_paths), cwd).ok()
  }

  fn log_level(&self) -> LogLevel {
    self.log_level
  }

  fn log_stderr_with_context(&self, text: &str, context_name: &str) {
    if self.log_level != LogLevel::Silent {
      self.logger.log_stderr_with_context(text, context_name);
    }
  }
}

impl CliEnvironment for RealEnvironment {
  fn log(&self, text: &str) {
    if self.log_level.is_info() {
      self.logger.log(text, "extfmt");
    }
  }

  fn log_machine_readable(&self, text: &str) {
    self.logger.log_machine_readable(text);
  }
}
