use extfmt_core::Environment;

/// What the command line needs beyond the pipeline's environment.
pub trait CliEnvironment: Environment {
  /// Logs informational text to stdout. Suppressed when stdout is machine readable.
  fn log(&self, text: &str);
  /// Writes output meant to be read by a program to stdout.
  fn log_machine_readable(&self, text: &str);
}
