use std::io::IsTerminal;
use std::ops::Range;
use std::path::Path;
use std::path::PathBuf;

use crossterm::style::Stylize;
use extfmt_core::FormatError;
use extfmt_core::HostBuffer;
use extfmt_core::TextChange;
use extfmt_core::apply::apply_text_changes;
use extfmt_core::log_warn;

use crate::environment::CliEnvironment;

/// A file's text held in memory while it's being formatted from the command line.
pub struct FileBuffer<TEnvironment: CliEnvironment> {
  environment: TEnvironment,
  file_path: PathBuf,
  folder_name: Option<String>,
  syntax: Option<String>,
  text: String,
  selections: Vec<Range<usize>>,
}

impl<TEnvironment: CliEnvironment> FileBuffer<TEnvironment> {
  pub fn new(environment: TEnvironment, file_path: PathBuf, text: String) -> Self {
    Self {
      environment,
      file_path,
      folder_name: None,
      syntax: None,
      text,
      selections: Vec::new(),
    }
  }

  pub fn with_folder_name(mut self, folder_name: Option<String>) -> Self {
    self.folder_name = folder_name;
    self
  }

  pub fn with_syntax(mut self, syntax: Option<String>) -> Self {
    self.syntax = syntax;
    self
  }

  pub fn with_selections(mut self, selections: Vec<Range<usize>>) -> Self {
    self.selections = selections;
    self
  }

  pub fn current_text(&self) -> &str {
    &self.text
  }

  pub fn into_text(self) -> String {
    self.text
  }
}

impl<TEnvironment: CliEnvironment> HostBuffer for FileBuffer<TEnvironment> {
  fn file_path(&self) -> &Path {
    &self.file_path
  }

  fn folder_name(&self) -> Option<String> {
    self.folder_name.clone()
  }

  fn syntax(&self) -> Option<String> {
    self.syntax.clone()
  }

  fn text(&self) -> String {
    self.text.clone()
  }

  fn selections(&self) -> Vec<Range<usize>> {
    self.selections.clone()
  }

  fn replace(&mut self, changes: &[TextChange], selections: &[Range<usize>]) {
    match apply_text_changes(&self.text, changes) {
      Ok(text) => {
        self.text = text;
        self.selections = selections.to_vec();
      }
      Err(err) => log_warn!(self.environment, "Could not update {}: {}", self.file_path.display(), err),
    }
  }

  fn show_error(&mut self, error: &FormatError) {
    let heading = format!("{}:", error.kind());
    let heading = if std::io::stderr().is_terminal() {
      heading.red().bold().to_string()
    } else {
      heading
    };
    self
      .environment
      .log_stderr(&format!("{} {}\n    at {}", heading, error, self.file_path.display()));
  }

  fn show_status(&mut self, message: &str) {
    self.environment.log(message);
  }
}
