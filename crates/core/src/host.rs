use std::ops::Range;
use std::path::Path;

use crate::apply::FormatSuccess;
use crate::apply::TextChange;
use crate::error::FormatError;

/// Scroll position of a view, in host units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportPosition {
  pub x: f64,
  pub y: f64,
}

/// The editor buffer a format command acts on.
///
/// Implemented by host adapters. The pipeline only reads from it before
/// running the formatter and only writes to it once the formatter succeeded.
pub trait HostBuffer {
  fn file_path(&self) -> &Path;
  /// Name of the project folder that owns the file, if any.
  fn folder_name(&self) -> Option<String>;
  /// The buffer's syntax name or syntax file path (ex. `Packages/C++/C++.sublime-syntax`).
  fn syntax(&self) -> Option<String>;
  fn text(&self) -> String;
  /// Byte ranges in the order the user added them.
  fn selections(&self) -> Vec<Range<usize>>;
  /// Applies non-overlapping changes to the current text and replaces the
  /// selections, which are expressed against the new text.
  fn replace(&mut self, changes: &[TextChange], selections: &[Range<usize>]);
  fn show_error(&mut self, error: &FormatError);
  /// Non-intrusive message, such as in a status bar.
  fn show_status(&mut self, message: &str);

  fn viewport_position(&self) -> Option<ViewportPosition> {
    None
  }

  fn set_viewport_position(&mut self, _position: ViewportPosition) {}
}

/// Writes a successful format into the buffer, keeping the viewport where it was.
///
/// Returns false when the formatter left the text as it was.
pub fn apply_to_buffer(buffer: &mut impl HostBuffer, original_text: &str, success: &FormatSuccess) -> bool {
  let changes = success.minimal_changes(original_text);
  if changes.is_empty() {
    if buffer.selections() != success.selections {
      buffer.replace(&[], &success.selections);
    }
    return false;
  }

  let position = buffer.viewport_position();
  buffer.replace(&changes, &success.selections);
  if let Some(position) = position {
    buffer.set_viewport_position(position);
  }
  true
}
