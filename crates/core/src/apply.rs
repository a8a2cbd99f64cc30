use std::ops::Range;
use std::time::Duration;
use std::time::Instant;

use serde::Serialize;
use similar::Algorithm;
use similar::DiffOp;
use similar::DiffTag;
use thiserror::Error;

use crate::error::FormatError;
use crate::process::ProcessOutput;
use crate::range::floor_char_boundary;

const DIFF_DEADLINE: Duration = Duration::from_millis(250);

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChange {
  /// Range start to end byte index in the original text.
  pub range: Range<usize>,
  /// New text to insert or replace at the provided range.
  pub new_text: String,
}

impl TextChange {
  pub fn new(range: Range<usize>, new_text: impl Into<String>) -> Self {
    Self {
      range,
      new_text: new_text.into(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextChangeError {
  #[error("Text change had start index {start} greater than end index {end}.")]
  Reversed { start: usize, end: usize },
  #[error("Text changes were overlapping. Past index was {past_index}, but new change had index {start}.")]
  Overlapping { past_index: usize, start: usize },
  #[error("Text change range {start}..{end} is not within the text or not on a character boundary.")]
  InvalidRange { start: usize, end: usize },
}

/// Applies non-overlapping text changes to the given source text.
pub fn apply_text_changes(source: &str, changes: &[TextChange]) -> Result<String, TextChangeError> {
  let mut changes = changes.iter().collect::<Vec<_>>();
  changes.sort_by_key(|change| (change.range.start, change.range.end));

  let mut last_index = 0;
  let mut final_text = String::with_capacity(source.len());
  for change in changes {
    let Range { start, end } = change.range;
    if start > end {
      return Err(TextChangeError::Reversed { start, end });
    }
    if start < last_index {
      return Err(TextChangeError::Overlapping { past_index: last_index, start });
    }
    if !source.is_char_boundary(start) || !source.is_char_boundary(end) {
      return Err(TextChangeError::InvalidRange { start, end });
    }
    final_text.push_str(&source[last_index..start]);
    final_text.push_str(&change.new_text);
    last_index = end;
  }
  final_text.push_str(&source[last_index..]);
  Ok(final_text)
}

/// A successful format, expressed against the text that was sent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatSuccess {
  /// One replacement per formatted range, in document order.
  pub changes: Vec<TextChange>,
  /// The host's selections remapped onto the formatted text.
  pub selections: Vec<Range<usize>>,
}

impl FormatSuccess {
  pub fn apply_to(&self, original_text: &str) -> Result<String, TextChangeError> {
    apply_text_changes(original_text, &self.changes)
  }

  pub fn is_unchanged(&self, original_text: &str) -> bool {
    self
      .changes
      .iter()
      .all(|change| original_text.get(change.range.clone()) == Some(change.new_text.as_str()))
  }

  /// The changes with the text they share with the original trimmed from
  /// both ends. Unchanged ranges are left out.
  pub fn minimal_changes(&self, original_text: &str) -> Vec<TextChange> {
    self
      .changes
      .iter()
      .filter_map(|change| {
        let old_text = original_text.get(change.range.clone())?;
        let new_text = change.new_text.as_str();
        if old_text == new_text {
          return None;
        }
        let prefix = common_prefix_len(old_text, new_text);
        let suffix = common_suffix_len(&old_text[prefix..], &new_text[prefix..]);
        Some(TextChange::new(
          change.range.start + prefix..change.range.end - suffix,
          &new_text[prefix..new_text.len() - suffix],
        ))
      })
      .collect()
  }
}

fn common_prefix_len(a: &str, b: &str) -> usize {
  a.chars().zip(b.chars()).take_while(|(a, b)| a == b).map(|(c, _)| c.len_utf8()).sum()
}

fn common_suffix_len(a: &str, b: &str) -> usize {
  a.chars()
    .rev()
    .zip(b.chars().rev())
    .take_while(|(a, b)| a == b)
    .map(|(c, _)| c.len_utf8())
    .sum()
}

#[derive(Debug)]
pub enum FormatOutcome {
  Success(FormatSuccess),
  Failure(FormatError),
}

impl FormatOutcome {
  pub fn into_result(self) -> Result<FormatSuccess, FormatError> {
    match self {
      FormatOutcome::Success(success) => Ok(success),
      FormatOutcome::Failure(err) => Err(err),
    }
  }
}

impl From<Result<FormatSuccess, FormatError>> for FormatOutcome {
  fn from(result: Result<FormatSuccess, FormatError>) -> Self {
    match result {
      Ok(success) => FormatOutcome::Success(success),
      Err(err) => FormatOutcome::Failure(err),
    }
  }
}

/// A formatter process's output for one range of the original text.
pub struct RangeOutput {
  pub range: Range<usize>,
  pub output: ProcessOutput,
}

/// Validates the process outputs and turns them into changes to the
/// original text, remapping the selections onto the result.
///
/// Any failing output fails the whole format, so the buffer is either
/// changed for every range or not at all.
pub fn apply_outputs(original_text: &str, outputs: Vec<RangeOutput>, selections: &[Range<usize>]) -> Result<FormatSuccess, FormatError> {
  let mut changes = Vec::with_capacity(outputs.len());
  for RangeOutput { range, output } in outputs {
    let new_text = validate_output(output, !range.is_empty())?;
    changes.push(TextChange::new(range, new_text));
  }
  changes.sort_by_key(|change| change.range.start);

  let mappers = changes
    .iter()
    .map(|change| ChangeMapper::new(original_text.get(change.range.clone()).unwrap_or_default(), change))
    .collect::<Vec<_>>();
  let new_text = apply_text_changes(original_text, &changes).map_err(|err| FormatError::ProcessError {
    exit_code: None,
    message: err.to_string(),
  })?;
  let selections = selections
    .iter()
    .map(|selection| {
      let start = floor_char_boundary(&new_text, remap_position(selection.start, &mappers));
      let end = floor_char_boundary(&new_text, remap_position(selection.end, &mappers));
      start..end
    })
    .collect();

  Ok(FormatSuccess { changes, selections })
}

fn validate_output(output: ProcessOutput, had_input: bool) -> Result<String, FormatError> {
  if !output.success() {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = if !stderr.is_empty() {
      stderr
    } else {
      match output.exit_code {
        Some(code) => format!("Formatter exited with code {}.", code),
        None => "Formatter was terminated by a signal.".to_string(),
      }
    };
    return Err(FormatError::ProcessError {
      exit_code: output.exit_code,
      message,
    });
  }
  if output.stdout.is_empty() && had_input {
    return Err(FormatError::EmptyOutput);
  }
  String::from_utf8(output.stdout).map_err(|_| FormatError::ProcessError {
    exit_code: output.exit_code,
    message: "Formatter output was not valid UTF-8.".to_string(),
  })
}

struct ChangeMapper {
  range: Range<usize>,
  new_len: usize,
  ops: Vec<DiffOp>,
}

impl ChangeMapper {
  fn new(old_text: &str, change: &TextChange) -> Self {
    let deadline = Instant::now() + DIFF_DEADLINE;
    let ops = similar::capture_diff_slices_deadline(Algorithm::Myers, old_text.as_bytes(), change.new_text.as_bytes(), Some(deadline));
    Self {
      range: change.range.clone(),
      new_len: change.new_text.len(),
      ops,
    }
  }

  /// Maps an offset relative to the start of the replaced range. Positions
  /// in unchanged text follow that text. Positions in rewritten text move
  /// proportionally.
  fn map_offset(&self, offset: usize) -> usize {
    for op in &self.ops {
      let (tag, old, new) = op.as_tag_tuple();
      if offset < old.start || offset > old.end {
        continue;
      }
      match tag {
        DiffTag::Equal => return new.start + (offset - old.start),
        DiffTag::Delete | DiffTag::Insert => return new.start,
        DiffTag::Replace => {
          let moved = (offset - old.start) * new.len() / std::cmp::max(old.len(), 1);
          return std::cmp::min(new.start + moved, new.end);
        }
      }
    }
    std::cmp::min(offset, self.new_len)
  }
}

fn remap_position(position: usize, mappers: &[ChangeMapper]) -> usize {
  let mut delta = 0isize;
  for mapper in mappers {
    if position < mapper.range.start {
      break;
    }
    if position <= mapper.range.end {
      let start = mapper.range.start as isize + delta;
      return start as usize + mapper.map_offset(position - mapper.range.start);
    }
    delta += mapper.new_len as isize - mapper.range.len() as isize;
  }
  (position as isize + delta).max(0) as usize
}

#[cfg(test)]
mod test {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::error::FormatErrorKind;

  fn ok(stdout: &str) -> ProcessOutput {
    ProcessOutput {
      exit_code: Some(0),
      stdout: stdout.as_bytes().to_vec(),
      stderr: Vec::new(),
    }
  }

  fn apply(text: &str, outputs: Vec<(Range<usize>, ProcessOutput)>, selections: &[Range<usize>]) -> Result<FormatSuccess, FormatError> {
    let outputs = outputs.into_iter().map(|(range, output)| RangeOutput { range, output }).collect();
    apply_outputs(text, outputs, selections)
  }

  #[test]
  fn applies_text_changes() {
    assert_eq!(
      apply_text_changes(
        "0123456789",
        &[
          TextChange::new(9..10, "z"),
          TextChange::new(4..6, "y"),
          TextChange::new(1..2, "x"),
        ]
      )
      .unwrap(),
      "0x23y678z",
    );
    assert_eq!(apply_text_changes("0123456789", &[TextChange::new(0..10, "x")]).unwrap(), "x");
    assert_eq!(apply_text_changes("0123456789", &[TextChange::new(5..5, "x")]).unwrap(), "01234x56789");
    assert_eq!(apply_text_changes("0123456789", &[TextChange::new(10..10, "x")]).unwrap(), "0123456789x");
  }

  #[test]
  fn rejects_invalid_text_changes() {
    assert_eq!(
      apply_text_changes("0123456789", &[TextChange::new(3..10, "x"), TextChange::new(5..7, "y")]),
      Err(TextChangeError::Overlapping { past_index: 10, start: 5 })
    );
    assert_eq!(
      apply_text_changes("0123456789", &[TextChange::new(2..4, "x"), TextChange::new(3..5, "y")])
        .unwrap_err()
        .to_string(),
      "Text changes were overlapping. Past index was 4, but new change had index 3."
    );
    #[allow(clippy::reversed_empty_ranges)]
    let reversed = TextChange::new(2..1, "x");
    assert_eq!(
      apply_text_changes("0123456789", &[reversed]),
      Err(TextChangeError::Reversed { start: 2, end: 1 })
    );
    assert_eq!(
      apply_text_changes("0123456789", &[TextChange::new(8..12, "x")]),
      Err(TextChangeError::InvalidRange { start: 8, end: 12 })
    );
    // inside the two byte encoding of the accented character
    assert_eq!(
      apply_text_changes("a\u{00e9}b", &[TextChange::new(2..3, "x")]),
      Err(TextChangeError::InvalidRange { start: 2, end: 3 })
    );
  }

  #[test]
  fn identity_output_keeps_selections() {
    let result = apply("int x=1;", vec![(0..8, ok("int x=1;"))], &[3..3, 0..8]).unwrap();
    assert!(result.is_unchanged("int x=1;"));
    assert_eq!(result.apply_to("int x=1;").unwrap(), "int x=1;");
    assert_eq!(result.selections, vec![3..3, 0..8]);
    assert!(result.minimal_changes("int x=1;").is_empty());
  }

  #[test]
  fn replaces_selected_range_and_moves_cursor() {
    let text = "abcdefghij";
    let result = apply(text, vec![(2..5, ok(" c d e "))], &[5..5]).unwrap();
    assert_eq!(result.apply_to(text).unwrap(), "ab c d e fghij");
    assert_eq!(result.selections, vec![8..8]);
  }

  #[test]
  fn shifts_positions_after_the_range() {
    let text = "abcdefghij";
    let result = apply(text, vec![(2..5, ok("CDEXY"))], &[0..1, 7..9]).unwrap();
    assert_eq!(result.apply_to(text).unwrap(), "abCDEXYfghij");
    assert_eq!(result.selections, vec![0..1, 9..11]);
  }

  #[test]
  fn cursor_follows_unchanged_text() {
    let text = "int  x  =  1;";
    // cursor before the `1`
    let result = apply(text, vec![(0..text.len(), ok("int x = 1;\n"))], &[11..11]).unwrap();
    assert_eq!(result.apply_to(text).unwrap(), "int x = 1;\n");
    assert_eq!(result.selections, vec![8..8]);
  }

  #[test]
  fn splices_ranges_independently() {
    let text = "aaa bbb ccc";
    let result = apply(text, vec![(8..11, ok("CCCC")), (0..3, ok("A"))], &[4..7, 10..10]).unwrap();
    assert_eq!(result.apply_to(text).unwrap(), "A bbb CCCC");
    assert_eq!(result.changes.iter().map(|c| c.range.clone()).collect::<Vec<_>>(), vec![0..3, 8..11]);
    assert_eq!(result.selections[0], 2..5);
  }

  #[test]
  fn nonzero_exit_is_process_error() {
    let output = ProcessOutput {
      exit_code: Some(2),
      stdout: b"partial".to_vec(),
      stderr: b"main.cc:1:1: error: expected expression\n".to_vec(),
    };
    let err = apply("x", vec![(0..1, output)], &[]).unwrap_err();
    assert_eq!(
      err,
      FormatError::ProcessError {
        exit_code: Some(2),
        message: "main.cc:1:1: error: expected expression".to_string(),
      }
    );
  }

  #[test]
  fn nonzero_exit_without_stderr_reports_code() {
    let output = ProcessOutput {
      exit_code: Some(3),
      stdout: Vec::new(),
      stderr: Vec::new(),
    };
    let err = apply("x", vec![(0..1, output)], &[]).unwrap_err();
    assert_eq!(err.to_string(), "Formatter exited with code 3.");
  }

  #[test]
  fn empty_output_for_non_empty_input_fails() {
    let err = apply("text", vec![(0..4, ok(""))], &[]).unwrap_err();
    assert_eq!(err.kind(), FormatErrorKind::EmptyOutput);
    // nothing was sent, so nothing is expected back
    assert_eq!(apply("", vec![(0..0, ok(""))], &[]).unwrap().apply_to("").unwrap(), "");
  }

  #[test]
  fn any_failing_range_fails_all() {
    let err = apply("aaa bbb", vec![(0..3, ok("A")), (4..7, ok(""))], &[]).unwrap_err();
    assert_eq!(err.kind(), FormatErrorKind::EmptyOutput);
  }

  #[test]
  fn rejects_invalid_utf8() {
    let output = ProcessOutput {
      exit_code: Some(0),
      stdout: vec![0xff, 0xfe],
      stderr: Vec::new(),
    };
    assert_eq!(apply("ab", vec![(0..2, output)], &[]).unwrap_err().kind(), FormatErrorKind::ProcessError);
  }

  #[test]
  fn selections_land_on_char_boundaries() {
    let text = "ab";
    let result = apply(text, vec![(0..2, ok("\u{00e9}\u{00e9}"))], &[1..1]).unwrap();
    let new_text = result.apply_to(text).unwrap();
    for selection in &result.selections {
      assert!(new_text.is_char_boundary(selection.start));
      assert!(new_text.is_char_boundary(selection.end));
    }
  }

  #[test]
  fn computes_minimal_changes() {
    let text = "fn main() {\n  let x=1;\n}\n";
    let success = FormatSuccess {
      changes: vec![TextChange::new(0..text.len(), "fn main() {\n  let x = 1;\n}\n")],
      selections: Vec::new(),
    };
    assert_eq!(success.minimal_changes(text), vec![TextChange::new(19..20, " = ")]);
  }
}
