use std::ops::Range;

use serde::Serialize;

use crate::registry::FormatterSpec;
use crate::registry::MaxSelections;

/// The part of the buffer a format request acts on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InputRange {
  WholeBuffer,
  /// Non-empty, non-overlapping byte ranges in document order.
  Ranges(Vec<Range<usize>>),
}

/// Decides which range(s) of the buffer to format.
///
/// - No selections, or only empty ones, formats the whole buffer.
/// - A formatter without selection support formats the whole buffer.
/// - A formatter taking one selection gets the first non-empty selection in
///   document order. Selections starting at the same offset are ordered by
///   their end offset.
/// - A formatter taking many selections gets all of them when it accepts
///   several ranges per invocation (overlapping ones are merged), otherwise
///   the non-empty selection the user added last.
///
/// Selections are expected in insertion order and already normalized with
/// [`normalize_selection`].
pub fn select_range(selections: &[Range<usize>], spec: &FormatterSpec) -> InputRange {
  let non_empty = selections.iter().filter(|selection| !selection.is_empty()).cloned().collect::<Vec<_>>();
  if non_empty.is_empty() || !spec.supports_selection {
    return InputRange::WholeBuffer;
  }

  match spec.max_selections {
    MaxSelections::Zero => InputRange::WholeBuffer,
    MaxSelections::One => {
      let first = non_empty.iter().min_by_key(|selection| (selection.start, selection.end)).cloned();
      InputRange::Ranges(first.into_iter().collect())
    }
    MaxSelections::Many => {
      if spec.multi_range_invocation {
        InputRange::Ranges(merge_ranges(non_empty))
      } else {
        InputRange::Ranges(non_empty.last().cloned().into_iter().collect())
      }
    }
  }
}

/// Orders the ends of a selection, clamps it to the text and moves each end
/// back onto a character boundary.
pub fn normalize_selection(text: &str, selection: &Range<usize>) -> Range<usize> {
  let start = floor_char_boundary(text, std::cmp::min(selection.start, selection.end));
  let end = floor_char_boundary(text, std::cmp::max(selection.start, selection.end));
  start..end
}

pub(crate) fn floor_char_boundary(text: &str, index: usize) -> usize {
  if index >= text.len() {
    return text.len();
  }
  let mut index = index;
  while !text.is_char_boundary(index) {
    index -= 1;
  }
  index
}

fn merge_ranges(mut ranges: Vec<Range<usize>>) -> Vec<Range<usize>> {
  ranges.sort_by_key(|range| (range.start, range.end));
  let mut merged: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
  for range in ranges {
    match merged.last_mut() {
      Some(last) if range.start < last.end => {
        last.end = std::cmp::max(last.end, range.end);
      }
      _ => merged.push(range),
    }
  }
  merged
}

#[cfg(test)]
mod test {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::registry::FormatterKind;

  fn spec(supports_selection: bool, max_selections: MaxSelections, multi_range_invocation: bool) -> FormatterSpec {
    FormatterSpec {
      supports_selection,
      max_selections,
      multi_range_invocation,
      ..FormatterSpec::builtin(FormatterKind::Prettier)
    }
  }

  #[test]
  fn first_non_empty_wins_for_single_selection() {
    let spec = spec(true, MaxSelections::One, false);
    assert_eq!(select_range(&[5..5, 10..20], &spec), InputRange::Ranges(vec![10..20]));
    // document order, not insertion order
    assert_eq!(select_range(&[30..40, 10..20], &spec), InputRange::Ranges(vec![10..20]));
    // same start, earliest end wins
    assert_eq!(select_range(&[10..30, 10..20], &spec), InputRange::Ranges(vec![10..20]));
  }

  #[test]
  fn whole_buffer_without_usable_selections() {
    let specs = [
      spec(true, MaxSelections::One, false),
      spec(true, MaxSelections::Many, true),
      spec(true, MaxSelections::Many, false),
      spec(false, MaxSelections::Zero, false),
    ];
    for spec in &specs {
      assert_eq!(select_range(&[], spec), InputRange::WholeBuffer);
      assert_eq!(select_range(&[3..3, 7..7], spec), InputRange::WholeBuffer);
    }
  }

  #[test]
  fn ignores_selections_when_unsupported() {
    assert_eq!(select_range(&[1..4], &spec(false, MaxSelections::One, false)), InputRange::WholeBuffer);
    assert_eq!(select_range(&[1..4], &spec(true, MaxSelections::Zero, false)), InputRange::WholeBuffer);
  }

  #[test]
  fn passes_all_ranges_for_multi_range_formatters() {
    let spec = spec(true, MaxSelections::Many, true);
    assert_eq!(
      select_range(&[20..30, 0..0, 2..5, 25..35, 40..41], &spec),
      InputRange::Ranges(vec![2..5, 20..35, 40..41])
    );
  }

  #[test]
  fn last_added_selection_for_single_range_invocations() {
    let spec = spec(true, MaxSelections::Many, false);
    assert_eq!(select_range(&[20..30, 2..5, 8..8], &spec), InputRange::Ranges(vec![2..5]));
  }

  #[test]
  fn normalizes_selections() {
    let text = "a\u{00e9}b";
    assert_eq!(normalize_selection(text, &(3..0)), 0..3);
    assert_eq!(normalize_selection(text, &(2..100)), 1..4);
  }
}
