use similar::TextDiff;

/// Gets a unified line diff between the original and formatted text.
pub fn get_difference(file_name: &str, original_text: &str, formatted_text: &str) -> String {
  // normalize newlines
  let original_text = original_text.replace("\r\n", "\n");
  let formatted_text = formatted_text.replace("\r\n", "\n");
  if original_text == formatted_text {
    return " | Text differed by line endings.\n".to_string();
  }

  TextDiff::from_lines(&original_text, &formatted_text)
    .unified_diff()
    .context_radius(3)
    .header(file_name, file_name)
    .to_string()
}
