use std::path::Path;

use crate::configuration::ProjectSettings;
use crate::configuration::read_formatter_settings;
use crate::environment::Environment;
use crate::error::FormatError;
use crate::registry::FormatterRegistry;
use crate::service::FormatRequest;

/// Decides which formats to run when a file is saved.
///
/// Every formatter that handles the file and has `on_save` enabled for the
/// owning folder gets one whole-file request, in registry declaration order.
/// The requests are meant to run one after another.
pub fn save_requests(
  file_path: &Path,
  folder_name: Option<&str>,
  syntax: Option<&str>,
  registry: &FormatterRegistry,
  settings: &ProjectSettings,
  environment: &impl Environment,
) -> Result<Vec<FormatRequest>, FormatError> {
  let mut requests = Vec::new();
  for spec in registry.all_for_buffer(syntax, file_path) {
    let formatter_settings = read_formatter_settings(&spec.name, settings)?;
    if !formatter_settings.on_save.is_enabled_for(folder_name) {
      continue;
    }
    log_debug!(environment, "Formatting {} on save with {}.", file_path.display(), spec.name);
    requests.push(FormatRequest {
      file_path: file_path.to_path_buf(),
      folder_name: folder_name.map(ToOwned::to_owned),
      syntax: syntax.map(ToOwned::to_owned),
      formatter_name: spec.name.clone(),
      selections: Vec::new(),
      triggered_by_save: true,
    });
  }
  Ok(requests)
}
