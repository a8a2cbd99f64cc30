use std::path::PathBuf;

use indexmap::IndexMap;
use indexmap::IndexSet;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::environment::Environment;
use crate::error::FormatError;
use crate::expand::expand_environment;
use crate::expand::expand_value;

const ENVIRONMENT_KEY: &str = "environment";
const PATH_KEY: &str = "path";
const ON_SAVE_KEY: &str = "on_save";

/// The `format` block of the host's project settings.
///
/// This is a thin wrapper over the raw JSON so that every call reads the
/// settings as they are at that moment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProjectSettings {
  value: Option<Value>,
}

impl ProjectSettings {
  pub fn new(format_settings: Value) -> Self {
    Self { value: Some(format_settings) }
  }

  pub fn empty() -> Self {
    Self { value: None }
  }

  /// Extracts the `settings.format` block from project data shaped like
  /// `{ "folders": [...], "settings": { "format": { ... } } }`.
  pub fn from_project_data(project_data: &Value) -> Result<Self, FormatError> {
    let Some(project_data) = project_data.as_object() else {
      return Err(FormatError::malformed("<project>", "Expected an object."));
    };
    let Some(settings) = project_data.get("settings") else {
      return Ok(Self::empty());
    };
    let Some(settings) = settings.as_object() else {
      return Err(FormatError::malformed("settings", "Expected an object."));
    };
    Ok(match settings.get("format") {
      Some(format) => Self::new(format.clone()),
      None => Self::empty(),
    })
  }

  fn root(&self) -> Result<Option<&Map<String, Value>>, FormatError> {
    match &self.value {
      None | Some(Value::Null) => Ok(None),
      Some(Value::Object(map)) => Ok(Some(map)),
      Some(_) => Err(FormatError::malformed("format", "Expected an object.")),
    }
  }

  /// Gets the raw settings block of a formatter, if it has one.
  pub fn formatter_block(&self, formatter_name: &str) -> Result<Option<&Map<String, Value>>, FormatError> {
    let Some(root) = self.root()? else {
      return Ok(None);
    };
    match root.get(formatter_name) {
      None | Some(Value::Null) => Ok(None),
      Some(Value::Object(block)) => Ok(Some(block)),
      Some(_) => Err(FormatError::malformed(format!("format.{}", formatter_name), "Expected an object.")),
    }
  }

  /// The configured environment overrides, not yet expanded.
  pub fn raw_environment(&self) -> Result<IndexMap<String, String>, FormatError> {
    let Some(root) = self.root()? else {
      return Ok(IndexMap::new());
    };
    let environment = match root.get(ENVIRONMENT_KEY) {
      None | Some(Value::Null) => return Ok(IndexMap::new()),
      Some(Value::Object(environment)) => environment,
      Some(_) => return Err(FormatError::malformed("format.environment", "Expected an object.")),
    };
    let mut result = IndexMap::with_capacity(environment.len());
    for (name, value) in environment {
      match value {
        Value::String(value) => {
          result.insert(name.clone(), value.clone());
        }
        _ => return Err(FormatError::malformed(format!("format.environment.{}", name), "Expected a string.")),
      }
    }
    Ok(result)
  }
}

/// When a formatter runs as part of saving a file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OnSave {
  Always,
  #[default]
  Never,
  /// Only for files within one of these project folders.
  Folders(IndexSet<String>),
}

impl OnSave {
  /// A file outside every project folder only formats on save with `Always`.
  pub fn is_enabled_for(&self, folder_name: Option<&str>) -> bool {
    match self {
      OnSave::Always => true,
      OnSave::Never => false,
      OnSave::Folders(folders) => folder_name.map(|name| folders.contains(name)).unwrap_or(false),
    }
  }
}

/// A formatter's settings block after shape validation, before expansion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormatterSettings {
  pub path: Option<String>,
  pub on_save: OnSave,
  pub unknown_keys: Vec<String>,
}

/// Validates and reads a formatter's settings block. A formatter without a
/// block gets the defaults.
pub fn read_formatter_settings(formatter_name: &str, settings: &ProjectSettings) -> Result<FormatterSettings, FormatError> {
  let Some(block) = settings.formatter_block(formatter_name)? else {
    return Ok(FormatterSettings::default());
  };
  let key_name = |key: &str| format!("format.{}.{}", formatter_name, key);

  let mut result = FormatterSettings::default();
  for (key, value) in block {
    match key.as_str() {
      PATH_KEY => {
        result.path = match value {
          Value::Null => None,
          Value::String(path) => Some(path.clone()),
          _ => return Err(FormatError::malformed(key_name(key), "Expected a string.")),
        };
      }
      ON_SAVE_KEY => {
        result.on_save = match value {
          Value::Null => OnSave::Never,
          Value::Bool(true) => OnSave::Always,
          Value::Bool(false) => OnSave::Never,
          Value::Array(items) => {
            let mut folders = IndexSet::with_capacity(items.len());
            for item in items {
              match item {
                Value::String(folder) => {
                  folders.insert(folder.clone());
                }
                _ => {
                  return Err(FormatError::malformed(key_name(key), "Expected a list of folder names."));
                }
              }
            }
            OnSave::Folders(folders)
          }
          _ => {
            return Err(FormatError::malformed(key_name(key), "Expected true, false, or a list of folder names."));
          }
        };
      }
      _ => result.unknown_keys.push(key.clone()),
    }
  }
  Ok(result)
}

/// The effective configuration of one formatter for one request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatterConfig {
  /// Expanded search path override (a directory, or the executable itself).
  pub search_path: Option<PathBuf>,
  pub on_save: OnSave,
  /// Whether `on_save` applies to the requested folder.
  pub on_save_enabled: bool,
  /// Expanded environment overrides for the formatter process.
  pub environment: IndexMap<String, String>,
}

/// Merges the global and per-formatter settings into the configuration that
/// applies to `formatter_name` for a file in `folder_name`.
pub fn resolve_formatter_config(
  formatter_name: &str,
  folder_name: Option<&str>,
  settings: &ProjectSettings,
  environment: &impl Environment,
) -> Result<FormatterConfig, FormatError> {
  let formatter_settings = read_formatter_settings(formatter_name, settings)?;
  for key in &formatter_settings.unknown_keys {
    log_warn!(environment, "Unknown property in format.{} settings: {}", formatter_name, key);
  }

  let raw_environment = settings.raw_environment()?;
  let inherited = environment.env_vars();
  let resolved_environment = expand_environment(&raw_environment, &inherited)?;
  let search_path = match &formatter_settings.path {
    Some(path) if !path.trim().is_empty() => Some(PathBuf::from(expand_value(path, &raw_environment, &inherited)?)),
    _ => None,
  };

  Ok(FormatterConfig {
    search_path,
    on_save_enabled: formatter_settings.on_save.is_enabled_for(folder_name),
    on_save: formatter_settings.on_save,
    environment: resolved_environment,
  })
}
