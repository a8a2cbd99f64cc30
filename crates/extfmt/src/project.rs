use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use extfmt_core::ProjectSettings;
use serde::Deserialize;

const PROJECT_FILE_NAMES: [&str; 2] = ["extfmt.json", ".extfmt.json"];

/// A folder of the project, as listed in its `folders` array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectFolder {
  pub name: String,
  pub path: PathBuf,
}

/// The project file a host would otherwise provide, read from disk.
#[derive(Debug)]
pub struct ProjectFile {
  pub path: Option<PathBuf>,
  pub folders: Vec<ProjectFolder>,
  pub settings: ProjectSettings,
}

#[derive(Deserialize)]
struct RawFolder {
  name: Option<String>,
  path: String,
}

impl ProjectFile {
  /// Used when no project file exists.
  pub fn empty() -> Self {
    Self {
      path: None,
      folders: Vec::new(),
      settings: ProjectSettings::empty(),
    }
  }

  /// Reads the project file at the provided path, or the nearest one in the
  /// file's directory or one of its ancestors.
  pub fn resolve(explicit_path: Option<&str>, file_path: &Path) -> Result<Self> {
    match explicit_path {
      Some(path) => Self::load(&dunce::canonicalize(path).with_context(|| format!("Could not find project file at '{}'.", path))?),
      None => match discover(file_path) {
        Some(path) => Self::load(&path),
        None => Ok(Self::empty()),
      },
    }
  }

  pub fn load(path: &Path) -> Result<Self> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Error reading project file '{}'.", path.display()))?;
    Self::parse(path, &text).with_context(|| format!("Error parsing project file '{}'.", path.display()))
  }

  fn parse(path: &Path, text: &str) -> Result<Self> {
    let value = match jsonc_parser::parse_to_serde_value(text, &Default::default())? {
      Some(value) => value,
      None => serde_json::Value::Object(Default::default()),
    };
    let settings = ProjectSettings::from_project_data(&value)?;
    let base_dir = path.parent().unwrap_or(Path::new("."));
    let folders = match value.get("folders") {
      None | Some(serde_json::Value::Null) => Vec::new(),
      Some(folders) => {
        let raw_folders = Vec::<RawFolder>::deserialize(folders).context("Expected 'folders' to be an array of objects with a 'path'.")?;
        raw_folders.into_iter().map(|raw| resolve_folder(base_dir, raw)).collect::<Result<Vec<_>>>()?
      }
    };
    Ok(Self {
      path: Some(path.to_path_buf()),
      folders,
      settings,
    })
  }

  /// Name of the deepest project folder containing the file.
  pub fn folder_name_for(&self, file_path: &Path) -> Option<String> {
    self
      .folders
      .iter()
      .filter(|folder| file_path.starts_with(&folder.path))
      .max_by_key(|folder| folder.path.components().count())
      .map(|folder| folder.name.clone())
  }
}

fn resolve_folder(base_dir: &Path, raw: RawFolder) -> Result<ProjectFolder> {
  let path = base_dir.join(&raw.path);
  // folders that don't exist can't contain the file, but still keep a normalized path
  let path = dunce::canonicalize(&path).unwrap_or(path);
  let name = match raw.name {
    Some(name) => name,
    None => match path.file_name() {
      Some(name) => name.to_string_lossy().to_string(),
      None => bail!("Could not derive a name for folder '{}'. Provide a 'name'.", raw.path),
    },
  };
  Ok(ProjectFolder { name, path })
}

fn discover(file_path: &Path) -> Option<PathBuf> {
  let start_dir = file_path.parent()?;
  for dir in start_dir.ancestors() {
    for name in PROJECT_FILE_NAMES {
      let candidate = dir.join(name);
      if candidate.is_file() {
        return Some(candidate);
      }
    }
  }
  None
}
