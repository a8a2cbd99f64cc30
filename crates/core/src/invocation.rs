use std::ffi::OsString;
use std::ops::Range;
use std::path::Path;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::Serialize;

use crate::configuration::FormatterConfig;
use crate::environment::Environment;
use crate::error::FormatError;
use crate::range::InputRange;
use crate::registry::ArgsContext;
use crate::registry::FormatterKind;
use crate::registry::FormatterSpec;
use crate::registry::SelectionInput;

/// A fully resolved formatter process invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedInvocation {
  executable_path: PathBuf,
  pub arguments: Vec<String>,
  /// Overrides applied on top of the inherited environment.
  pub environment: IndexMap<String, String>,
  pub working_dir: Option<PathBuf>,
  /// The byte range written to stdin, or `None` for the whole buffer.
  pub input_range: Option<Range<usize>>,
}

impl ResolvedInvocation {
  pub fn new(
    executable_path: PathBuf,
    arguments: Vec<String>,
    environment: IndexMap<String, String>,
    working_dir: Option<PathBuf>,
    input_range: Option<Range<usize>>,
  ) -> Result<Self, FormatError> {
    if executable_path.as_os_str().is_empty() {
      return Err(FormatError::malformed("path", "Resolved to an empty executable path."));
    }
    Ok(Self {
      executable_path,
      arguments,
      environment,
      working_dir,
      input_range,
    })
  }

  pub fn executable_path(&self) -> &Path {
    &self.executable_path
  }

  /// The range of the buffer the process output replaces.
  pub fn replaced_range(&self, text_len: usize) -> Range<usize> {
    self.input_range.clone().unwrap_or(0..text_len)
  }

  /// Human readable command line, for logging.
  pub fn command_line(&self) -> String {
    let mut text = self.executable_path.display().to_string();
    for arg in &self.arguments {
      text.push(' ');
      if arg.contains(' ') {
        text.push('"');
        text.push_str(arg);
        text.push('"');
      } else {
        text.push_str(arg);
      }
    }
    text
  }
}

pub struct InvocationContext<'a> {
  pub spec: &'a FormatterSpec,
  pub config: &'a FormatterConfig,
  pub file_path: &'a Path,
  pub syntax: Option<&'a str>,
}

/// Builds the process invocations needed to format `input_range`.
///
/// Formatters that take range arguments get one invocation over the whole
/// buffer. Formatters that only read stdin get one invocation per range,
/// each fed with only that range's text.
pub fn resolve_invocations(context: &InvocationContext, input_range: &InputRange, environment: &impl Environment) -> Result<Vec<ResolvedInvocation>, FormatError> {
  let executable_path = find_executable(context, environment)?;
  let working_dir = context.file_path.parent().filter(|dir| !dir.as_os_str().is_empty()).map(Path::to_path_buf);
  let create = |ranges: &[Range<usize>], input_range: Option<Range<usize>>| {
    let arguments = context.spec.build_args(&ArgsContext {
      file_path: context.file_path,
      syntax: context.syntax,
      ranges,
    });
    ResolvedInvocation::new(
      executable_path.clone(),
      arguments,
      context.config.environment.clone(),
      working_dir.clone(),
      input_range,
    )
  };

  match input_range {
    InputRange::WholeBuffer => Ok(vec![create(&[], None)?]),
    InputRange::Ranges(ranges) => match context.spec.selection_input() {
      SelectionInput::WholeBufferWithRanges => Ok(vec![create(ranges, None)?]),
      SelectionInput::SelectedText => ranges.iter().map(|range| create(&[], Some(range.clone()))).collect(),
    },
  }
}

/// Finds the formatter's executable.
///
/// Looks in the configured search path first, then the `PATH` of the
/// process environment (with the configured overrides applied), then
/// convenience directories and formatter specific install locations.
pub fn find_executable(context: &InvocationContext, environment: &impl Environment) -> Result<PathBuf, FormatError> {
  let spec = context.spec;
  let cwd = context.file_path.parent().unwrap_or(Path::new("."));

  if let Some(search_path) = &context.config.search_path {
    if environment.is_file(search_path) {
      log_debug!(environment, "Using configured {} executable: {}", spec.name, search_path.display());
      return Ok(search_path.clone());
    }
    if environment.is_dir(search_path) {
      if let Some(path) = find_in_dirs(spec, search_path.as_os_str().to_os_string(), cwd, environment) {
        return Ok(path);
      }
    }
    log_debug!(environment, "Could not find {} in {}. Searching PATH.", spec.name, search_path.display());
  }

  let path_var = context
    .config
    .environment
    .get("PATH")
    .cloned()
    .or_else(|| environment.env_vars().get("PATH").cloned());
  if let Some(path_var) = path_var {
    if let Some(path) = find_in_dirs(spec, OsString::from(path_var), cwd, environment) {
      return Ok(path);
    }
  }

  let fallback_dirs = fallback_dirs(spec, context.file_path, environment);
  if !fallback_dirs.is_empty() {
    if let Ok(search_paths) = std::env::join_paths(&fallback_dirs) {
      if let Some(path) = find_in_dirs(spec, search_paths, cwd, environment) {
        return Ok(path);
      }
    }
  }

  Err(FormatError::ExecutableNotFound {
    formatter: spec.name.clone(),
    candidates: spec.binaries.clone(),
  })
}

fn find_in_dirs(spec: &FormatterSpec, search_paths: OsString, cwd: &Path, environment: &impl Environment) -> Option<PathBuf> {
  spec.binaries.iter().find_map(|binary| {
    let path = environment.which_in(binary, &search_paths, cwd)?;
    log_debug!(environment, "Found {} executable: {}", spec.name, path.display());
    Some(path)
  })
}

fn fallback_dirs(spec: &FormatterSpec, file_path: &Path, environment: &impl Environment) -> Vec<PathBuf> {
  let mut dirs = Vec::new();
  let home_dir = environment.home_dir();

  if let Some(home_dir) = &home_dir {
    if cfg!(target_os = "linux") {
      dirs.push(home_dir.join(".local").join("bin"));
    }
  }
  if cfg!(target_os = "macos") {
    dirs.push(PathBuf::from("/opt/homebrew/bin"));
  }

  match spec.kind {
    FormatterKind::Prettier => {
      if let Some(bin_dir) = file_path
        .ancestors()
        .skip(1)
        .map(|dir| dir.join("node_modules").join(".bin"))
        .find(|dir| environment.is_dir(dir))
      {
        dirs.push(bin_dir);
      }
    }
    FormatterKind::RustFmt => {
      let cargo_home = environment
        .env_vars()
        .get("CARGO_HOME")
        .map(PathBuf::from)
        .or_else(|| home_dir.as_ref().map(|home_dir| home_dir.join(".cargo")));
      if let Some(cargo_home) = cargo_home {
        dirs.push(cargo_home.join("bin"));
      }
    }
    FormatterKind::AutoPep8 | FormatterKind::ClangFormat | FormatterKind::Gn => {}
  }

  dirs.retain(|dir| environment.is_dir(dir));
  dirs
}
