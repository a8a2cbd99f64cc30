use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use extfmt_core::FormatError;
use extfmt_core::FormatOptions;
use extfmt_core::FormatRequest;
use extfmt_core::FormatService;
use extfmt_core::FormatterRegistry;
use extfmt_core::log_debug;
use extfmt_core::log_warn;
use serde::Serialize;

use crate::arg_parser::CliArgs;
use crate::arg_parser::FmtSubCommand;
use crate::arg_parser::OnSaveSubCommand;
use crate::arg_parser::StdInFmtSubCommand;
use crate::arg_parser::SubCommand;
use crate::arg_parser::TargetArgs;
use crate::buffer::FileBuffer;
use crate::environment::CliEnvironment;
use crate::project::ProjectFile;
use crate::utils::get_difference;

const GENERAL_EXIT_CODE: i32 = 1;
const FORMAT_FAILED_EXIT_CODE: i32 = 10;
const CONFIG_EXIT_CODE: i32 = 11;

pub struct AppError {
  pub inner: anyhow::Error,
  pub exit_code: i32,
}

impl AppError {
  fn with_exit_code(inner: impl Into<anyhow::Error>, exit_code: i32) -> Self {
    Self {
      inner: inner.into(),
      exit_code,
    }
  }

  /// The failure was already shown to the user.
  fn format_failed() -> Self {
    Self::with_exit_code(anyhow::anyhow!(""), FORMAT_FAILED_EXIT_CODE)
  }
}

impl<TError: Into<anyhow::Error>> From<TError> for AppError {
  fn from(inner: TError) -> Self {
    Self::with_exit_code(inner, GENERAL_EXIT_CODE)
  }
}

pub async fn run_cli<TEnvironment: CliEnvironment>(args: &CliArgs, environment: &TEnvironment) -> Result<(), AppError> {
  let service = FormatService::new(environment.clone(), FormatterRegistry::builtin(), format_options(args));
  match &args.sub_command {
    SubCommand::Help(text) => {
      environment.log(text);
      Ok(())
    }
    SubCommand::Version => {
      environment.log(&format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")));
      Ok(())
    }
    SubCommand::Formatters => {
      let formatters = service.registry().iter().collect::<Vec<_>>();
      environment.log_machine_readable(&to_pretty_json(&formatters)?);
      Ok(())
    }
    SubCommand::Fmt(cmd) => format_file(cmd, args, environment, &service).await,
    SubCommand::StdInFmt(cmd) => format_stdin(cmd, args, environment, &service).await,
    SubCommand::OnSave(cmd) => format_on_save(cmd, args, environment, &service).await,
    SubCommand::OutputResolvedInvocation(target) => output_resolved_invocation(target, args, environment, &service),
  }
}

fn format_options(args: &CliArgs) -> FormatOptions {
  let mut options = FormatOptions::default();
  if let Some(timeout) = args.timeout {
    options.timeout = timeout;
  }
  options
}

async fn format_file<TEnvironment: CliEnvironment>(
  cmd: &FmtSubCommand,
  args: &CliArgs,
  environment: &TEnvironment,
  service: &FormatService<TEnvironment>,
) -> Result<(), AppError> {
  let file_path = resolve_file_path(&cmd.target.file_path)?;
  let file_text = read_file(&file_path)?;
  let project = resolve_project(args, &file_path)?;
  let mut buffer = create_buffer(environment, &cmd.target, &project, file_path.clone(), file_text.clone());

  let changed = service
    .run_format_command(&mut buffer, cmd.target.formatter.as_deref(), &project.settings)
    .await
    .map_err(|_| AppError::format_failed())?;
  if !changed {
    log_debug!(environment, "Already formatted {}", file_path.display());
    return Ok(());
  }

  if cmd.diff {
    environment.log(&get_difference(&file_path.display().to_string(), &file_text, buffer.current_text()));
  } else {
    std::fs::write(&file_path, buffer.current_text()).with_context(|| format!("Error writing file '{}'.", file_path.display()))?;
    environment.log(&format!("Formatted {}", file_path.display()));
  }
  Ok(())
}

async fn format_stdin<TEnvironment: CliEnvironment>(
  cmd: &StdInFmtSubCommand,
  args: &CliArgs,
  environment: &TEnvironment,
  service: &FormatService<TEnvironment>,
) -> Result<(), AppError> {
  let file_path = resolve_file_path(&cmd.target.file_path)?;
  let project = resolve_project(args, &file_path)?;
  let mut buffer = create_buffer(environment, &cmd.target, &project, file_path, cmd.file_text.clone());
  service
    .run_format_command(&mut buffer, cmd.target.formatter.as_deref(), &project.settings)
    .await
    .map_err(|_| AppError::format_failed())?;
  environment.log_machine_readable(&buffer.into_text());
  Ok(())
}

async fn format_on_save<TEnvironment: CliEnvironment>(
  cmd: &OnSaveSubCommand,
  args: &CliArgs,
  environment: &TEnvironment,
  service: &FormatService<TEnvironment>,
) -> Result<(), AppError> {
  // a save hook is never blocked, so failures are only reported
  let file_path = resolve_file_path(&cmd.file_path)?;
  let file_text = match read_file(&file_path) {
    Ok(text) => text,
    Err(err) => {
      log_warn!(environment, "Format on save skipped: {:#}", err);
      return Ok(());
    }
  };
  let project = match ProjectFile::resolve(args.project.as_deref(), &file_path) {
    Ok(project) => project,
    Err(err) => {
      log_warn!(environment, "Format on save skipped: {:#}", err);
      return Ok(());
    }
  };

  let mut buffer = FileBuffer::new(environment.clone(), file_path.clone(), file_text.clone())
    .with_folder_name(project.folder_name_for(&file_path))
    .with_syntax(cmd.syntax.clone());
  let results = service.run_on_save(&mut buffer, &project.settings).await;
  for result in &results {
    if let Ok(changed) = &result.result {
      log_debug!(environment, "{} on save changed the file: {}", result.formatter_name, changed);
    }
  }

  if buffer.current_text() != file_text {
    if let Err(err) = std::fs::write(&file_path, buffer.current_text()) {
      log_warn!(environment, "Error writing file '{}': {}", file_path.display(), err);
      return Ok(());
    }
    environment.log(&format!("Formatted {}", file_path.display()));
  }
  Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolvedInvocationOutput<'a> {
  formatter: &'a str,
  invocations: Vec<extfmt_core::ResolvedInvocation>,
}

fn output_resolved_invocation<TEnvironment: CliEnvironment>(
  target: &TargetArgs,
  args: &CliArgs,
  environment: &TEnvironment,
  service: &FormatService<TEnvironment>,
) -> Result<(), AppError> {
  let file_path = resolve_file_path(&target.file_path)?;
  // the text is only needed to normalize the selections
  let file_text = if file_path.is_file() { read_file(&file_path)? } else { String::new() };
  let project = resolve_project(args, &file_path)?;
  let formatter_name = match &target.formatter {
    Some(name) => name.clone(),
    None => match service.registry().for_buffer(target.syntax.as_deref(), &file_path) {
      Some(spec) => spec.name.clone(),
      None => return Err(FormatError::NoFormatter(file_path).into()),
    },
  };
  let request = FormatRequest {
    folder_name: project.folder_name_for(&file_path),
    file_path,
    syntax: target.syntax.clone(),
    formatter_name,
    selections: target.ranges.clone(),
    triggered_by_save: false,
  };
  let invocations = service.resolve(&request, &file_text, &project.settings)?;
  environment.log_machine_readable(&to_pretty_json(&ResolvedInvocationOutput {
    formatter: &request.formatter_name,
    invocations,
  })?);
  Ok(())
}

fn create_buffer<TEnvironment: CliEnvironment>(
  environment: &TEnvironment,
  target: &TargetArgs,
  project: &ProjectFile,
  file_path: PathBuf,
  text: String,
) -> FileBuffer<TEnvironment> {
  let folder_name = project.folder_name_for(&file_path);
  FileBuffer::new(environment.clone(), file_path, text)
    .with_folder_name(folder_name)
    .with_syntax(target.syntax.clone())
    .with_selections(target.ranges.clone())
}

fn resolve_project(args: &CliArgs, file_path: &Path) -> Result<ProjectFile, AppError> {
  ProjectFile::resolve(args.project.as_deref(), file_path).map_err(|err| AppError::with_exit_code(err, CONFIG_EXIT_CODE))
}

/// Makes the path absolute, resolving symlinks when the file exists.
fn resolve_file_path(file_path: &str) -> Result<PathBuf> {
  let path = Path::new(file_path);
  let path = if path.is_absolute() {
    path.to_path_buf()
  } else {
    std::env::current_dir().context("Error getting the current directory.")?.join(path)
  };
  Ok(dunce::canonicalize(&path).unwrap_or(path))
}

fn read_file(file_path: &Path) -> Result<String> {
  std::fs::read_to_string(file_path).with_context(|| format!("Error reading file '{}'.", file_path.display()))
}

fn to_pretty_json(value: &impl Serialize) -> Result<String> {
  let mut text = serde_json::to_string_pretty(value)?;
  text.push('\n');
  Ok(text)
}
