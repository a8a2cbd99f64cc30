use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::apply::FormatOutcome;
use crate::apply::FormatSuccess;
use crate::apply::RangeOutput;
use crate::apply::apply_outputs;
use crate::configuration::ProjectSettings;
use crate::configuration::resolve_formatter_config;
use crate::environment::Environment;
use crate::error::FormatError;
use crate::host::HostBuffer;
use crate::host::apply_to_buffer;
use crate::invocation::InvocationContext;
use crate::invocation::ResolvedInvocation;
use crate::invocation::resolve_invocations;
use crate::locks::BufferLocks;
use crate::process;
use crate::range::InputRange;
use crate::range::normalize_selection;
use crate::range::select_range;
use crate::registry::FormatterRegistry;
use crate::save::save_requests;

/// One request to format a buffer. Consumed immediately.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatRequest {
  pub file_path: PathBuf,
  /// Name of the project folder that owns the file.
  pub folder_name: Option<String>,
  pub syntax: Option<String>,
  pub formatter_name: String,
  /// Byte ranges in insertion order.
  pub selections: Vec<Range<usize>>,
  pub triggered_by_save: bool,
}

#[derive(Clone, Debug)]
pub struct FormatOptions {
  /// How long a formatter process may run before it is killed.
  pub timeout: Duration,
}

impl Default for FormatOptions {
  fn default() -> Self {
    Self {
      timeout: Duration::from_secs(10),
    }
  }
}

/// Result of one formatter run during a save.
#[derive(Debug)]
pub struct SaveResult {
  pub formatter_name: String,
  /// Whether the buffer changed.
  pub result: Result<bool, FormatError>,
}

/// Runs the invocation pipeline for a host.
///
/// At most one format runs per buffer at a time. Different buffers may
/// format concurrently.
pub struct FormatService<TEnvironment: Environment> {
  environment: TEnvironment,
  registry: Arc<FormatterRegistry>,
  options: FormatOptions,
  locks: BufferLocks,
  /// Parent of the tokens of the requests currently running.
  token: Mutex<CancellationToken>,
}

impl<TEnvironment: Environment> FormatService<TEnvironment> {
  pub fn new(environment: TEnvironment, registry: Arc<FormatterRegistry>, options: FormatOptions) -> Self {
    Self {
      environment,
      registry,
      options,
      locks: BufferLocks::new(),
      token: Mutex::new(CancellationToken::new()),
    }
  }

  pub fn registry(&self) -> &FormatterRegistry {
    &self.registry
  }

  /// Kills every running formatter process. Their requests fail with `Cancelled`.
  pub fn cancel_all(&self) {
    let mut token = self.token.lock();
    token.cancel();
    *token = CancellationToken::new();
  }

  /// Resolves the invocations a request would run, without running them.
  pub fn resolve(&self, request: &FormatRequest, text: &str, settings: &ProjectSettings) -> Result<Vec<ResolvedInvocation>, FormatError> {
    let spec = self.registry.by_name(&request.formatter_name)?;
    let config = resolve_formatter_config(&spec.name, request.folder_name.as_deref(), settings, &self.environment)?;
    let selections = request_selections(request, text);
    let input_range = select_range(&selections, spec);
    match &input_range {
      InputRange::WholeBuffer => log_debug!(self.environment, "Formatting whole buffer of {}.", request.file_path.display()),
      InputRange::Ranges(ranges) => log_debug!(self.environment, "Formatting ranges {:?} of {}.", ranges, request.file_path.display()),
    }
    resolve_invocations(
      &InvocationContext {
        spec,
        config: &config,
        file_path: &request.file_path,
        syntax: request.syntax.as_deref(),
      },
      &input_range,
      &self.environment,
    )
  }

  /// Formats `text` as described by the request. The text is not modified.
  pub async fn format(&self, request: &FormatRequest, text: &str, settings: &ProjectSettings) -> FormatOutcome {
    let selections = request_selections(request, text);
    self.format_inner(request, text, settings, &selections).await.into()
  }

  /// Runs the request, remapping `selections` onto the formatted text.
  async fn format_inner(
    &self,
    request: &FormatRequest,
    text: &str,
    settings: &ProjectSettings,
    selections: &[Range<usize>],
  ) -> Result<FormatSuccess, FormatError> {
    let token = self.token.lock().child_token();
    let invocations = self.resolve(request, text, settings)?;
    let mut outputs = Vec::with_capacity(invocations.len());
    for invocation in &invocations {
      let range = invocation.replaced_range(text.len());
      let input = text.get(range.clone()).unwrap_or_default().as_bytes().to_vec();
      log_debug!(self.environment, "Running {}", invocation.command_line());
      let start = Instant::now();
      let output = process::invoke(&request.formatter_name, invocation, input, self.options.timeout, &token).await?;
      log_debug!(
        self.environment,
        "{} exited with code {:?} in {}ms.",
        request.formatter_name,
        output.exit_code,
        start.elapsed().as_millis()
      );
      outputs.push(RangeOutput { range, output });
    }
    apply_outputs(text, outputs, selections)
  }

  /// Formats a buffer with the given formatter, or the one handling the
  /// buffer, waiting for any format of the same buffer to finish first.
  ///
  /// Failures are shown with `show_error`. Returns whether the buffer changed.
  pub async fn run_format_command(&self, buffer: &mut impl HostBuffer, formatter_name: Option<&str>, settings: &ProjectSettings) -> Result<bool, FormatError> {
    let _guard = self.locks.lock(buffer.file_path()).await;
    self.format_buffer(buffer, formatter_name, settings).await
  }

  /// Like `run_format_command`, but fails with `Busy` instead of waiting.
  pub async fn try_run_format_command(&self, buffer: &mut impl HostBuffer, formatter_name: Option<&str>, settings: &ProjectSettings) -> Result<bool, FormatError> {
    let _guard = match self.locks.try_lock(buffer.file_path()) {
      Ok(guard) => guard,
      Err(err) => {
        buffer.show_error(&err);
        return Err(err);
      }
    };
    self.format_buffer(buffer, formatter_name, settings).await
  }

  async fn format_buffer(&self, buffer: &mut impl HostBuffer, formatter_name: Option<&str>, settings: &ProjectSettings) -> Result<bool, FormatError> {
    // read the buffer only once the lock is held so queued formats see earlier results
    let text = buffer.text();
    let result = match self.request_for(buffer, formatter_name) {
      Ok(request) => {
        let selections = request_selections(&request, &text);
        self.format_inner(&request, &text, settings, &selections).await
      }
      Err(err) => Err(err),
    };
    match result {
      Ok(success) => Ok(apply_to_buffer(buffer, &text, &success)),
      Err(err) => {
        buffer.show_error(&err);
        Err(err)
      }
    }
  }

  fn request_for(&self, buffer: &impl HostBuffer, formatter_name: Option<&str>) -> Result<FormatRequest, FormatError> {
    let syntax = buffer.syntax();
    let formatter_name = match formatter_name {
      Some(name) => name.to_string(),
      None => match self.registry.for_buffer(syntax.as_deref(), buffer.file_path()) {
        Some(spec) => spec.name.clone(),
        None => return Err(FormatError::NoFormatter(buffer.file_path().to_path_buf())),
      },
    };
    Ok(FormatRequest {
      file_path: buffer.file_path().to_path_buf(),
      folder_name: buffer.folder_name(),
      syntax,
      formatter_name,
      selections: buffer.selections(),
      triggered_by_save: false,
    })
  }

  /// Formats the whole buffer with every formatter enabled on save for it,
  /// one after another.
  ///
  /// Failures are reported with `show_status` and never stop the save.
  pub async fn run_on_save(&self, buffer: &mut impl HostBuffer, settings: &ProjectSettings) -> Vec<SaveResult> {
    let _guard = self.locks.lock(buffer.file_path()).await;
    let syntax = buffer.syntax();
    let folder_name = buffer.folder_name();
    let requests = match save_requests(buffer.file_path(), folder_name.as_deref(), syntax.as_deref(), &self.registry, settings, &self.environment) {
      Ok(requests) => requests,
      Err(err) => {
        log_warn!(self.environment, "Format on save skipped: {}", err);
        buffer.show_status(&format!("Format on save skipped: {}", err));
        return Vec::new();
      }
    };

    let mut results = Vec::with_capacity(requests.len());
    for request in requests {
      let text = buffer.text();
      // the whole file is formatted, but the cursors still follow the text
      let selections = buffer
        .selections()
        .iter()
        .map(|selection| normalize_selection(&text, selection))
        .collect::<Vec<_>>();
      let result = match self.format_inner(&request, &text, settings, &selections).await {
        Ok(success) => Ok(apply_to_buffer(buffer, &text, &success)),
        Err(err) => {
          let message = format!("{} failed on save: {}", request.formatter_name, err);
          if self.environment.log_level().is_warn() {
            self.environment.log_stderr_with_context(&message, &request.formatter_name);
          }
          buffer.show_status(&message);
          Err(err)
        }
      };
      results.push(SaveResult {
        formatter_name: request.formatter_name,
        result,
      });
    }
    results
  }
}

fn request_selections(request: &FormatRequest, text: &str) -> Vec<Range<usize>> {
  if request.triggered_by_save {
    return Vec::new();
  }
  request.selections.iter().map(|selection| normalize_selection(text, selection)).collect()
}
