use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::FormatError;
use crate::invocation::ResolvedInvocation;

/// What a formatter process produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessOutput {
  /// `None` when the process was terminated by a signal.
  pub exit_code: Option<i32>,
  pub stdout: Vec<u8>,
  pub stderr: Vec<u8>,
}

impl ProcessOutput {
  pub fn success(&self) -> bool {
    self.exit_code == Some(0)
  }
}

/// Runs the invocation, writing `input` to its stdin and collecting stdout
/// and stderr until it exits.
///
/// The process is killed when `timeout` elapses or `token` is cancelled.
pub async fn invoke(
  formatter_name: &str,
  invocation: &ResolvedInvocation,
  input: Vec<u8>,
  timeout: Duration,
  token: &CancellationToken,
) -> Result<ProcessOutput, FormatError> {
  let mut command = Command::new(invocation.executable_path());
  command
    .args(&invocation.arguments)
    .envs(&invocation.environment)
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);
  if let Some(working_dir) = &invocation.working_dir {
    if working_dir.is_dir() {
      command.current_dir(working_dir);
    }
  }
  #[cfg(windows)]
  {
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    command.creation_flags(CREATE_NO_WINDOW);
  }

  let mut child = command.spawn().map_err(|err| match err.kind() {
    ErrorKind::NotFound => FormatError::ExecutableNotFound {
      formatter: formatter_name.to_string(),
      candidates: vec![invocation.executable_path().display().to_string()],
    },
    ErrorKind::PermissionDenied => FormatError::PermissionDenied(invocation.executable_path().to_path_buf()),
    _ => FormatError::ProcessError {
      exit_code: None,
      message: format!("Failed to start {}: {}", invocation.executable_path().display(), err),
    },
  })?;

  let stdin = child.stdin.take();
  let write_input = async move {
    let Some(mut stdin) = stdin else {
      return Ok(());
    };
    match stdin.write_all(&input).await {
      // the formatter may exit without reading all of its input
      Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
      result => result,
    }
    // stdin is dropped here, closing the pipe
  };
  let run = async move {
    let (write_result, output) = tokio::join!(write_input, child.wait_with_output());
    let output = output.map_err(|err| FormatError::ProcessError {
      exit_code: None,
      message: format!("Failed waiting on formatter: {}", err),
    })?;
    if let Err(err) = write_result {
      return Err(FormatError::ProcessError {
        exit_code: output.status.code(),
        message: format!("Failed writing to formatter stdin: {}", err),
      });
    }
    Ok(ProcessOutput {
      exit_code: output.status.code(),
      stdout: output.stdout,
      stderr: output.stderr,
    })
  };

  tokio::select! {
    result = run => result,
    _ = tokio::time::sleep(timeout) => Err(FormatError::Timeout(timeout)),
    _ = token.cancelled() => Err(FormatError::Cancelled),
  }
}


#[cfg(all(test, unix))]
mod test {
  use indexmap::IndexMap;
  use pretty_assertions::assert_eq;

  use super::test_scripts::write_script;
  use super::*;
  use crate::error::FormatErrorKind;

  fn invocation(executable: std::path::PathBuf) -> ResolvedInvocation {
    ResolvedInvocation::new(executable, Vec::new(), IndexMap::new(), None, None).unwrap()
  }

  async fn run(body: &str, input: &[u8], timeout: Duration) -> Result<ProcessOutput, FormatError> {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "formatter", body);
    invoke("test", &invocation(script), input.to_vec(), timeout, &CancellationToken::new()).await
  }

  #[tokio::test]
  async fn pipes_input_through() {
    let output = run("cat", b"int x=1;", Duration::from_secs(10)).await.unwrap();
    assert_eq!(
      output,
      ProcessOutput {
        exit_code: Some(0),
        stdout: b"int x=1;".to_vec(),
        stderr: Vec::new(),
      }
    );
  }

  #[tokio::test]
  async fn handles_large_input() {
    let input = "line of text\n".repeat(100_000).into_bytes();
    let output = run("cat", &input, Duration::from_secs(30)).await.unwrap();
    assert_eq!(output.stdout.len(), input.len());
  }

  #[tokio::test]
  async fn reports_exit_code_and_stderr() {
    let output = run("echo 'syntax error' >&2\nexit 2", b"text", Duration::from_secs(10)).await.unwrap();
    assert_eq!(output.exit_code, Some(2));
    assert!(!output.success());
    assert_eq!(String::from_utf8_lossy(&output.stderr), "syntax error\n");
  }

  #[tokio::test]
  async fn tolerates_formatter_not_reading_input() {
    let input = vec![b'a'; 1_000_000];
    let output = run("echo done", &input, Duration::from_secs(10)).await.unwrap();
    assert_eq!(output.stdout, b"done\n");
  }

  #[tokio::test]
  async fn passes_arguments_and_environment() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "formatter", "printf '%s|%s|%s' \"$1\" \"$2\" \"$EXTFMT_TEST\"");
    let mut environment = IndexMap::new();
    environment.insert("EXTFMT_TEST".to_string(), "value".to_string());
    let invocation = ResolvedInvocation::new(script, vec!["-a".to_string(), "b c".to_string()], environment, None, None).unwrap();
    let output = invoke("test", &invocation, Vec::new(), Duration::from_secs(10), &CancellationToken::new())
      .await
      .unwrap();
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "-a|b c|value");
  }

  #[tokio::test]
  async fn times_out() {
    let err = run("sleep 5", b"", Duration::from_millis(100)).await.unwrap_err();
    assert_eq!(err.kind(), FormatErrorKind::TimeoutError);
  }

  #[tokio::test]
  async fn cancels() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "formatter", "sleep 5");
    let token = CancellationToken::new();
    token.cancel();
    let err = invoke("test", &invocation(script), Vec::new(), Duration::from_secs(10), &token)
      .await
      .unwrap_err();
    assert_eq!(err, FormatError::Cancelled);
  }

  #[tokio::test]
  async fn missing_executable() {
    let dir = tempfile::tempdir().unwrap();
    let err = invoke(
      "test",
      &invocation(dir.path().join("missing")),
      Vec::new(),
      Duration::from_secs(10),
      &CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), FormatErrorKind::ExecutableNotFound);
  }

  #[tokio::test]
  async fn not_executable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("formatter");
    std::fs::write(&path, "#!/bin/sh\ncat\n").unwrap();
    let err = invoke("test", &invocation(path), Vec::new(), Duration::from_secs(10), &CancellationToken::new())
      .await
      .unwrap_err();
    assert_eq!(err.kind(), FormatErrorKind::PermissionDenied);
  }
}
