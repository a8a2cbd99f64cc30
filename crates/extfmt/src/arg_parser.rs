use std::ops::Range;
use std::time::Duration;

use anyhow::Result;
use anyhow::bail;
use clap::ArgMatches;
use clap::error::ErrorKind;
use extfmt_core::LogLevel;
use thiserror::Error;

use crate::utils::StdInReader;

pub struct CliArgs {
  pub sub_command: SubCommand,
  pub log_level: LogLevel,
  pub project: Option<String>,
  pub timeout: Option<Duration>,
}

impl CliArgs {
  pub fn is_stdout_machine_readable(&self) -> bool {
    // these output json or formatted text that's read from stdout
    matches!(
      self.sub_command,
      SubCommand::StdInFmt(..) | SubCommand::OutputResolvedInvocation(..) | SubCommand::Formatters
    )
  }

  fn new_with_sub_command(sub_command: SubCommand) -> CliArgs {
    CliArgs {
      sub_command,
      log_level: LogLevel::Info,
      project: None,
      timeout: None,
    }
  }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SubCommand {
  Fmt(FmtSubCommand),
  StdInFmt(StdInFmtSubCommand),
  OnSave(OnSaveSubCommand),
  OutputResolvedInvocation(TargetArgs),
  Formatters,
  Version,
  Help(String),
}

/// The file to format and how.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TargetArgs {
  pub file_path: String,
  pub formatter: Option<String>,
  pub syntax: Option<String>,
  /// Selections in the order they were provided.
  pub ranges: Vec<Range<usize>>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct FmtSubCommand {
  pub target: TargetArgs,
  pub diff: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub struct StdInFmtSubCommand {
  pub target: TargetArgs,
  pub file_text: String,
}

#[derive(Debug, PartialEq, Eq)]
pub struct OnSaveSubCommand {
  pub file_path: String,
  pub syntax: Option<String>,
}

#[derive(Debug, Error)]
#[error(transparent)]
pub struct ParseArgsError(#[from] anyhow::Error);

pub fn parse_args<TStdInReader: StdInReader>(args: Vec<String>, std_in_reader: TStdInReader) -> Result<CliArgs, ParseArgsError> {
  inner_parse_args(args, std_in_reader).map_err(ParseArgsError)
}

fn inner_parse_args<TStdInReader: StdInReader>(args: Vec<String>, std_in_reader: TStdInReader) -> Result<CliArgs> {
  let cli_parser = create_cli_parser();
  let matches = match cli_parser.try_get_matches_from(&args) {
    Ok(result) => result,
    Err(err) => {
      return match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
          Ok(CliArgs::new_with_sub_command(SubCommand::Help(err.render().to_string())))
        }
        ErrorKind::DisplayVersion => Ok(CliArgs::new_with_sub_command(SubCommand::Version)),
        _ => Err(err.into()),
      };
    }
  };

  let sub_command = match matches.subcommand() {
    Some(("fmt", matches)) => SubCommand::Fmt(FmtSubCommand {
      target: parse_target_args(matches, "file")?,
      diff: matches.get_flag("diff"),
    }),
    Some(("stdin-fmt", matches)) => SubCommand::StdInFmt(StdInFmtSubCommand {
      target: parse_target_args(matches, "file-path")?,
      file_text: std_in_reader.read_text()?,
    }),
    Some(("on-save", matches)) => SubCommand::OnSave(OnSaveSubCommand {
      file_path: required_string(matches, "file")?,
      syntax: matches.get_one::<String>("syntax").map(String::from),
    }),
    Some(("output-resolved-invocation", matches)) => SubCommand::OutputResolvedInvocation(parse_target_args(matches, "file")?),
    Some(("formatters", _)) => SubCommand::Formatters,
    Some(("version", _)) => SubCommand::Version,
    _ => {
      let mut cli_parser = create_cli_parser();
      SubCommand::Help(cli_parser.render_help().to_string())
    }
  };

  let log_level = if matches.get_flag("verbose") {
    LogLevel::Debug
  } else {
    match matches.get_one::<String>("log-level").map(String::as_str) {
      Some("debug") => LogLevel::Debug,
      Some("warn") => LogLevel::Warn,
      Some("silent") => LogLevel::Silent,
      _ => LogLevel::Info,
    }
  };

  Ok(CliArgs {
    sub_command,
    log_level,
    project: matches.get_one::<String>("project").map(String::from),
    timeout: matches.get_one::<u64>("timeout").map(|seconds| Duration::from_secs(*seconds)),
  })
}

fn parse_target_args(matches: &ArgMatches, file_arg_name: &str) -> Result<TargetArgs> {
  let ranges = match matches.get_many::<String>("range") {
    Some(values) => values.map(|value| parse_range(value)).collect::<Result<Vec<_>>>()?,
    None => Vec::new(),
  };
  Ok(TargetArgs {
    file_path: required_string(matches, file_arg_name)?,
    formatter: matches.get_one::<String>("formatter").map(String::from),
    syntax: matches.get_one::<String>("syntax").map(String::from),
    ranges,
  })
}

fn required_string(matches: &ArgMatches, name: &str) -> Result<String> {
  match matches.get_one::<String>(name) {
    Some(value) => Ok(value.to_string()),
    None => bail!("Missing required argument: {}", name),
  }
}

/// Parses a byte range in the form `<start>..<end>`.
fn parse_range(text: &str) -> Result<Range<usize>> {
  let parsed = text
    .split_once("..")
    .and_then(|(start, end)| Some(start.trim().parse::<usize>().ok()?..end.trim().parse::<usize>().ok()?));
  match parsed {
    Some(range) => Ok(range),
    None => bail!("Invalid range '{}'. Expected <start>..<end> byte offsets (ex. 10..20).", text),
  }
}

pub fn create_cli_parser() -> clap::Command {
  use clap::Arg;
  use clap::Command;

  Command::new("extfmt")
    .bin_name("extfmt")
    .version(env!("CARGO_PKG_VERSION"))
    .about("Formats files with external code formatters (clang-format, prettier, autopep8, rustfmt, gn).")
    .subcommand_required(false)
    .after_help(
      r#"CONFIGURATION:
  Settings are read from the nearest extfmt.json or .extfmt.json in the
  file's directory or an ancestor directory:

    {
      "folders": [{ "name": "MyFolder", "path": "." }],
      "settings": {
        "format": {
          "environment": { "TOOLS": "$HOME/tools" },
          "clang-format": { "path": "$TOOLS/bin", "on_save": ["MyFolder"] }
        }
      }
    }

EXAMPLES:
  Format a file in place:

    extfmt fmt src/main.cc

  Format only a selection (byte offsets):

    extfmt fmt src/app.ts --range 120..180

  Format stdin:

    extfmt stdin-fmt --file-path src/main.cc < src/main.cc"#,
    )
    .subcommand(
      Command::new("fmt")
        .about("Formats a file and writes the result to the file system.")
        .arg(Arg::new("file").help("Path of the file to format.").required(true).num_args(1))
        .add_target_args()
        .arg(
          Arg::new("diff")
            .long("diff")
            .help("Outputs a diff of the change instead of writing the file.")
            .num_args(0)
            .required(false),
        ),
    )
    .subcommand(
      Command::new("stdin-fmt")
        .about("Formats stdin and outputs the result to stdout.")
        .arg(
          Arg::new("file-path")
            .long("file-path")
            .help("Path the text belongs to. Used to pick the formatter, its settings and its working directory.")
            .required(true)
            .num_args(1),
        )
        .add_target_args(),
    )
    .subcommand(
      Command::new("on-save")
        .about("Runs the formatters enabled on save for a file. Failures are reported, but never fail the command.")
        .arg(Arg::new("file").help("Path of the saved file.").required(true).num_args(1))
        .arg(syntax_arg()),
    )
    .subcommand(
      Command::new("output-resolved-invocation")
        .about("Prints the resolved executable, arguments, environment and input range as JSON.")
        .arg(Arg::new("file").help("Path of the file to format.").required(true).num_args(1))
        .add_target_args(),
    )
    .subcommand(Command::new("formatters").about("Prints the known formatters as JSON."))
    .subcommand(Command::new("version").about("Prints the version."))
    .arg(
      Arg::new("project")
        .long("project")
        .short('p')
        .help("Path to the project file. Defaults to extfmt.json or .extfmt.json in the file's directory or an ancestor directory.")
        .global(true)
        .num_args(1),
    )
    .arg(
      Arg::new("timeout")
        .long("timeout")
        .value_name("seconds")
        .help("Seconds a formatter may run before it is killed. Defaults to 10.")
        .value_parser(clap::value_parser!(u64).range(1..))
        .global(true)
        .num_args(1),
    )
    .arg(
      Arg::new("log-level")
        .long("log-level")
        .help("Minimum level of the messages to output.")
        .value_parser(["debug", "info", "warn", "silent"])
        .global(true)
        .num_args(1),
    )
    .arg(
      Arg::new("verbose")
        .long("verbose")
        .help("Prints additional diagnostic information. Same as --log-level=debug.")
        .global(true)
        .num_args(0),
    )
}

fn syntax_arg() -> clap::Arg {
  clap::Arg::new("syntax")
    .long("syntax")
    .help("Editor syntax name of the buffer (ex. C++). Takes priority over the file extension when picking the formatter.")
    .num_args(1)
}

trait ClapExtensions {
  fn add_target_args(self) -> Self;
}

impl ClapExtensions for clap::Command {
  fn add_target_args(self) -> Self {
    use clap::Arg;
    self
      .arg(
        Arg::new("formatter")
          .long("formatter")
          .short('f')
          .help("Name of the formatter to use. Defaults to the one handling the file.")
          .num_args(1),
      )
      .arg(syntax_arg())
      .arg(
        Arg::new("range")
          .long("range")
          .value_name("start..end")
          .help("Selection to format, as byte offsets. May be provided multiple times.")
          .action(clap::ArgAction::Append)
          .num_args(1),
      )
  }
}

#[cfg(test)]
mod test {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::utils::TestStdInReader;

  fn test_args(args: Vec<&str>) -> Result<CliArgs, ParseArgsError> {
    test_args_with_stdin(args, TestStdInReader::default())
  }

  fn test_args_with_stdin(args: Vec<&str>, stdin_reader: TestStdInReader) -> Result<CliArgs, ParseArgsError> {
    let mut args: Vec<String> = args.into_iter().map(String::from).collect();
    args.insert(0, "".to_string());
    parse_args(args, stdin_reader)
  }

  #[test]
  fn parses_fmt() {
    let args = test_args(vec!["fmt", "src/main.cc", "--range", "20..30", "--range=2..5", "--diff", "-f", "clang-format"]).unwrap();
    assert_eq!(
      args.sub_command,
      SubCommand::Fmt(FmtSubCommand {
        target: TargetArgs {
          file_path: "src/main.cc".to_string(),
          formatter: Some("clang-format".to_string()),
          syntax: None,
          ranges: vec![20..30, 2..5],
        },
        diff: true,
      })
    );
    assert_eq!(args.log_level, LogLevel::Info);
    assert_eq!(args.timeout, None);
    assert!(!args.is_stdout_machine_readable());
  }

  #[test]
  fn parses_stdin_fmt() {
    let args = test_args_with_stdin(
      vec!["stdin-fmt", "--file-path", "a.py", "--syntax", "Python"],
      TestStdInReader::from("x=1"),
    )
    .unwrap();
    assert_eq!(
      args.sub_command,
      SubCommand::StdInFmt(StdInFmtSubCommand {
        target: TargetArgs {
          file_path: "a.py".to_string(),
          syntax: Some("Python".to_string()),
          ..Default::default()
        },
        file_text: "x=1".to_string(),
      })
    );
    assert!(args.is_stdout_machine_readable());
  }

  #[test]
  fn parses_global_flags() {
    let args = test_args(vec!["on-save", "a.cc", "--project", "p.json", "--timeout", "3", "--log-level", "warn"]).unwrap();
    assert_eq!(
      args.sub_command,
      SubCommand::OnSave(OnSaveSubCommand {
        file_path: "a.cc".to_string(),
        syntax: None,
      })
    );
    assert_eq!(args.project, Some("p.json".to_string()));
    assert_eq!(args.timeout, Some(Duration::from_secs(3)));
    assert_eq!(args.log_level, LogLevel::Warn);

    let args = test_args(vec!["formatters", "--log-level", "warn", "--verbose"]).unwrap();
    assert_eq!(args.log_level, LogLevel::Debug);
  }

  #[test]
  fn errors_on_invalid_range() {
    let err = test_args(vec!["fmt", "a.cc", "--range", "5-10"]).err().unwrap();
    assert_eq!(err.to_string(), "Invalid range '5-10'. Expected <start>..<end> byte offsets (ex. 10..20).");
  }

  #[test]
  fn errors_on_zero_timeout() {
    assert!(test_args(vec!["fmt", "a.cc", "--timeout", "0"]).is_err());
  }

  #[test]
  fn outputs_help() {
    assert!(matches!(test_args(vec![]).unwrap().sub_command, SubCommand::Help(_)));
    assert!(matches!(test_args(vec!["--help"]).unwrap().sub_command, SubCommand::Help(_)));
    assert_eq!(test_args(vec!["--version"]).unwrap().sub_command, SubCommand::Version);
  }
}
