#![deny(clippy::print_stderr)]
#![deny(clippy::print_stdout)]
#![deny(clippy::unused_async)]

use extfmt_core::LogLevel;

use environment::RealEnvironment;
use environment::RealEnvironmentOptions;
use run_cli::AppError;
use utils::RealStdInReader;

mod arg_parser;
mod buffer;
mod environment;
mod project;
mod run_cli;
mod utils;

fn main() {
  let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
    Ok(rt) => rt,
    Err(err) => {
      #[allow(clippy::print_stderr)]
      {
        eprintln!("Error creating the async runtime: {:#}", err);
      }
      std::process::exit(1);
    }
  };
  rt.block_on(async move {
    match run().await {
      Ok(_) => {}
      Err((err, log_level)) => {
        if log_level != LogLevel::Silent {
          let result = format!("{:#}", err.inner);
          #[allow(clippy::print_stderr)]
          if !result.is_empty() {
            eprintln!("{}", result);
          }
        }
        std::process::exit(err.exit_code);
      }
    }
  });
}

async fn run() -> Result<(), (AppError, LogLevel)> {
  let args = arg_parser::parse_args(std::env::args().collect(), RealStdInReader).map_err(|err| (err.into(), LogLevel::Info))?;

  let environment = RealEnvironment::new(&RealEnvironmentOptions {
    log_level: args.log_level,
    is_stdout_machine_readable: args.is_stdout_machine_readable(),
  });

  run_cli::run_cli(&args, &environment).await.map_err(|err| (err, args.log_level))
}
