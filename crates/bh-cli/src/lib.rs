use std::ffi::OsString;

use clap::Parser;

mod cli_args;
mod commands;
mod error_map;
mod logging;

pub(crate) use cli_args::{Cli, Mode};
pub use error_map::CliError;
pub(crate) use error_map::emit_error;

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    logging::init_tracing();
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> Result<i32, CliError> {
    match cli.command {
        Mode::Inspect(args) => commands::run_inspect(args),
        Mode::Send(args) => commands::run_send(args),
    }
}

#[cfg(test)]
mod tests;
