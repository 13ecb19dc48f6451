mod commands;
mod helpers;

use clap::Parser;
use scale_core::domain::{PipelineStage, ScalingError};

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let scaling_error = error.as_scaling_error();
            eprintln!("{}", scaling_error.diagnostic_line());
            if let Some(summary_line) = scaling_error.fatal_exit_line() {
                eprintln!("{}", summary_line);
            }
            scaling_error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("scale-rs".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => dispatch_parsed(cli.command),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(name = "scale-rs", about = "Diffraction intensity scaling engine")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Scale a reflection table and write the corrected table
    Scale(commands::ScaleArgs),
    /// Validate a scaling options file without reading any data
    Check(commands::CheckArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Scale(args) => commands::run_scale_command(args),
        CliCommand::Check(args) => commands::run_check_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(ScalingError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ScalingError> for CliError {
    fn from(error: ScalingError) -> Self {
        Self::Compute(error)
    }
}

impl CliError {
    fn as_scaling_error(&self) -> ScalingError {
        match self {
            Self::Usage(message) => ScalingError::configuration(
                PipelineStage::Config,
                "INPUT.CLI_USAGE",
                message.trim_end().to_string(),
            ),
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => {
                ScalingError::io_system(PipelineStage::Save, "IO.CLI", format!("{error:#}"))
            }
        }
    }
}
