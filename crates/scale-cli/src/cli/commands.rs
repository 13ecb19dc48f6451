use super::CliError;
use super::helpers::{init_tracing, load_options, render_human_summary, write_summary};
use scale_core::modules::symmetry::LaueGroup;
use scale_core::{CancelToken, GaussNewtonMinimizer, PipelineStage, ReflectionTable, ScalingError, run_scaling};
use std::path::PathBuf;
use tracing::info;

#[derive(clap::Args)]
pub(super) struct ScaleArgs {
    /// Input reflection table (JSON, named columns)
    #[arg(long)]
    input: PathBuf,

    /// Output path for the scaled reflection table
    #[arg(long)]
    output: PathBuf,

    /// Scaling options file; built-in defaults apply when omitted
    #[arg(long)]
    options: Option<PathBuf>,

    /// Also write the run summary as JSON
    #[arg(long)]
    summary: Option<PathBuf>,

    #[command(flatten)]
    logging: LoggingFlags,
}

#[derive(clap::Args)]
pub(super) struct CheckArgs {
    /// Scaling options file
    #[arg(long)]
    options: PathBuf,

    #[command(flatten)]
    logging: LoggingFlags,
}

#[derive(clap::Args, Default)]
pub(super) struct LoggingFlags {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

pub(super) fn run_scale_command(args: ScaleArgs) -> Result<i32, CliError> {
    init_tracing(args.logging.verbose);

    let options = load_options(args.options.as_deref())?;
    let table = ReflectionTable::read_json(&args.input)?;
    info!(input = %args.input.display(), columns = table.column_names().count(), "loaded reflection table");
    let minimizer = GaussNewtonMinimizer::new(options.minimizer);
    let run = run_scaling(&table, &options, &minimizer, &CancelToken::new())?;

    run.table.write_json(&args.output)?;
    info!(output = %args.output.display(), "wrote scaled reflection table");
    let summary = run.summary();
    if let Some(path) = &args.summary {
        write_summary(path, &summary)?;
    }

    print!("{}", render_human_summary(&summary));
    println!("wrote {}", args.output.display());
    Ok(0)
}

pub(super) fn run_check_command(args: CheckArgs) -> Result<i32, CliError> {
    init_tracing(args.logging.verbose);

    let options = load_options(Some(&args.options))?;
    options.validate()?;
    let symmetry = LaueGroup::from_spec(&options.symmetry).map_err(|error| {
        ScalingError::configuration(PipelineStage::Config, "SYMMETRY.INVALID", error.to_string())
    })?;

    let families: Vec<String> = options
        .parameterization_kind()
        .families()
        .iter()
        .map(ToString::to_string)
        .collect();
    println!(
        "options ok: families [{}], {:?} combination, {} symmetry operators",
        families.join(", "),
        options.parameterization,
        symmetry.order()
    );
    Ok(0)
}
