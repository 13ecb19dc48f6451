use super::CliError;
use anyhow::Context;
use scale_core::modules::pipeline::RunSummary;
use scale_core::{ScalingError, ScalingOptions, load_scaling_options};
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Stderr subscriber honouring `RUST_LOG`; safe to call more than once.
pub(super) fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A subscriber installed earlier in the process wins.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

pub(super) fn load_options(path: Option<&Path>) -> Result<ScalingOptions, CliError> {
    match path {
        Some(path) => load_scaling_options(path)
            .map_err(|error| CliError::Compute(ScalingError::from(error))),
        None => Ok(ScalingOptions::default()),
    }
}

pub(super) fn write_summary(path: &Path, summary: &RunSummary) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(summary)
        .context("failed to serialize run summary")?;
    fs::write(path, rendered)
        .with_context(|| format!("failed to write run summary '{}'", path.display()))?;
    Ok(())
}

fn format_statistic(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |value| format!("{value:.4}"))
}

pub(super) fn render_human_summary(summary: &RunSummary) -> String {
    let refinement = &summary.refinement;
    let quality = &summary.quality;
    let mut rendered = String::new();
    rendered.push_str(&format!(
        "filter: {} of {} reflections retained\n",
        summary.filter.retained, summary.filter.input
    ));
    rendered.push_str(&format!(
        "refinement: {} parameters, {} iterations, objective {:.6e} -> {:.6e}{}\n",
        summary.parameters,
        refinement.iterations,
        refinement.initial_objective,
        refinement.final_objective,
        if refinement.converged {
            ""
        } else {
            " (iteration cap)"
        }
    ));
    rendered.push_str(&format!(
        "outliers: {} rejected in {} rounds\n",
        summary.outliers.total_rejected(),
        summary.outliers.rounds.len()
    ));
    rendered.push_str(&format!(
        "quality: {} reflections, {} groups, multiplicity {:.2}, R_meas {}, R_pim {}\n",
        quality.n_reflections,
        quality.n_groups,
        quality.mean_multiplicity,
        format_statistic(quality.r_meas),
        format_statistic(quality.r_pim)
    ));
    rendered
}
