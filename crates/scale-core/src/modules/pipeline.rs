//! End-to-end scaling run: load, filter and sort, bin, refine on the
//! positive-weight subset, rescale, reject outliers, report, hand back.

use super::context::ScalingContext;
use super::filtering::{FilterOptions, FilterSortOutput, FilterSummary, filter_and_sort};
use super::outliers::{OutlierOptions, OutlierReport, reject_outliers};
use super::parameterization::ScaleModel;
use super::quality::{QualityReport, quality_report};
use super::refinement::{Minimizer, MinimizerReport, refine};
use super::symmetry::LaueGroup;
use super::table::ReflectionTable;
use super::weighting::WeightingOptions;
use crate::common::cancel::CancelToken;
use crate::common::config::ScalingOptions;
use crate::domain::{PipelineStage, ScalingError, ScalingResult};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub filter: FilterSummary,
    pub parameters: usize,
    pub refinement: MinimizerReport,
    pub outliers: OutlierReport,
    pub quality: QualityReport,
}

#[derive(Debug, Clone)]
pub struct ScalingRun {
    /// Input rows that survived, in canonical order, with scaling columns.
    pub table: ReflectionTable,
    pub context: ScalingContext,
    pub filter: FilterSummary,
    pub refinement: MinimizerReport,
    pub outliers: OutlierReport,
    pub quality: QualityReport,
}

impl ScalingRun {
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            filter: self.filter,
            parameters: self.context.model().n_params(),
            refinement: self.refinement,
            outliers: self.outliers.clone(),
            quality: self.quality,
        }
    }
}

pub fn run_scaling(
    table: &ReflectionTable,
    options: &ScalingOptions,
    minimizer: &dyn Minimizer,
    cancel: &CancelToken,
) -> ScalingResult<ScalingRun> {
    options.validate()?;
    let symmetry = LaueGroup::from_spec(&options.symmetry).map_err(|error| {
        ScalingError::configuration(PipelineStage::Config, "SYMMETRY.INVALID", error.to_string())
    })?;
    info!(operators = symmetry.order(), "symmetry ready");

    cancel.check(PipelineStage::Load)?;
    let raw = table.to_reflections(options.integration_method)?;
    info!(
        reflections = raw.len(),
        method = ?options.integration_method.resolved(),
        "loaded reflections"
    );

    cancel.check(PipelineStage::Filter)?;
    let FilterSortOutput {
        filtered,
        sorted,
        groups,
        summary: filter,
    } = filter_and_sort(raw, FilterOptions::from_options(options), &symmetry)?;
    if sorted.is_empty() {
        return Err(ScalingError::data_integrity(
            PipelineStage::Filter,
            "DATA.EMPTY",
            format!("no reflections survived filtering ({} read)", filter.input),
        ));
    }
    info!(groups = groups.n_groups(), "grouped reflections");

    let model = ScaleModel::build(
        &options.parameterization_kind(),
        options.parameterization,
        &filtered,
        &sorted,
    )?;
    drop(filtered);
    cancel.check(PipelineStage::Parameterization)?;

    let mut context = ScalingContext::new(sorted, model, WeightingOptions::from_options(options))?;
    let mut scaling_subset = context.for_scaling()?;
    if scaling_subset.is_empty() {
        return Err(ScalingError::data_integrity(
            PipelineStage::Weighting,
            "DATA.NO_POSITIVE_WEIGHT",
            "every reflection was excluded from scaling by the weighting cutoffs",
        ));
    }
    info!(
        reflections = scaling_subset.len(),
        groups = scaling_subset.groups().n_groups(),
        "selected reflections for scaling"
    );

    let refinement = refine(&mut scaling_subset, minimizer, cancel)?;
    context.adopt_parameters(&scaling_subset.parameters())?;
    context.normalise_overall_scale();

    let outliers = reject_outliers(&mut context, OutlierOptions::from_options(options), cancel)?;
    let quality = quality_report(&context);
    info!(
        reflections = quality.n_reflections,
        groups = quality.n_groups,
        r_meas = ?quality.r_meas,
        r_pim = ?quality.r_pim,
        "scaling finished"
    );

    cancel.check(PipelineStage::Save)?;
    let output = table.with_scaling_results(context.reflections())?;

    Ok(ScalingRun {
        table: output,
        context,
        filter,
        refinement,
        outliers,
        quality,
    })
}
