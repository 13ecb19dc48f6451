use super::grouping::GroupTable;
use super::selection::select_in_range;
use super::symmetry::SymmetryMapper;
use crate::common::config::ScalingOptions;
use crate::domain::{PipelineStage, Reflection, ScalingError, ScalingResult};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterOptions {
    pub sanity_floor: f64,
    /// Reflections with `lower < d <= upper` are discarded.
    pub resolution_screen: (f64, f64),
}

impl FilterOptions {
    pub fn from_options(options: &ScalingOptions) -> Self {
        Self {
            sanity_floor: options.sanity_floor,
            resolution_screen: (options.resolution_screen.lower, options.resolution_screen.upper),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSummary {
    pub input: usize,
    pub non_positive_variance: usize,
    pub below_sanity_floor: usize,
    pub inside_resolution_screen: usize,
    pub retained: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterSortOutput {
    /// Surviving reflections in input order, already canonicalized.
    pub filtered: Vec<Reflection>,
    pub sorted: Vec<Reflection>,
    pub groups: GroupTable,
    pub summary: FilterSummary,
}

pub fn filter_reflections(
    raw: Vec<Reflection>,
    options: FilterOptions,
) -> (Vec<Reflection>, FilterSummary) {
    let mut summary = FilterSummary {
        input: raw.len(),
        ..FilterSummary::default()
    };
    let (screen_lower, screen_upper) = options.resolution_screen;
    let resolution: Vec<f64> = raw.iter().map(|reflection| reflection.d).collect();
    let screened = select_in_range(&resolution, screen_lower, screen_upper);

    let filtered: Vec<Reflection> = raw
        .into_iter()
        .zip(screened)
        .filter(|(reflection, inside_screen)| {
            if !(reflection.variance > 0.0) {
                summary.non_positive_variance += 1;
                return false;
            }
            if !(reflection.intensity_over_sigma() > options.sanity_floor) {
                summary.below_sanity_floor += 1;
                return false;
            }
            if *inside_screen {
                summary.inside_resolution_screen += 1;
                return false;
            }
            true
        })
        .map(|(reflection, _)| reflection)
        .collect();

    summary.retained = filtered.len();
    (filtered, summary)
}

pub fn canonicalize_reflections(
    reflections: &mut [Reflection],
    symmetry: &dyn SymmetryMapper,
) -> ScalingResult<()> {
    for reflection in reflections.iter_mut() {
        reflection.asu_miller_index = symmetry
            .canonicalize(reflection.miller_index)
            .map_err(|error| {
                ScalingError::configuration(
                    PipelineStage::Canonicalize,
                    "SYMMETRY.CANONICALIZE",
                    format!(
                        "cannot canonicalize {}: {error}",
                        reflection.miller_index
                    ),
                )
            })?;
    }
    Ok(())
}

/// Filter, canonicalize, stable-sort by canonical index, then group.
pub fn filter_and_sort(
    raw: Vec<Reflection>,
    options: FilterOptions,
    symmetry: &dyn SymmetryMapper,
) -> ScalingResult<FilterSortOutput> {
    let (mut filtered, summary) = filter_reflections(raw, options);
    info!(
        input = summary.input,
        retained = summary.retained,
        non_positive_variance = summary.non_positive_variance,
        below_sanity_floor = summary.below_sanity_floor,
        inside_resolution_screen = summary.inside_resolution_screen,
        "filtered reflections"
    );

    canonicalize_reflections(&mut filtered, symmetry)?;

    let mut sorted = filtered.clone();
    sorted.sort_by_key(|reflection| reflection.asu_miller_index);
    let groups = GroupTable::from_reflections(&sorted)?;
    debug!(groups = groups.n_groups(), "grouped sorted reflections");

    Ok(FilterSortOutput {
        filtered,
        sorted,
        groups,
        summary,
    })
}
