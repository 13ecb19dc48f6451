//! Merging statistics over grouped, scaled data, and consistent synthetic
//! intensities for exercising the refinement.

use super::context::ScalingContext;
use super::grouping::GroupTable;
use super::refinement::RefinementTarget;
use crate::domain::Reflection;
use crate::numerics::{mean, stable_sum};
use rayon::prelude::*;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub n_reflections: usize,
    pub n_groups: usize,
    pub mean_multiplicity: f64,
    /// `None` when no group has two or more members.
    pub r_meas: Option<f64>,
    pub r_pim: Option<f64>,
    pub weighted_residual: f64,
}

/// `(sqrt(n/(n-1)) * sum|dev|, sqrt(1/(n-1)) * sum|dev|, sum I)` for one group
/// of scaled intensities.
fn group_terms(scaled: &[f64]) -> Option<(f64, f64, f64)> {
    let n = scaled.len();
    if n < 2 {
        return None;
    }
    let center = mean(scaled)?;
    let deviations: Vec<f64> = scaled.iter().map(|value| (value - center).abs()).collect();
    let spread = stable_sum(&deviations);
    let n = n as f64;
    Some((
        (n / (n - 1.0)).sqrt() * spread,
        (1.0 / (n - 1.0)).sqrt() * spread,
        stable_sum(scaled),
    ))
}

/// Multiplicity-corrected `R_meas` and precision-indicating `R_pim`.
/// Singleton groups contribute to neither numerator nor denominator.
pub fn merging_statistics(reflections: &[Reflection], groups: &GroupTable) -> (Option<f64>, Option<f64>) {
    let terms: Vec<(f64, f64, f64)> = (0..groups.n_groups())
        .into_par_iter()
        .filter_map(|group| {
            let scaled: Vec<f64> = reflections[groups.range(group)]
                .iter()
                .map(Reflection::scaled_intensity)
                .collect();
            group_terms(&scaled)
        })
        .collect();

    let meas: Vec<f64> = terms.iter().map(|term| term.0).collect();
    let pim: Vec<f64> = terms.iter().map(|term| term.1).collect();
    let total: Vec<f64> = terms.iter().map(|term| term.2).collect();
    let denominator = stable_sum(&total);
    if terms.is_empty() || !(denominator > 0.0) {
        return (None, None);
    }
    (
        Some(stable_sum(&meas) / denominator),
        Some(stable_sum(&pim) / denominator),
    )
}

pub fn quality_report(context: &ScalingContext) -> QualityReport {
    let n_groups = context.groups().n_groups();
    let (r_meas, r_pim) = merging_statistics(context.reflections(), context.groups());
    QualityReport {
        n_reflections: context.len(),
        n_groups,
        mean_multiplicity: if n_groups == 0 {
            0.0
        } else {
            context.len() as f64 / n_groups as f64
        },
        r_meas,
        r_pim,
        weighted_residual: context.evaluate_target().weighted_sum_of_squares(),
    }
}

/// Copies of the context's reflections with `intensity = Ih * g`, i.e. data
/// the current model fits exactly.
pub fn synthesize_intensities(context: &ScalingContext) -> Vec<Reflection> {
    context
        .reflections()
        .iter()
        .map(|reflection| Reflection {
            intensity: reflection.ih * reflection.inverse_scale_factor,
            ..reflection.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{merging_statistics, quality_report, synthesize_intensities};
    use crate::domain::{CombinationMode, CorrectionFamilyKind, MillerIndex, PipelineStage, Reflection};
    use crate::modules::binning::BinAssignment;
    use crate::modules::context::ScalingContext;
    use crate::modules::grouping::GroupTable;
    use crate::modules::parameterization::{CorrectionFamily, ScaleModel};
    use crate::modules::weighting::WeightingOptions;

    fn observation(l: i32, intensity: f64, g: f64) -> Reflection {
        let mut reflection = Reflection::new(MillerIndex::new(0, 0, l), intensity, 4.0, [0.0; 3], 2.0);
        reflection.inverse_scale_factor = g;
        reflection
    }

    #[test]
    fn merging_statistics_follow_multiplicity_corrected_definitions() {
        let reflections = vec![
            observation(1, 10.0, 1.0),
            observation(1, 24.0, 2.0),
            observation(2, 50.0, 1.0),
        ];
        let groups = GroupTable::from_reflections(&reflections).expect("sorted input");

        let (r_meas, r_pim) = merging_statistics(&reflections, &groups);
        // Scaled intensities 10 and 12: sum|dev| = 2, sum I = 22.
        let r_meas = r_meas.expect("one multi-member group");
        let r_pim = r_pim.expect("one multi-member group");
        assert!((r_meas - 2.0_f64.sqrt() * 2.0 / 22.0).abs() < 1.0e-12);
        assert!((r_pim - 2.0 / 22.0).abs() < 1.0e-12);
    }

    #[test]
    fn singleton_only_data_has_no_merging_statistics() {
        let reflections = vec![observation(1, 10.0, 1.0), observation(2, 20.0, 1.0)];
        let groups = GroupTable::from_reflections(&reflections).expect("sorted input");
        assert_eq!(merging_statistics(&reflections, &groups), (None, None));
    }

    #[test]
    fn synthesized_intensities_fit_the_model_exactly() {
        let reflections = vec![
            observation(1, 10.0, 1.0),
            observation(1, 30.0, 1.0),
            observation(2, 7.0, 1.0),
            observation(2, 9.0, 1.0),
        ];
        let mode = CombinationMode::Linear;
        let bins = BinAssignment::complete(
            vec![Some(0), Some(1), Some(0), Some(1)],
            2,
            PipelineStage::Bin(CorrectionFamilyKind::Scale),
        )
        .expect("complete assignment");
        let model = ScaleModel::new(
            mode,
            vec![CorrectionFamily::plain(CorrectionFamilyKind::Scale, bins, mode)],
        );
        let options = WeightingOptions {
            intensity_over_sigma_min: f64::NEG_INFINITY,
            resolution_min: 0.0,
        };
        let mut context =
            ScalingContext::new(reflections, model, options).expect("context should build");
        context
            .adopt_parameters(&[1.0, 1.5])
            .expect("parameter count matches");

        let synthetic = synthesize_intensities(&context);
        let refit = ScalingContext::new(synthetic, context.model().clone(), options)
            .expect("synthetic context should build");
        let report = quality_report(&refit);
        assert_eq!(report.n_groups, 2);
        assert_eq!(report.mean_multiplicity, 2.0);
        assert!(report.weighted_residual < 1.0e-18);
        assert!(report.r_meas.expect("multi-member groups") < 1.0e-12);
    }
}
