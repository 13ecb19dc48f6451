use super::grouping::GroupTable;
use crate::domain::Reflection;
use rayon::prelude::*;

/// Weighted consensus intensity per group:
/// `sum(w g I) / sum(w g^2)`, or `0.0` when `sum(w g^2)` is not positive.
pub fn group_intensities(
    groups: &GroupTable,
    intensities: &[f64],
    scale_factors: &[f64],
    weights: &[f64],
) -> Vec<f64> {
    let (w_g, w_g_i): (Vec<f64>, Vec<f64>) = intensities
        .par_iter()
        .zip(scale_factors)
        .zip(weights)
        .map(|((&intensity, &g), &weight)| (weight * g * g, weight * g * intensity))
        .unzip();

    let sum_w_g = groups.segment_sum(&w_g);
    let sum_w_g_i = groups.segment_sum(&w_g_i);
    sum_w_g
        .iter()
        .zip(&sum_w_g_i)
        .map(|(&denominator, &numerator)| {
            if denominator > 0.0 {
                numerator / denominator
            } else {
                0.0
            }
        })
        .collect()
}

/// Recomputes `Ih` from the reflections' current inverse scale factors and
/// writes it onto every member of each group.
pub fn update_ih(reflections: &mut [Reflection], groups: &GroupTable, weights: &[f64]) {
    let intensities: Vec<f64> = reflections.iter().map(|r| r.intensity).collect();
    let scale_factors: Vec<f64> = reflections.iter().map(|r| r.inverse_scale_factor).collect();
    let per_group = group_intensities(groups, &intensities, &scale_factors, weights);
    for (reflection, ih) in reflections.iter_mut().zip(groups.broadcast(&per_group)) {
        reflection.ih = ih;
    }
}
