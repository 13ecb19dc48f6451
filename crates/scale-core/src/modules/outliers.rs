//! Within-group outlier rejection.
//!
//! Pairs are tested symmetrically and both members go when either normalised
//! difference is too large. Larger groups compare each member with the
//! leave-one-out consensus of the others. The rejection rule for larger groups
//! keeps two quirks downstream results depend on: the tolerance test uses the
//! leave-one-out mean of the last member, and a lone positive offender is
//! rejected independently of the lone-negative / largest-offender branch.

use super::context::ScalingContext;
use super::grouping::GroupTable;
use crate::common::cancel::CancelToken;
use crate::common::config::ScalingOptions;
use crate::domain::{PipelineStage, Reflection, ScalingResult};
use crate::numerics::sample_standard_deviation;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierOptions {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl OutlierOptions {
    pub fn from_options(options: &ScalingOptions) -> Self {
        Self {
            tolerance: options.outlier_tolerance,
            max_iterations: options.outlier_max_iterations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutlierRound {
    pub round: usize,
    pub rejected: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct OutlierReport {
    pub rounds: Vec<OutlierRound>,
    /// True when a round rejected nothing before the iteration cap.
    pub converged: bool,
}

impl OutlierReport {
    pub fn total_rejected(&self) -> usize {
        self.rounds.iter().map(|round| round.rejected).sum()
    }
}

fn pair_is_discordant(a: &Reflection, b: &Reflection, tolerance: f64) -> bool {
    let g_a = a.inverse_scale_factor;
    let g_b = b.inverse_scale_factor;
    let delta_a = (a.intensity - g_a * b.intensity) / (a.variance + g_a * g_a * b.variance).sqrt();
    let delta_b = (b.intensity - g_b * a.intensity) / (b.variance + g_b * g_b * a.variance).sqrt();
    (delta_a / b.intensity).abs() > tolerance || (delta_b / a.intensity).abs() > tolerance
}

/// Normalised deviation of each member from the others' consensus, plus the
/// leave-one-out consensus of the last member. `None` below three members.
pub fn leave_one_out_deltas(members: &[Reflection]) -> Option<(Vec<f64>, f64)> {
    if members.len() < 3 {
        return None;
    }
    let mut deltas = Vec::with_capacity(members.len());
    let mut last_consensus = 0.0;

    for (index, member) in members.iter().enumerate() {
        let mut sum_g_i = 0.0;
        let mut sum_g_sq = 0.0;
        let mut corrected = Vec::with_capacity(members.len() - 1);
        for (other_index, other) in members.iter().enumerate() {
            if other_index == index {
                continue;
            }
            let g = other.inverse_scale_factor;
            sum_g_i += other.intensity * g / other.variance;
            sum_g_sq += g * g / other.variance;
            corrected.push(other.intensity / g);
        }
        if !(sum_g_sq > 0.0) {
            return None;
        }
        let consensus = sum_g_i / sum_g_sq;
        let spread = sample_standard_deviation(&corrected)?;
        let g = member.inverse_scale_factor;
        deltas.push((member.intensity - g * consensus) / (member.variance + (g * spread).powi(2)).sqrt());
        last_consensus = consensus;
    }

    Some((deltas, last_consensus))
}

/// Local indices of the members to reject from a group of three or more.
pub fn multi_member_rejections(members: &[Reflection], tolerance: f64) -> Vec<usize> {
    let Some((deltas, last_consensus)) = leave_one_out_deltas(members) else {
        return Vec::new();
    };
    // First index wins ties.
    let mut largest = 0;
    for (index, delta) in deltas.iter().enumerate() {
        if delta.abs() > deltas[largest].abs() {
            largest = index;
        }
    }
    let max_delta = deltas.get(largest).map_or(0.0, |delta| delta.abs());
    if !(max_delta / last_consensus > tolerance) {
        return Vec::new();
    }

    let positive: Vec<usize> = (0..deltas.len()).filter(|&i| deltas[i] > 0.0).collect();
    let negative: Vec<usize> = (0..deltas.len()).filter(|&i| deltas[i] < 0.0).collect();

    let mut rejected = Vec::new();
    if positive.len() == 1 {
        rejected.push(positive[0]);
    }
    if negative.len() == 1 {
        rejected.push(negative[0]);
    } else {
        rejected.push(largest);
    }
    rejected.sort_unstable();
    rejected.dedup();
    rejected
}

/// Keep-mask over the sorted reflections for one rejection round.
pub fn flag_outliers(reflections: &[Reflection], groups: &GroupTable, tolerance: f64) -> Vec<bool> {
    let rejected: Vec<usize> = (0..groups.n_groups())
        .into_par_iter()
        .flat_map_iter(|group| {
            let range = groups.range(group);
            let start = range.start;
            let members = &reflections[range];
            let local = match members.len() {
                2 if pair_is_discordant(&members[0], &members[1], tolerance) => vec![0, 1],
                n if n > 2 => multi_member_rejections(members, tolerance),
                _ => Vec::new(),
            };
            local.into_iter().map(move |index| start + index)
        })
        .collect();

    let mut keep = vec![true; reflections.len()];
    for index in rejected {
        keep[index] = false;
    }
    keep
}

/// Rejects outliers until a round rejects nothing or the round cap is hit.
/// Each round regroups, reweights and recomputes scale factors and `Ih`.
pub fn reject_outliers(
    context: &mut ScalingContext,
    options: OutlierOptions,
    cancel: &CancelToken,
) -> ScalingResult<OutlierReport> {
    let mut report = OutlierReport::default();

    for round in 1..=options.max_iterations {
        cancel.check(PipelineStage::Outliers)?;
        let keep = flag_outliers(context.reflections(), context.groups(), options.tolerance);
        let rejected = keep.iter().filter(|&&kept| !kept).count();
        if rejected > 0 {
            context.retain(&keep)?;
        }

        info!(round, rejected, remaining = context.len(), "outlier rejection round");
        report.rounds.push(OutlierRound {
            round,
            rejected,
            remaining: context.len(),
        });

        if rejected == 0 {
            report.converged = true;
            break;
        }
        debug!(groups = context.groups().n_groups(), "regrouped after rejection");
    }

    if !report.converged && options.max_iterations > 0 {
        warn!(
            max_iterations = options.max_iterations,
            total_rejected = report.total_rejected(),
            "outlier rejection stopped at the iteration cap"
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::{flag_outliers, leave_one_out_deltas, multi_member_rejections};
    use crate::domain::{MillerIndex, Reflection};
    use crate::modules::grouping::GroupTable;

    fn member(intensity: f64, variance: f64) -> Reflection {
        Reflection::new(MillerIndex::new(1, 2, 3), intensity, variance, [0.0; 3], 2.0)
    }

    #[test]
    fn gross_outlier_in_a_group_of_four_is_rejected() {
        let members = [
            member(100.0, 25.0),
            member(98.0, 24.0),
            member(5.0, 1.0),
            member(102.0, 26.0),
        ];
        let (deltas, last_consensus) =
            leave_one_out_deltas(&members).expect("deltas should be defined");
        assert!((deltas[0] - 1.596).abs() < 1.0e-2);
        assert!((deltas[2] + 42.46).abs() < 1.0e-1);
        assert!((last_consensus - 12.095).abs() < 1.0e-2);

        assert_eq!(multi_member_rejections(&members, 0.3), vec![2]);
    }

    #[test]
    fn consistent_group_is_kept() {
        let members = [member(100.0, 25.0), member(101.0, 25.0), member(99.0, 25.0)];
        assert!(multi_member_rejections(&members, 0.3).is_empty());
    }

    #[test]
    fn lone_positive_offender_is_rejected_once() {
        // One positive delta and two negatives: the positive member is
        // rejected, and the largest-offender branch picks the same member.
        let members = [
            member(10.0, 1.0),
            member(10.5, 1.0),
            member(40.0, 1.0),
        ];
        let (deltas, _) = leave_one_out_deltas(&members).expect("deltas should be defined");
        assert_eq!(deltas.iter().filter(|delta| **delta > 0.0).count(), 1);
        assert_eq!(deltas.iter().filter(|delta| **delta < 0.0).count(), 2);

        let rejected = multi_member_rejections(&members, 0.01);
        assert_eq!(rejected, vec![2]);
    }

    #[test]
    fn lone_positive_and_largest_negative_are_both_rejected() {
        let members = [member(30.0, 1.0), member(20.0, 1.0), member(10.0, 4.0)];
        let (deltas, last_consensus) =
            leave_one_out_deltas(&members).expect("deltas should be defined");
        assert!(deltas[0] > 0.0);
        assert!(deltas[1] < 0.0 && deltas[2] < 0.0);
        assert!(deltas[2].abs() > deltas[0].abs());
        assert_eq!(last_consensus, 25.0);

        assert_eq!(multi_member_rejections(&members, 0.01), vec![0, 2]);
    }

    #[test]
    fn tied_offenders_reject_the_first_index_only() {
        let members = [
            member(0.0, 1.0),
            member(0.0, 1.0),
            member(10.0, 1.0),
            member(10.0, 1.0),
            member(10.0, 1.0),
        ];
        let (deltas, _) = leave_one_out_deltas(&members).expect("deltas should be defined");
        assert_eq!(deltas[0], deltas[1]);
        assert!(deltas[0] < 0.0);
        assert!(deltas[2..].iter().all(|delta| *delta > 0.0 && delta.abs() < deltas[0].abs()));

        assert_eq!(multi_member_rejections(&members, 0.01), vec![0]);
    }

    #[test]
    fn lone_negative_offender_is_rejected_alone() {
        let members = [
            member(100.0, 1.0),
            member(101.0, 1.0),
            member(130.0, 1.0),
            member(5.0, 1.0),
        ];
        assert_eq!(multi_member_rejections(&members, 0.01), vec![3]);
    }

    #[test]
    fn deltas_need_at_least_three_members() {
        assert_eq!(leave_one_out_deltas(&[]), None);
        assert_eq!(leave_one_out_deltas(&[member(1.0, 1.0), member(2.0, 1.0)]), None);
        assert!(multi_member_rejections(&[member(1.0, 1.0), member(50.0, 1.0)], 0.01).is_empty());
    }

    #[test]
    fn discordant_pair_loses_both_members() {
        let mut reflections = vec![member(100.0, 10.0), member(10.0, 10.0), member(50.0, 5.0)];
        reflections[2].miller_index = MillerIndex::new(3, 3, 3);
        reflections[2].asu_miller_index = MillerIndex::new(3, 3, 3);
        let groups = GroupTable::from_reflections(&reflections).expect("sorted input");

        let keep = flag_outliers(&reflections, &groups, 0.5);
        assert_eq!(keep, vec![false, false, true]);

        let keep = flag_outliers(&reflections, &groups, 1.0e6);
        assert_eq!(keep, vec![true, true, true]);
    }
}
