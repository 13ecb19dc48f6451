//! Equal-width binning and the bin assignments built on it.

pub mod schemes;

pub use schemes::{
    RadialAngularLayout, absorption_bins, detector_bins, resolution_time_bins, time_bins,
};

use crate::common::constants::BIN_EDGE_EPSILON;
use crate::domain::{PipelineStage, ScalingError, ScalingResult};
use rayon::prelude::*;

/// `n + 1` monotonic breakpoints; bin `i` holds `(breakpoints[i], breakpoints[i + 1]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct EqualWidthBinning {
    breakpoints: Vec<f64>,
}

impl EqualWidthBinning {
    /// Spans the finite range of `values`. Empty, non-finite or zero-width
    /// ranges are data-integrity errors attributed to `stage`.
    pub fn from_values(values: &[f64], n_bins: usize, stage: PipelineStage) -> ScalingResult<Self> {
        if values.is_empty() {
            return Err(ScalingError::data_integrity(
                stage,
                "DATA.EMPTY",
                "no reflections available to derive bin boundaries",
            ));
        }
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &value| {
                (lo.min(value), hi.max(value))
            });
        Self::from_range(min, max, n_bins, stage)
    }

    pub fn from_range(
        min: f64,
        max: f64,
        n_bins: usize,
        stage: PipelineStage,
    ) -> ScalingResult<Self> {
        if n_bins == 0 {
            return Err(ScalingError::configuration(
                stage,
                "CONFIG.BIN_COUNT",
                "bin count must be at least 1",
            ));
        }
        if !(min.is_finite() && max.is_finite()) || min >= max {
            return Err(ScalingError::data_integrity(
                stage,
                "DATA.DEGENERATE_RANGE",
                format!("cannot bin over degenerate range [{min}, {max}]"),
            ));
        }

        let width = (max - min) / n_bins as f64;
        let mut breakpoints: Vec<f64> = (0..=n_bins)
            .map(|index| min + index as f64 * width)
            .collect();
        breakpoints[0] = min - BIN_EDGE_EPSILON;
        breakpoints[n_bins] = max + BIN_EDGE_EPSILON;
        Ok(Self { breakpoints })
    }

    /// Uses explicit breakpoints, widening the two extremes.
    pub fn from_breakpoints(mut breakpoints: Vec<f64>) -> Option<Self> {
        if breakpoints.len() < 2 || breakpoints.windows(2).any(|pair| !(pair[0] < pair[1])) {
            return None;
        }
        let last = breakpoints.len() - 1;
        breakpoints[0] -= BIN_EDGE_EPSILON;
        breakpoints[last] += BIN_EDGE_EPSILON;
        Some(Self { breakpoints })
    }

    pub fn n_bins(&self) -> usize {
        self.breakpoints.len() - 1
    }

    pub fn breakpoints(&self) -> &[f64] {
        &self.breakpoints
    }

    pub fn bin_of(&self, value: f64) -> Option<usize> {
        let upper = self.breakpoints.partition_point(|&breakpoint| breakpoint < value);
        (1..=self.n_bins()).contains(&upper).then(|| upper - 1)
    }

    pub fn assign(&self, values: &[f64]) -> Vec<Option<usize>> {
        values.par_iter().map(|&value| self.bin_of(value)).collect()
    }
}

/// Bin id per reflection, every id in `[0, n_bins)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinAssignment {
    ids: Vec<usize>,
    n_bins: usize,
}

impl BinAssignment {
    /// Fails with `DATA.UNBINNED` if any reflection was left unassigned.
    pub fn complete(
        ids: Vec<Option<usize>>,
        n_bins: usize,
        stage: PipelineStage,
    ) -> ScalingResult<Self> {
        let unassigned = ids.iter().filter(|id| id.is_none()).count();
        if unassigned > 0 {
            return Err(ScalingError::data_integrity(
                stage,
                "DATA.UNBINNED",
                format!("unable to bin data: {unassigned} reflections left unassigned"),
            ));
        }
        let ids: Vec<usize> = ids.into_iter().flatten().collect();
        if let Some(&out_of_range) = ids.iter().find(|&&id| id >= n_bins) {
            return Err(ScalingError::internal(
                stage,
                "DATA.BIN_OUT_OF_RANGE",
                format!("bin id {out_of_range} exceeds bin count {n_bins}"),
            ));
        }
        Ok(Self { ids, n_bins })
    }

    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_bins];
        for &id in &self.ids {
            counts[id] += 1;
        }
        counts
    }

    pub fn retain(&mut self, mask: &[bool]) {
        let ids = std::mem::take(&mut self.ids);
        self.ids = super::selection::retain_by_mask(ids, mask);
    }

    /// Row-major combination `self + other * self.n_bins`.
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            ids: self
                .ids
                .iter()
                .zip(&other.ids)
                .map(|(&inner, &outer)| inner + outer * self.n_bins)
                .collect(),
            n_bins: self.n_bins * other.n_bins,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BinAssignment, EqualWidthBinning};
    use crate::domain::{CorrectionFamilyKind, PipelineStage, ScalingErrorCategory};

    const STAGE: PipelineStage = PipelineStage::Bin(CorrectionFamilyKind::Scale);

    #[test]
    fn extremes_land_in_the_outer_bins() {
        let binning =
            EqualWidthBinning::from_values(&[0.0, 2.5, 5.0, 10.0], 4, STAGE).expect("binning");
        assert_eq!(binning.n_bins(), 4);
        assert_eq!(binning.bin_of(0.0), Some(0));
        assert_eq!(binning.bin_of(2.5), Some(0));
        assert_eq!(binning.bin_of(2.6), Some(1));
        assert_eq!(binning.bin_of(10.0), Some(3));
        assert_eq!(binning.bin_of(10.1), None);
        assert_eq!(binning.bin_of(f64::NAN), None);
        assert_eq!(
            binning.assign(&[0.0, 5.0, 7.5, 10.0]),
            vec![Some(0), Some(1), Some(2), Some(3)]
        );
    }

    #[test]
    fn degenerate_and_empty_ranges_are_fatal() {
        let error = EqualWidthBinning::from_values(&[3.0, 3.0], 2, STAGE)
            .expect_err("zero-width range should fail");
        assert_eq!(error.category(), ScalingErrorCategory::DataIntegrityError);
        assert_eq!(error.placeholder(), "DATA.DEGENERATE_RANGE");
        assert_eq!(error.stage().to_string(), "bin:scale");

        EqualWidthBinning::from_values(&[], 2, STAGE).expect_err("empty input should fail");
        let error = EqualWidthBinning::from_values(&[1.0, 2.0], 0, STAGE)
            .expect_err("zero bins should fail");
        assert_eq!(error.category(), ScalingErrorCategory::InputValidationError);
    }

    #[test]
    fn unassigned_reflections_fail_the_assignment() {
        let error = BinAssignment::complete(vec![Some(0), None, Some(1)], 2, STAGE)
            .expect_err("unassigned reflection should fail");
        assert_eq!(error.placeholder(), "DATA.UNBINNED");

        let assignment =
            BinAssignment::complete(vec![Some(0), Some(1), Some(1)], 2, STAGE).expect("complete");
        assert_eq!(assignment.counts(), vec![1, 2]);
    }

    #[test]
    fn combine_is_row_major() {
        let inner = BinAssignment::complete(vec![Some(0), Some(2), Some(1)], 3, STAGE)
            .expect("inner assignment");
        let outer = BinAssignment::complete(vec![Some(1), Some(0), Some(1)], 2, STAGE)
            .expect("outer assignment");
        let combined = inner.combine(&outer);
        assert_eq!(combined.ids(), &[3, 2, 4]);
        assert_eq!(combined.n_bins(), 6);
    }
}
