//! Binning schemes used by the correction families.
//!
//! Boundaries are always derived from the filtered reflections; assignments
//! are made on the sorted array.

use super::{BinAssignment, EqualWidthBinning};
use crate::common::constants::{BIN_EDGE_EPSILON, RADIAL_BAND_COUNT, RADIAL_BAND_FRACTIONS};
use crate::domain::{CorrectionFamilyKind, PipelineStage, Reflection, ScalingError, ScalingResult};
use std::f64::consts::TAU;

fn axis(
    filtered: &[Reflection],
    sorted: &[Reflection],
    n_bins: usize,
    stage: PipelineStage,
    value: impl Fn(&Reflection) -> f64,
) -> ScalingResult<BinAssignment> {
    let range_values: Vec<f64> = filtered.iter().map(&value).collect();
    let binning = EqualWidthBinning::from_values(&range_values, n_bins, stage)?;
    let target_values: Vec<f64> = sorted.iter().map(&value).collect();
    BinAssignment::complete(binning.assign(&target_values), n_bins, stage)
}

fn inverse_d_squared(reflection: &Reflection) -> f64 {
    1.0 / (reflection.d * reflection.d)
}

/// 1-D binning over acquisition time `z`.
pub fn time_bins(
    filtered: &[Reflection],
    sorted: &[Reflection],
    n_bins: usize,
    family: CorrectionFamilyKind,
) -> ScalingResult<BinAssignment> {
    axis(filtered, sorted, n_bins, PipelineStage::Bin(family), |r| r.z)
}

/// Resolution bins are equal-width in `1/d^2`; id = `resolution + time * n_resolution`.
pub fn resolution_time_bins(
    filtered: &[Reflection],
    sorted: &[Reflection],
    n_resolution_bins: usize,
    n_time_bins: usize,
    family: CorrectionFamilyKind,
) -> ScalingResult<BinAssignment> {
    let stage = PipelineStage::Bin(family);
    let resolution = axis(filtered, sorted, n_resolution_bins, stage, inverse_d_squared)?;
    let time = axis(filtered, sorted, n_time_bins, stage, |r| r.z)?;
    Ok(resolution.combine(&time))
}

/// Square `n x n` grid over detector position; id = `x + y * n`.
pub fn detector_bins(
    filtered: &[Reflection],
    sorted: &[Reflection],
    n_bins_per_axis: usize,
    family: CorrectionFamilyKind,
) -> ScalingResult<BinAssignment> {
    let stage = PipelineStage::Bin(family);
    let x = axis(filtered, sorted, n_bins_per_axis, stage, |r| r.x)?;
    let y = axis(filtered, sorted, n_bins_per_axis, stage, |r| r.y)?;
    Ok(x.combine(&y))
}

/// Polar layout around the beam center: three radial bands crossed with
/// equal angular sectors measured from +y towards +x.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialAngularLayout {
    center: [f64; 2],
    radial: EqualWidthBinning,
    angular: EqualWidthBinning,
}

impl RadialAngularLayout {
    pub fn from_filtered(
        filtered: &[Reflection],
        n_angular_sectors: usize,
        beam_center: Option<[f64; 2]>,
        family: CorrectionFamilyKind,
    ) -> ScalingResult<Self> {
        let stage = PipelineStage::Bin(family);
        if filtered.is_empty() {
            return Err(ScalingError::data_integrity(
                stage,
                "DATA.EMPTY",
                "no reflections available to derive the detector layout",
            ));
        }
        if n_angular_sectors == 0 {
            return Err(ScalingError::configuration(
                stage,
                "CONFIG.BIN_COUNT",
                "angular sector count must be at least 1",
            ));
        }

        let (x_min, x_max) = extent(filtered.iter().map(|r| r.x));
        let (y_min, y_max) = extent(filtered.iter().map(|r| r.y));
        let center = beam_center.unwrap_or([(x_min + x_max) / 2.0, (y_min + y_max) / 2.0]);
        let half_width = (x_max - x_min) / 2.0;
        let half_height = (y_max - y_min) / 2.0;
        if !(half_height > 0.0) {
            return Err(ScalingError::data_integrity(
                stage,
                "DATA.DEGENERATE_RANGE",
                format!("detector y extent [{y_min}, {y_max}] is degenerate"),
            ));
        }

        let observed_radius = filtered
            .iter()
            .map(|r| (r.x - center[0]).hypot(r.y - center[1]))
            .fold(0.0_f64, f64::max);
        let outer = half_width.hypot(half_height).max(observed_radius);

        let mut radial_breakpoints = vec![0.0];
        radial_breakpoints.extend(RADIAL_BAND_FRACTIONS.iter().map(|f| f * half_height));
        radial_breakpoints.push(outer.max(half_height + BIN_EDGE_EPSILON));
        let radial = EqualWidthBinning::from_breakpoints(radial_breakpoints).ok_or_else(|| {
            ScalingError::internal(stage, "DATA.RADIAL_BANDS", "radial bands are not monotonic")
        })?;
        let angular = EqualWidthBinning::from_range(0.0, TAU, n_angular_sectors, stage)?;

        Ok(Self {
            center,
            radial,
            angular,
        })
    }

    pub fn center(&self) -> [f64; 2] {
        self.center
    }

    pub fn n_radial_bands(&self) -> usize {
        RADIAL_BAND_COUNT
    }

    pub fn n_angular_sectors(&self) -> usize {
        self.angular.n_bins()
    }

    pub fn n_cells(&self) -> usize {
        self.n_radial_bands() * self.n_angular_sectors()
    }

    /// Radius and angle in `[0, 2pi)` relative to the center.
    pub fn polar(&self, x: f64, y: f64) -> (f64, f64) {
        let x_rel = x - self.center[0];
        let y_rel = y - self.center[1];
        let mut angle = x_rel.atan2(y_rel);
        if angle < 0.0 {
            angle += TAU;
        }
        (x_rel.hypot(y_rel), angle)
    }

    /// Cell id `angle * n_radial + radial` for one position.
    pub fn cell_of(&self, x: f64, y: f64) -> Option<usize> {
        let (radius, angle) = self.polar(x, y);
        let band = self.radial.bin_of(radius)?;
        let sector = self.angular.bin_of(angle)?;
        Some(sector * self.n_radial_bands() + band)
    }

    pub fn assign(
        &self,
        sorted: &[Reflection],
        family: CorrectionFamilyKind,
    ) -> ScalingResult<BinAssignment> {
        let cells = sorted.iter().map(|r| self.cell_of(r.x, r.y)).collect();
        BinAssignment::complete(cells, self.n_cells(), PipelineStage::Bin(family))
    }
}

/// Radial/angular cells crossed with time bins:
/// `cell + time * n_angular * n_radial`.
pub fn absorption_bins(
    filtered: &[Reflection],
    sorted: &[Reflection],
    n_angular_sectors: usize,
    n_time_bins: usize,
    beam_center: Option<[f64; 2]>,
    family: CorrectionFamilyKind,
) -> ScalingResult<BinAssignment> {
    let layout = RadialAngularLayout::from_filtered(filtered, n_angular_sectors, beam_center, family)?;
    let cells = layout.assign(sorted, family)?;
    let time = time_bins(filtered, sorted, n_time_bins, family)?;
    Ok(cells.combine(&time))
}

fn extent(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), value| {
        (lo.min(value), hi.max(value))
    })
}
