//! Correction families and their combination into inverse scale factors.

use super::binning::{BinAssignment, absorption_bins, detector_bins, resolution_time_bins, time_bins};
use crate::domain::{
    CombinationMode, CorrectionFamilyKind, ParameterizationKind, PipelineStage, Reflection,
    ScalingError, ScalingResult,
};
use crate::numerics::mean;
use rayon::prelude::*;
use tracing::{info, warn};

/// How one family's per-bin parameter turns into a per-reflection factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorForm {
    /// The parameter is the factor (or its log).
    Plain,
    /// Debye-Waller style `exp(B / (2 d^2))`.
    DebyeWaller,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionFamily {
    kind: CorrectionFamilyKind,
    form: FactorForm,
    bins: BinAssignment,
    factors: Vec<f64>,
    /// `1 / (2 d^2)` per reflection; empty for plain families.
    resolution_terms: Vec<f64>,
}

impl CorrectionFamily {
    pub fn plain(kind: CorrectionFamilyKind, bins: BinAssignment, mode: CombinationMode) -> Self {
        let factors = vec![mode.default_factor(); bins.n_bins()];
        Self {
            kind,
            form: FactorForm::Plain,
            bins,
            factors,
            resolution_terms: Vec::new(),
        }
    }

    pub fn debye_waller(
        kind: CorrectionFamilyKind,
        bins: BinAssignment,
        reflections: &[Reflection],
    ) -> Self {
        let factors = vec![0.0; bins.n_bins()];
        Self {
            kind,
            form: FactorForm::DebyeWaller,
            bins,
            factors,
            resolution_terms: reflections
                .iter()
                .map(|reflection| 1.0 / (2.0 * reflection.d * reflection.d))
                .collect(),
        }
    }

    pub fn kind(&self) -> CorrectionFamilyKind {
        self.kind
    }

    pub fn form(&self) -> FactorForm {
        self.form
    }

    pub fn bins(&self) -> &BinAssignment {
        &self.bins
    }

    pub fn factors(&self) -> &[f64] {
        &self.factors
    }

    pub fn n_bins(&self) -> usize {
        self.bins.n_bins()
    }

    fn resolution_term(&self, reflection: usize) -> f64 {
        match self.form {
            FactorForm::Plain => 1.0,
            FactorForm::DebyeWaller => self.resolution_terms[reflection],
        }
    }

    /// Additive contribution to `ln g` (log mode) or exponent of the
    /// Debye-Waller factor.
    fn exponent(&self, reflection: usize) -> f64 {
        self.factors[self.bins.ids()[reflection]] * self.resolution_term(reflection)
    }

    /// Multiplicative factor in linear mode.
    fn linear_value(&self, reflection: usize) -> f64 {
        match self.form {
            FactorForm::Plain => self.factors[self.bins.ids()[reflection]],
            FactorForm::DebyeWaller => self.exponent(reflection).exp(),
        }
    }

    fn retain(&mut self, mask: &[bool]) {
        self.bins.retain(mask);
        if self.form == FactorForm::DebyeWaller {
            let terms = std::mem::take(&mut self.resolution_terms);
            self.resolution_terms = super::selection::retain_by_mask(terms, mask);
        }
    }
}

/// Derivative of every inverse scale factor with respect to one family's
/// parameters. Entry `(bin, i)` is `values[i]` when `bin_ids[i] == bin`
/// and zero otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivativeBlock {
    pub kind: CorrectionFamilyKind,
    /// Index of this family's first parameter in the flat parameter vector.
    pub offset: usize,
    pub n_bins: usize,
    pub bin_ids: Vec<usize>,
    pub values: Vec<f64>,
}

impl DerivativeBlock {
    pub fn indicator(&self, bin: usize, reflection: usize) -> f64 {
        if self.bin_ids[reflection] == bin { 1.0 } else { 0.0 }
    }

    pub fn entry(&self, bin: usize, reflection: usize) -> f64 {
        self.indicator(bin, reflection) * self.values[reflection]
    }

    pub fn parameter_index(&self, reflection: usize) -> usize {
        self.offset + self.bin_ids[reflection]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasisEvaluation {
    pub scale_factors: Vec<f64>,
    pub derivatives: Vec<DerivativeBlock>,
}

/// Active correction families plus the rule that combines them.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleModel {
    mode: CombinationMode,
    families: Vec<CorrectionFamily>,
}

impl ScaleModel {
    pub fn new(mode: CombinationMode, families: Vec<CorrectionFamily>) -> Self {
        Self { mode, families }
    }

    /// Bins every active family. Boundaries come from `filtered`,
    /// assignments are made on `sorted`.
    pub fn build(
        kind: &ParameterizationKind,
        mode: CombinationMode,
        filtered: &[Reflection],
        sorted: &[Reflection],
    ) -> ScalingResult<Self> {
        let families = match kind {
            ParameterizationKind::ScaleDecay {
                n_scale_bins,
                n_decay_bins,
            } => {
                let scale = time_bins(filtered, sorted, *n_scale_bins, CorrectionFamilyKind::Scale)?;
                let decay = time_bins(filtered, sorted, *n_decay_bins, CorrectionFamilyKind::Decay)?;
                vec![
                    CorrectionFamily::plain(CorrectionFamilyKind::Scale, scale, mode),
                    CorrectionFamily::debye_waller(CorrectionFamilyKind::Decay, decay, sorted),
                ]
            }
            ParameterizationKind::Physical {
                n_resolution_bins,
                n_time_bins,
                n_detector_bins,
                n_angular_sectors,
                absorption,
                beam_center,
            } => {
                let decay = resolution_time_bins(
                    filtered,
                    sorted,
                    *n_resolution_bins,
                    *n_time_bins,
                    CorrectionFamilyKind::Decay,
                )?;
                let modulation = detector_bins(
                    filtered,
                    sorted,
                    *n_detector_bins,
                    CorrectionFamilyKind::Modulation,
                )?;
                let mut families = vec![
                    CorrectionFamily::plain(CorrectionFamilyKind::Decay, decay, mode),
                    CorrectionFamily::plain(CorrectionFamilyKind::Modulation, modulation, mode),
                ];
                if *absorption {
                    let cells = absorption_bins(
                        filtered,
                        sorted,
                        *n_angular_sectors,
                        *n_time_bins,
                        *beam_center,
                        CorrectionFamilyKind::Absorption,
                    )?;
                    families.push(CorrectionFamily::plain(
                        CorrectionFamilyKind::Absorption,
                        cells,
                        mode,
                    ));
                }
                families
            }
        };

        for family in &families {
            let occupied = family.bins().counts().iter().filter(|&&count| count > 0).count();
            info!(
                family = %family.kind(),
                bins = family.n_bins(),
                occupied,
                "binned reflections"
            );
        }

        Ok(Self { mode, families })
    }

    pub fn mode(&self) -> CombinationMode {
        self.mode
    }

    pub fn families(&self) -> &[CorrectionFamily] {
        &self.families
    }

    pub fn n_reflections(&self) -> usize {
        self.families.first().map_or(0, |family| family.bins.len())
    }

    pub fn n_params(&self) -> usize {
        self.families.iter().map(CorrectionFamily::n_bins).sum()
    }

    pub fn parameters(&self) -> Vec<f64> {
        self.families
            .iter()
            .flat_map(|family| family.factors.iter().copied())
            .collect()
    }

    pub fn set_parameters(&mut self, parameters: &[f64]) -> ScalingResult<()> {
        if parameters.len() != self.n_params() {
            return Err(ScalingError::internal(
                PipelineStage::Parameterization,
                "PARAM.LENGTH",
                format!(
                    "expected {} parameters, got {}",
                    self.n_params(),
                    parameters.len()
                ),
            ));
        }
        let mut offset = 0;
        for family in &mut self.families {
            let n_bins = family.n_bins();
            family
                .factors
                .copy_from_slice(&parameters[offset..offset + n_bins]);
            offset += n_bins;
        }
        Ok(())
    }

    fn scale_factor(&self, reflection: usize) -> f64 {
        match self.mode {
            CombinationMode::Linear => self
                .families
                .iter()
                .map(|family| family.linear_value(reflection))
                .product(),
            CombinationMode::Log => self
                .families
                .iter()
                .map(|family| family.exponent(reflection))
                .sum::<f64>()
                .exp(),
        }
    }

    pub fn inverse_scale_factors(&self) -> Vec<f64> {
        (0..self.n_reflections())
            .into_par_iter()
            .map(|reflection| self.scale_factor(reflection))
            .collect()
    }

    /// Scale factors plus `dg/dp` for every family.
    pub fn evaluate(&self) -> BasisEvaluation {
        let scale_factors = self.inverse_scale_factors();
        let mut derivatives = Vec::with_capacity(self.families.len());
        let mut offset = 0;

        for (index, family) in self.families.iter().enumerate() {
            let values: Vec<f64> = (0..scale_factors.len())
                .into_par_iter()
                .map(|reflection| match (self.mode, family.form) {
                    (CombinationMode::Linear, FactorForm::Plain) => self
                        .families
                        .iter()
                        .enumerate()
                        .filter(|(other, _)| *other != index)
                        .map(|(_, other)| other.linear_value(reflection))
                        .product(),
                    (_, FactorForm::DebyeWaller) | (CombinationMode::Log, FactorForm::Plain) => {
                        scale_factors[reflection] * family.resolution_term(reflection)
                    }
                })
                .collect();

            derivatives.push(DerivativeBlock {
                kind: family.kind,
                offset,
                n_bins: family.n_bins(),
                bin_ids: family.bins.ids().to_vec(),
                values,
            });
            offset += family.n_bins();
        }

        BasisEvaluation {
            scale_factors,
            derivatives,
        }
    }

    pub fn retain(&mut self, mask: &[bool]) {
        for family in &mut self.families {
            family.retain(mask);
        }
    }

    /// Normalises every plain family to unit mean (linear) or zero mean
    /// (log). The overall scale moves into `Ih`; residuals are unchanged
    /// once consensus intensities are recomputed.
    pub fn normalise_overall_scale(&mut self) {
        for family in &mut self.families {
            if family.form != FactorForm::Plain {
                continue;
            }
            let Some(center) = mean(&family.factors) else {
                continue;
            };
            match self.mode {
                CombinationMode::Linear if center > 0.0 && center.is_finite() => {
                    family.factors.iter_mut().for_each(|factor| *factor /= center);
                }
                CombinationMode::Linear => {
                    warn!(
                        family = %family.kind,
                        mean = center,
                        "skipping normalisation of non-positive correction factors"
                    );
                }
                CombinationMode::Log => {
                    family.factors.iter_mut().for_each(|factor| *factor -= center);
                }
            }
        }
    }
}
