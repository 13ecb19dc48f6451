use super::grouping::GroupTable;
use super::ih::update_ih;
use super::parameterization::ScaleModel;
use super::selection::retain_by_mask;
use super::weighting::{Weighting, WeightingOptions};
use crate::domain::{PipelineStage, Reflection, ScalingError, ScalingResult};

/// Everything one scaling run owns: the sorted reflections, their groups and
/// weights, and the correction model whose bins are aligned with them.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingContext {
    reflections: Vec<Reflection>,
    groups: GroupTable,
    weighting: Weighting,
    model: ScaleModel,
    weighting_options: WeightingOptions,
}

impl ScalingContext {
    /// `sorted` must be ordered by canonical index and aligned with `model`.
    pub fn new(
        sorted: Vec<Reflection>,
        model: ScaleModel,
        weighting_options: WeightingOptions,
    ) -> ScalingResult<Self> {
        if model.n_reflections() != sorted.len() && !model.families().is_empty() {
            return Err(ScalingError::internal(
                PipelineStage::Parameterization,
                "PARAM.MISALIGNED",
                format!(
                    "model covers {} reflections but the dataset has {}",
                    model.n_reflections(),
                    sorted.len()
                ),
            ));
        }

        let groups = GroupTable::from_reflections(&sorted)?;
        let weighting = Weighting::with_cutoffs(&sorted, weighting_options);
        let mut context = Self {
            reflections: sorted,
            groups,
            weighting,
            model,
            weighting_options,
        };
        context.recompute_scale_factors();
        context.recompute_ih();
        Ok(context)
    }

    pub fn reflections(&self) -> &[Reflection] {
        &self.reflections
    }

    pub fn groups(&self) -> &GroupTable {
        &self.groups
    }

    pub fn weights(&self) -> &[f64] {
        self.weighting.weights()
    }

    pub fn model(&self) -> &ScaleModel {
        &self.model
    }

    pub fn len(&self) -> usize {
        self.reflections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reflections.is_empty()
    }

    pub fn recompute_scale_factors(&mut self) {
        if self.model.families().is_empty() {
            return;
        }
        let scale_factors = self.model.inverse_scale_factors();
        for (reflection, g) in self.reflections.iter_mut().zip(scale_factors) {
            reflection.inverse_scale_factor = g;
        }
    }

    pub fn recompute_ih(&mut self) {
        update_ih(&mut self.reflections, &self.groups, self.weighting.weights());
    }

    /// Regroups, reweights and recomputes scale factors and `Ih`.
    pub fn refresh(&mut self) -> ScalingResult<()> {
        self.groups = GroupTable::from_reflections(&self.reflections)?;
        self.weighting = Weighting::with_cutoffs(&self.reflections, self.weighting_options);
        self.recompute_scale_factors();
        self.recompute_ih();
        Ok(())
    }

    /// Drops reflections whose mask entry is false, keeping bin boundaries.
    pub fn retain(&mut self, mask: &[bool]) -> ScalingResult<()> {
        let reflections = std::mem::take(&mut self.reflections);
        self.reflections = retain_by_mask(reflections, mask);
        self.model.retain(mask);
        self.refresh()
    }

    /// The positive-weight subset used for refinement.
    pub fn for_scaling(&self) -> ScalingResult<Self> {
        let mask = self.weighting.positive_mask();
        let mut subset = self.clone();
        subset.retain(&mask)?;
        Ok(subset)
    }

    pub fn parameters(&self) -> Vec<f64> {
        self.model.parameters()
    }

    /// Installs refined correction factors and recomputes derived values.
    pub fn adopt_parameters(&mut self, parameters: &[f64]) -> ScalingResult<()> {
        self.model.set_parameters(parameters)?;
        self.recompute_scale_factors();
        self.recompute_ih();
        Ok(())
    }

    pub fn normalise_overall_scale(&mut self) {
        self.model.normalise_overall_scale();
        self.recompute_scale_factors();
        self.recompute_ih();
    }
}
