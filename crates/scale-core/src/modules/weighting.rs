use crate::common::config::ScalingOptions;
use crate::domain::Reflection;

/// Cutoffs applied on top of statistical weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightingOptions {
    pub intensity_over_sigma_min: f64,
    pub resolution_min: f64,
}

impl WeightingOptions {
    pub fn from_options(options: &ScalingOptions) -> Self {
        Self {
            intensity_over_sigma_min: options.intensity_over_sigma_min,
            resolution_min: options.resolution_min,
        }
    }
}

/// Per-reflection weights aligned with a reflection slice. Cutoffs zero
/// weights in place and never change the length.
#[derive(Debug, Clone, PartialEq)]
pub struct Weighting {
    weights: Vec<f64>,
}

impl Weighting {
    /// `1 / variance` for every reflection.
    pub fn statistical(reflections: &[Reflection]) -> Self {
        Self {
            weights: reflections
                .iter()
                .map(|reflection| 1.0 / reflection.variance)
                .collect(),
        }
    }

    /// Statistical weights with both configured cutoffs applied.
    pub fn with_cutoffs(reflections: &[Reflection], options: WeightingOptions) -> Self {
        let mut weighting = Self::statistical(reflections);
        weighting.apply_intensity_over_sigma_cutoff(reflections, options.intensity_over_sigma_min);
        weighting.apply_resolution_cutoff(reflections, options.resolution_min);
        weighting
    }

    pub fn apply_intensity_over_sigma_cutoff(&mut self, reflections: &[Reflection], ratio: f64) {
        for (weight, reflection) in self.weights.iter_mut().zip(reflections) {
            if reflection.intensity_over_sigma() < ratio {
                *weight = 0.0;
            }
        }
    }

    pub fn apply_resolution_cutoff(&mut self, reflections: &[Reflection], d_min: f64) {
        for (weight, reflection) in self.weights.iter_mut().zip(reflections) {
            if reflection.d < d_min {
                *weight = 0.0;
            }
        }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn positive_mask(&self) -> Vec<bool> {
        self.weights.iter().map(|&weight| weight > 0.0).collect()
    }

}
