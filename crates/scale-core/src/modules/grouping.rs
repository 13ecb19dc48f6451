use crate::domain::{MillerIndex, PipelineStage, Reflection, ScalingError, ScalingResult};
use crate::numerics::stable_sum;
use rayon::prelude::*;
use std::ops::Range;

/// Contiguous symmetry-equivalence groups over a sorted reflection array.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupTable {
    group_ids: Vec<usize>,
    counts: Vec<usize>,
    offsets: Vec<usize>,
}

impl GroupTable {
    /// Single linear scan; fails if `indices` is not sorted ascending.
    pub fn assign(indices: &[MillerIndex]) -> ScalingResult<Self> {
        let mut group_ids = Vec::with_capacity(indices.len());
        let mut counts: Vec<usize> = Vec::new();

        for (position, index) in indices.iter().enumerate() {
            match position.checked_sub(1).map(|previous| indices[previous]) {
                Some(previous) if previous == *index => {
                    if let Some(count) = counts.last_mut() {
                        *count += 1;
                    }
                }
                Some(previous) if previous > *index => {
                    return Err(ScalingError::data_integrity(
                        PipelineStage::Group,
                        "GROUP.UNSORTED",
                        format!(
                            "grouping attempted on unsorted data: {index} follows {previous} at position {position}"
                        ),
                    ));
                }
                _ => counts.push(1),
            }
            group_ids.push(counts.len() - 1);
        }

        let mut offsets = Vec::with_capacity(counts.len() + 1);
        offsets.push(0);
        let mut running = 0;
        for count in &counts {
            running += count;
            offsets.push(running);
        }

        Ok(Self {
            group_ids,
            counts,
            offsets,
        })
    }

    pub fn from_reflections(reflections: &[Reflection]) -> ScalingResult<Self> {
        let indices: Vec<MillerIndex> = reflections
            .iter()
            .map(|reflection| reflection.asu_miller_index)
            .collect();
        Self::assign(&indices)
    }

    pub fn n_groups(&self) -> usize {
        self.counts.len()
    }

    pub fn n_reflections(&self) -> usize {
        self.group_ids.len()
    }

    pub fn group_ids(&self) -> &[usize] {
        &self.group_ids
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn range(&self, group: usize) -> Range<usize> {
        self.offsets[group]..self.offsets[group + 1]
    }

    /// Per-group sum of `values`, which must be aligned with the sorted array.
    pub fn segment_sum(&self, values: &[f64]) -> Vec<f64> {
        (0..self.n_groups())
            .into_par_iter()
            .map(|group| stable_sum(&values[self.range(group)]))
            .collect()
    }

    /// Repeats each per-group value over the group's members.
    pub fn broadcast(&self, per_group: &[f64]) -> Vec<f64> {
        self.group_ids
            .iter()
            .map(|&group| per_group[group])
            .collect()
    }
}
