pub mod errors;

pub use errors::{ScalingError, ScalingErrorCategory, ScalingResult};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(from = "[i32; 3]", into = "[i32; 3]")]
pub struct MillerIndex {
    pub h: i32,
    pub k: i32,
    pub l: i32,
}

impl MillerIndex {
    pub const fn new(h: i32, k: i32, l: i32) -> Self {
        Self { h, k, l }
    }

    pub const fn as_array(self) -> [i32; 3] {
        [self.h, self.k, self.l]
    }
}

impl From<[i32; 3]> for MillerIndex {
    fn from(value: [i32; 3]) -> Self {
        Self::new(value[0], value[1], value[2])
    }
}

impl From<MillerIndex> for [i32; 3] {
    fn from(value: MillerIndex) -> Self {
        value.as_array()
    }
}

impl Display for MillerIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.h, self.k, self.l)
    }
}

/// One diffraction observation plus the scratch state the scaling engine
/// attaches to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reflection {
    pub miller_index: MillerIndex,
    pub asu_miller_index: MillerIndex,
    pub intensity: f64,
    pub variance: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub d: f64,
    pub inverse_scale_factor: f64,
    pub ih: f64,
    /// Row of the input table this reflection was read from.
    pub source_row: usize,
}

impl Reflection {
    pub fn new(
        miller_index: MillerIndex,
        intensity: f64,
        variance: f64,
        position: [f64; 3],
        d: f64,
    ) -> Self {
        Self {
            miller_index,
            asu_miller_index: miller_index,
            intensity,
            variance,
            x: position[0],
            y: position[1],
            z: position[2],
            d,
            inverse_scale_factor: 1.0,
            ih: 0.0,
            source_row: 0,
        }
    }

    pub fn with_source_row(mut self, source_row: usize) -> Self {
        self.source_row = source_row;
        self
    }

    pub fn intensity_over_sigma(&self) -> f64 {
        self.intensity / self.variance.sqrt()
    }

    pub fn scaled_intensity(&self) -> f64 {
        self.intensity / self.inverse_scale_factor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationMethod {
    Sum,
    #[default]
    Prf,
    Combine,
}

impl IntegrationMethod {
    /// `combine` has no dedicated profile/summation mix yet and reads the
    /// profile-fitted columns.
    pub const fn resolved(self) -> Self {
        match self {
            Self::Combine => Self::Prf,
            other => other,
        }
    }

    pub const fn column_prefix(self) -> &'static str {
        match self.resolved() {
            Self::Sum => "intensity.sum",
            _ => "intensity.prf",
        }
    }
}

/// How per-family correction factors combine into one inverse scale factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombinationMode {
    #[default]
    Linear,
    Log,
}

impl CombinationMode {
    pub const fn default_factor(self) -> f64 {
        match self {
            Self::Linear => 1.0,
            Self::Log => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorrectionFamilyKind {
    Scale,
    Decay,
    Modulation,
    Absorption,
}

impl CorrectionFamilyKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scale => "scale",
            Self::Decay => "decay",
            Self::Modulation => "modulation",
            Self::Absorption => "absorption",
        }
    }
}

impl Display for CorrectionFamilyKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Which correction families are active and how they are binned.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterizationKind {
    /// Time-binned scale times a time-binned Debye-Waller decay.
    ScaleDecay {
        n_scale_bins: usize,
        n_decay_bins: usize,
    },
    /// Resolution x time decay, detector modulation and optional
    /// radial/angular x time absorption.
    Physical {
        n_resolution_bins: usize,
        n_time_bins: usize,
        n_detector_bins: usize,
        n_angular_sectors: usize,
        absorption: bool,
        beam_center: Option<[f64; 2]>,
    },
}

impl ParameterizationKind {
    pub fn families(&self) -> Vec<CorrectionFamilyKind> {
        match self {
            Self::ScaleDecay { .. } => vec![CorrectionFamilyKind::Scale, CorrectionFamilyKind::Decay],
            Self::Physical { absorption, .. } => {
                let mut families = vec![
                    CorrectionFamilyKind::Decay,
                    CorrectionFamilyKind::Modulation,
                ];
                if *absorption {
                    families.push(CorrectionFamilyKind::Absorption);
                }
                families
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Config,
    Load,
    Filter,
    Canonicalize,
    Sort,
    Group,
    Weighting,
    Bin(CorrectionFamilyKind),
    Parameterization,
    Refinement,
    Outliers,
    Save,
}

impl Display for PipelineStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config => f.write_str("config"),
            Self::Load => f.write_str("load"),
            Self::Filter => f.write_str("filter"),
            Self::Canonicalize => f.write_str("canonicalize"),
            Self::Sort => f.write_str("sort"),
            Self::Group => f.write_str("group"),
            Self::Weighting => f.write_str("weighting"),
            Self::Bin(family) => write!(f, "bin:{family}"),
            Self::Parameterization => f.write_str("parameterization"),
            Self::Refinement => f.write_str("refinement"),
            Self::Outliers => f.write_str("outliers"),
            Self::Save => f.write_str("save"),
        }
    }
}
