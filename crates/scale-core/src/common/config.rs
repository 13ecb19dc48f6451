//! Scaling run options and their JSON loader.

use super::constants::{
    DEFAULT_ANGULAR_SECTORS, DEFAULT_MINIMIZER_DAMPING, DEFAULT_MINIMIZER_MAX_ITERATIONS,
    DEFAULT_MINIMIZER_TOLERANCE, DEFAULT_OUTLIER_MAX_ITERATIONS, DEFAULT_OUTLIER_TOLERANCE,
    DEFAULT_RESOLUTION_SCREEN, DEFAULT_SANITY_FLOOR,
};
use crate::domain::{
    CombinationMode, IntegrationMethod, ParameterizationKind, PipelineStage, ScalingError,
    ScalingResult,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelKind {
    #[default]
    ScaleDecay,
    Physical,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolutionScreen {
    pub lower: f64,
    pub upper: f64,
}

impl Default for ResolutionScreen {
    fn default() -> Self {
        Self {
            lower: DEFAULT_RESOLUTION_SCREEN.0,
            upper: DEFAULT_RESOLUTION_SCREEN.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct MinimizerOptions {
    pub max_iterations: usize,
    pub convergence_tolerance: f64,
    pub damping: f64,
}

impl Default for MinimizerOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MINIMIZER_MAX_ITERATIONS,
            convergence_tolerance: DEFAULT_MINIMIZER_TOLERANCE,
            damping: DEFAULT_MINIMIZER_DAMPING,
        }
    }
}

/// Either a named Laue class or explicit integer rotation operators acting on
/// miller indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SymmetrySpec {
    Named(String),
    Operators(Vec<[[i32; 3]; 3]>),
}

impl Default for SymmetrySpec {
    fn default() -> Self {
        Self::Named("-1".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ScalingOptions {
    pub integration_method: IntegrationMethod,
    pub intensity_over_sigma_min: f64,
    pub resolution_min: f64,
    pub resolution_screen: ResolutionScreen,
    pub sanity_floor: f64,
    pub parameterization: CombinationMode,
    pub model: ModelKind,
    pub n_scale_bins: usize,
    pub n_decay_bins: usize,
    pub n_resolution_bins: usize,
    pub n_time_bins: usize,
    pub n_detector_bins: usize,
    pub n_angular_sectors: usize,
    pub absorption: bool,
    pub beam_center: Option<[f64; 2]>,
    pub outlier_tolerance: f64,
    pub outlier_max_iterations: usize,
    pub minimizer: MinimizerOptions,
    pub symmetry: SymmetrySpec,
}

impl Default for ScalingOptions {
    fn default() -> Self {
        Self {
            integration_method: IntegrationMethod::default(),
            intensity_over_sigma_min: 0.0,
            resolution_min: 0.0,
            resolution_screen: ResolutionScreen::default(),
            sanity_floor: DEFAULT_SANITY_FLOOR,
            parameterization: CombinationMode::default(),
            model: ModelKind::default(),
            n_scale_bins: 10,
            n_decay_bins: 10,
            n_resolution_bins: 10,
            n_time_bins: 10,
            n_detector_bins: 4,
            n_angular_sectors: DEFAULT_ANGULAR_SECTORS,
            absorption: true,
            beam_center: None,
            outlier_tolerance: DEFAULT_OUTLIER_TOLERANCE,
            outlier_max_iterations: DEFAULT_OUTLIER_MAX_ITERATIONS,
            minimizer: MinimizerOptions::default(),
            symmetry: SymmetrySpec::default(),
        }
    }
}

impl ScalingOptions {
    pub fn parameterization_kind(&self) -> ParameterizationKind {
        match self.model {
            ModelKind::ScaleDecay => ParameterizationKind::ScaleDecay {
                n_scale_bins: self.n_scale_bins,
                n_decay_bins: self.n_decay_bins,
            },
            ModelKind::Physical => ParameterizationKind::Physical {
                n_resolution_bins: self.n_resolution_bins,
                n_time_bins: self.n_time_bins,
                n_detector_bins: self.n_detector_bins,
                n_angular_sectors: self.n_angular_sectors,
                absorption: self.absorption,
                beam_center: self.beam_center,
            },
        }
    }

    /// Rejects option sets that would fail later, before any data is read.
    pub fn validate(&self) -> ScalingResult<()> {
        let bin_counts: &[(&str, usize)] = match self.model {
            ModelKind::ScaleDecay => &[
                ("nScaleBins", self.n_scale_bins),
                ("nDecayBins", self.n_decay_bins),
            ],
            ModelKind::Physical => &[
                ("nResolutionBins", self.n_resolution_bins),
                ("nTimeBins", self.n_time_bins),
                ("nDetectorBins", self.n_detector_bins),
                ("nAngularSectors", self.n_angular_sectors),
            ],
        };
        for (name, count) in bin_counts {
            if *count == 0 {
                return Err(config_error(
                    "CONFIG.BIN_COUNT",
                    format!("{name} must be at least 1"),
                ));
            }
        }

        for (name, value) in [
            ("intensityOverSigmaMin", self.intensity_over_sigma_min),
            ("resolutionMin", self.resolution_min),
            ("sanityFloor", self.sanity_floor),
            ("resolutionScreen.lower", self.resolution_screen.lower),
            ("resolutionScreen.upper", self.resolution_screen.upper),
        ] {
            if !value.is_finite() {
                return Err(config_error(
                    "CONFIG.NON_FINITE",
                    format!("{name} must be finite, got {value}"),
                ));
            }
        }

        if self.resolution_screen.lower > self.resolution_screen.upper {
            return Err(config_error(
                "CONFIG.RESOLUTION_SCREEN",
                format!(
                    "resolution screen lower bound {} exceeds upper bound {}",
                    self.resolution_screen.lower, self.resolution_screen.upper
                ),
            ));
        }

        if !(self.outlier_tolerance.is_finite() && self.outlier_tolerance > 0.0) {
            return Err(config_error(
                "CONFIG.OUTLIER_TOLERANCE",
                format!(
                    "outlierTolerance must be positive and finite, got {}",
                    self.outlier_tolerance
                ),
            ));
        }

        if let Some(center) = self.beam_center
            && center.iter().any(|value| !value.is_finite())
        {
            return Err(config_error(
                "CONFIG.BEAM_CENTER",
                format!("beamCenter must be finite, got {center:?}"),
            ));
        }

        let minimizer = &self.minimizer;
        if minimizer.max_iterations == 0 {
            return Err(config_error(
                "CONFIG.MINIMIZER",
                "minimizer.maxIterations must be at least 1",
            ));
        }
        if !(minimizer.convergence_tolerance.is_finite() && minimizer.convergence_tolerance > 0.0)
        {
            return Err(config_error(
                "CONFIG.MINIMIZER",
                format!(
                    "minimizer.convergenceTolerance must be positive, got {}",
                    minimizer.convergence_tolerance
                ),
            ));
        }
        if !(minimizer.damping.is_finite() && minimizer.damping >= 0.0) {
            return Err(config_error(
                "CONFIG.MINIMIZER",
                format!(
                    "minimizer.damping must be non-negative, got {}",
                    minimizer.damping
                ),
            ));
        }

        Ok(())
    }
}

fn config_error(placeholder: &'static str, message: impl Into<String>) -> ScalingError {
    ScalingError::configuration(PipelineStage::Config, placeholder, message)
}

#[derive(Debug, thiserror::Error)]
pub enum ScalingOptionsError {
    #[error("failed to read scaling options '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse scaling options '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl From<ScalingOptionsError> for ScalingError {
    fn from(error: ScalingOptionsError) -> Self {
        match &error {
            ScalingOptionsError::Read { .. } => ScalingError::io_system(
                PipelineStage::Config,
                "IO.OPTIONS_READ",
                error.to_string(),
            ),
            ScalingOptionsError::Parse { .. } => {
                config_error("CONFIG.OPTIONS_PARSE", error.to_string())
            }
        }
    }
}

pub fn load_scaling_options(
    options_path: impl AsRef<Path>,
) -> Result<ScalingOptions, ScalingOptionsError> {
    let options_path = options_path.as_ref();
    let source = fs::read_to_string(options_path).map_err(|source| ScalingOptionsError::Read {
        path: options_path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&source).map_err(|source| ScalingOptionsError::Parse {
        path: options_path.to_path_buf(),
        source,
    })
}
