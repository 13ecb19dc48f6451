//! Scaling engine for diffraction-intensity datasets.
//!
//! Raw reflections are filtered, mapped onto their symmetry-unique index,
//! grouped, binned along the physical axes the active correction model uses,
//! and refined until symmetry-equivalent observations agree.

pub mod common;
pub mod domain;
pub mod modules;
pub mod numerics;

pub use common::cancel::CancelToken;
pub use common::config::{ScalingOptions, ScalingOptionsError, load_scaling_options};
pub use domain::{
    CombinationMode, CorrectionFamilyKind, IntegrationMethod, MillerIndex, ParameterizationKind,
    PipelineStage, Reflection, ScalingError, ScalingErrorCategory, ScalingResult,
};
pub use modules::context::ScalingContext;
pub use modules::pipeline::{RunSummary, ScalingRun, run_scaling};
pub use modules::quality::QualityReport;
pub use modules::refinement::{
    GaussNewtonMinimizer, Minimizer, MinimizerReport, RefinementTarget, TargetEvaluation,
};
pub use modules::table::ReflectionTable;
