use scale_core::common::config::{ModelKind, SymmetrySpec};
use scale_core::{
    CombinationMode, IntegrationMethod, ScalingError, ScalingErrorCategory, ScalingOptionsError,
    load_scaling_options,
};
use std::fs;
use tempfile::TempDir;

#[test]
fn options_file_overrides_defaults() {
    let temp = TempDir::new().expect("tempdir should be created");
    let path = temp.path().join("options.json");
    fs::write(
        &path,
        r#"{
            "integrationMethod": "combine",
            "intensityOverSigmaMin": 1.5,
            "parameterization": "log",
            "model": "physical",
            "nResolutionBins": 6,
            "beamCenter": [512.0, 498.5],
            "outlierTolerance": 4.0,
            "minimizer": {"maxIterations": 20},
            "symmetry": "4/mmm"
        }"#,
    )
    .expect("options should be written");

    let options = load_scaling_options(&path).expect("options should load");
    assert_eq!(options.integration_method, IntegrationMethod::Combine);
    assert_eq!(options.integration_method.resolved(), IntegrationMethod::Prf);
    assert_eq!(options.intensity_over_sigma_min, 1.5);
    assert_eq!(options.parameterization, CombinationMode::Log);
    assert_eq!(options.model, ModelKind::Physical);
    assert_eq!(options.n_resolution_bins, 6);
    assert_eq!(options.beam_center, Some([512.0, 498.5]));
    assert_eq!(options.outlier_tolerance, 4.0);
    assert_eq!(options.minimizer.max_iterations, 20);
    assert_eq!(options.minimizer.damping, 1.0e-3);
    assert_eq!(options.symmetry, SymmetrySpec::Named("4/mmm".to_string()));
    options.validate().expect("loaded options should validate");
}

#[test]
fn missing_file_maps_to_io_error() {
    let temp = TempDir::new().expect("tempdir should be created");
    let error = load_scaling_options(temp.path().join("absent.json"))
        .expect_err("missing options should fail");
    assert!(matches!(error, ScalingOptionsError::Read { .. }));

    let scaling_error = ScalingError::from(error);
    assert_eq!(scaling_error.category(), ScalingErrorCategory::IoSystemError);
    assert_eq!(scaling_error.exit_code(), 3);
    assert_eq!(scaling_error.placeholder(), "IO.OPTIONS_READ");
}

#[test]
fn unrecognized_values_map_to_configuration_error() {
    let temp = TempDir::new().expect("tempdir should be created");
    let path = temp.path().join("options.json");
    fs::write(&path, r#"{"integrationMethod": "peak"}"#).expect("options should be written");

    let error = load_scaling_options(&path).expect_err("unknown method should fail");
    assert!(matches!(error, ScalingOptionsError::Parse { .. }));
    assert!(error.to_string().contains("options.json"));

    let scaling_error = ScalingError::from(error);
    assert_eq!(scaling_error.exit_code(), 2);
    assert_eq!(
        scaling_error.diagnostic_line().split(':').next(),
        Some("ERROR")
    );
    assert_eq!(
        scaling_error.fatal_exit_line().as_deref(),
        Some("FATAL EXIT CODE: 2")
    );
}
