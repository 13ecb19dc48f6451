use scale_core::modules::outliers::{OutlierOptions, reject_outliers};
use scale_core::modules::parameterization::ScaleModel;
use scale_core::modules::quality::synthesize_intensities;
use scale_core::modules::refinement::refine;
use scale_core::modules::table::Column;
use scale_core::modules::weighting::WeightingOptions;
use scale_core::{
    CancelToken, CombinationMode, GaussNewtonMinimizer, MillerIndex, ParameterizationKind,
    Reflection, ReflectionTable, ScalingContext, ScalingOptions, run_scaling,
};
use tempfile::TempDir;

const NO_CUTOFFS: WeightingOptions = WeightingOptions {
    intensity_over_sigma_min: f64::NEG_INFINITY,
    resolution_min: 0.0,
};

#[test]
fn gross_outlier_is_rejected_and_consensus_settles_near_the_rest() {
    let reflections: Vec<Reflection> = [(100.0, 25.0), (98.0, 24.0), (5.0, 1.0), (102.0, 26.0)]
        .iter()
        .map(|&(intensity, variance)| {
            Reflection::new(MillerIndex::new(1, 2, 3), intensity, variance, [0.0; 3], 2.0)
        })
        .collect();
    let mut context = ScalingContext::new(
        reflections,
        ScaleModel::new(CombinationMode::Linear, Vec::new()),
        NO_CUTOFFS,
    )
    .expect("context should build");

    let report = reject_outliers(
        &mut context,
        OutlierOptions {
            tolerance: 0.3,
            max_iterations: 1,
        },
        &CancelToken::new(),
    )
    .expect("rejection should succeed");

    assert_eq!(report.total_rejected(), 1);
    let kept: Vec<f64> = context.reflections().iter().map(|r| r.intensity).collect();
    assert_eq!(kept, vec![100.0, 98.0, 102.0]);

    let expected = (100.0 / 25.0 + 98.0 / 24.0 + 102.0 / 26.0) / (1.0 / 25.0 + 1.0 / 24.0 + 1.0 / 26.0);
    for reflection in context.reflections() {
        assert!((reflection.ih - expected).abs() < 1.0e-9);
        assert!((reflection.ih - 100.0).abs() < 1.0);
    }
}

/// Five unique reflections observed on ten frames each, sorted by index.
fn frame_series() -> Vec<Reflection> {
    let mut reflections = Vec::new();
    for l in 1..=5 {
        let d = 1.0 + l as f64 * 0.5;
        for frame in 0..10 {
            let intensity = 50.0 * l as f64;
            reflections.push(Reflection::new(
                MillerIndex::new(0, 0, l),
                intensity,
                intensity,
                [frame as f64, 0.0, frame as f64],
                d,
            ));
        }
    }
    reflections
}

#[test]
fn refinement_recovers_scales_of_synthesized_data() {
    let kind = ParameterizationKind::ScaleDecay {
        n_scale_bins: 3,
        n_decay_bins: 1,
    };
    let mode = CombinationMode::Linear;
    let series = frame_series();
    let truth_model =
        ScaleModel::build(&kind, mode, &series, &series).expect("truth model should build");
    let mut truth =
        ScalingContext::new(series, truth_model, NO_CUTOFFS).expect("truth context should build");
    truth
        .adopt_parameters(&[1.0, 1.3, 0.8, 0.0])
        .expect("parameter count matches");

    let synthetic = synthesize_intensities(&truth);
    let model = ScaleModel::build(&kind, mode, &synthetic, &synthetic)
        .expect("fresh model should build");
    let mut context =
        ScalingContext::new(synthetic, model, NO_CUTOFFS).expect("context should build");

    let report = refine(
        &mut context,
        &GaussNewtonMinimizer::default(),
        &CancelToken::new(),
    )
    .expect("refinement should succeed");
    assert!(report.final_objective < 1.0e-8 * report.initial_objective.max(1.0));

    // Frames 0, 4 and 9 fall into scale bins 0, 1 and 2 of the first group.
    let g: Vec<f64> = context
        .reflections()
        .iter()
        .map(|r| r.inverse_scale_factor)
        .collect();
    assert!((g[4] / g[0] - 1.3).abs() < 1.0e-4, "ratio {}", g[4] / g[0]);
    assert!((g[9] / g[0] - 0.8).abs() < 1.0e-4, "ratio {}", g[9] / g[0]);
}

#[test]
fn table_round_trips_through_a_full_run() {
    let temp = TempDir::new().expect("tempdir should be created");
    let series = frame_series();
    let table = ReflectionTable::new()
        .with_column(
            "miller_index",
            Column::Miller(series.iter().map(|r| r.miller_index.as_array()).collect()),
        )
        .with_column(
            "intensity.sum.value",
            Column::Float(series.iter().map(|r| r.intensity).collect()),
        )
        .with_column(
            "intensity.sum.variance",
            Column::Float(series.iter().map(|r| r.variance).collect()),
        )
        .with_column(
            "xyzobs.px.value",
            Column::Vec3(series.iter().map(|r| [r.x + 0.5, r.y + 0.5, r.z]).collect()),
        )
        .with_column("d", Column::Float(series.iter().map(|r| r.d).collect()));
    let input_path = temp.path().join("input.json");
    table.write_json(&input_path).expect("input should be written");

    let options: ScalingOptions = serde_json::from_str(
        r#"{"integrationMethod": "sum", "nScaleBins": 3, "nDecayBins": 2, "outlierMaxIterations": 2}"#,
    )
    .expect("options should parse");
    let loaded = ReflectionTable::read_json(&input_path).expect("input should load");
    let run = run_scaling(
        &loaded,
        &options,
        &GaussNewtonMinimizer::new(options.minimizer),
        &CancelToken::new(),
    )
    .expect("run should succeed");

    let output_path = temp.path().join("output.json");
    run.table.write_json(&output_path).expect("output should be written");
    let output = ReflectionTable::read_json(&output_path).expect("output should load");
    assert_eq!(output.n_rows().expect("consistent output"), 50);
    assert!(output.contains("intensity.sum.value"));
    assert!(output.contains("inverse_scale_factor"));
    assert!(output.contains("Ih_values"));
    assert!(!output.contains("asu_miller_index"));

    let Some(Column::Float(ih)) = output.column("Ih_values") else {
        panic!("Ih values should be numbers");
    };
    assert!(ih.iter().all(|value| value.is_finite() && *value > 0.0));
    assert!(run.outliers.converged);
}
