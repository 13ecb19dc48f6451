pub mod linalg;

pub use linalg::{
    CholeskyDecomposition, DenseMatrix, LinearSolveError, cholesky_factorize,
    solve_symmetric_positive_definite,
};

fn kahan_add(sum: &mut f64, correction: &mut f64, value: f64) {
    let corrected = value - *correction;
    let next = *sum + corrected;
    *correction = (next - *sum) - corrected;
    *sum = next;
}

pub fn stable_sum(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut correction = 0.0;

    for &value in values {
        kahan_add(&mut sum, &mut correction, value);
    }

    sum
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(stable_sum(values) / values.len() as f64)
}

/// Bessel-corrected (divisor `n - 1`) standard deviation.
pub fn sample_standard_deviation(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let center = mean(values)?;
    let squared: Vec<f64> = values
        .iter()
        .map(|value| (value - center) * (value - center))
        .collect();
    Some((stable_sum(&squared) / (values.len() - 1) as f64).sqrt())
}
