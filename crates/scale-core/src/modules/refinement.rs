//! Refinement loop: a [`Minimizer`] drives parameter updates on a
//! [`RefinementTarget`] that recomputes scale factors and `Ih` on demand.

use super::context::ScalingContext;
use super::parameterization::BasisEvaluation;
use crate::common::cancel::CancelToken;
use crate::common::config::MinimizerOptions;
use crate::domain::{PipelineStage, ScalingError, ScalingResult};
use crate::numerics::{DenseMatrix, solve_symmetric_positive_definite, stable_sum};
use serde::Serialize;
use tracing::{debug, info, warn};

const MIN_RIDGE: f64 = 1.0e-12;
const MIN_DAMPING: f64 = 1.0e-9;
const MAX_DAMPING: f64 = 1.0e10;

/// Residuals `I - g * Ih` with their weights and the `Ih` each was taken
/// against.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetEvaluation {
    pub residuals: Vec<f64>,
    pub weights: Vec<f64>,
    pub intensity_estimates: Vec<f64>,
}

impl TargetEvaluation {
    pub fn weighted_sum_of_squares(&self) -> f64 {
        let terms: Vec<f64> = self
            .residuals
            .iter()
            .zip(&self.weights)
            .map(|(residual, weight)| weight * residual * residual)
            .collect();
        stable_sum(&terms)
    }
}

pub trait RefinementTarget {
    fn parameters(&self) -> Vec<f64>;

    /// Installs `parameters`, recomputes scale factors and consensus
    /// intensities, and returns the scale factors with their derivatives.
    fn evaluate_basis(&mut self, parameters: &[f64]) -> ScalingResult<BasisEvaluation>;

    fn evaluate_target(&self) -> TargetEvaluation;
}

impl RefinementTarget for ScalingContext {
    fn parameters(&self) -> Vec<f64> {
        ScalingContext::parameters(self)
    }

    fn evaluate_basis(&mut self, parameters: &[f64]) -> ScalingResult<BasisEvaluation> {
        self.adopt_parameters(parameters)?;
        Ok(self.model().evaluate())
    }

    fn evaluate_target(&self) -> TargetEvaluation {
        let reflections = self.reflections();
        TargetEvaluation {
            residuals: reflections
                .iter()
                .map(|r| r.intensity - r.inverse_scale_factor * r.ih)
                .collect(),
            weights: self.weights().to_vec(),
            intensity_estimates: reflections.iter().map(|r| r.ih).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimizerReport {
    pub iterations: usize,
    pub initial_objective: f64,
    pub final_objective: f64,
    pub converged: bool,
}

pub trait Minimizer {
    fn minimize(
        &self,
        target: &mut dyn RefinementTarget,
        cancel: &CancelToken,
    ) -> ScalingResult<MinimizerReport>;
}

/// Damped Gauss-Newton over the normal equations `J^T W J`, with `Ih`
/// held fixed inside each Jacobian.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GaussNewtonMinimizer {
    options: MinimizerOptions,
}

impl GaussNewtonMinimizer {
    pub fn new(options: MinimizerOptions) -> Self {
        Self { options }
    }

    fn normal_equations(
        basis: &BasisEvaluation,
        target: &TargetEvaluation,
        n_params: usize,
    ) -> (DenseMatrix, Vec<f64>) {
        let mut normal = DenseMatrix::zeros(n_params, n_params);
        let mut gradient = vec![0.0; n_params];
        let mut row: Vec<(usize, f64)> = Vec::with_capacity(basis.derivatives.len());

        for (reflection, &weight) in target.weights.iter().enumerate() {
            if weight <= 0.0 {
                continue;
            }
            row.clear();
            let ih = target.intensity_estimates[reflection];
            for block in &basis.derivatives {
                row.push((
                    block.parameter_index(reflection),
                    -ih * block.values[reflection],
                ));
            }
            let residual = target.residuals[reflection];
            for &(lhs, lhs_value) in &row {
                gradient[lhs] += weight * lhs_value * residual;
                for &(rhs, rhs_value) in &row {
                    normal[(lhs, rhs)] += weight * lhs_value * rhs_value;
                }
            }
        }

        (normal, gradient)
    }
}

impl Minimizer for GaussNewtonMinimizer {
    fn minimize(
        &self,
        target: &mut dyn RefinementTarget,
        cancel: &CancelToken,
    ) -> ScalingResult<MinimizerReport> {
        let mut parameters = target.parameters();
        let n_params = parameters.len();
        let mut basis = target.evaluate_basis(&parameters)?;
        let mut evaluation = target.evaluate_target();
        let mut objective = evaluation.weighted_sum_of_squares();
        let initial_objective = objective;
        let mut damping = self.options.damping.max(MIN_DAMPING);
        let mut converged = n_params == 0;
        let mut iterations = 0;

        while !converged && iterations < self.options.max_iterations {
            cancel.check(PipelineStage::Refinement)?;
            iterations += 1;

            let (mut normal, gradient) = Self::normal_equations(&basis, &evaluation, n_params);
            for index in 0..n_params {
                let diagonal = normal[(index, index)];
                normal[(index, index)] = diagonal + damping * diagonal + MIN_RIDGE;
            }
            let rhs: Vec<f64> = gradient.iter().map(|value| -value).collect();
            let step = solve_symmetric_positive_definite(&normal, &rhs).map_err(|error| {
                ScalingError::computation(
                    PipelineStage::Refinement,
                    "REFINE.NORMAL_EQUATIONS",
                    format!("iteration {iterations}: {error}"),
                )
            })?;

            let trial: Vec<f64> = parameters
                .iter()
                .zip(&step)
                .map(|(value, delta)| value + delta)
                .collect();
            let trial_basis = target.evaluate_basis(&trial)?;
            let trial_evaluation = target.evaluate_target();
            let trial_objective = trial_evaluation.weighted_sum_of_squares();

            if trial_objective.is_finite() && trial_objective <= objective {
                let improvement = (objective - trial_objective) / objective.max(f64::MIN_POSITIVE);
                parameters = trial;
                basis = trial_basis;
                evaluation = trial_evaluation;
                objective = trial_objective;
                damping = (damping / 10.0).max(MIN_DAMPING);
                debug!(iteration = iterations, objective, damping, "accepted refinement step");
                converged = improvement < self.options.convergence_tolerance;
            } else {
                damping *= 10.0;
                basis = target.evaluate_basis(&parameters)?;
                debug!(
                    iteration = iterations,
                    rejected_objective = trial_objective,
                    damping,
                    "rejected refinement step"
                );
                if damping > MAX_DAMPING {
                    converged = true;
                }
            }
        }

        if converged {
            info!(iterations, initial_objective, final_objective = objective, "refinement converged");
        } else {
            warn!(
                iterations,
                final_objective = objective,
                "refinement stopped at the iteration cap"
            );
        }

        Ok(MinimizerReport {
            iterations,
            initial_objective,
            final_objective: objective,
            converged,
        })
    }
}

/// Runs `minimizer` on `context`, leaving the refined parameters installed.
pub fn refine(
    context: &mut ScalingContext,
    minimizer: &dyn Minimizer,
    cancel: &CancelToken,
) -> ScalingResult<MinimizerReport> {
    info!(
        reflections = context.len(),
        parameters = context.model().n_params(),
        "starting refinement"
    );
    minimizer.minimize(context, cancel)
}
