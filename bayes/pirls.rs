//! Posterior mode of the full model (every `γ_j = 1`) by penalized Fisher
//! scoring.
//!
//! The Normal slab acts as a ridge penalty, so the mode exists even under
//! perfect separation. The mode seeds chains when `init = "mode"` and its
//! penalized information matrix sets the initial Metropolis step sizes.

use crate::bayes::faer_ndarray::{FaerCholesky, FaerLinalgError};
use crate::bayes::link::LinkFunction;
use crate::bayes::prior::SpikeSlabPrior;
use crate::bayes::types::Coefficients;
use faer::Side;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

const MIN_WEIGHT: f64 = 1e-10;
const MIN_DENSITY: f64 = 1e-12;
const MAX_STEP_HALVINGS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PirlsStatus {
    /// Coefficient and objective changes fell below tolerance.
    Converged,
    /// Ran out of iterations; the last iterate is returned.
    MaxIterationsReached,
    /// Step halving could not find an ascent direction.
    Unstable,
}

#[derive(Debug, Clone, Copy)]
pub struct ModeOptions {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for ModeOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModeResult {
    pub beta: Coefficients,
    /// Penalized Fisher information `XᵀWX + V` at the mode.
    pub hessian: Array2<f64>,
    pub log_posterior: f64,
    pub iterations: usize,
    pub status: PirlsStatus,
}

/// IRLS weights and working response for the current linear predictor.
pub fn update_glm_vectors(
    y: ArrayView1<f64>,
    eta: &Array1<f64>,
    link: LinkFunction,
) -> (Array1<f64>, Array1<f64>) {
    let mut weights = Array1::zeros(eta.len());
    let mut working = Array1::zeros(eta.len());
    for i in 0..eta.len() {
        let mu = link.inverse(eta[i]);
        let density = link.density(eta[i]).max(MIN_DENSITY);
        weights[i] = (density * density / (mu * (1.0 - mu))).max(MIN_WEIGHT);
        working[i] = eta[i] + (y[i] - mu) / density;
    }
    (weights, working)
}

/// `XᵀWX + diag(precision)`.
pub fn penalized_information(
    x: ArrayView2<f64>,
    weights: &Array1<f64>,
    precision: &Array1<f64>,
) -> Array2<f64> {
    let weighted = &x * &weights.view().insert_axis(Axis(1));
    let mut info = x.t().dot(&weighted);
    for j in 0..precision.len() {
        info[(j, j)] += precision[j];
    }
    info
}

pub fn log_likelihood(y: ArrayView1<f64>, eta: &Array1<f64>, link: LinkFunction) -> f64 {
    y.iter()
        .zip(eta.iter())
        .map(|(&yi, &ei)| link.log_likelihood(yi, ei))
        .sum()
}

fn log_posterior(
    y: ArrayView1<f64>,
    eta: &Array1<f64>,
    beta: &Array1<f64>,
    prior: &SpikeSlabPrior,
    link: LinkFunction,
) -> f64 {
    let prior_term: f64 = beta
        .iter()
        .enumerate()
        .map(|(j, &b)| prior.log_slab_density(j, b))
        .sum();
    log_likelihood(y, eta, link) + prior_term
}

/// Maximizes `ℓ(y | Xβ) + log p(β)` with step-halving Fisher scoring.
pub fn find_posterior_mode(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    prior: &SpikeSlabPrior,
    link: LinkFunction,
    options: &ModeOptions,
) -> Result<ModeResult, FaerLinalgError> {
    let p = x.ncols();
    let precision = prior.precision();
    let prior_rhs = prior.precision_weighted_mean();

    let mut beta = Array1::from_shape_fn(p, |j| prior.slab_mean(j));
    let mut eta = x.dot(&beta);
    let mut current = log_posterior(y, &eta, &beta, prior, link);
    let mut status = PirlsStatus::MaxIterationsReached;
    let mut iterations = 0;

    for iter in 1..=options.max_iterations {
        iterations = iter;
        let (weights, working) = update_glm_vectors(y, &eta, link);
        let info = penalized_information(x, &weights, &precision);
        let rhs = x.t().dot(&(&weights * &working)) + &prior_rhs;
        let target = info.cholesky(Side::Lower)?.solve_vec(&rhs);
        let direction = &target - &beta;

        let mut step = 1.0;
        let mut accepted = None;
        for _ in 0..MAX_STEP_HALVINGS {
            let trial = &beta + &(&direction * step);
            let trial_eta = x.dot(&trial);
            let trial_value = log_posterior(y, &trial_eta, &trial, prior, link);
            if trial_value.is_finite() && trial_value >= current - 1e-12 * (1.0 + current.abs()) {
                accepted = Some((trial, trial_eta, trial_value));
                break;
            }
            step *= 0.5;
        }

        let Some((next_beta, next_eta, next_value)) = accepted else {
            log::warn!("Mode search stalled at iteration {iter}: step halving found no ascent");
            status = PirlsStatus::Unstable;
            break;
        };

        let max_change = direction.iter().fold(0.0f64, |acc, d| acc.max((d * step).abs()));
        let objective_change = (next_value - current).abs();
        log::debug!(
            "mode iter {iter}: log posterior {next_value:.6}, step {step:.3e}, max |dβ| {max_change:.3e}"
        );
        beta = next_beta;
        eta = next_eta;
        current = next_value;

        if max_change < options.tolerance
            && objective_change < options.tolerance * (1.0 + current.abs())
        {
            status = PirlsStatus::Converged;
            break;
        }
    }

    if status == PirlsStatus::MaxIterationsReached {
        log::warn!(
            "Mode search did not converge after {} iterations",
            options.max_iterations
        );
    }

    let (weights, _) = update_glm_vectors(y, &eta, link);
    let hessian = penalized_information(x, &weights, &precision);
    Ok(ModeResult {
        beta: Coefficients::new(beta),
        hessian,
        log_posterior: current,
        iterations,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bayes::link::normal_pdf;
    use crate::bayes::prior::PriorConfig;
    use approx::assert_abs_diff_eq;

    fn toy_problem() -> (Array2<f64>, Array1<f64>) {
        let n = 40;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 { 1.0 } else { (i as f64 - 19.5) / 10.0 }
        });
        // Overlapping classes so the unpenalized MLE is finite too.
        let y = Array1::from_shape_fn(n, |i| {
            let pattern = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
            if i < 12 { 0.0 } else if i >= 28 { 1.0 } else { pattern[i % 8] }
        });
        (x, y)
    }

    fn prior(p: usize) -> SpikeSlabPrior {
        SpikeSlabPrior::from_config(&PriorConfig::default(), p).unwrap()
    }

    #[test]
    fn logit_mode_zeroes_the_penalized_score() {
        let (x, y) = toy_problem();
        let prior = prior(2);
        let mode = find_posterior_mode(
            x.view(),
            y.view(),
            &prior,
            LinkFunction::Logit,
            &ModeOptions::default(),
        )
        .unwrap();
        assert_eq!(mode.status, PirlsStatus::Converged);

        let eta = x.dot(&mode.beta.0);
        let mu = eta.mapv(|e| LinkFunction::Logit.inverse(e));
        let score = x.t().dot(&(&y - &mu)) - &mode.beta.0;
        for s in score.iter() {
            assert_abs_diff_eq!(*s, 0.0, epsilon = 1e-6);
        }
        assert!(mode.beta[1] > 0.0);
    }

    #[test]
    fn probit_mode_zeroes_the_penalized_score() {
        let (x, y) = toy_problem();
        let prior = prior(2);
        let mode = find_posterior_mode(
            x.view(),
            y.view(),
            &prior,
            LinkFunction::Probit,
            &ModeOptions::default(),
        )
        .unwrap();
        assert_eq!(mode.status, PirlsStatus::Converged);

        let eta = x.dot(&mode.beta.0);
        let mut score = -mode.beta.0.clone();
        for i in 0..eta.len() {
            let mu = LinkFunction::Probit.inverse(eta[i]);
            let factor = (y[i] - mu) * normal_pdf(eta[i]) / (mu * (1.0 - mu));
            score[0] += factor * x[(i, 0)];
            score[1] += factor * x[(i, 1)];
        }
        for s in score.iter() {
            assert_abs_diff_eq!(*s, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn separated_data_still_has_a_finite_mode() {
        let x = Array2::from_shape_fn((20, 2), |(i, j)| if j == 0 { 1.0 } else { i as f64 - 9.5 });
        let y = Array1::from_shape_fn(20, |i| if i >= 10 { 1.0 } else { 0.0 });
        let mode = find_posterior_mode(
            x.view(),
            y.view(),
            &prior(2),
            LinkFunction::Logit,
            &ModeOptions::default(),
        )
        .unwrap();
        assert!(mode.beta.iter().all(|b| b.is_finite()));
        assert!(mode.beta[1] > 0.5);
        assert!(mode.hessian.diag().iter().all(|&h| h >= 1.0));
    }
}
