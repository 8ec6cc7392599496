//! Component-wise random-walk Metropolis for the logit coefficients.
//!
//! Included coefficients get a symmetric Gaussian proposal each; excluded
//! coefficients have no likelihood contribution, so their full conditional is
//! the slab prior and they are drawn from it directly.
//!
//! Step sizes adapt in batches during burn-in only and are frozen afterwards.

use crate::bayes::sampler::{ChainState, PosteriorTarget, ProposalConfig};
use ndarray::Array1;
use rand::Rng;
use rand_distr::{Distribution, Open01, StandardNormal};

pub const ADAPTATION_BATCH: usize = 50;
const MAX_LOG_SCALE_STEP: f64 = 0.25;
const MIN_SCALE: f64 = 1e-4;
const MAX_SCALE: f64 = 1e2;

#[derive(Debug, Clone)]
pub struct MetropolisKernel {
    scales: Array1<f64>,
    sweeps: usize,
    adapt: bool,
    target_acceptance: f64,
    batch_accepted: Vec<usize>,
    batch_proposed: Vec<usize>,
    batch_iterations: usize,
    batches_completed: usize,
    accepted: Vec<usize>,
    proposed: Vec<usize>,
}

impl MetropolisKernel {
    pub fn new(initial_scales: Array1<f64>, config: &ProposalConfig) -> Self {
        let p = initial_scales.len();
        Self {
            scales: initial_scales,
            sweeps: config.sweeps.max(1),
            adapt: config.adapt,
            target_acceptance: config.target_acceptance,
            batch_accepted: vec![0; p],
            batch_proposed: vec![0; p],
            batch_iterations: 0,
            batches_completed: 0,
            accepted: vec![0; p],
            proposed: vec![0; p],
        }
    }

    pub fn scales(&self) -> &Array1<f64> {
        &self.scales
    }

    /// Acceptance rate per coefficient over the non-adapting iterations.
    pub fn acceptance_rates(&self) -> Vec<Option<f64>> {
        self.accepted
            .iter()
            .zip(&self.proposed)
            .map(|(&a, &n)| (n > 0).then(|| a as f64 / n as f64))
            .collect()
    }

    pub fn update_coefficients<R: Rng + ?Sized>(
        &mut self,
        target: &PosteriorTarget<'_>,
        state: &mut ChainState,
        rng: &mut R,
        adapting: bool,
    ) {
        let p = target.num_coefficients();
        for _ in 0..self.sweeps {
            let mut ll_current = target.log_likelihood(&state.eta);
            for j in 0..p {
                if !state.gamma.is_included(j) {
                    state.beta[j] = target.prior.sample_slab(j, rng);
                    continue;
                }
                let current = state.beta[j];
                let noise: f64 = StandardNormal.sample(rng);
                let proposal = current + self.scales[j] * noise;
                let delta = proposal - current;

                let ll_proposal = target.log_likelihood_shifted(&state.eta, j, delta);
                let log_ratio = ll_proposal - ll_current
                    + target.prior.log_slab_density(j, proposal)
                    - target.prior.log_slab_density(j, current);

                let u: f64 = rng.sample(Open01);
                let accept = log_ratio.is_finite() && u.ln() < log_ratio;
                if accept {
                    state.beta[j] = proposal;
                    state.eta.scaled_add(delta, &target.x.column(j));
                    ll_current = ll_proposal;
                }

                if adapting {
                    self.batch_proposed[j] += 1;
                    self.batch_accepted[j] += usize::from(accept);
                } else {
                    self.proposed[j] += 1;
                    self.accepted[j] += usize::from(accept);
                }
            }
        }

        if adapting && self.adapt {
            self.batch_iterations += 1;
            if self.batch_iterations == ADAPTATION_BATCH {
                self.adapt_scales();
            }
        }
    }

    /// Moves each log step size by `min(0.25, 1/√batch)` toward the target
    /// acceptance rate.
    fn adapt_scales(&mut self) {
        self.batches_completed += 1;
        let step = MAX_LOG_SCALE_STEP.min(1.0 / (self.batches_completed as f64).sqrt());
        for j in 0..self.scales.len() {
            let proposed = self.batch_proposed[j];
            if proposed > 0 {
                let rate = self.batch_accepted[j] as f64 / proposed as f64;
                let direction = if rate > self.target_acceptance { step } else { -step };
                self.scales[j] = (self.scales[j] * direction.exp()).clamp(MIN_SCALE, MAX_SCALE);
            }
            self.batch_accepted[j] = 0;
            self.batch_proposed[j] = 0;
        }
        self.batch_iterations = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bayes::link::LinkFunction;
    use crate::bayes::prior::{PriorConfig, SpikeSlabPrior};
    use crate::bayes::types::{Coefficients, InclusionMask, LinearPredictor};
    use ndarray::{Array2, array};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn problem() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((50, 2), |(i, j)| {
            if j == 0 { 1.0 } else { (i as f64 - 24.5) / 12.0 }
        });
        let y = Array1::from_shape_fn(50, |i| if (i * 7) % 10 < 4 + i / 10 { 1.0 } else { 0.0 });
        (x, y)
    }

    #[test]
    fn eta_tracks_accepted_moves() {
        let (x, y) = problem();
        let prior = SpikeSlabPrior::from_config(&PriorConfig::default(), 2).unwrap();
        let target = PosteriorTarget::new(x.view(), y.view(), &prior, LinkFunction::Logit).unwrap();
        let mut state = ChainState::new(&target, Coefficients::zeros(2));
        let mut kernel = MetropolisKernel::new(array![0.5, 0.5], &ProposalConfig::default());
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            kernel.update_coefficients(&target, &mut state, &mut rng, false);
        }
        let fresh = LinearPredictor::from_design(x.view(), &state.beta, &state.gamma);
        for (a, b) in state.eta.iter().zip(fresh.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
        let rates = kernel.acceptance_rates();
        assert!(rates.iter().all(|r| r.is_some_and(|v| v > 0.0 && v < 1.0)));
    }

    #[test]
    fn excluded_coefficients_are_drawn_from_the_slab() {
        let (x, y) = problem();
        let prior = SpikeSlabPrior::from_config(
            &PriorConfig {
                slab_mean: 3.0,
                slab_variance: 0.01,
                ..PriorConfig::default()
            },
            2,
        )
        .unwrap();
        let target = PosteriorTarget::new(x.view(), y.view(), &prior, LinkFunction::Logit).unwrap();
        let mut state = ChainState::new(&target, Coefficients::zeros(2));
        state.gamma = InclusionMask(vec![true, false]);
        state.refresh_eta(x.view());
        let mut kernel = MetropolisKernel::new(array![0.1, 0.1], &ProposalConfig::default());
        let mut rng = StdRng::seed_from_u64(5);
        kernel.update_coefficients(&target, &mut state, &mut rng, false);
        assert!((state.beta[1] - 3.0).abs() < 0.5);
        assert_eq!(kernel.acceptance_rates()[1], None);
    }

    #[test]
    fn adaptation_shrinks_oversized_steps_and_then_freezes() {
        let (x, y) = problem();
        let prior = SpikeSlabPrior::from_config(&PriorConfig::default(), 2).unwrap();
        let target = PosteriorTarget::new(x.view(), y.view(), &prior, LinkFunction::Logit).unwrap();
        let mut state = ChainState::new(&target, Coefficients::zeros(2));
        let mut kernel = MetropolisKernel::new(array![20.0, 20.0], &ProposalConfig::default());
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..(4 * ADAPTATION_BATCH) {
            kernel.update_coefficients(&target, &mut state, &mut rng, true);
        }
        assert!(kernel.scales().iter().all(|&s| s < 20.0));
        let frozen = kernel.scales().clone();
        for _ in 0..ADAPTATION_BATCH {
            kernel.update_coefficients(&target, &mut state, &mut rng, false);
        }
        assert_eq!(kernel.scales(), &frozen);
    }
}
