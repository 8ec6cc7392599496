//! # Posterior sampler
//!
//! Drives one or more Markov chains over `(β, γ, w)`.
//!
//! Each iteration updates the coefficients with a link-specific kernel
//! ([`MetropolisKernel`] for logit, [`LatentGibbsKernel`] for probit), the
//! inclusion indicators from their Bernoulli full conditionals and the shared
//! inclusion rate from its conjugate Beta. Iterations up to `burn_in` are
//! discarded, every `thin`-th iteration afterwards is recorded.
//!
//! Chains are independent and run on the rayon pool. Every chain owns its
//! state, kernel, draw buffer and `StdRng`; the design matrix, labels and
//! prior are shared read-only through [`PosteriorTarget`].

use crate::bayes::data::{DataError, validate_design};
use crate::bayes::faer_ndarray::FaerLinalgError;
use crate::bayes::gibbs::LatentGibbsKernel;
use crate::bayes::link::{LinkFunction, logistic};
use crate::bayes::metropolis::MetropolisKernel;
use crate::bayes::pirls::{ModeOptions, find_posterior_mode};
use crate::bayes::prior::{PriorError, SpikeSlabPrior, clamp_probability};
use crate::bayes::progress::{ChainPhase, SamplingProgress};
use crate::bayes::types::{Coefficients, InclusionMask, LinearPredictor};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Open01;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Spacing between per-chain seeds (the 64-bit golden ratio).
const CHAIN_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Step size used when no curvature information is available.
pub const FALLBACK_PROPOSAL_SCALE: f64 = 0.5;

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Invalid sampler configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Prior(#[from] PriorError),
    #[error("Linear algebra failure while sampling: {0}")]
    Linalg(#[from] FaerLinalgError),
    #[error("Prior has {prior} coefficients but the design matrix has {design} columns")]
    DimensionMismatch { prior: usize, design: usize },
}

/// Starting point of every chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainInit {
    /// `β = 0`.
    #[default]
    Zero,
    /// The penalized posterior mode of the full model.
    Mode,
}

/// Random-walk proposal settings for the logit kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalConfig {
    /// Fixed initial step size for every coefficient. When absent the step
    /// sizes come from the curvature at the posterior mode.
    pub initial_scale: Option<f64>,
    /// Adapt step sizes during burn-in.
    pub adapt: bool,
    pub target_acceptance: f64,
    /// Metropolis passes over the coefficients per iteration.
    pub sweeps: usize,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            initial_scale: None,
            adapt: true,
            target_acceptance: 0.44,
            sweeps: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub link: LinkFunction,
    /// Total iterations per chain, burn-in included.
    pub iterations: usize,
    pub burn_in: usize,
    pub thin: usize,
    pub seed: u64,
    pub chains: usize,
    pub init: ChainInit,
    /// Wall-clock cap per run; chains stop early and keep what they have.
    pub max_seconds: Option<f64>,
    pub proposal: ProposalConfig,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            link: LinkFunction::Logit,
            iterations: 5000,
            burn_in: 1000,
            thin: 1,
            seed: 42,
            chains: 1,
            init: ChainInit::Zero,
            max_seconds: None,
            proposal: ProposalConfig::default(),
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<(), SamplerError> {
        let fail = |msg: String| Err(SamplerError::InvalidConfig(msg));
        if self.iterations <= self.burn_in {
            return fail(format!(
                "iterations ({}) must exceed burn_in ({})",
                self.iterations, self.burn_in
            ));
        }
        if self.thin == 0 {
            return fail("thin must be at least 1".to_string());
        }
        if self.retained_per_chain() == 0 {
            return fail(format!(
                "thin ({}) leaves no draws after burn-in",
                self.thin
            ));
        }
        if self.chains == 0 {
            return fail("chains must be at least 1".to_string());
        }
        if self.proposal.sweeps == 0 {
            return fail("proposal.sweeps must be at least 1".to_string());
        }
        let target = self.proposal.target_acceptance;
        if !(target > 0.0 && target < 1.0) {
            return fail(format!("proposal.target_acceptance must lie in (0, 1), got {target}"));
        }
        if let Some(scale) = self.proposal.initial_scale {
            if !(scale.is_finite() && scale > 0.0) {
                return fail(format!("proposal.initial_scale must be positive, got {scale}"));
            }
        }
        if let Some(seconds) = self.max_seconds {
            if !(seconds.is_finite() && seconds > 0.0) {
                return fail(format!("max_seconds must be positive, got {seconds}"));
            }
        }
        Ok(())
    }

    /// Draws kept by a chain that runs to completion.
    pub fn retained_per_chain(&self) -> usize {
        if self.thin == 0 {
            return 0;
        }
        self.iterations.saturating_sub(self.burn_in) / self.thin
    }

    pub fn chain_seed(&self, chain: usize) -> u64 {
        self.seed
            .wrapping_add((chain as u64).wrapping_mul(CHAIN_SEED_STRIDE))
    }
}

/// Read-only inputs shared by every chain.
pub struct PosteriorTarget<'a> {
    pub x: ArrayView2<'a, f64>,
    pub y: ArrayView1<'a, f64>,
    pub prior: &'a SpikeSlabPrior,
    pub link: LinkFunction,
}

impl<'a> PosteriorTarget<'a> {
    pub fn new(
        x: ArrayView2<'a, f64>,
        y: ArrayView1<'a, f64>,
        prior: &'a SpikeSlabPrior,
        link: LinkFunction,
    ) -> Result<Self, SamplerError> {
        validate_design(x, y)?;
        if prior.num_coefficients() != x.ncols() {
            return Err(SamplerError::DimensionMismatch {
                prior: prior.num_coefficients(),
                design: x.ncols(),
            });
        }
        Ok(Self { x, y, prior, link })
    }

    pub fn num_coefficients(&self) -> usize {
        self.x.ncols()
    }

    pub fn log_likelihood(&self, eta: &Array1<f64>) -> f64 {
        self.y
            .iter()
            .zip(eta.iter())
            .map(|(&yi, &ei)| self.link.log_likelihood(yi, ei))
            .sum()
    }

    /// Log-likelihood after adding `delta · X[:, column]` to `eta`, in O(n)
    /// without touching `eta`.
    pub fn log_likelihood_shifted(&self, eta: &Array1<f64>, column: usize, delta: f64) -> f64 {
        let xj = self.x.column(column);
        let mut total = 0.0;
        for i in 0..eta.len() {
            total += self.link.log_likelihood(self.y[i], eta[i] + delta * xj[i]);
        }
        total
    }
}

/// The mutable state of one chain.
#[derive(Debug, Clone)]
pub struct ChainState {
    pub beta: Coefficients,
    pub gamma: InclusionMask,
    pub inclusion_probability: f64,
    /// Cached `X (γ ⊙ β)`; every update keeps it in sync.
    pub eta: LinearPredictor,
}

impl ChainState {
    /// `γ = 1`, `w` at its prior mean.
    pub fn new(target: &PosteriorTarget<'_>, beta: Coefficients) -> Self {
        let gamma = InclusionMask::all_included(target.num_coefficients());
        let eta = LinearPredictor::from_design(target.x, &beta, &gamma);
        Self {
            beta,
            gamma,
            inclusion_probability: target.prior.inclusion_prior_mean(),
            eta,
        }
    }

    pub fn refresh_eta(&mut self, x: ArrayView2<f64>) {
        self.eta = LinearPredictor::from_design(x, &self.beta, &self.gamma);
    }

    /// Contribution of coefficient `j` to the linear predictor.
    #[inline]
    pub fn active_value(&self, j: usize) -> f64 {
        if self.gamma.is_included(j) { self.beta[j] } else { 0.0 }
    }
}

/// Gibbs update of every selectable `γ_j` from
/// `logit P(γ_j = 1 | ·) = ln w − ln(1 − w) + ℓ(γ_j = 1) − ℓ(γ_j = 0)`.
pub fn update_inclusion<R: Rng + ?Sized>(
    target: &PosteriorTarget<'_>,
    state: &mut ChainState,
    rng: &mut R,
) {
    let w = clamp_probability(state.inclusion_probability);
    let prior_log_odds = w.ln() - (1.0 - w).ln();
    for j in 0..target.num_coefficients() {
        if !target.prior.is_selectable(j) {
            continue;
        }
        let current = state.active_value(j);
        let beta_j = state.beta[j];
        let xj = target.x.column(j);
        let mut ll_in = 0.0;
        let mut ll_out = 0.0;
        for i in 0..xj.len() {
            let base = state.eta[i] - current * xj[i];
            ll_out += target.link.log_likelihood(target.y[i], base);
            ll_in += target.link.log_likelihood(target.y[i], base + beta_j * xj[i]);
        }
        let probability = logistic(prior_log_odds + ll_in - ll_out);
        let u: f64 = rng.sample(Open01);
        let include = u < probability;
        if include != state.gamma.is_included(j) {
            let shift = if include { beta_j } else { -beta_j };
            state.eta.scaled_add(shift, &xj);
            state.gamma.set(j, include);
        }
    }
}

/// Draws `w | γ` from its conjugate Beta. A no-op when nothing is selectable.
pub fn update_inclusion_probability<R: Rng + ?Sized>(
    target: &PosteriorTarget<'_>,
    state: &mut ChainState,
    rng: &mut R,
) -> Result<(), SamplerError> {
    if target.prior.num_selectable() > 0 {
        state.inclusion_probability = target
            .prior
            .sample_inclusion_probability(&state.gamma, rng)?;
    }
    Ok(())
}

/// Coefficient update strategy, chosen by the link.
pub enum Kernel {
    Metropolis(MetropolisKernel),
    Gibbs(LatentGibbsKernel),
}

impl Kernel {
    /// One full iteration. Logit updates β then γ; probit updates γ with the
    /// latent variables integrated out, then z, then β. Both finish with `w`.
    pub fn step<R: Rng + ?Sized>(
        &mut self,
        target: &PosteriorTarget<'_>,
        state: &mut ChainState,
        rng: &mut R,
        adapting: bool,
    ) -> Result<(), SamplerError> {
        match self {
            Kernel::Metropolis(kernel) => {
                kernel.update_coefficients(target, state, rng, adapting);
                update_inclusion(target, state, rng);
            }
            Kernel::Gibbs(kernel) => {
                update_inclusion(target, state, rng);
                kernel.update(target, state, rng)?;
            }
        }
        update_inclusion_probability(target, state, rng)
    }
}

/// Retained draws of one chain, in iteration order.
#[derive(Debug, Clone)]
pub struct ChainDraws {
    pub chain: usize,
    /// `[draws, p]`.
    pub beta: Array2<f64>,
    /// `[draws, p]`.
    pub gamma: Array2<bool>,
    pub inclusion_probability: Vec<f64>,
    pub log_likelihood: Vec<f64>,
    /// Post-burn-in Metropolis acceptance rate per coefficient; `None` for a
    /// coefficient that was never proposed.
    pub acceptance_rates: Option<Vec<Option<f64>>>,
    pub proposal_scales: Option<Vec<f64>>,
    pub terminated_early: bool,
}

impl ChainDraws {
    pub fn num_draws(&self) -> usize {
        self.beta.nrows()
    }

    /// `γ ⊙ β` per draw.
    pub fn effects(&self) -> Array2<f64> {
        Array2::from_shape_fn(self.beta.dim(), |idx| {
            if self.gamma[idx] { self.beta[idx] } else { 0.0 }
        })
    }
}

/// Every chain of a run.
#[derive(Debug, Clone)]
pub struct PosteriorDraws {
    pub chains: Vec<ChainDraws>,
    pub link: LinkFunction,
}

impl PosteriorDraws {
    pub fn num_coefficients(&self) -> usize {
        self.chains.first().map_or(0, |c| c.beta.ncols())
    }

    pub fn num_draws(&self) -> usize {
        self.chains.iter().map(ChainDraws::num_draws).sum()
    }

    pub fn terminated_early(&self) -> bool {
        self.chains.iter().any(|c| c.terminated_early)
    }

    /// Chains stacked in order.
    pub fn pooled_beta(&self) -> Array2<f64> {
        stack_rows(self.chains.iter().map(|c| &c.beta), self.num_coefficients())
    }

    pub fn pooled_gamma(&self) -> Array2<bool> {
        stack_rows(self.chains.iter().map(|c| &c.gamma), self.num_coefficients())
    }

    pub fn pooled_effects(&self) -> Array2<f64> {
        let effects: Vec<Array2<f64>> = self.chains.iter().map(ChainDraws::effects).collect();
        stack_rows(effects.iter(), self.num_coefficients())
    }

    pub fn pooled_inclusion_probability(&self) -> Vec<f64> {
        self.chains
            .iter()
            .flat_map(|c| c.inclusion_probability.iter().copied())
            .collect()
    }
}

fn stack_rows<'a, T: Clone + Default + 'a>(
    blocks: impl Iterator<Item = &'a Array2<T>> + Clone,
    cols: usize,
) -> Array2<T> {
    let total = blocks.clone().map(|b| b.nrows()).sum();
    let mut out = Array2::from_elem((total, cols), T::default());
    let mut offset = 0;
    for block in blocks {
        let rows = block.nrows();
        out.slice_mut(s![offset..offset + rows, ..]).assign(block);
        offset += rows;
    }
    out
}

/// Chain-independent setup shared by every chain: the start point and the
/// initial proposal scales.
#[derive(Debug, Clone)]
pub struct ChainSetup {
    pub initial_beta: Coefficients,
    pub proposal_scales: Array1<f64>,
}

impl ChainSetup {
    /// Runs the mode search when the configuration needs it. A failed search
    /// falls back to `β = 0` and fixed step sizes.
    pub fn prepare(target: &PosteriorTarget<'_>, config: &SamplerConfig) -> Self {
        let p = target.num_coefficients();
        let wants_curvature =
            target.link == LinkFunction::Logit && config.proposal.initial_scale.is_none();
        let mode = if config.init == ChainInit::Mode || wants_curvature {
            match find_posterior_mode(
                target.x,
                target.y,
                target.prior,
                target.link,
                &ModeOptions::default(),
            ) {
                Ok(mode) => {
                    log::info!(
                        "Posterior mode found in {} iterations ({:?}), log posterior {:.4}",
                        mode.iterations,
                        mode.status,
                        mode.log_posterior
                    );
                    Some(mode)
                }
                Err(e) => {
                    log::warn!("Posterior mode search failed ({e}); using default start and step sizes");
                    None
                }
            }
        } else {
            None
        };

        let initial_beta = match (&mode, config.init) {
            (Some(mode), ChainInit::Mode) => mode.beta.clone(),
            _ => Coefficients::zeros(p),
        };
        let proposal_scales = match (config.proposal.initial_scale, &mode) {
            (Some(scale), _) => Array1::from_elem(p, scale),
            (None, Some(mode)) => mode.hessian.diag().mapv(|h| {
                if h.is_finite() && h > 0.0 {
                    2.4 / h.sqrt()
                } else {
                    FALLBACK_PROPOSAL_SCALE
                }
            }),
            (None, None) => Array1::from_elem(p, FALLBACK_PROPOSAL_SCALE),
        };
        Self {
            initial_beta,
            proposal_scales,
        }
    }
}

/// Runs a single chain to completion or until `deadline`.
pub fn run_chain(
    target: &PosteriorTarget<'_>,
    config: &SamplerConfig,
    setup: &ChainSetup,
    chain: usize,
    deadline: Option<Instant>,
    progress: &dyn SamplingProgress,
) -> Result<ChainDraws, SamplerError> {
    let p = target.num_coefficients();
    let mut rng = StdRng::seed_from_u64(config.chain_seed(chain));
    let mut state = ChainState::new(target, setup.initial_beta.clone());
    let mut kernel = match target.link {
        LinkFunction::Logit => Kernel::Metropolis(MetropolisKernel::new(
            setup.proposal_scales.clone(),
            &config.proposal,
        )),
        LinkFunction::Probit => Kernel::Gibbs(LatentGibbsKernel::new(target)),
    };

    let capacity = config.retained_per_chain();
    let mut beta_draws = Array2::<f64>::zeros((capacity, p));
    let mut gamma_draws = Array2::from_elem((capacity, p), false);
    let mut w_trace = Vec::with_capacity(capacity);
    let mut ll_trace = Vec::with_capacity(capacity);
    let mut kept = 0;
    let mut terminated_early = false;
    let report_every = (config.iterations / 100).max(1);

    progress.on_chain_start(chain, config.iterations);
    for iteration in 1..=config.iterations {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::warn!(
                "Chain {chain} hit the time limit after {} of {} iterations; keeping {kept} draws",
                iteration - 1,
                config.iterations
            );
            terminated_early = true;
            break;
        }

        let adapting = iteration <= config.burn_in;
        kernel.step(target, &mut state, &mut rng, adapting)?;

        if !adapting && (iteration - config.burn_in) % config.thin == 0 && kept < capacity {
            beta_draws.row_mut(kept).assign(&state.beta.0);
            for j in 0..p {
                gamma_draws[(kept, j)] = state.gamma.is_included(j);
            }
            w_trace.push(state.inclusion_probability);
            ll_trace.push(target.log_likelihood(&state.eta));
            kept += 1;
        }

        if iteration % report_every == 0 || iteration == config.iterations {
            let phase = if adapting {
                ChainPhase::BurnIn
            } else {
                ChainPhase::Sampling
            };
            progress.on_chain_advance(chain, phase, iteration);
        }
    }
    progress.on_chain_finish(chain);

    let (acceptance_rates, proposal_scales) = match &kernel {
        Kernel::Metropolis(kernel) => (
            Some(kernel.acceptance_rates()),
            Some(kernel.scales().to_vec()),
        ),
        Kernel::Gibbs(_) => (None, None),
    };
    log::debug!("Chain {chain} finished with {kept} retained draws");

    Ok(ChainDraws {
        chain,
        beta: beta_draws.slice(s![..kept, ..]).to_owned(),
        gamma: gamma_draws.slice(s![..kept, ..]).to_owned(),
        inclusion_probability: w_trace,
        log_likelihood: ll_trace,
        acceptance_rates,
        proposal_scales,
        terminated_early,
    })
}

/// Validates the inputs and runs `config.chains` chains in parallel.
pub fn run_chains<'a>(
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    prior: &'a SpikeSlabPrior,
    config: &SamplerConfig,
    progress: &dyn SamplingProgress,
) -> Result<PosteriorDraws, SamplerError> {
    config.validate()?;
    let target = PosteriorTarget::new(x, y, prior, config.link)?;
    let setup = ChainSetup::prepare(&target, config);
    let deadline = config
        .max_seconds
        .map(|secs| Instant::now() + Duration::from_secs_f64(secs));

    log::info!(
        "Sampling {} chain(s) of {} iterations ({} burn-in, thin {}) with the {} link",
        config.chains,
        config.iterations,
        config.burn_in,
        config.thin,
        config.link
    );

    let chains = (0..config.chains)
        .into_par_iter()
        .map(|chain| run_chain(&target, config, &setup, chain, deadline, progress))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PosteriorDraws {
        chains,
        link: config.link,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bayes::progress::NoopProgress;
    use crate::bayes::prior::{PriorConfig, SelectionMode};
    use ndarray::array;

    fn small_problem() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((30, 3), |(i, j)| match j {
            0 => 1.0,
            1 => ((i * 7) % 11) as f64 / 5.0 - 1.0,
            _ => ((i * 5) % 13) as f64 / 6.0 - 1.0,
        });
        let y = Array1::from_shape_fn(30, |i| if (i * 3) % 5 < 2 { 1.0 } else { 0.0 });
        (x, y)
    }

    #[test]
    fn config_validation_catches_bad_settings() {
        let mut config = SamplerConfig {
            iterations: 100,
            burn_in: 100,
            ..SamplerConfig::default()
        };
        assert!(config.validate().is_err());
        config.burn_in = 10;
        config.thin = 0;
        assert!(config.validate().is_err());
        config.thin = 200;
        assert!(config.validate().is_err());
        config.thin = 3;
        assert!(config.validate().is_ok());
        assert_eq!(config.retained_per_chain(), 30);
        config.proposal.target_acceptance = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn chain_seeds_are_distinct() {
        let config = SamplerConfig::default();
        assert_eq!(config.chain_seed(0), 42);
        assert_ne!(config.chain_seed(1), config.chain_seed(2));
    }

    #[test]
    fn inclusion_step_keeps_cached_eta_in_sync() {
        let (x, y) = small_problem();
        let prior = SpikeSlabPrior::from_config(&PriorConfig::default(), 3).unwrap();
        let target = PosteriorTarget::new(x.view(), y.view(), &prior, LinkFunction::Logit).unwrap();
        let mut state = ChainState::new(&target, Coefficients::new(array![0.2, -1.5, 0.8]));
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            update_inclusion(&target, &mut state, &mut rng);
            let fresh = LinearPredictor::from_design(x.view(), &state.beta, &state.gamma);
            for (a, b) in state.eta.iter().zip(fresh.iter()) {
                assert!((a - b).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn unselectable_coefficients_stay_included() {
        let (x, y) = small_problem();
        let prior = SpikeSlabPrior::from_config(
            &PriorConfig {
                selection: SelectionMode::Off,
                ..PriorConfig::default()
            },
            3,
        )
        .unwrap();
        for link in [LinkFunction::Logit, LinkFunction::Probit] {
            let config = SamplerConfig {
                link,
                iterations: 200,
                burn_in: 50,
                ..SamplerConfig::default()
            };
            let draws = run_chains(x.view(), y.view(), &prior, &config, &NoopProgress).unwrap();
            assert_eq!(draws.num_draws(), 150);
            assert!(draws.pooled_gamma().iter().all(|&g| g));
            assert!(draws.chains[0].inclusion_probability.iter().all(|&w| w == 0.5));
        }
    }

    #[test]
    fn same_seed_reproduces_the_chain() {
        let (x, y) = small_problem();
        let prior = SpikeSlabPrior::from_config(&PriorConfig::default(), 3).unwrap();
        let config = SamplerConfig {
            iterations: 300,
            burn_in: 100,
            thin: 2,
            chains: 2,
            ..SamplerConfig::default()
        };
        let first = run_chains(x.view(), y.view(), &prior, &config, &NoopProgress).unwrap();
        let second = run_chains(x.view(), y.view(), &prior, &config, &NoopProgress).unwrap();
        assert_eq!(first.pooled_beta(), second.pooled_beta());
        assert_eq!(first.pooled_gamma(), second.pooled_gamma());
        assert_eq!(first.chains[0].num_draws(), 100);
        assert_ne!(
            first.chains[0].beta.row(99).to_vec(),
            first.chains[1].beta.row(99).to_vec()
        );
    }

    #[test]
    fn mismatched_prior_is_rejected() {
        let (x, y) = small_problem();
        let prior = SpikeSlabPrior::from_config(&PriorConfig::default(), 2).unwrap();
        let result = run_chains(
            x.view(),
            y.view(),
            &prior,
            &SamplerConfig::default(),
            &NoopProgress,
        );
        assert!(matches!(
            result,
            Err(SamplerError::DimensionMismatch { prior: 2, design: 3 })
        ));
    }

    #[test]
    fn pooled_effects_zero_excluded_draws() {
        let draws = ChainDraws {
            chain: 0,
            beta: array![[1.0, 2.0], [3.0, 4.0]],
            gamma: array![[true, false], [false, true]],
            inclusion_probability: vec![0.5, 0.5],
            log_likelihood: vec![-1.0, -1.0],
            acceptance_rates: None,
            proposal_scales: None,
            terminated_early: false,
        };
        let posterior = PosteriorDraws {
            chains: vec![draws.clone(), draws],
            link: LinkFunction::Logit,
        };
        let effects = posterior.pooled_effects();
        assert_eq!(effects.nrows(), 4);
        assert_eq!(effects.row(0).to_vec(), vec![1.0, 0.0]);
        assert_eq!(effects.row(3).to_vec(), vec![0.0, 4.0]);
    }
}
