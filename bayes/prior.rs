//! Spike-and-slab prior over `(β, γ, w)`.
//!
//! * `β_j ~ Normal(β0_j, σ0_j²)`, independent of `γ_j`. An excluded coefficient
//!   keeps a value drawn from its slab, but the likelihood only sees `γ_j β_j`.
//! * `γ_j ~ Bernoulli(w)` for every selectable coefficient.
//! * `w ~ Beta(a, b)`, shared, so the inclusion rate is learned from the data.

use crate::bayes::types::{Coefficients, InclusionMask};
use ndarray::Array1;
use rand::Rng;
use rand_distr::{Beta, Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use statrs::function::beta::ln_beta;
use std::f64::consts::PI;
use thiserror::Error;

/// Which coefficients carry an inclusion indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionMode {
    /// Every coefficient, including the intercept.
    #[default]
    All,
    /// Column 0 is always included.
    ExceptIntercept,
    /// No selection: a plain Bayesian GLM with every `γ_j = 1`.
    Off,
}

/// User-facing prior hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorConfig {
    pub slab_mean: f64,
    pub slab_variance: f64,
    /// Per-coefficient slab means; overrides `slab_mean` when present.
    pub slab_means: Option<Vec<f64>>,
    /// Per-coefficient slab variances; overrides `slab_variance` when present.
    pub slab_variances: Option<Vec<f64>>,
    pub inclusion_alpha: f64,
    pub inclusion_beta: f64,
    pub selection: SelectionMode,
}

impl Default for PriorConfig {
    fn default() -> Self {
        Self {
            slab_mean: 0.0,
            slab_variance: 1.0,
            slab_means: None,
            slab_variances: None,
            inclusion_alpha: 1.0,
            inclusion_beta: 1.0,
            selection: SelectionMode::All,
        }
    }
}

#[derive(Error, Debug)]
pub enum PriorError {
    #[error("Slab variance for coefficient {index} must be positive and finite, got {value}")]
    InvalidSlabVariance { index: usize, value: f64 },
    #[error("Slab mean for coefficient {index} must be finite, got {value}")]
    InvalidSlabMean { index: usize, value: f64 },
    #[error("Beta hyperparameters must be positive and finite, got a={alpha}, b={beta}")]
    InvalidInclusionHyperparameters { alpha: f64, beta: f64 },
    #[error("Prior supplies {found} per-coefficient values but the design has {expected} columns")]
    LengthMismatch { expected: usize, found: usize },
    #[error("Cannot sample the inclusion probability: {0}")]
    BetaSampling(String),
}

/// The resolved prior for a design with `p` columns.
#[derive(Debug, Clone)]
pub struct SpikeSlabPrior {
    slab_means: Array1<f64>,
    slab_variances: Array1<f64>,
    selectable: Vec<bool>,
    inclusion_alpha: f64,
    inclusion_beta: f64,
}

impl SpikeSlabPrior {
    pub fn from_config(config: &PriorConfig, num_coefficients: usize) -> Result<Self, PriorError> {
        let slab_means = expand(&config.slab_means, config.slab_mean, num_coefficients)?;
        let slab_variances =
            expand(&config.slab_variances, config.slab_variance, num_coefficients)?;

        for (index, &value) in slab_means.iter().enumerate() {
            if !value.is_finite() {
                return Err(PriorError::InvalidSlabMean { index, value });
            }
        }
        for (index, &value) in slab_variances.iter().enumerate() {
            if !(value.is_finite() && value > 0.0) {
                return Err(PriorError::InvalidSlabVariance { index, value });
            }
        }
        let (alpha, beta) = (config.inclusion_alpha, config.inclusion_beta);
        if !(alpha.is_finite() && beta.is_finite() && alpha > 0.0 && beta > 0.0) {
            return Err(PriorError::InvalidInclusionHyperparameters { alpha, beta });
        }

        let selectable = (0..num_coefficients)
            .map(|j| match config.selection {
                SelectionMode::All => true,
                SelectionMode::ExceptIntercept => j != 0,
                SelectionMode::Off => false,
            })
            .collect();

        Ok(Self {
            slab_means,
            slab_variances,
            selectable,
            inclusion_alpha: alpha,
            inclusion_beta: beta,
        })
    }

    pub fn num_coefficients(&self) -> usize {
        self.slab_means.len()
    }

    #[inline]
    pub fn is_selectable(&self, index: usize) -> bool {
        self.selectable[index]
    }

    pub fn num_selectable(&self) -> usize {
        self.selectable.iter().filter(|&&flag| flag).count()
    }

    pub fn slab_mean(&self, index: usize) -> f64 {
        self.slab_means[index]
    }

    pub fn slab_variance(&self, index: usize) -> f64 {
        self.slab_variances[index]
    }

    /// Diagonal of the prior precision matrix `V`.
    pub fn precision(&self) -> Array1<f64> {
        self.slab_variances.mapv(|v| 1.0 / v)
    }

    /// `V β0`.
    pub fn precision_weighted_mean(&self) -> Array1<f64> {
        &self.slab_means / &self.slab_variances
    }

    pub fn inclusion_alpha(&self) -> f64 {
        self.inclusion_alpha
    }

    pub fn inclusion_beta(&self) -> f64 {
        self.inclusion_beta
    }

    /// Mean of the Beta hyperprior; the chain starts here.
    pub fn inclusion_prior_mean(&self) -> f64 {
        self.inclusion_alpha / (self.inclusion_alpha + self.inclusion_beta)
    }

    pub fn log_slab_density(&self, index: usize, value: f64) -> f64 {
        let variance = self.slab_variances[index];
        let diff = value - self.slab_means[index];
        -0.5 * (2.0 * PI * variance).ln() - 0.5 * diff * diff / variance
    }

    pub fn log_coefficient_prior(&self, beta: &Coefficients) -> f64 {
        beta.iter()
            .enumerate()
            .map(|(j, &value)| self.log_slab_density(j, value))
            .sum()
    }

    /// Bernoulli log-mass of the selectable indicators.
    pub fn log_inclusion_prior(&self, mask: &InclusionMask, inclusion_probability: f64) -> f64 {
        let w = clamp_probability(inclusion_probability);
        (0..mask.len())
            .filter(|&j| self.selectable[j])
            .map(|j| if mask.is_included(j) { w.ln() } else { (1.0 - w).ln() })
            .sum()
    }

    pub fn log_inclusion_rate_prior(&self, inclusion_probability: f64) -> f64 {
        let w = clamp_probability(inclusion_probability);
        (self.inclusion_alpha - 1.0) * w.ln() + (self.inclusion_beta - 1.0) * (1.0 - w).ln()
            - ln_beta(self.inclusion_alpha, self.inclusion_beta)
    }

    /// Joint prior log-density of one chain state.
    ///
    /// The coefficient updates never evaluate this in full. Moving one
    /// included coefficient only changes its slab term, so the Metropolis
    /// ratio uses the difference of [`SpikeSlabPrior::log_slab_density`] at
    /// the two values, which equals the difference of `log_joint`.
    pub fn log_joint(
        &self,
        beta: &Coefficients,
        mask: &InclusionMask,
        inclusion_probability: f64,
    ) -> f64 {
        let mut total = self.log_coefficient_prior(beta) + self.log_inclusion_prior(mask, inclusion_probability);
        if self.num_selectable() > 0 {
            total += self.log_inclusion_rate_prior(inclusion_probability);
        }
        total
    }

    pub fn sample_slab<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> f64 {
        let noise: f64 = StandardNormal.sample(rng);
        self.slab_means[index] + self.slab_variances[index].sqrt() * noise
    }

    /// Parameters of the conjugate full conditional `w | γ`.
    pub fn inclusion_posterior(&self, mask: &InclusionMask) -> (f64, f64) {
        let active = (0..mask.len())
            .filter(|&j| self.selectable[j] && mask.is_included(j))
            .count() as f64;
        let total = self.num_selectable() as f64;
        (self.inclusion_alpha + active, self.inclusion_beta + total - active)
    }

    /// Draws `w | γ ~ Beta(a + Σγ, b + p_sel − Σγ)`.
    pub fn sample_inclusion_probability<R: Rng + ?Sized>(
        &self,
        mask: &InclusionMask,
        rng: &mut R,
    ) -> Result<f64, PriorError> {
        let (alpha, beta) = self.inclusion_posterior(mask);
        let distribution =
            Beta::new(alpha, beta).map_err(|e| PriorError::BetaSampling(e.to_string()))?;
        Ok(distribution.sample(rng))
    }
}

/// Keeps `ln w` and `ln(1 − w)` finite.
pub fn clamp_probability(w: f64) -> f64 {
    w.clamp(1e-12, 1.0 - 1e-12)
}

fn expand(
    values: &Option<Vec<f64>>,
    fallback: f64,
    len: usize,
) -> Result<Array1<f64>, PriorError> {
    match values {
        Some(values) if values.len() != len => Err(PriorError::LengthMismatch {
            expected: len,
            found: values.len(),
        }),
        Some(values) => Ok(Array1::from_vec(values.clone())),
        None => Ok(Array1::from_elem(len, fallback)),
    }
}
