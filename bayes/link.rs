//! Link functions for binary outcomes.
//!
//! Both links are symmetric CDFs, so `link(-η) = 1 - link(η)` and the
//! likelihood of a zero label is obtained by reflecting the linear predictor.
//! The normal CDF and its quantile come from `statrs` (complementary error
//! function and its inverse); every other quantity is written in a form that
//! stays finite for the full range of `f64` inputs.

use serde::{Deserialize, Serialize};
use statrs::function::erf::{erfc, erfc_inv};
use std::f64::consts::{FRAC_1_SQRT_2, PI, SQRT_2};
use std::fmt;

/// Probabilities returned by [`LinkFunction::inverse`] are clamped this far
/// away from 0 and 1.
pub const PROB_EPS: f64 = 1e-15;

/// Lower bound for a single observation's log-likelihood contribution.
pub const LOG_PROB_FLOOR: f64 = -1.0e4;

/// Below this argument `ln Φ(x)` switches to the Mills-ratio expansion.
const LOG_CDF_TAIL: f64 = -30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkFunction {
    /// Logistic CDF, sampled with Metropolis-within-Gibbs.
    Logit,
    /// Standard normal CDF, sampled with latent-variable Gibbs.
    Probit,
}

impl LinkFunction {
    /// Success probability for a linear predictor.
    pub fn inverse(self, eta: f64) -> f64 {
        let p = match self {
            LinkFunction::Logit => logistic(eta),
            LinkFunction::Probit => normal_cdf(eta),
        };
        p.clamp(PROB_EPS, 1.0 - PROB_EPS)
    }

    /// `log P(y | η)` for a 0/1 label.
    pub fn log_likelihood(self, y: f64, eta: f64) -> f64 {
        let signed = if y > 0.5 { eta } else { -eta };
        let value = match self {
            LinkFunction::Logit => log_logistic(signed),
            LinkFunction::Probit => log_normal_cdf(signed),
        };
        if value.is_nan() {
            LOG_PROB_FLOOR
        } else {
            value.max(LOG_PROB_FLOOR)
        }
    }

    /// Derivative of the mean with respect to the linear predictor.
    pub fn density(self, eta: f64) -> f64 {
        match self {
            LinkFunction::Logit => {
                let p = logistic(eta);
                p * (1.0 - p)
            }
            LinkFunction::Probit => normal_pdf(eta),
        }
    }
}

impl fmt::Display for LinkFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkFunction::Logit => f.write_str("logit"),
            LinkFunction::Probit => f.write_str("probit"),
        }
    }
}

/// Sigmoid evaluated on the side where `exp` cannot overflow.
pub fn logistic(eta: f64) -> f64 {
    if eta >= 0.0 {
        1.0 / (1.0 + (-eta).exp())
    } else {
        let e = eta.exp();
        e / (1.0 + e)
    }
}

/// `ln σ(η) = -ln(1 + e^{-η})`.
pub fn log_logistic(eta: f64) -> f64 {
    if eta >= 0.0 {
        -(-eta).exp().ln_1p()
    } else {
        eta - eta.exp().ln_1p()
    }
}

pub fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Standard normal CDF `Φ(x) = erfc(-x/√2) / 2`.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x * FRAC_1_SQRT_2)
}

/// Standard normal quantile `Φ⁻¹(p) = -√2 erfc⁻¹(2p)`.
pub fn normal_quantile(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    -SQRT_2 * erfc_inv(2.0 * p)
}

/// `ln Φ(x)`, accurate in both tails.
pub fn log_normal_cdf(x: f64) -> f64 {
    if x > 0.0 {
        (-0.5 * erfc(x * FRAC_1_SQRT_2)).ln_1p()
    } else if x > LOG_CDF_TAIL {
        normal_cdf(x).ln()
    } else {
        let inv_sq = 1.0 / (x * x);
        let series = 1.0 - inv_sq + 3.0 * inv_sq * inv_sq - 15.0 * inv_sq * inv_sq * inv_sq;
        -0.5 * x * x - (-x).ln() - 0.5 * (2.0 * PI).ln() + series.ln()
    }
}
