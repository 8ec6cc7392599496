//! Latent-variable Gibbs kernel for the probit link.
//!
//! With `z_i ~ N(η_i, 1)` and `y_i = 1{z_i > 0}`, both full conditionals are
//! standard: `z_i` is a truncated normal and `β | z, γ` is multivariate normal
//! with precision `Ṽ = V + Γ XᵀX Γ` and mean `Ṽ⁻¹(V β0 + Γ Xᵀ z)`.

use crate::bayes::faer_ndarray::{FaerCholesky, FaerCholeskyFactor, FaerLinalgError};
use crate::bayes::link::{normal_cdf, normal_quantile};
use crate::bayes::sampler::{ChainState, PosteriorTarget, SamplerError};
use crate::bayes::types::InclusionMask;
use faer::Side;
use ndarray::{Array1, Array2, ArrayView2};
use rand::Rng;
use rand_distr::{Distribution, Exp1, Open01, StandardNormal};

/// Tail masses below this use the extreme-tail approximation.
const MIN_TAIL_MASS: f64 = 1e-300;

/// Draws `X ~ N(0, 1)` conditioned on `X > lower`.
///
/// Inverse CDF in the upper-tail form `X = −Φ⁻¹(U · Φ(−a))`, which stays
/// accurate far into the right tail. Once `Φ(−a)` underflows the draw is
/// `a + E / a` with `E ~ Exp(1)`.
pub fn sample_truncated_normal<R: Rng + ?Sized>(lower: f64, rng: &mut R) -> f64 {
    let tail = normal_cdf(-lower);
    if tail > MIN_TAIL_MASS {
        let u: f64 = rng.sample(Open01);
        let draw = -normal_quantile(u * tail);
        if draw.is_finite() {
            return draw.max(lower);
        }
    }
    let e: f64 = Exp1.sample(rng);
    lower + e / lower.max(1.0)
}

/// Mean and precision factor of `β | z, γ`.
pub struct ConditionalMoments {
    pub mean: Array1<f64>,
    pub factor: FaerCholeskyFactor,
}

/// `β | z, γ` for a design with Gram matrix `XᵀX` and `Xᵀz`.
pub fn conditional_moments(
    gram: &Array2<f64>,
    xtz: &Array1<f64>,
    precision: &Array1<f64>,
    prior_rhs: &Array1<f64>,
    gamma: &InclusionMask,
) -> Result<ConditionalMoments, FaerLinalgError> {
    let p = precision.len();
    let g = gamma.as_indicator();
    let mut posterior_precision = Array2::from_shape_fn((p, p), |(j, k)| gram[(j, k)] * g[j] * g[k]);
    for j in 0..p {
        posterior_precision[(j, j)] += precision[j];
    }
    let rhs = prior_rhs + &(&g * xtz);
    let factor = posterior_precision.cholesky(Side::Lower)?;
    let mean = factor.solve_vec(&rhs);
    Ok(ConditionalMoments { mean, factor })
}

/// Conditional moments of the coefficients given latent values `z`.
///
/// `prior_rhs` is `V β0`. With a zero prior precision and every coefficient
/// included the mean is the least-squares fit of `z` on `x`.
pub fn posterior_coefficient_moments(
    x: ArrayView2<f64>,
    z: &Array1<f64>,
    precision: &Array1<f64>,
    prior_rhs: &Array1<f64>,
    gamma: &InclusionMask,
) -> Result<ConditionalMoments, FaerLinalgError> {
    let gram = x.t().dot(&x);
    let xtz = x.t().dot(z);
    conditional_moments(&gram, &xtz, precision, prior_rhs, gamma)
}

#[derive(Debug, Clone)]
pub struct LatentGibbsKernel {
    gram: Array2<f64>,
    precision: Array1<f64>,
    prior_rhs: Array1<f64>,
    latent: Array1<f64>,
}

impl LatentGibbsKernel {
    pub fn new(target: &PosteriorTarget<'_>) -> Self {
        Self {
            gram: target.x.t().dot(&target.x),
            precision: target.prior.precision(),
            prior_rhs: target.prior.precision_weighted_mean(),
            latent: Array1::zeros(target.x.nrows()),
        }
    }

    pub fn latent(&self) -> &Array1<f64> {
        &self.latent
    }

    /// Draws `z | β, γ, y`, then `β | z, γ`, and refreshes the cached `η`.
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        target: &PosteriorTarget<'_>,
        state: &mut ChainState,
        rng: &mut R,
    ) -> Result<(), SamplerError> {
        for i in 0..self.latent.len() {
            let eta = state.eta[i];
            self.latent[i] = if target.y[i] > 0.5 {
                eta + sample_truncated_normal(-eta, rng)
            } else {
                eta - sample_truncated_normal(eta, rng)
            };
        }

        let xtz = target.x.t().dot(&self.latent);
        let moments = conditional_moments(
            &self.gram,
            &xtz,
            &self.precision,
            &self.prior_rhs,
            &state.gamma,
        )?;
        let noise = Array1::from_shape_fn(moments.mean.len(), |_| {
            let e: f64 = StandardNormal.sample(rng);
            e
        });
        state.beta.0 = &moments.mean + &moments.factor.solve_lower_transpose(&noise);
        state.refresh_eta(target.x);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bayes::link::LinkFunction;
    use crate::bayes::prior::{PriorConfig, SpikeSlabPrior};
    use crate::bayes::types::Coefficients;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn truncated_draws_respect_the_bound() {
        let mut rng = StdRng::seed_from_u64(1);
        for lower in [-5.0, -0.5, 0.0, 1.0, 4.0, 9.0, 40.0] {
            for _ in 0..200 {
                let draw = sample_truncated_normal(lower, &mut rng);
                assert!(draw.is_finite());
                assert!(draw >= lower, "{draw} < {lower}");
            }
        }
    }

    #[test]
    fn truncated_mean_matches_mills_ratio() {
        let mut rng = StdRng::seed_from_u64(2);
        let lower = 1.0;
        let n = 20_000;
        let mean = (0..n).map(|_| sample_truncated_normal(lower, &mut rng)).sum::<f64>() / n as f64;
        let expected = crate::bayes::link::normal_pdf(lower) / normal_cdf(-lower);
        assert_abs_diff_eq!(mean, expected, epsilon = 0.02);
    }

    #[test]
    fn flat_prior_reduces_to_least_squares() {
        let x = array![[1.0, 0.5], [1.0, -1.0], [1.0, 2.0], [1.0, 0.0], [1.0, 1.5]];
        let z = array![1.0, -0.5, 2.5, 0.3, 1.9];
        let moments = posterior_coefficient_moments(
            x.view(),
            &z,
            &Array1::zeros(2),
            &Array1::zeros(2),
            &InclusionMask::all_included(2),
        )
        .unwrap();

        // Closed-form simple regression.
        let n = 5.0;
        let sx: f64 = x.column(1).sum();
        let sz: f64 = z.sum();
        let sxx: f64 = x.column(1).mapv(|v| v * v).sum();
        let sxz: f64 = x.column(1).iter().zip(z.iter()).map(|(a, b)| a * b).sum();
        let slope = (n * sxz - sx * sz) / (n * sxx - sx * sx);
        let intercept = (sz - slope * sx) / n;
        assert_abs_diff_eq!(moments.mean[0], intercept, epsilon = 1e-10);
        assert_abs_diff_eq!(moments.mean[1], slope, epsilon = 1e-10);
    }

    #[test]
    fn excluded_coordinates_follow_their_prior() {
        let x = array![[1.0, 0.5], [1.0, -1.0], [1.0, 2.0]];
        let z = array![1.0, -0.5, 2.5];
        let moments = posterior_coefficient_moments(
            x.view(),
            &z,
            &array![1.0, 4.0],
            &array![0.0, 4.0 * 0.75],
            &InclusionMask(vec![true, false]),
        )
        .unwrap();
        assert_abs_diff_eq!(moments.mean[1], 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(moments.factor.lower()[(1, 1)], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn kernel_draws_latents_with_the_right_sign() {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| if j == 0 { 1.0 } else { i as f64 / 20.0 - 1.0 });
        let y = Array1::from_shape_fn(40, |i| if i % 3 == 0 { 1.0 } else { 0.0 });
        let prior = SpikeSlabPrior::from_config(&PriorConfig::default(), 2).unwrap();
        let target = PosteriorTarget::new(x.view(), y.view(), &prior, LinkFunction::Probit).unwrap();
        let mut state = ChainState::new(&target, Coefficients::zeros(2));
        let mut kernel = LatentGibbsKernel::new(&target);
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..20 {
            kernel.update(&target, &mut state, &mut rng).unwrap();
            for (z, label) in kernel.latent().iter().zip(y.iter()) {
                if *label > 0.5 {
                    assert!(*z >= 0.0);
                } else {
                    assert!(*z <= 0.0);
                }
            }
        }
        let fresh = x.dot(&state.beta.0);
        for (a, b) in state.eta.iter().zip(fresh.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
        }
    }
}
