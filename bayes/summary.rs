//! Per-coefficient posterior summaries of the model-averaged effects `γ_j β_j`.

use crate::bayes::data::Standardizer;
use crate::bayes::diagnostics::multi_chain_ess;
use crate::bayes::predict::PredictionError;
use crate::bayes::sampler::PosteriorDraws;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub const LOWER_QUANTILE: f64 = 0.025;
pub const UPPER_QUANTILE: f64 = 0.975;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientSummary {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    pub lower: f64,
    pub upper: f64,
    /// Posterior inclusion probability, the mean of `γ_j`.
    pub inclusion_probability: f64,
    /// Mean of `β_j` over draws with `γ_j = 1`.
    pub conditional_mean: Option<f64>,
    pub ess: f64,
    /// `mean` mapped back to raw feature units.
    pub raw_scale_mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTable {
    pub rows: Vec<CoefficientSummary>,
}

/// Sample quantile with linear interpolation between order statistics.
/// `sorted` must be ascending and non-empty.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

impl SummaryTable {
    pub fn from_draws(draws: &PosteriorDraws, names: &[String]) -> Result<Self, PredictionError> {
        if draws.num_draws() == 0 {
            return Err(PredictionError::EmptyDraws);
        }
        let effects = draws.pooled_effects();
        let beta = draws.pooled_beta();
        let gamma = draws.pooled_gamma();
        let per_chain_effects: Vec<_> = draws.chains.iter().map(|c| c.effects()).collect();
        let n = effects.nrows() as f64;

        let rows = (0..draws.num_coefficients())
            .map(|j| {
                let column = effects.column(j);
                let mean = column.sum() / n;
                let sd = if effects.nrows() > 1 {
                    (column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
                } else {
                    0.0
                };
                let mut sorted = column.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));

                let included: Vec<f64> = beta
                    .column(j)
                    .iter()
                    .zip(gamma.column(j))
                    .filter_map(|(&b, &g)| g.then_some(b))
                    .collect();
                let conditional_mean = (!included.is_empty())
                    .then(|| included.iter().sum::<f64>() / included.len() as f64);

                let chains: Vec<Vec<f64>> = per_chain_effects
                    .iter()
                    .map(|e| e.column(j).to_vec())
                    .collect();

                CoefficientSummary {
                    name: names.get(j).cloned().unwrap_or_else(|| format!("beta{j}")),
                    mean,
                    sd,
                    lower: quantile_sorted(&sorted, LOWER_QUANTILE),
                    upper: quantile_sorted(&sorted, UPPER_QUANTILE),
                    inclusion_probability: included.len() as f64 / n,
                    conditional_mean,
                    ess: multi_chain_ess(&chains),
                    raw_scale_mean: None,
                }
            })
            .collect();
        Ok(Self { rows })
    }

    /// Fills `raw_scale_mean` from the posterior means. Row 0 must be the
    /// intercept.
    pub fn with_raw_scale(mut self, standardizer: &Standardizer) -> Self {
        if self.rows.len() != standardizer.num_features() + 1 {
            return self;
        }
        let means = ndarray::Array1::from_iter(self.rows.iter().map(|r| r.mean));
        let raw = standardizer.unstandardize_coefficients(means.view());
        for (row, value) in self.rows.iter_mut().zip(raw.iter()) {
            row.raw_scale_mean = Some(*value);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&CoefficientSummary> {
        self.rows.iter().find(|r| r.name == name)
    }

    pub fn write_tsv(&self, path: impl AsRef<Path>) -> Result<(), csv::Error> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)?;
        writer.write_record([
            "coefficient",
            "mean",
            "sd",
            "q2.5",
            "q97.5",
            "pip",
            "conditional_mean",
            "ess",
            "raw_scale_mean",
        ])?;
        let opt = |v: Option<f64>| v.map_or_else(|| "NA".to_string(), |v| v.to_string());
        for row in &self.rows {
            writer.write_record([
                row.name.clone(),
                row.mean.to_string(),
                row.sd.to_string(),
                row.lower.to_string(),
                row.upper.to_string(),
                row.inclusion_probability.to_string(),
                opt(row.conditional_mean),
                row.ess.to_string(),
                opt(row.raw_scale_mean),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl fmt::Display for SummaryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .rows
            .iter()
            .map(|r| r.name.len())
            .max()
            .unwrap_or(0)
            .max("coefficient".len());
        writeln!(
            f,
            "{:<width$}  {:>9}  {:>9}  {:>9}  {:>9}  {:>6}  {:>8}",
            "coefficient", "mean", "sd", "q2.5", "q97.5", "pip", "ess"
        )?;
        for r in &self.rows {
            writeln!(
                f,
                "{:<width$}  {:>9.4}  {:>9.4}  {:>9.4}  {:>9.4}  {:>6.3}  {:>8.1}",
                r.name, r.mean, r.sd, r.lower, r.upper, r.inclusion_probability, r.ess
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bayes::link::LinkFunction;
    use crate::bayes::sampler::ChainDraws;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn draws() -> PosteriorDraws {
        let beta = array![[1.0, 2.0], [2.0, -1.0], [3.0, 4.0], [4.0, 6.0]];
        let gamma = array![[true, true], [true, false], [true, true], [true, false]];
        PosteriorDraws {
            chains: vec![ChainDraws {
                chain: 0,
                beta,
                gamma,
                inclusion_probability: vec![0.5; 4],
                log_likelihood: vec![-3.0, -2.0, -2.5, -2.2],
                acceptance_rates: None,
                proposal_scales: None,
                terminated_early: false,
            }],
            link: LinkFunction::Logit,
        }
    }

    #[test]
    fn quantiles_interpolate_linearly() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_abs_diff_eq!(quantile_sorted(&sorted, 0.0), 1.0);
        assert_abs_diff_eq!(quantile_sorted(&sorted, 1.0), 4.0);
        assert_abs_diff_eq!(quantile_sorted(&sorted, 0.5), 2.5);
        assert_abs_diff_eq!(quantile_sorted(&sorted, 0.025), 1.075, epsilon = 1e-12);
        assert_abs_diff_eq!(quantile_sorted(&[7.0], 0.975), 7.0);
    }

    #[test]
    fn summary_averages_gated_effects() {
        let names = vec!["intercept".to_string(), "x".to_string()];
        let table = SummaryTable::from_draws(&draws(), &names).unwrap();
        let intercept = table.get("intercept").unwrap();
        assert_abs_diff_eq!(intercept.mean, 2.5);
        assert_abs_diff_eq!(intercept.inclusion_probability, 1.0);
        assert_abs_diff_eq!(intercept.sd, (5.0f64 / 3.0).sqrt(), epsilon = 1e-12);

        // Effects of x are [2, 0, 4, 0].
        let x = table.get("x").unwrap();
        assert_abs_diff_eq!(x.mean, 1.5);
        assert_abs_diff_eq!(x.inclusion_probability, 0.5);
        assert_abs_diff_eq!(x.conditional_mean.unwrap(), 3.0);
        assert_abs_diff_eq!(x.lower, 0.0);
        assert_abs_diff_eq!(x.upper, 3.85, epsilon = 1e-12);
    }

    #[test]
    fn raw_scale_means_undo_standardization() {
        let names = vec!["intercept".to_string(), "x".to_string()];
        let standardizer = Standardizer {
            means: vec![10.0],
            scales: vec![2.0],
        };
        let table = SummaryTable::from_draws(&draws(), &names)
            .unwrap()
            .with_raw_scale(&standardizer);
        assert_abs_diff_eq!(table.rows[1].raw_scale_mean.unwrap(), 0.75);
        assert_abs_diff_eq!(table.rows[0].raw_scale_mean.unwrap(), 2.5 - 7.5);
    }

    #[test]
    fn empty_draws_are_rejected_and_output_is_written() {
        let empty = PosteriorDraws {
            chains: vec![],
            link: LinkFunction::Probit,
        };
        assert!(matches!(
            SummaryTable::from_draws(&empty, &[]),
            Err(PredictionError::EmptyDraws)
        ));

        let table = SummaryTable::from_draws(&draws(), &[]).unwrap();
        assert_eq!(table.rows[1].name, "beta1");
        let file = tempfile::NamedTempFile::new().unwrap();
        table.write_tsv(file.path()).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.starts_with("coefficient\tmean\tsd"));
        assert_eq!(text.lines().count(), 3);
        assert!(table.to_string().contains("beta0"));
    }
}
