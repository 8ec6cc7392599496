//! Convergence diagnostics over retained draws.
//!
//! Nothing here declares convergence. Statistics that look suspicious are
//! collected as warnings and logged; the caller decides what to do.

use crate::bayes::sampler::{ChainDraws, PosteriorDraws};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub const GEWEKE_FIRST: f64 = 0.1;
pub const GEWEKE_LAST: f64 = 0.5;
pub const GEWEKE_WARN: f64 = 2.0;
pub const R_HAT_WARN: f64 = 1.1;
pub const ESS_WARN: f64 = 100.0;

/// Lags reported when the caller does not choose.
pub fn default_lags() -> Vec<usize> {
    vec![1, 5, 10, 50]
}

struct Centered {
    values: Vec<f64>,
    variance: f64,
}

impl Centered {
    fn new(series: &[f64]) -> Self {
        let n = series.len().max(1) as f64;
        let mean = series.iter().sum::<f64>() / n;
        let values: Vec<f64> = series.iter().map(|v| v - mean).collect();
        let variance = values.iter().map(|v| v * v).sum::<f64>() / n;
        Self { values, variance }
    }

    fn is_constant(&self) -> bool {
        self.variance < 1e-15
    }

    fn autocorrelation(&self, lag: usize) -> f64 {
        let n = self.values.len();
        if lag >= n || self.is_constant() {
            return 0.0;
        }
        let covariance = self.values[..n - lag]
            .iter()
            .zip(&self.values[lag..])
            .map(|(a, b)| a * b)
            .sum::<f64>()
            / n as f64;
        covariance / self.variance
    }
}

/// Sample autocorrelation at `lag` (biased estimator, divides by `n`).
pub fn autocorrelation(series: &[f64], lag: usize) -> f64 {
    Centered::new(series).autocorrelation(lag)
}

/// Effective sample size by Geyer's initial positive sequence: pairs of
/// autocorrelations `ρ_{2m} + ρ_{2m+1}` are summed while positive and forced
/// to be non-increasing. Capped at `n`; a constant series returns `n`.
pub fn effective_sample_size(series: &[f64]) -> f64 {
    let n = series.len();
    if n < 4 {
        return n as f64;
    }
    let centered = Centered::new(series);
    if centered.is_constant() {
        return n as f64;
    }

    let mut tau = -1.0;
    let mut previous_pair = f64::INFINITY;
    let mut m = 0;
    while 2 * m + 1 < n {
        let pair = centered.autocorrelation(2 * m) + centered.autocorrelation(2 * m + 1);
        if pair <= 0.0 {
            break;
        }
        let pair = pair.min(previous_pair);
        tau += 2.0 * pair;
        previous_pair = pair;
        m += 1;
    }
    if tau <= 0.0 {
        return n as f64;
    }
    (n as f64 / tau).min(n as f64)
}

/// Sum of per-chain effective sample sizes.
pub fn multi_chain_ess(chains: &[Vec<f64>]) -> f64 {
    chains.iter().map(|c| effective_sample_size(c)).sum()
}

/// Early-versus-late comparison of the chain mean. The variance of each window
/// mean is `var / ESS` of the window. `None` when the windows are too short or
/// the series is constant.
pub fn geweke_z(series: &[f64]) -> Option<f64> {
    let n = series.len();
    let first_len = (GEWEKE_FIRST * n as f64).floor() as usize;
    let last_len = (GEWEKE_LAST * n as f64).floor() as usize;
    if first_len < 4 || last_len < 4 {
        return None;
    }
    let first = &series[..first_len];
    let last = &series[n - last_len..];
    let window = |w: &[f64]| {
        let centered = Centered::new(w);
        let mean = w.iter().sum::<f64>() / w.len() as f64;
        (mean, centered.variance / effective_sample_size(w))
    };
    let (mean_a, var_a) = window(first);
    let (mean_b, var_b) = window(last);
    let denom = (var_a + var_b).sqrt();
    if !(denom.is_finite() && denom > 0.0) {
        return None;
    }
    Some((mean_a - mean_b) / denom)
}

/// Split R-hat: every chain is cut in half and the halves are compared with
/// the Gelman-Rubin ratio. `None` with fewer than four draws per chain or
/// zero within-chain variance.
pub fn split_r_hat(chains: &[Vec<f64>]) -> Option<f64> {
    let shortest = chains.iter().map(Vec::len).min()?;
    let half = shortest / 2;
    if half < 2 {
        return None;
    }
    let mut pieces: Vec<&[f64]> = Vec::with_capacity(2 * chains.len());
    for chain in chains {
        pieces.push(&chain[..half]);
        pieces.push(&chain[chain.len() - half..]);
    }

    let len = half as f64;
    let means: Vec<f64> = pieces.iter().map(|p| p.iter().sum::<f64>() / len).collect();
    let within = pieces
        .iter()
        .zip(&means)
        .map(|(p, m)| p.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (len - 1.0))
        .sum::<f64>()
        / pieces.len() as f64;
    if within < 1e-15 {
        return None;
    }
    let grand = means.iter().sum::<f64>() / means.len() as f64;
    let between = len * means.iter().map(|m| (m - grand).powi(2)).sum::<f64>()
        / (means.len() as f64 - 1.0);
    let pooled = (len - 1.0) / len * within + between / len;
    Some((pooled / within).sqrt())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDiagnostics {
    pub name: String,
    /// `(lag, ρ)`, averaged over chains.
    pub autocorrelation: Vec<(usize, f64)>,
    pub ess: f64,
    /// Chain 0.
    pub geweke_z: Option<f64>,
    pub r_hat: Option<f64>,
}

impl ParameterDiagnostics {
    pub fn from_chains(name: &str, chains: &[Vec<f64>], lags: &[usize]) -> Self {
        let autocorrelation = lags
            .iter()
            .map(|&lag| {
                let total: f64 = chains.iter().map(|c| autocorrelation(c, lag)).sum();
                (lag, total / chains.len().max(1) as f64)
            })
            .collect();
        Self {
            name: name.to_string(),
            autocorrelation,
            ess: multi_chain_ess(chains),
            geweke_z: chains.first().and_then(|c| geweke_z(c)),
            r_hat: if chains.len() > 1 { split_r_hat(chains) } else { None },
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(z) = self.geweke_z {
            if z.abs() > GEWEKE_WARN {
                warnings.push(format!(
                    "{}: Geweke z = {z:.2} (early and late means disagree)",
                    self.name
                ));
            }
        }
        if let Some(r) = self.r_hat {
            if r > R_HAT_WARN {
                warnings.push(format!("{}: split R-hat = {r:.3} exceeds {R_HAT_WARN}", self.name));
            }
        }
        if self.ess < ESS_WARN {
            warnings.push(format!(
                "{}: effective sample size {:.0} is below {ESS_WARN}",
                self.name, self.ess
            ));
        }
        warnings
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    pub parameters: Vec<ParameterDiagnostics>,
    pub warnings: Vec<String>,
    pub terminated_early: bool,
}

fn per_chain<F: Fn(&ChainDraws) -> Vec<f64>>(draws: &PosteriorDraws, extract: F) -> Vec<Vec<f64>> {
    draws.chains.iter().map(extract).collect()
}

impl DiagnosticsReport {
    /// Diagnostics for every model-averaged effect `γ_j β_j`, the inclusion
    /// rate (when it is sampled) and the log-likelihood.
    pub fn compute(
        draws: &PosteriorDraws,
        names: &[String],
        lags: &[usize],
        inclusion_sampled: bool,
    ) -> Self {
        let effects: Vec<_> = draws.chains.iter().map(ChainDraws::effects).collect();
        let mut parameters = Vec::with_capacity(draws.num_coefficients() + 2);
        for j in 0..draws.num_coefficients() {
            let chains: Vec<Vec<f64>> = effects.iter().map(|e| e.column(j).to_vec()).collect();
            let name = names.get(j).cloned().unwrap_or_else(|| format!("beta{j}"));
            parameters.push(ParameterDiagnostics::from_chains(&name, &chains, lags));
        }
        if inclusion_sampled {
            let chains = per_chain(draws, |c| c.inclusion_probability.clone());
            parameters.push(ParameterDiagnostics::from_chains("inclusion_probability", &chains, lags));
        }
        let chains = per_chain(draws, |c| c.log_likelihood.clone());
        parameters.push(ParameterDiagnostics::from_chains("log_likelihood", &chains, lags));

        let mut warnings: Vec<String> = parameters.iter().flat_map(|p| p.warnings()).collect();
        if draws.terminated_early() {
            warnings.push("sampling stopped at the time limit; fewer draws than requested".to_string());
        }
        for warning in &warnings {
            log::warn!("{warning}");
        }

        Self {
            parameters,
            warnings,
            terminated_early: draws.terminated_early(),
        }
    }
}

impl fmt::Display for DiagnosticsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parameter\tess\tgeweke_z\tr_hat")?;
        if let Some(first) = self.parameters.first() {
            for (lag, _) in &first.autocorrelation {
                write!(f, "\tacf_{lag}")?;
            }
        }
        writeln!(f)?;
        let show = |v: Option<f64>| v.map_or_else(|| "NA".to_string(), |v| format!("{v:.3}"));
        for p in &self.parameters {
            write!(f, "{}\t{:.1}\t{}\t{}", p.name, p.ess, show(p.geweke_z), show(p.r_hat))?;
            for (_, rho) in &p.autocorrelation {
                write!(f, "\t{rho:.3}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Writes every retained draw as one TSV row: chain, draw index, `w`, the
/// log-likelihood, then `β_j` and `γ_j` per coefficient.
pub fn write_trace(path: impl AsRef<Path>, draws: &PosteriorDraws, names: &[String]) -> Result<(), csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)?;
    let mut header = vec![
        "chain".to_string(),
        "draw".to_string(),
        "inclusion_probability".to_string(),
        "log_likelihood".to_string(),
    ];
    for name in names {
        header.push(format!("beta_{name}"));
    }
    for name in names {
        header.push(format!("gamma_{name}"));
    }
    writer.write_record(&header)?;
    for chain in &draws.chains {
        for d in 0..chain.num_draws() {
            let mut record = vec![
                chain.chain.to_string(),
                d.to_string(),
                chain.inclusion_probability[d].to_string(),
                chain.log_likelihood[d].to_string(),
            ];
            record.extend(chain.beta.row(d).iter().map(|b| b.to_string()));
            record.extend(chain.gamma.row(d).iter().map(|&g| u8::from(g).to_string()));
            writer.write_record(&record)?;
        }
    }
    writer.flush()?;
    Ok(())
}
