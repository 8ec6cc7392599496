//! # Posterior predictive engine
//!
//! Bayesian model averaging over retained draws: every draw contributes
//! `link(x · (γ ⊙ β))` and the predictive probability is the plain average.
//! Everything downstream of the probabilities (classification, threshold
//! search, ROC, calibration) works on `(probability, label)` pairs only.

use crate::bayes::data::{DataError, validate_labels};
use crate::bayes::link::LinkFunction;
use crate::bayes::sampler::PosteriorDraws;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Log loss clamps probabilities to `[LOG_LOSS_EPS, 1 - LOG_LOSS_EPS]`.
const LOG_LOSS_EPS: f64 = 1e-15;

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("The posterior sample is empty; at least one draw is required for prediction")]
    EmptyDraws,
    #[error("Input has {found} columns but the model has {expected} coefficients")]
    FeatureMismatch { expected: usize, found: usize },
    #[error("Draw arrays disagree: beta is {beta_rows}x{beta_cols}, gamma is {gamma_rows}x{gamma_cols}")]
    DrawShapeMismatch {
        beta_rows: usize,
        beta_cols: usize,
        gamma_rows: usize,
        gamma_cols: usize,
    },
    #[error("Threshold must lie in [0, 1], got {0}")]
    InvalidThreshold(f64),
    #[error("{predictions} predictions but {labels} labels")]
    LengthMismatch { predictions: usize, labels: usize },
    #[error("No predictions to evaluate")]
    EmptyInput,
    #[error("Both classes must be present to build an ROC curve")]
    SingleClass,
    #[error("Threshold grid is empty")]
    EmptyGrid,
    #[error("Calibration needs at least one bin")]
    InvalidBinCount,
    #[error(transparent)]
    Data(#[from] DataError),
}

/// Pooled draws used for prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorSample {
    pub link: LinkFunction,
    /// `[draws, p]`.
    pub beta: Array2<f64>,
    /// `[draws, p]`.
    pub gamma: Array2<bool>,
}

impl PosteriorSample {
    pub fn new(
        link: LinkFunction,
        beta: Array2<f64>,
        gamma: Array2<bool>,
    ) -> Result<Self, PredictionError> {
        if beta.dim() != gamma.dim() {
            return Err(PredictionError::DrawShapeMismatch {
                beta_rows: beta.nrows(),
                beta_cols: beta.ncols(),
                gamma_rows: gamma.nrows(),
                gamma_cols: gamma.ncols(),
            });
        }
        Ok(Self { link, beta, gamma })
    }

    pub fn from_draws(draws: &PosteriorDraws) -> Self {
        Self {
            link: draws.link,
            beta: draws.pooled_beta(),
            gamma: draws.pooled_gamma(),
        }
    }

    pub fn num_draws(&self) -> usize {
        self.beta.nrows()
    }

    pub fn num_coefficients(&self) -> usize {
        self.beta.ncols()
    }

    /// `γ ⊙ β` per draw.
    pub fn effects(&self) -> Array2<f64> {
        Array2::from_shape_fn(self.beta.dim(), |idx| {
            if self.gamma[idx] { self.beta[idx] } else { 0.0 }
        })
    }

    /// BMA predictive probability for each row of `x`.
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, PredictionError> {
        if self.num_draws() == 0 {
            return Err(PredictionError::EmptyDraws);
        }
        if x.ncols() != self.num_coefficients() {
            return Err(PredictionError::FeatureMismatch {
                expected: self.num_coefficients(),
                found: x.ncols(),
            });
        }
        let eta = x.dot(&self.effects().t());
        let link = self.link;
        let draws = self.num_draws() as f64;
        Ok(eta.map_axis(Axis(1), |row| {
            row.iter().map(|&e| link.inverse(e)).sum::<f64>() / draws
        }))
    }
}

pub fn validate_threshold(threshold: f64) -> Result<(), PredictionError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(PredictionError::InvalidThreshold(threshold))
    }
}

/// `1` where the probability is strictly above the threshold.
pub fn classify(probabilities: ArrayView1<f64>, threshold: f64) -> Result<Array1<u8>, PredictionError> {
    validate_threshold(threshold)?;
    Ok(probabilities.mapv(|p| u8::from(p > threshold)))
}

fn check_pairs(probabilities: ArrayView1<f64>, labels: ArrayView1<f64>) -> Result<(), PredictionError> {
    if probabilities.len() != labels.len() {
        return Err(PredictionError::LengthMismatch {
            predictions: probabilities.len(),
            labels: labels.len(),
        });
    }
    if probabilities.is_empty() {
        return Err(PredictionError::EmptyInput);
    }
    validate_labels(labels)?;
    Ok(())
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(
        probabilities: ArrayView1<f64>,
        labels: ArrayView1<f64>,
        threshold: f64,
    ) -> Result<Self, PredictionError> {
        check_pairs(probabilities, labels)?;
        validate_threshold(threshold)?;
        Ok(Self::tally(probabilities, labels, threshold))
    }

    fn tally(probabilities: ArrayView1<f64>, labels: ArrayView1<f64>, threshold: f64) -> Self {
        let mut matrix = Self::default();
        for (&p, &y) in probabilities.iter().zip(labels.iter()) {
            match (p > threshold, y > 0.5) {
                (true, true) => matrix.true_positive += 1,
                (true, false) => matrix.false_positive += 1,
                (false, false) => matrix.true_negative += 1,
                (false, true) => matrix.false_negative += 1,
            }
        }
        matrix
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }

    /// True positive rate.
    pub fn sensitivity(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    /// True negative rate.
    pub fn specificity(&self) -> f64 {
        ratio(self.true_negative, self.true_negative + self.false_positive)
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    pub fn f1(&self) -> f64 {
        ratio(
            2 * self.true_positive,
            2 * self.true_positive + self.false_positive + self.false_negative,
        )
    }

    pub fn balanced_accuracy(&self) -> f64 {
        0.5 * (self.sensitivity() + self.specificity())
    }

    pub fn youden(&self) -> f64 {
        self.sensitivity() + self.specificity() - 1.0
    }

    pub fn metric(&self, metric: ThresholdMetric) -> f64 {
        match metric {
            ThresholdMetric::Accuracy => self.accuracy(),
            ThresholdMetric::BalancedAccuracy => self.balanced_accuracy(),
            ThresholdMetric::F1 => self.f1(),
            ThresholdMetric::Youden => self.youden(),
        }
    }
}

/// Objective maximized by the threshold scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThresholdMetric {
    #[default]
    Accuracy,
    BalancedAccuracy,
    F1,
    Youden,
}

impl fmt::Display for ThresholdMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ThresholdMetric::Accuracy => "accuracy",
            ThresholdMetric::BalancedAccuracy => "balanced-accuracy",
            ThresholdMetric::F1 => "f1",
            ThresholdMetric::Youden => "youden",
        })
    }
}

impl FromStr for ThresholdMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accuracy" => Ok(Self::Accuracy),
            "balanced-accuracy" | "balanced_accuracy" => Ok(Self::BalancedAccuracy),
            "f1" => Ok(Self::F1),
            "youden" => Ok(Self::Youden),
            other => Err(format!(
                "unknown metric '{other}' (expected accuracy, balanced-accuracy, f1 or youden)"
            )),
        }
    }
}

/// `0.01, 0.02, …, 0.99`.
pub fn default_threshold_grid() -> Vec<f64> {
    (1..=99).map(|i| i as f64 / 100.0).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdScan {
    pub metric: ThresholdMetric,
    pub threshold: f64,
    pub score: f64,
    /// The threshold was chosen on the same observations it is scored on, so
    /// `score` is optimistic.
    pub tuned_on_scored_split: bool,
    /// `(threshold, score)` for every grid point.
    pub scores: Vec<(f64, f64)>,
}

/// Picks the grid threshold maximizing `metric`; ties go to the lowest one.
pub fn scan_thresholds(
    probabilities: ArrayView1<f64>,
    labels: ArrayView1<f64>,
    metric: ThresholdMetric,
    grid: &[f64],
    tuned_on_scored_split: bool,
) -> Result<ThresholdScan, PredictionError> {
    check_pairs(probabilities, labels)?;
    if grid.is_empty() {
        return Err(PredictionError::EmptyGrid);
    }
    let mut sorted = grid.to_vec();
    for &t in &sorted {
        validate_threshold(t)?;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut scores = Vec::with_capacity(sorted.len());
    let mut best = (sorted[0], f64::NEG_INFINITY);
    for &t in &sorted {
        let score = ConfusionMatrix::tally(probabilities, labels, t).metric(metric);
        scores.push((t, score));
        if score > best.1 {
            best = (t, score);
        }
    }
    if tuned_on_scored_split {
        log::warn!(
            "Threshold {:.2} was tuned on the same data it is scored on; its {metric} of {:.4} is optimistic",
            best.0,
            best.1
        );
    }
    Ok(ThresholdScan {
        metric,
        threshold: best.0,
        score: best.1,
        tuned_on_scored_split,
        scores,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    /// Observations with probability at or above this value are positive.
    pub threshold: f64,
    pub false_positive_rate: f64,
    pub true_positive_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub points: Vec<RocPoint>,
    pub auc: f64,
}

/// Exact ROC over the distinct predicted probabilities, from `(0, 0)` to
/// `(1, 1)`, with the trapezoidal area.
pub fn roc_curve(probabilities: ArrayView1<f64>, labels: ArrayView1<f64>) -> Result<RocCurve, PredictionError> {
    check_pairs(probabilities, labels)?;
    let positives = labels.iter().filter(|&&y| y > 0.5).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(PredictionError::SingleClass);
    }

    let mut order: Vec<usize> = (0..probabilities.len()).collect();
    order.sort_by(|&a, &b| probabilities[b].total_cmp(&probabilities[a]));

    let mut points = vec![RocPoint {
        threshold: f64::INFINITY,
        false_positive_rate: 0.0,
        true_positive_rate: 0.0,
    }];
    let (mut tp, mut fp) = (0usize, 0usize);
    let mut idx = 0;
    while idx < order.len() {
        let value = probabilities[order[idx]];
        while idx < order.len() && probabilities[order[idx]] == value {
            if labels[order[idx]] > 0.5 {
                tp += 1;
            } else {
                fp += 1;
            }
            idx += 1;
        }
        points.push(RocPoint {
            threshold: value,
            false_positive_rate: fp as f64 / negatives as f64,
            true_positive_rate: tp as f64 / positives as f64,
        });
    }

    let auc = points
        .windows(2)
        .map(|w| {
            (w[1].false_positive_rate - w[0].false_positive_rate)
                * (w[1].true_positive_rate + w[0].true_positive_rate)
                / 2.0
        })
        .sum();
    Ok(RocCurve { points, auc })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    /// `None` for an empty bin.
    pub mean_predicted: Option<f64>,
    pub observed_rate: Option<f64>,
}

/// Equal-width probability bins; a probability of exactly 1 lands in the
/// last bin.
pub fn calibration_table(
    probabilities: ArrayView1<f64>,
    labels: ArrayView1<f64>,
    bins: usize,
) -> Result<Vec<CalibrationBin>, PredictionError> {
    check_pairs(probabilities, labels)?;
    if bins == 0 {
        return Err(PredictionError::InvalidBinCount);
    }
    let mut counts = vec![0usize; bins];
    let mut predicted = vec![0.0; bins];
    let mut observed = vec![0.0; bins];
    for (&p, &y) in probabilities.iter().zip(labels.iter()) {
        let bin = ((p * bins as f64) as usize).min(bins - 1);
        counts[bin] += 1;
        predicted[bin] += p;
        observed[bin] += y;
    }
    Ok((0..bins)
        .map(|b| {
            let count = counts[b];
            let mean = |sum: f64| (count > 0).then(|| sum / count as f64);
            CalibrationBin {
                lower: b as f64 / bins as f64,
                upper: (b + 1) as f64 / bins as f64,
                count,
                mean_predicted: mean(predicted[b]),
                observed_rate: mean(observed[b]),
            }
        })
        .collect())
}

pub fn brier_score(probabilities: ArrayView1<f64>, labels: ArrayView1<f64>) -> Result<f64, PredictionError> {
    check_pairs(probabilities, labels)?;
    let total: f64 = probabilities
        .iter()
        .zip(labels.iter())
        .map(|(p, y)| (p - y).powi(2))
        .sum();
    Ok(total / probabilities.len() as f64)
}

pub fn log_loss(probabilities: ArrayView1<f64>, labels: ArrayView1<f64>) -> Result<f64, PredictionError> {
    check_pairs(probabilities, labels)?;
    let total: f64 = probabilities
        .iter()
        .zip(labels.iter())
        .map(|(&p, &y)| {
            let p = p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
            if y > 0.5 { -p.ln() } else { -(1.0 - p).ln() }
        })
        .sum();
    Ok(total / probabilities.len() as f64)
}

/// Everything the `evaluate` command reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub observations: usize,
    pub threshold: f64,
    pub confusion: ConfusionMatrix,
    /// `None` when only one class is present.
    pub auc: Option<f64>,
    pub brier: f64,
    pub log_loss: f64,
    pub calibration: Vec<CalibrationBin>,
}

pub fn evaluate(
    probabilities: ArrayView1<f64>,
    labels: ArrayView1<f64>,
    threshold: f64,
    bins: usize,
) -> Result<EvaluationReport, PredictionError> {
    let confusion = ConfusionMatrix::from_predictions(probabilities, labels, threshold)?;
    let auc = match roc_curve(probabilities, labels) {
        Ok(roc) => Some(roc.auc),
        Err(PredictionError::SingleClass) => None,
        Err(e) => return Err(e),
    };
    Ok(EvaluationReport {
        observations: probabilities.len(),
        threshold,
        confusion,
        auc,
        brier: brier_score(probabilities, labels)?,
        log_loss: log_loss(probabilities, labels)?,
        calibration: calibration_table(probabilities, labels, bins)?,
    })
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.confusion;
        writeln!(f, "observations\t{}", self.observations)?;
        writeln!(f, "threshold\t{:.4}", self.threshold)?;
        writeln!(f, "accuracy\t{:.4}", c.accuracy())?;
        writeln!(f, "balanced_accuracy\t{:.4}", c.balanced_accuracy())?;
        writeln!(f, "sensitivity\t{:.4}", c.sensitivity())?;
        writeln!(f, "specificity\t{:.4}", c.specificity())?;
        writeln!(f, "f1\t{:.4}", c.f1())?;
        match self.auc {
            Some(auc) => writeln!(f, "auc\t{auc:.4}")?,
            None => writeln!(f, "auc\tNA")?,
        }
        writeln!(f, "brier\t{:.4}", self.brier)?;
        writeln!(f, "log_loss\t{:.4}", self.log_loss)?;
        writeln!(
            f,
            "confusion\ttp={} fp={} tn={} fn={}",
            c.true_positive, c.false_positive, c.true_negative, c.false_negative
        )?;
        writeln!(f, "bin\tcount\tmean_predicted\tobserved_rate")?;
        for bin in &self.calibration {
            let show = |v: Option<f64>| v.map_or_else(|| "NA".to_string(), |v| format!("{v:.4}"));
            writeln!(
                f,
                "[{:.2},{:.2})\t{}\t{}\t{}",
                bin.lower,
                bin.upper,
                bin.count,
                show(bin.mean_predicted),
                show(bin.observed_rate)
            )?;
        }
        Ok(())
    }
}
