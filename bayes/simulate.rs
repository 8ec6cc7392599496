//! Synthetic binary-outcome data with known coefficients.
//!
//! Used by the `simulate` command and by tests that check parameter
//! recovery. Features are standard normal, drawn either pseudo-randomly or
//! from a Halton sequence pushed through `Φ⁻¹`; labels are Bernoulli with
//! success probability `link(β0 + Σ β_k x_k)`.

use crate::bayes::data::{DataError, FeatureTable, INTERCEPT_NAME, SAMPLE_ID_COLUMN, TrainingData, with_intercept};
use crate::bayes::link::{LinkFunction, normal_quantile};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Open01, StandardNormal};
use std::path::Path;

/// How feature values and the label uniforms are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DesignKind {
    /// Independent draws from a seeded `StdRng`.
    #[default]
    Random,
    /// Low-discrepancy Halton points, one prime base per dimension. Sample
    /// moments sit much closer to their targets than with random draws.
    Halton,
}

pub struct SyntheticDataBuilder {
    n_samples: usize,
    coefficients: Vec<f64>,
    link: LinkFunction,
    design: DesignKind,
    seed: u64,
}

#[derive(Debug, Clone)]
pub struct SyntheticData {
    /// `[n, k]`, no intercept.
    pub features: Array2<f64>,
    pub labels: Array1<f64>,
    pub true_probabilities: Array1<f64>,
    /// Intercept first.
    pub coefficients: Array1<f64>,
    pub feature_names: Vec<String>,
}

impl SyntheticDataBuilder {
    /// `coefficients[0]` is the intercept; one feature per remaining entry.
    pub fn new(n_samples: usize, coefficients: Vec<f64>) -> Self {
        Self {
            n_samples,
            coefficients,
            link: LinkFunction::Logit,
            design: DesignKind::Random,
            seed: 42,
        }
    }

    pub fn with_link(mut self, link: LinkFunction) -> Self {
        self.link = link;
        self
    }

    pub fn with_design(mut self, design: DesignKind) -> Self {
        self.design = design;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn build(self) -> Result<SyntheticData, DataError> {
        if self.n_samples == 0 {
            return Err(DataError::Empty);
        }
        if self.coefficients.len() < 2 {
            return Err(DataError::NoFeatures);
        }
        let k = self.coefficients.len() - 1;
        let (features, uniforms) = match self.design {
            DesignKind::Random => {
                let mut rng = StdRng::seed_from_u64(self.seed);
                let features = Array2::from_shape_fn((self.n_samples, k), |_| {
                    rng.sample::<f64, _>(StandardNormal)
                });
                let uniforms =
                    Array1::from_shape_fn(self.n_samples, |_| rng.sample::<f64, _>(Open01));
                (features, uniforms)
            }
            DesignKind::Halton => {
                let bases = first_primes(k + 1);
                let features = Array2::from_shape_fn((self.n_samples, k), |(i, j)| {
                    normal_quantile(radical_inverse(i as u64 + 1, bases[j]))
                });
                let uniforms = Array1::from_shape_fn(self.n_samples, |i| {
                    radical_inverse(i as u64 + 1, bases[k])
                });
                (features, uniforms)
            }
        };

        let coefficients = Array1::from_vec(self.coefficients);
        let eta = with_intercept(features.view()).dot(&coefficients);
        let link = self.link;
        let true_probabilities = eta.mapv(|e| link.inverse(e));
        let labels = Array1::from_shape_fn(self.n_samples, |i| {
            if uniforms[i] < true_probabilities[i] { 1.0 } else { 0.0 }
        });
        log::debug!(
            "Simulated {} observations ({} positive) with {:?} design",
            self.n_samples,
            labels.sum(),
            self.design
        );

        Ok(SyntheticData {
            features,
            labels,
            true_probabilities,
            coefficients,
            feature_names: (1..=k).map(|j| format!("x{j}")).collect(),
        })
    }
}

impl SyntheticData {
    pub fn into_table(self) -> FeatureTable {
        let n = self.labels.len();
        FeatureTable {
            features: self.features,
            feature_names: self.feature_names,
            labels: Some(self.labels),
            sample_ids: (1..=n).map(|i| format!("s{i}")).collect(),
        }
    }

    /// Unstandardized design with the intercept column.
    pub fn into_training_data(self) -> Result<TrainingData, DataError> {
        let x = with_intercept(self.features.view());
        let mut names = vec![INTERCEPT_NAME.to_string()];
        names.extend(self.feature_names);
        TrainingData::new(x, self.labels, names)
    }

    /// `sample_id`, `y`, then one column per feature.
    pub fn write_tsv(&self, path: impl AsRef<Path>, response: &str) -> Result<(), csv::Error> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)?;
        let mut header = vec![SAMPLE_ID_COLUMN.to_string(), response.to_string()];
        header.extend(self.feature_names.iter().cloned());
        writer.write_record(&header)?;
        for (i, row) in self.features.rows().into_iter().enumerate() {
            let mut record = vec![format!("s{}", i + 1), format!("{}", self.labels[i] as u8)];
            record.extend(row.iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Van der Corput radical inverse of `index` in `base`, in `(0, 1)` for
/// `index ≥ 1`.
pub fn radical_inverse(mut index: u64, base: u64) -> f64 {
    let inv_base = 1.0 / base as f64;
    let mut factor = inv_base;
    let mut value = 0.0;
    while index > 0 {
        value += (index % base) as f64 * factor;
        index /= base;
        factor *= inv_base;
    }
    value
}

pub fn first_primes(count: usize) -> Vec<u64> {
    let mut primes = Vec::with_capacity(count);
    let mut candidate = 2u64;
    while primes.len() < count {
        if primes.iter().take_while(|&&p| p * p <= candidate).all(|&p| candidate % p != 0) {
            primes.push(candidate);
        }
        candidate += 1;
    }
    primes
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn radical_inverse_matches_hand_computed_values() {
        assert_abs_diff_eq!(radical_inverse(1, 2), 0.5);
        assert_abs_diff_eq!(radical_inverse(2, 2), 0.25);
        assert_abs_diff_eq!(radical_inverse(3, 2), 0.75);
        assert_abs_diff_eq!(radical_inverse(5, 3), 2.0 / 3.0 + 1.0 / 9.0, epsilon = 1e-15);
        assert_eq!(first_primes(6), vec![2, 3, 5, 7, 11, 13]);
    }

    #[test]
    fn halton_features_have_standard_moments() {
        let data = SyntheticDataBuilder::new(1000, vec![0.0, 1.0, -1.0])
            .with_design(DesignKind::Halton)
            .build()
            .unwrap();
        for column in data.features.columns() {
            let mean = column.mean().unwrap();
            let var = column.mapv(|v| (v - mean).powi(2)).mean().unwrap();
            assert!(mean.abs() < 0.03, "{mean}");
            assert!((var - 1.0).abs() < 0.06, "{var}");
        }
    }

    #[test]
    fn labels_follow_the_true_probabilities() {
        let data = SyntheticDataBuilder::new(4000, vec![0.3, 0.8])
            .with_link(LinkFunction::Probit)
            .with_seed(3)
            .build()
            .unwrap();
        let observed = data.labels.mean().unwrap();
        let expected = data.true_probabilities.mean().unwrap();
        assert!((observed - expected).abs() < 0.03);
        assert!(data.labels.iter().all(|&y| y == 0.0 || y == 1.0));
    }

    #[test]
    fn builder_rejects_degenerate_requests_and_writes_tsv() {
        assert!(matches!(
            SyntheticDataBuilder::new(0, vec![0.0, 1.0]).build(),
            Err(DataError::Empty)
        ));
        assert!(matches!(
            SyntheticDataBuilder::new(10, vec![0.0]).build(),
            Err(DataError::NoFeatures)
        ));

        let data = SyntheticDataBuilder::new(5, vec![0.0, 1.0]).build().unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        data.write_tsv(file.path(), "y").unwrap();
        let table = crate::bayes::data::load_training_table(file.path(), "y").unwrap();
        assert_eq!(table.feature_names, vec!["x1"]);
        assert_eq!(table.labels.unwrap(), data.labels);
        assert_eq!(table.sample_ids[0], "s1");
    }
}
