use crate::bayes::data::{DataError, Standardizer, INTERCEPT_NAME, with_intercept};
use crate::bayes::diagnostics::default_lags;
use crate::bayes::predict::{PosteriorSample, PredictionError, ThresholdMetric, ThresholdScan, classify, validate_threshold};
use crate::bayes::prior::PriorConfig;
use crate::bayes::sampler::{SamplerConfig, SamplerError};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

/// Everything that controls a fit. Loadable from TOML; every field has a
/// default so a configuration file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Name of the label column in training files.
    pub response: String,
    /// Center and scale non-intercept features on the training set.
    pub standardize: bool,
    /// Classification threshold used when no metric is tuned.
    pub threshold: f64,
    /// When set, the threshold is chosen on the training data by this metric.
    pub tune_threshold: Option<ThresholdMetric>,
    pub diagnostic_lags: Vec<usize>,
    pub calibration_bins: usize,
    pub sampler: SamplerConfig,
    pub prior: PriorConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            response: "y".to_string(),
            standardize: true,
            threshold: 0.5,
            tune_threshold: None,
            diagnostic_lags: default_lags(),
            calibration_bins: 10,
            sampler: SamplerConfig::default(),
            prior: PriorConfig::default(),
        }
    }
}

impl ModelConfig {
    pub fn load(path: &str) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        validate_threshold(self.threshold)?;
        self.sampler.validate()?;
        if self.calibration_bins == 0 {
            return Err(ModelError::InvalidConfig(
                "calibration_bins must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A fitted posterior plus everything needed to score new data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    /// Raw feature columns in design order, without the intercept.
    pub feature_names: Vec<String>,
    pub threshold: f64,
    pub standardizer: Standardizer,
    pub threshold_scan: Option<ThresholdScan>,
    pub config: ModelConfig,
    pub posterior: PosteriorSample,
}

/// Custom error type for model loading, saving, and prediction.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write model file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize model to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Sampler(#[from] SamplerError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Prediction(#[from] PredictionError),
    #[error("Model has {expected} features but the standardizer covers {found}")]
    InconsistentModel { expected: usize, found: usize },
}

impl FittedModel {
    /// Coefficient names in design order, intercept first.
    pub fn coefficient_names(&self) -> Vec<String> {
        std::iter::once(INTERCEPT_NAME.to_string())
            .chain(self.feature_names.iter().cloned())
            .collect()
    }

    /// Applies the training standardization and prepends the intercept.
    pub fn design_matrix(&self, features: ArrayView2<f64>) -> Result<Array2<f64>, ModelError> {
        let scaled = self.standardizer.transform(features)?;
        Ok(with_intercept(scaled.view()))
    }

    /// BMA probabilities for raw (unstandardized) feature rows.
    pub fn predict_proba(&self, features: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        let x = self.design_matrix(features)?;
        Ok(self.posterior.predict_proba(x.view())?)
    }

    pub fn classify(&self, probabilities: ArrayView1<f64>) -> Result<Array1<u8>, ModelError> {
        Ok(classify(probabilities, self.threshold)?)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let posterior = &self.posterior;
        if posterior.beta.dim() != posterior.gamma.dim() {
            return Err(PredictionError::DrawShapeMismatch {
                beta_rows: posterior.beta.nrows(),
                beta_cols: posterior.beta.ncols(),
                gamma_rows: posterior.gamma.nrows(),
                gamma_cols: posterior.gamma.ncols(),
            }
            .into());
        }
        if self.standardizer.num_features() != self.feature_names.len() {
            return Err(ModelError::InconsistentModel {
                expected: self.feature_names.len(),
                found: self.standardizer.num_features(),
            });
        }
        if self.posterior.num_coefficients() != self.feature_names.len() + 1 {
            return Err(ModelError::InconsistentModel {
                expected: self.feature_names.len() + 1,
                found: self.posterior.num_coefficients(),
            });
        }
        validate_threshold(self.threshold)?;
        Ok(())
    }

    /// Saves the model to a human-readable TOML file.
    pub fn save(&self, path: &str) -> Result<(), ModelError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Loads a fitted model from a TOML file.
    pub fn load(path: &str) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let model: Self = toml::from_str(&toml_string)?;
        model.validate()?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bayes::link::LinkFunction;
    use crate::bayes::prior::SelectionMode;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use tempfile::NamedTempFile;

    fn toy_model() -> FittedModel {
        FittedModel {
            feature_names: vec!["age".to_string(), "dose".to_string()],
            threshold: 0.4,
            standardizer: Standardizer {
                means: vec![50.0, 2.0],
                scales: vec![10.0, 0.5],
            },
            threshold_scan: None,
            config: ModelConfig::default(),
            posterior: PosteriorSample::new(
                LinkFunction::Probit,
                array![[0.1, 0.5, -0.25], [0.3, 0.7, 0.5]],
                array![[true, true, false], [true, true, true]],
            )
            .unwrap(),
        }
    }

    #[test]
    fn prediction_standardizes_before_averaging() {
        let model = toy_model();
        let raw = array![[60.0, 2.5]];
        let probs = model.predict_proba(raw.view()).unwrap();
        // Standardized row is (1, 1, 1).
        let expected = 0.5 * (LinkFunction::Probit.inverse(0.6) + LinkFunction::Probit.inverse(1.5));
        assert_abs_diff_eq!(probs[0], expected, epsilon = 1e-14);
        assert_eq!(model.classify(probs.view()).unwrap(), array![1]);
        assert_eq!(model.coefficient_names(), vec!["intercept", "age", "dose"]);

        assert!(matches!(
            model.predict_proba(array![[1.0, 2.0, 3.0]].view()),
            Err(ModelError::Data(DataError::FeatureCountMismatch { expected: 2, found: 3 }))
        ));
    }

    #[test]
    fn model_round_trips_through_toml() {
        let model = toy_model();
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        model.save(path).unwrap();
        let loaded = FittedModel::load(path).unwrap();
        assert_eq!(loaded, model);
    }

    #[test]
    fn partial_config_files_fill_in_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "threshold = 0.3\n\n[sampler]\nlink = \"probit\"\niterations = 2000\nburn_in = 500\n\n[prior]\nselection = \"except-intercept\"\nslab_variance = 4.0\n"
        )
        .unwrap();
        let config = ModelConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_abs_diff_eq!(config.threshold, 0.3);
        assert_eq!(config.sampler.link, LinkFunction::Probit);
        assert_eq!(config.sampler.iterations, 2000);
        assert_eq!(config.sampler.thin, 1);
        assert_eq!(config.prior.selection, SelectionMode::ExceptIntercept);
        assert_abs_diff_eq!(config.prior.slab_variance, 4.0);
        assert_eq!(config.response, "y");

        let mut bad = NamedTempFile::new().unwrap();
        writeln!(bad, "[sampler]\niterations = 10\nburn_in = 20\n").unwrap();
        assert!(matches!(
            ModelConfig::load(bad.path().to_str().unwrap()),
            Err(ModelError::Sampler(SamplerError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn inconsistent_artifacts_are_rejected() {
        let mut model = toy_model();
        model.feature_names.pop();
        assert!(matches!(
            model.validate(),
            Err(ModelError::InconsistentModel { .. })
        ));
    }

    #[test]
    fn hand_edited_draw_tables_must_agree_in_shape() {
        let mut model = toy_model();
        model.posterior.gamma = array![[true, true], [true, false]];
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        model.save(path).unwrap();

        let err = FittedModel::load(path).unwrap_err();
        assert!(matches!(
            err,
            ModelError::Prediction(PredictionError::DrawShapeMismatch {
                beta_rows: 2,
                beta_cols: 3,
                gamma_rows: 2,
                gamma_cols: 2,
            })
        ));
    }
}
