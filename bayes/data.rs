//! # Data Loading and Validation Module
//!
//! Entry point for user-provided data. Tabular files are read as TSV with a
//! header row, validated against a strict schema and turned into the `ndarray`
//! structures the sampler consumes.
//!
//! - Schema: the response column (default `y`) holds 0/1 labels, an optional
//!   `sample_id` column is carried through, every other column is a numeric
//!   feature.
//! - Standardization: non-intercept features are centered and scaled with
//!   statistics from the training set; the same transform is stored with the
//!   fitted model and re-applied at prediction time.
//! - Failures are assumed to be user-input errors and `DataError` says which
//!   column and row to look at.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const INTERCEPT_NAME: &str = "intercept";
pub const SAMPLE_ID_COLUMN: &str = "sample_id";

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error reading delimited input: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error("Column '{column}' row {row}: could not parse '{value}' as a number")]
    NonNumeric {
        column: String,
        row: usize,
        value: String,
    },
    #[error("Column '{column}' row {row}: value is not finite")]
    NonFinite { column: String, row: usize },
    #[error("Label at row {row} is {value}; labels must be exactly 0 or 1")]
    NonBinaryLabel { row: usize, value: f64 },
    #[error("Design matrix has {rows} rows but the label vector has {labels} entries")]
    MismatchedRows { rows: usize, labels: usize },
    #[error("Input contains no observations")]
    Empty,
    #[error("Design matrix has no columns")]
    NoFeatures,
    #[error("{found} feature names were supplied for {expected} columns")]
    FeatureNameMismatch { expected: usize, found: usize },
    #[error("Feature '{0}' is constant in the training data and cannot be standardized")]
    ConstantFeature(String),
    #[error("Input has {found} feature columns but {expected} were expected")]
    FeatureCountMismatch { expected: usize, found: usize },
}

/// A validated design matrix with binary labels, ready for sampling.
#[derive(Debug, Clone)]
pub struct TrainingData {
    /// Shape `[n, p]`; column 0 is the intercept when one was added.
    pub x: Array2<f64>,
    /// 0/1 labels, length `n`.
    pub y: Array1<f64>,
    /// One name per column of `x`.
    pub feature_names: Vec<String>,
}

impl TrainingData {
    pub fn new(
        x: Array2<f64>,
        y: Array1<f64>,
        feature_names: Vec<String>,
    ) -> Result<Self, DataError> {
        validate_design(x.view(), y.view())?;
        if feature_names.len() != x.ncols() {
            return Err(DataError::FeatureNameMismatch {
                expected: x.ncols(),
                found: feature_names.len(),
            });
        }
        Ok(Self {
            x,
            y,
            feature_names,
        })
    }

    pub fn n(&self) -> usize {
        self.x.nrows()
    }

    pub fn p(&self) -> usize {
        self.x.ncols()
    }
}

/// Fails fast on anything the sampler cannot consume.
pub fn validate_design(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(), DataError> {
    if x.nrows() == 0 {
        return Err(DataError::Empty);
    }
    if x.ncols() == 0 {
        return Err(DataError::NoFeatures);
    }
    if x.nrows() != y.len() {
        return Err(DataError::MismatchedRows {
            rows: x.nrows(),
            labels: y.len(),
        });
    }
    validate_labels(y)?;
    for ((row, col), &value) in x.indexed_iter() {
        if !value.is_finite() {
            return Err(DataError::NonFinite {
                column: format!("column {col}"),
                row,
            });
        }
    }
    Ok(())
}

pub fn validate_labels(y: ArrayView1<f64>) -> Result<(), DataError> {
    for (row, &value) in y.iter().enumerate() {
        if value != 0.0 && value != 1.0 {
            return Err(DataError::NonBinaryLabel { row, value });
        }
    }
    Ok(())
}

/// Raw features read from a file, before standardization.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    /// Shape `[n, k]`, no intercept column.
    pub features: Array2<f64>,
    pub feature_names: Vec<String>,
    /// Present when the file carried the response column.
    pub labels: Option<Array1<f64>>,
    /// From the `sample_id` column, or 1-based row numbers.
    pub sample_ids: Vec<String>,
}

/// Per-column centering and scaling learned on the training set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl Standardizer {
    /// Learns column means and population standard deviations.
    pub fn fit(features: ArrayView2<f64>, names: &[String]) -> Result<Self, DataError> {
        if features.nrows() == 0 {
            return Err(DataError::Empty);
        }
        let mut means = Vec::with_capacity(features.ncols());
        let mut scales = Vec::with_capacity(features.ncols());
        for (col, column) in features.axis_iter(Axis(1)).enumerate() {
            let mean = column.mean().unwrap_or(0.0);
            let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / column.len() as f64;
            let scale = variance.sqrt();
            if !(scale.is_finite() && scale > 1e-12) {
                let name = names
                    .get(col)
                    .cloned()
                    .unwrap_or_else(|| format!("column {col}"));
                return Err(DataError::ConstantFeature(name));
            }
            means.push(mean);
            scales.push(scale);
        }
        Ok(Self { means, scales })
    }

    /// Identity transform for `k` columns; used when standardization is off.
    pub fn identity(num_features: usize) -> Self {
        Self {
            means: vec![0.0; num_features],
            scales: vec![1.0; num_features],
        }
    }

    pub fn num_features(&self) -> usize {
        self.means.len()
    }

    pub fn transform(&self, features: ArrayView2<f64>) -> Result<Array2<f64>, DataError> {
        if features.ncols() != self.num_features() {
            return Err(DataError::FeatureCountMismatch {
                expected: self.num_features(),
                found: features.ncols(),
            });
        }
        let mut out = features.to_owned();
        for (col, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (mean, scale) = (self.means[col], self.scales[col]);
            column.mapv_inplace(|v| (v - mean) / scale);
        }
        Ok(out)
    }

    /// Maps coefficients on the standardized scale back to raw feature units.
    /// `beta[0]` must be the intercept.
    pub fn unstandardize_coefficients(&self, beta: ArrayView1<f64>) -> Array1<f64> {
        let mut raw = beta.to_owned();
        let mut shift = 0.0;
        for k in 0..self.num_features() {
            raw[k + 1] = beta[k + 1] / self.scales[k];
            shift += raw[k + 1] * self.means[k];
        }
        raw[0] = beta[0] - shift;
        raw
    }
}

/// Prepends a column of ones.
pub fn with_intercept(features: ArrayView2<f64>) -> Array2<f64> {
    Array2::from_shape_fn((features.nrows(), features.ncols() + 1), |(i, j)| {
        if j == 0 { 1.0 } else { features[(i, j - 1)] }
    })
}

/// Reads a TSV whose every column except `response` and `sample_id` is a
/// feature. The response column is mandatory.
pub fn load_training_table(path: impl AsRef<Path>, response: &str) -> Result<FeatureTable, DataError> {
    let table = internal::read_table(path.as_ref())?;
    if !table.headers.iter().any(|h| h == response) {
        return Err(DataError::ColumnNotFound(response.to_string()));
    }
    let feature_names: Vec<String> = table
        .headers
        .iter()
        .filter(|h| h.as_str() != response && h.as_str() != SAMPLE_ID_COLUMN)
        .cloned()
        .collect();
    internal::assemble(&table, &feature_names, Some(response))
}

/// Reads a TSV and selects `feature_names` in the given order. The response
/// column is read when present so the same file can be scored.
pub fn load_prediction_table(
    path: impl AsRef<Path>,
    feature_names: &[String],
    response: &str,
) -> Result<FeatureTable, DataError> {
    let table = internal::read_table(path.as_ref())?;
    let response = table
        .headers
        .iter()
        .any(|h| h == response)
        .then_some(response);
    internal::assemble(&table, feature_names, response)
}

/// Standardizes (optionally) and adds the intercept column.
pub fn prepare_training_data(
    table: &FeatureTable,
    standardize: bool,
) -> Result<(TrainingData, Standardizer), DataError> {
    let labels = table.labels.clone().ok_or_else(|| DataError::ColumnNotFound("response".to_string()))?;
    let standardizer = if standardize {
        Standardizer::fit(table.features.view(), &table.feature_names)?
    } else {
        Standardizer::identity(table.features.ncols())
    };
    let scaled = standardizer.transform(table.features.view())?;
    let x = with_intercept(scaled.view());
    let mut names = Vec::with_capacity(x.ncols());
    names.push(INTERCEPT_NAME.to_string());
    names.extend(table.feature_names.iter().cloned());
    let data = TrainingData::new(x, labels, names)?;
    Ok((data, standardizer))
}

/// Internal module for shared data loading logic.
mod internal {
    use super::*;

    pub(super) struct RawTable {
        pub headers: Vec<String>,
        pub rows: Vec<Vec<String>>,
    }

    pub(super) fn read_table(path: &Path) -> Result<RawTable, DataError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        if rows.is_empty() {
            return Err(DataError::Empty);
        }
        Ok(RawTable { headers, rows })
    }

    fn column_index(table: &RawTable, name: &str) -> Result<usize, DataError> {
        table
            .headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| DataError::ColumnNotFound(name.to_string()))
    }

    fn parse_column(table: &RawTable, name: &str) -> Result<Vec<f64>, DataError> {
        let idx = column_index(table, name)?;
        table
            .rows
            .iter()
            .enumerate()
            .map(|(row, fields)| {
                let raw = fields.get(idx).map(String::as_str).unwrap_or("");
                let value: f64 = raw.parse().map_err(|_| DataError::NonNumeric {
                    column: name.to_string(),
                    row: row + 1,
                    value: raw.to_string(),
                })?;
                if !value.is_finite() {
                    return Err(DataError::NonFinite {
                        column: name.to_string(),
                        row: row + 1,
                    });
                }
                Ok(value)
            })
            .collect()
    }

    pub(super) fn assemble(
        table: &RawTable,
        feature_names: &[String],
        response: Option<&str>,
    ) -> Result<FeatureTable, DataError> {
        let n = table.rows.len();
        let mut features = Array2::<f64>::zeros((n, feature_names.len()));
        for (col, name) in feature_names.iter().enumerate() {
            let values = parse_column(table, name)?;
            features.column_mut(col).assign(&Array1::from_vec(values));
        }

        let labels = match response {
            Some(name) => {
                let labels = Array1::from_vec(parse_column(table, name)?);
                validate_labels(labels.view())?;
                Some(labels)
            }
            None => None,
        };

        let sample_ids = match column_index(table, SAMPLE_ID_COLUMN) {
            Ok(idx) => table
                .rows
                .iter()
                .map(|fields| fields.get(idx).cloned().unwrap_or_default())
                .collect(),
            Err(_) => (1..=n).map(|i| i.to_string()).collect(),
        };

        Ok(FeatureTable {
            features,
            feature_names: feature_names.to_vec(),
            labels,
            sample_ids,
        })
    }
}
