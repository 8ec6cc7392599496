//! # Model Estimation
//!
//! One call from validated training data to a [`FittedModel`]:
//!
//! 1. Resolve the spike-and-slab prior for the design.
//! 2. Run the chains (which find the posterior mode first when the proposal
//!    tuning or the initialization asks for it).
//! 3. Summarize the retained draws and compute convergence diagnostics.
//! 4. Pick the classification threshold, either fixed or tuned on the
//!    training data.

use crate::bayes::data::{DataError, FeatureTable, Standardizer, TrainingData, prepare_training_data};
use crate::bayes::diagnostics::DiagnosticsReport;
use crate::bayes::model::{FittedModel, ModelConfig, ModelError};
use crate::bayes::predict::{PosteriorSample, PredictionError, default_threshold_grid, scan_thresholds};
use crate::bayes::prior::{PriorError, SpikeSlabPrior};
use crate::bayes::progress::SamplingProgress;
use crate::bayes::sampler::{PosteriorDraws, SamplerError, run_chains};
use crate::bayes::summary::SummaryTable;
use thiserror::Error;

/// Acceptance rates outside this band suggest badly scaled proposals.
const ACCEPTANCE_BAND: (f64, f64) = (0.15, 0.7);

#[derive(Error, Debug)]
pub enum EstimationError {
    #[error("Invalid training data: {0}")]
    Data(#[from] DataError),
    #[error("Invalid prior: {0}")]
    Prior(#[from] PriorError),
    #[error("Sampling failed: {0}")]
    Sampler(#[from] SamplerError),
    #[error("Posterior summary failed: {0}")]
    Prediction(#[from] PredictionError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Everything a fit produces. Only `model` is persisted.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub model: FittedModel,
    pub draws: PosteriorDraws,
    pub summary: SummaryTable,
    pub diagnostics: DiagnosticsReport,
}

/// Standardizes a raw feature table and fits it.
pub fn fit_table(
    table: &FeatureTable,
    config: &ModelConfig,
    progress: &dyn SamplingProgress,
) -> Result<FitOutcome, EstimationError> {
    let (data, standardizer) = prepare_training_data(table, config.standardize)?;
    fit_model(&data, standardizer, config, progress)
}

/// Fits a design whose column 0 is the intercept. `standardizer` is the
/// transform already applied to the remaining columns.
pub fn fit_model(
    data: &TrainingData,
    standardizer: Standardizer,
    config: &ModelConfig,
    progress: &dyn SamplingProgress,
) -> Result<FitOutcome, EstimationError> {
    config.validate()?;
    if standardizer.num_features() + 1 != data.p() {
        return Err(ModelError::InconsistentModel {
            expected: data.p() - 1,
            found: standardizer.num_features(),
        }
        .into());
    }
    log::info!(
        "Fitting {} model with {:?} selection: {} observations, {} coefficients",
        config.sampler.link,
        config.prior.selection,
        data.n(),
        data.p()
    );

    let prior = SpikeSlabPrior::from_config(&config.prior, data.p())?;
    let draws = run_chains(data.x.view(), data.y.view(), &prior, &config.sampler, progress)?;
    log::info!("Retained {} draws across {} chain(s)", draws.num_draws(), draws.chains.len());
    report_acceptance(&draws, &data.feature_names);

    let summary = SummaryTable::from_draws(&draws, &data.feature_names)?.with_raw_scale(&standardizer);
    let diagnostics = DiagnosticsReport::compute(
        &draws,
        &data.feature_names,
        &config.diagnostic_lags,
        prior.num_selectable() > 0,
    );
    let posterior = PosteriorSample::from_draws(&draws);

    let (threshold, threshold_scan) = match config.tune_threshold {
        Some(metric) => {
            let probabilities = posterior.predict_proba(data.x.view())?;
            let scan = scan_thresholds(
                probabilities.view(),
                data.y.view(),
                metric,
                &default_threshold_grid(),
                true,
            )?;
            log::info!("Tuned threshold {:.2} ({metric} {:.4})", scan.threshold, scan.score);
            (scan.threshold, Some(scan))
        }
        None => (config.threshold, None),
    };

    let model = FittedModel {
        feature_names: data.feature_names.iter().skip(1).cloned().collect(),
        threshold,
        standardizer,
        threshold_scan,
        config: config.clone(),
        posterior,
    };
    model.validate()?;

    Ok(FitOutcome {
        model,
        draws,
        summary,
        diagnostics,
    })
}

fn report_acceptance(draws: &PosteriorDraws, names: &[String]) {
    for chain in &draws.chains {
        let Some(rates) = &chain.acceptance_rates else {
            continue;
        };
        for (j, rate) in rates.iter().enumerate() {
            let Some(rate) = *rate else { continue };
            let name = names.get(j).map(String::as_str).unwrap_or("?");
            log::debug!("chain {} {name}: acceptance {rate:.3}", chain.chain);
            if rate < ACCEPTANCE_BAND.0 || rate > ACCEPTANCE_BAND.1 {
                log::warn!(
                    "Chain {} coefficient '{name}' accepted {:.1}% of proposals",
                    chain.chain,
                    100.0 * rate
                );
            }
        }
    }
}
