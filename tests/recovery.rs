use spikeslab::bayes::data::{Standardizer, TrainingData};
use spikeslab::bayes::estimate::{EstimationError, FitOutcome, fit_model};
use spikeslab::bayes::link::LinkFunction;
use spikeslab::bayes::model::ModelConfig;
use spikeslab::bayes::pirls::{ModeOptions, find_posterior_mode};
use spikeslab::bayes::predict::PredictionError;
use spikeslab::bayes::prior::{PriorConfig, SelectionMode, SpikeSlabPrior};
use spikeslab::bayes::progress::NoopProgress;
use spikeslab::bayes::sampler::{ProposalConfig, SamplerConfig};
use spikeslab::bayes::simulate::{DesignKind, SyntheticDataBuilder};

fn halton_data(n: usize, coefficients: Vec<f64>, link: LinkFunction) -> TrainingData {
    SyntheticDataBuilder::new(n, coefficients)
        .with_link(link)
        .with_design(DesignKind::Halton)
        .build()
        .expect("synthetic data")
        .into_training_data()
        .expect("training data")
}

fn fit(data: &TrainingData, config: &ModelConfig) -> FitOutcome {
    let standardizer = Standardizer::identity(data.p() - 1);
    fit_model(data, standardizer, config, &NoopProgress).expect("fit succeeds")
}

#[test]
fn logit_without_selection_recovers_the_generating_coefficients() {
    let truth = vec![1.0, -2.0, 0.5];
    let data = halton_data(500, truth.clone(), LinkFunction::Logit);
    let prior = PriorConfig {
        slab_variance: 4.0,
        selection: SelectionMode::Off,
        ..PriorConfig::default()
    };
    let config = ModelConfig {
        sampler: SamplerConfig {
            link: LinkFunction::Logit,
            iterations: 5000,
            burn_in: 1000,
            seed: 11,
            proposal: ProposalConfig {
                sweeps: 3,
                ..ProposalConfig::default()
            },
            ..SamplerConfig::default()
        },
        prior: prior.clone(),
        ..ModelConfig::default()
    };
    let outcome = fit(&data, &config);

    let mode = find_posterior_mode(
        data.x.view(),
        data.y.view(),
        &SpikeSlabPrior::from_config(&prior, 3).expect("prior"),
        LinkFunction::Logit,
        &ModeOptions::default(),
    )
    .expect("mode");

    let mut well_mixed = 0;
    for (j, row) in outcome.summary.rows.iter().enumerate() {
        assert_eq!(row.inclusion_probability, 1.0);
        assert!(
            (row.mean - truth[j]).abs() < 4.0 * row.sd,
            "{}: mean {} sd {} truth {}",
            row.name,
            row.mean,
            row.sd,
            truth[j]
        );
        assert!(
            (row.mean - mode.beta[j]).abs() < 0.15,
            "{}: mean {} mode {}",
            row.name,
            row.mean,
            mode.beta[j]
        );
        assert!(row.lower < row.mean && row.mean < row.upper);
        if row.ess > 400.0 {
            well_mixed += 1;
        }
    }
    assert!(well_mixed >= 2, "{:?}", outcome.summary.rows);

    let rates = outcome.draws.chains[0]
        .acceptance_rates
        .as_ref()
        .expect("logit chains track acceptance");
    for rate in rates.iter().flatten() {
        assert!((0.2..0.7).contains(rate), "acceptance {rate}");
    }
}

#[test]
fn default_logit_sampler_recovers_a_small_design() {
    let truth = vec![1.0, -2.0, 0.5];
    let data = halton_data(200, truth.clone(), LinkFunction::Logit);
    let config = ModelConfig {
        sampler: SamplerConfig {
            iterations: 5000,
            burn_in: 1000,
            seed: 1,
            ..SamplerConfig::default()
        },
        ..ModelConfig::default()
    };
    let outcome = fit(&data, &config);
    assert_eq!(outcome.draws.num_draws(), 4000);

    let rows = &outcome.summary.rows;
    for (row, beta) in rows.iter().zip(&truth) {
        assert!(
            (row.mean - beta).abs() < 0.3,
            "{}: mean {} truth {beta}",
            row.name,
            row.mean
        );
    }
    let well_mixed = rows.iter().filter(|r| r.ess > 500.0).count();
    assert!(
        well_mixed * 5 >= rows.len() * 4,
        "ESS {:?}",
        rows.iter().map(|r| r.ess).collect::<Vec<_>>()
    );
}

#[test]
fn spike_and_slab_separates_signal_from_noise_under_both_links() {
    let truth = vec![0.0, 1.5, 0.0, -1.5, 0.0];
    for link in [LinkFunction::Logit, LinkFunction::Probit] {
        let data = halton_data(500, truth.clone(), link);
        let config = ModelConfig {
            sampler: SamplerConfig {
                link,
                iterations: 4000,
                burn_in: 1000,
                seed: 3,
                ..SamplerConfig::default()
            },
            prior: PriorConfig {
                slab_variance: 4.0,
                selection: SelectionMode::ExceptIntercept,
                ..PriorConfig::default()
            },
            ..ModelConfig::default()
        };
        let outcome = fit(&data, &config);
        let pip: Vec<f64> = outcome
            .summary
            .rows
            .iter()
            .map(|r| r.inclusion_probability)
            .collect();

        assert_eq!(pip[0], 1.0, "{link}: intercept is never excluded");
        for j in [1, 3] {
            assert!(pip[j] > 0.8, "{link}: signal {j} has PIP {}", pip[j]);
        }
        for j in [2, 4] {
            assert!(pip[j] < 0.3, "{link}: noise {j} has PIP {}", pip[j]);
            assert!(pip[j] < pip[1].min(pip[3]));
        }
        let x1 = &outcome.summary.rows[1];
        let x3 = &outcome.summary.rows[3];
        assert!(x1.mean > 0.5 && x3.mean < -0.5, "{link}: {x1:?} {x3:?}");
    }
}

#[test]
fn independent_chains_agree() {
    let data = halton_data(300, vec![-0.5, 1.0, 0.0], LinkFunction::Probit);
    let config = ModelConfig {
        sampler: SamplerConfig {
            link: LinkFunction::Probit,
            iterations: 2000,
            burn_in: 500,
            chains: 3,
            ..SamplerConfig::default()
        },
        prior: PriorConfig {
            selection: SelectionMode::ExceptIntercept,
            ..PriorConfig::default()
        },
        ..ModelConfig::default()
    };
    let outcome = fit(&data, &config);
    assert_eq!(outcome.draws.chains.len(), 3);
    assert_eq!(outcome.draws.num_draws(), 4500);

    let x1 = outcome
        .diagnostics
        .parameters
        .iter()
        .find(|p| p.name == "x1")
        .expect("x1 diagnostics");
    let r_hat = x1.r_hat.expect("multi-chain R-hat");
    assert!(r_hat < 1.05, "R-hat {r_hat}");
    assert!(!outcome.diagnostics.terminated_early);
}

#[test]
fn time_limit_keeps_the_draws_collected_so_far() {
    let data = halton_data(200, vec![0.2, 1.0, -0.5], LinkFunction::Logit);
    let config = ModelConfig {
        sampler: SamplerConfig {
            iterations: 2_000_000,
            burn_in: 1,
            thin: 100,
            max_seconds: Some(0.5),
            ..SamplerConfig::default()
        },
        ..ModelConfig::default()
    };
    let outcome = fit(&data, &config);

    let kept = outcome.draws.num_draws();
    assert!(kept > 0);
    assert!(kept < config.sampler.retained_per_chain(), "kept {kept} draws");
    assert!(outcome.draws.terminated_early());
    assert!(outcome.diagnostics.terminated_early);
    assert!(
        outcome
            .diagnostics
            .warnings
            .iter()
            .any(|w| w.contains("time limit")),
        "{:?}",
        outcome.diagnostics.warnings
    );
    assert_eq!(outcome.model.posterior.num_draws(), kept);
}

#[test]
fn time_limit_before_the_first_draw_leaves_nothing_to_summarize() {
    let data = halton_data(100, vec![0.2, 1.0], LinkFunction::Probit);
    let config = ModelConfig {
        sampler: SamplerConfig {
            link: LinkFunction::Probit,
            iterations: 1000,
            burn_in: 100,
            max_seconds: Some(1e-9),
            ..SamplerConfig::default()
        },
        ..ModelConfig::default()
    };
    let standardizer = Standardizer::identity(data.p() - 1);
    let result = fit_model(&data, standardizer, &config, &NoopProgress);
    assert!(matches!(
        result,
        Err(EstimationError::Prediction(PredictionError::EmptyDraws))
    ));
}
