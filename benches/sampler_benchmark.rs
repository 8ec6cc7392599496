// ========================================================================================
//
//                       Spikeslab sampler iteration benchmark
//
// ========================================================================================
//
// Measures the cost of one full Gibbs iteration (coefficients, inclusion
// indicators, inclusion rate) for both links as the number of observations
// grows, plus the penalized mode search that seeds the logit proposals.
//
// ========================================================================================

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;
use spikeslab::bayes::data::TrainingData;
use spikeslab::bayes::gibbs::LatentGibbsKernel;
use spikeslab::bayes::link::LinkFunction;
use spikeslab::bayes::metropolis::MetropolisKernel;
use spikeslab::bayes::pirls::{ModeOptions, find_posterior_mode};
use spikeslab::bayes::prior::{PriorConfig, SelectionMode, SpikeSlabPrior};
use spikeslab::bayes::sampler::{ChainState, Kernel, PosteriorTarget, ProposalConfig};
use spikeslab::bayes::simulate::{DesignKind, SyntheticDataBuilder};
use spikeslab::bayes::types::Coefficients;

// --- Benchmark Tuning Parameters ---

/// Observation counts on the x-axis.
const SAMPLE_SIZES: [usize; 3] = [200, 1_000, 5_000];
/// Intercept followed by the feature effects; half the features are null.
const COEFFICIENTS: [f64; 9] = [0.3, 1.0, 0.0, -0.8, 0.0, 0.5, 0.0, -0.4, 0.0];

fn training_data(n: usize, link: LinkFunction) -> TrainingData {
    SyntheticDataBuilder::new(n, COEFFICIENTS.to_vec())
        .with_link(link)
        .with_design(DesignKind::Halton)
        .build()
        .and_then(|data| data.into_training_data())
        .expect("synthetic data")
}

fn prior() -> SpikeSlabPrior {
    let config = PriorConfig {
        slab_variance: 4.0,
        selection: SelectionMode::ExceptIntercept,
        ..PriorConfig::default()
    };
    SpikeSlabPrior::from_config(&config, COEFFICIENTS.len()).expect("valid prior")
}

fn bench_iterations(c: &mut Criterion) {
    let prior = prior();
    let mut group = c.benchmark_group("gibbs_iteration");

    for link in [LinkFunction::Logit, LinkFunction::Probit] {
        for &n in &SAMPLE_SIZES {
            let data = training_data(n, link);
            let target = PosteriorTarget::new(data.x.view(), data.y.view(), &prior, link)
                .expect("valid target");
            let mut kernel = match link {
                LinkFunction::Logit => Kernel::Metropolis(MetropolisKernel::new(
                    ndarray::Array1::from_elem(COEFFICIENTS.len(), 0.1),
                    &ProposalConfig::default(),
                )),
                LinkFunction::Probit => Kernel::Gibbs(LatentGibbsKernel::new(&target)),
            };
            let mut state = ChainState::new(&target, Coefficients::zeros(COEFFICIENTS.len()));
            let mut rng = StdRng::seed_from_u64(7);

            group.throughput(Throughput::Elements(n as u64));
            group.bench_with_input(BenchmarkId::new(link.to_string(), n), &n, |b, _| {
                b.iter(|| {
                    kernel
                        .step(&target, &mut state, &mut rng, false)
                        .expect("iteration");
                    black_box(state.inclusion_probability)
                })
            });
        }
    }
    group.finish();
}

fn bench_mode_search(c: &mut Criterion) {
    let prior = prior();
    let mut group = c.benchmark_group("posterior_mode");
    for &n in &SAMPLE_SIZES {
        let data = training_data(n, LinkFunction::Logit);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let mode = find_posterior_mode(
                    data.x.view(),
                    data.y.view(),
                    &prior,
                    LinkFunction::Logit,
                    &ModeOptions::default(),
                )
                .expect("mode");
                black_box(mode.log_posterior)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_iterations, bench_mode_search);
criterion_main!(benches);
