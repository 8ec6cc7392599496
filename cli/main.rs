#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;

use spikeslab::bayes::data::{SAMPLE_ID_COLUMN, load_prediction_table, load_training_table};
use spikeslab::bayes::diagnostics::write_trace;
use spikeslab::bayes::estimate::fit_table;
use spikeslab::bayes::link::LinkFunction;
use spikeslab::bayes::model::{FittedModel, ModelConfig};
use spikeslab::bayes::predict::{ThresholdMetric, default_threshold_grid, evaluate, scan_thresholds};
use spikeslab::bayes::prior::SelectionMode;
use spikeslab::bayes::progress::{ChainPhase, SamplingProgress};
use spikeslab::bayes::sampler::ChainInit;
use spikeslab::bayes::simulate::{DesignKind, SyntheticDataBuilder};

#[derive(Clone, Copy, ValueEnum)]
pub enum LinkCli {
    Logit,
    Probit,
}

impl From<LinkCli> for LinkFunction {
    fn from(value: LinkCli) -> Self {
        match value {
            LinkCli::Logit => LinkFunction::Logit,
            LinkCli::Probit => LinkFunction::Probit,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SelectionCli {
    All,
    ExceptIntercept,
    Off,
}

impl From<SelectionCli> for SelectionMode {
    fn from(value: SelectionCli) -> Self {
        match value {
            SelectionCli::All => SelectionMode::All,
            SelectionCli::ExceptIntercept => SelectionMode::ExceptIntercept,
            SelectionCli::Off => SelectionMode::Off,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum InitCli {
    Zero,
    Mode,
}

impl From<InitCli> for ChainInit {
    fn from(value: InitCli) -> Self {
        match value {
            InitCli::Zero => ChainInit::Zero,
            InitCli::Mode => ChainInit::Mode,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum MetricCli {
    Accuracy,
    BalancedAccuracy,
    F1,
    Youden,
}

impl From<MetricCli> for ThresholdMetric {
    fn from(value: MetricCli) -> Self {
        match value {
            MetricCli::Accuracy => ThresholdMetric::Accuracy,
            MetricCli::BalancedAccuracy => ThresholdMetric::BalancedAccuracy,
            MetricCli::F1 => ThresholdMetric::F1,
            MetricCli::Youden => ThresholdMetric::Youden,
        }
    }
}

#[derive(Args)]
pub struct FitArgs {
    /// Path to training TSV with a binary response column and numeric feature columns
    pub training_data: PathBuf,

    /// TOML configuration; command-line flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Where to write the fitted model
    #[arg(long, default_value = "model.toml")]
    pub model: PathBuf,

    /// Name of the response column
    #[arg(long)]
    pub response: Option<String>,

    #[arg(long, value_enum)]
    pub link: Option<LinkCli>,

    /// Total iterations per chain, burn-in included
    #[arg(long)]
    pub iterations: Option<usize>,

    #[arg(long)]
    pub burn_in: Option<usize>,

    #[arg(long)]
    pub thin: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of independent chains, run in parallel
    #[arg(long)]
    pub chains: Option<usize>,

    /// Which coefficients carry an inclusion indicator
    #[arg(long, value_enum)]
    pub selection: Option<SelectionCli>,

    /// Slab variance shared by every coefficient
    #[arg(long)]
    pub slab_variance: Option<f64>,

    /// Metropolis passes over the coefficients per iteration (logit only)
    #[arg(long)]
    pub sweeps: Option<usize>,

    #[arg(long, value_enum)]
    pub init: Option<InitCli>,

    /// Stop sampling after this many seconds and keep the draws so far
    #[arg(long)]
    pub max_seconds: Option<f64>,

    /// Fit features on their raw scale
    #[arg(long)]
    pub no_standardize: bool,

    /// Choose the classification threshold on the training data by this metric
    #[arg(long, value_enum)]
    pub tune_threshold: Option<MetricCli>,

    /// Write the per-coefficient posterior summary as TSV
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// Write every retained draw as TSV
    #[arg(long)]
    pub trace: Option<PathBuf>,
}

#[derive(Args)]
pub struct PredictArgs {
    /// Fitted model TOML
    pub model: PathBuf,

    /// TSV holding the model's feature columns
    pub data: PathBuf,

    #[arg(long, default_value = "predictions.tsv")]
    pub output: PathBuf,
}

#[derive(Args)]
pub struct EvaluateArgs {
    /// Fitted model TOML
    pub model: PathBuf,

    /// Labelled TSV holding the model's feature columns and response
    pub data: PathBuf,

    /// Override the model's classification threshold
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Also scan thresholds on this data for the given metric
    #[arg(long, value_enum)]
    pub scan: Option<MetricCli>,
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Number of observations
    #[arg(long, default_value = "500")]
    pub n: usize,

    /// Intercept followed by one coefficient per feature, comma separated
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
    pub coefficients: Vec<f64>,

    #[arg(long, value_enum, default_value_t = LinkCli::Logit)]
    pub link: LinkCli,

    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Use a Halton sequence instead of pseudo-random features
    #[arg(long)]
    pub halton: bool,

    #[arg(long, default_value = "y")]
    pub response: String,

    #[arg(long, default_value = "simulated.tsv")]
    pub output: PathBuf,
}

#[derive(Parser)]
#[command(
    name = "spikeslab",
    version,
    about = "Bayesian logit/probit regression with spike-and-slab variable selection",
    long_about = "Fits binary-outcome regressions by MCMC under a spike-and-slab prior, \
                 reports posterior inclusion probabilities and convergence diagnostics, \
                 and scores new data with Bayesian model averaging."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample the posterior and save a fitted model
    Fit(FitArgs),
    /// Write model-averaged probabilities and classes for new data
    Predict(PredictArgs),
    /// Score a fitted model against labelled data
    Evaluate(EvaluateArgs),
    /// Generate a synthetic training file with known coefficients
    Simulate(SimulateArgs),
    /// Show version and build information
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Fit(args)) => fit(args),
        Some(Commands::Predict(args)) => predict(args),
        Some(Commands::Evaluate(args)) => evaluate_model(args),
        Some(Commands::Simulate(args)) => simulate(args),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => match Cli::command().print_help() {
            Ok(()) => {
                println!();
                Ok(())
            }
            Err(e) => Err(e.into()),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// One progress bar per chain, hidden when stderr is not a terminal.
struct ChainProgressBars {
    bars: Vec<ProgressBar>,
}

impl ChainProgressBars {
    fn new(chains: usize, iterations: usize) -> Result<Self, Box<dyn std::error::Error>> {
        let multi = if std::io::stderr().is_terminal() {
            MultiProgress::with_draw_target(ProgressDrawTarget::stderr_with_hz(10))
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        let style = ProgressStyle::with_template(
            "> chain {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )?
        .progress_chars("█▉▊▋▌▍▎▏  ");
        let bars = (0..chains)
            .map(|chain| {
                let bar = multi.add(ProgressBar::new(iterations as u64));
                bar.set_style(style.clone());
                bar.set_prefix(chain.to_string());
                bar
            })
            .collect();
        Ok(Self { bars })
    }
}

impl SamplingProgress for ChainProgressBars {
    fn on_chain_start(&self, chain: usize, total_iterations: usize) {
        if let Some(bar) = self.bars.get(chain) {
            bar.set_length(total_iterations as u64);
            bar.set_message(ChainPhase::BurnIn.describe());
        }
    }

    fn on_chain_advance(&self, chain: usize, phase: ChainPhase, completed_iterations: usize) {
        if let Some(bar) = self.bars.get(chain) {
            bar.set_position(completed_iterations as u64);
            bar.set_message(phase.describe());
        }
    }

    fn on_chain_finish(&self, chain: usize) {
        if let Some(bar) = self.bars.get(chain) {
            bar.finish_with_message("done");
        }
    }
}

fn path_str(path: &std::path::Path) -> Result<&str, Box<dyn std::error::Error>> {
    path.to_str()
        .ok_or_else(|| format!("path is not valid UTF-8: {}", path.display()).into())
}

fn fit(args: FitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => ModelConfig::load(path_str(path)?)?,
        None => ModelConfig::default(),
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    log::info!("Loading training data from {}", args.training_data.display());
    let table = load_training_table(&args.training_data, &config.response)?;

    let progress = ChainProgressBars::new(config.sampler.chains, config.sampler.iterations)?;
    let outcome = fit_table(&table, &config, &progress)?;

    println!("\nPosterior summary (model-averaged effects, standardized scale):");
    print!("{}", outcome.summary);
    println!("\nConvergence diagnostics:");
    print!("{}", outcome.diagnostics);
    if let Some(scan) = &outcome.model.threshold_scan {
        println!(
            "\nTuned threshold: {:.2} ({} {:.4} on the training data, optimistic)",
            scan.threshold, scan.metric, scan.score
        );
    }

    outcome.model.save(path_str(&args.model)?)?;
    println!("\nModel saved to: {}", args.model.display());

    if let Some(path) = &args.summary {
        outcome.summary.write_tsv(path)?;
        println!("Summary written to: {}", path.display());
    }
    if let Some(path) = &args.trace {
        write_trace(path, &outcome.draws, &outcome.model.coefficient_names())?;
        println!("Trace written to: {}", path.display());
    }
    Ok(())
}

fn apply_overrides(config: &mut ModelConfig, args: &FitArgs) {
    if let Some(response) = &args.response {
        config.response = response.clone();
    }
    if args.no_standardize {
        config.standardize = false;
    }
    if let Some(metric) = args.tune_threshold {
        config.tune_threshold = Some(metric.into());
    }

    let sampler = &mut config.sampler;
    if let Some(link) = args.link {
        sampler.link = link.into();
    }
    if let Some(iterations) = args.iterations {
        sampler.iterations = iterations;
    }
    if let Some(burn_in) = args.burn_in {
        sampler.burn_in = burn_in;
    }
    if let Some(thin) = args.thin {
        sampler.thin = thin;
    }
    if let Some(seed) = args.seed {
        sampler.seed = seed;
    }
    if let Some(chains) = args.chains {
        sampler.chains = chains;
    }
    if let Some(init) = args.init {
        sampler.init = init.into();
    }
    if let Some(max_seconds) = args.max_seconds {
        sampler.max_seconds = Some(max_seconds);
    }
    if let Some(sweeps) = args.sweeps {
        sampler.proposal.sweeps = sweeps;
    }

    if let Some(selection) = args.selection {
        config.prior.selection = selection.into();
    }
    if let Some(slab_variance) = args.slab_variance {
        config.prior.slab_variance = slab_variance;
    }
}

fn predict(args: PredictArgs) -> Result<(), Box<dyn std::error::Error>> {
    let model = FittedModel::load(path_str(&args.model)?)?;
    let table = load_prediction_table(&args.data, &model.feature_names, &model.config.response)?;
    let probabilities = model.predict_proba(table.features.view())?;
    let classes = model.classify(probabilities.view())?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(&args.output)?;
    writer.write_record([SAMPLE_ID_COLUMN, "probability", "class"])?;
    for ((id, p), class) in table.sample_ids.iter().zip(&probabilities).zip(&classes) {
        writer.write_record([id.clone(), p.to_string(), class.to_string()])?;
    }
    writer.flush()?;

    log::info!(
        "Scored {} observations at threshold {:.2}",
        probabilities.len(),
        model.threshold
    );
    println!("Predictions saved to: {}", args.output.display());
    Ok(())
}

fn evaluate_model(args: EvaluateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let model = FittedModel::load(path_str(&args.model)?)?;
    let table = load_prediction_table(&args.data, &model.feature_names, &model.config.response)?;
    let labels = table.labels.as_ref().ok_or_else(|| {
        format!(
            "{} has no '{}' column to evaluate against",
            args.data.display(),
            model.config.response
        )
    })?;
    let probabilities = model.predict_proba(table.features.view())?;

    let threshold = args.threshold.unwrap_or(model.threshold);
    let report = evaluate(
        probabilities.view(),
        labels.view(),
        threshold,
        model.config.calibration_bins,
    )?;
    print!("{report}");

    if let Some(metric) = args.scan {
        let scan = scan_thresholds(
            probabilities.view(),
            labels.view(),
            metric.into(),
            &default_threshold_grid(),
            true,
        )?;
        println!(
            "best_threshold\t{:.2}\t{}\t{:.4}\ttuned_on_scored_split={}",
            scan.threshold, scan.metric, scan.score, scan.tuned_on_scored_split
        );
    }
    Ok(())
}

fn simulate(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let design = if args.halton {
        DesignKind::Halton
    } else {
        DesignKind::Random
    };
    let data = SyntheticDataBuilder::new(args.n, args.coefficients)
        .with_link(args.link.into())
        .with_design(design)
        .with_seed(args.seed)
        .build()?;
    data.write_tsv(&args.output, &args.response)?;

    let positives = data.labels.iter().filter(|&&y| y == 1.0).count();
    println!(
        "Simulated {} observations ({} positive, mean true probability {:.3}) to: {}",
        data.labels.len(),
        positives,
        data.true_probabilities.mean().unwrap_or(f64::NAN),
        args.output.display()
    );
    Ok(())
}

/// Format seconds into a human-readable duration like "2.4 hours ago"
fn format_duration_ago(seconds: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    if seconds < MINUTE {
        format!("{seconds} seconds ago")
    } else if seconds < HOUR {
        format!("{:.1} minutes ago", seconds as f64 / MINUTE as f64)
    } else if seconds < DAY {
        format!("{:.1} hours ago", seconds as f64 / HOUR as f64)
    } else {
        format!("{:.1} days ago", seconds as f64 / DAY as f64)
    }
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let build_timestamp: u64 = env!("SPIKESLAB_BUILD_TIMESTAMP").parse().unwrap_or(0);

    println!("spikeslab {version}");
    if build_timestamp > 0 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if now > build_timestamp {
            println!("Built: {}", format_duration_ago(now - build_timestamp));
        } else {
            println!("Built: just now");
        }
    }
}
