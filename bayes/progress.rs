use std::fmt;

/// Phases of a single chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChainPhase {
    BurnIn,
    Sampling,
}

impl ChainPhase {
    pub fn describe(self) -> &'static str {
        match self {
            Self::BurnIn => "burn-in",
            Self::Sampling => "sampling",
        }
    }
}

impl fmt::Display for ChainPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Observer for per-chain sampling progress.
///
/// Chains run on the rayon pool, so callbacks take `&self` and may arrive
/// interleaved from several threads.
pub trait SamplingProgress: Sync {
    fn on_chain_start(&self, chain: usize, total_iterations: usize) {
        let _ = (chain, total_iterations);
    }
    fn on_chain_advance(&self, chain: usize, phase: ChainPhase, completed_iterations: usize) {
        let _ = (chain, phase, completed_iterations);
    }
    fn on_chain_finish(&self, chain: usize) {
        let _ = chain;
    }
}

#[derive(Default)]
pub struct NoopProgress;

impl SamplingProgress for NoopProgress {}
