#![deny(dead_code)]
#![deny(unused_imports)]

pub mod data;
pub mod diagnostics;
pub mod estimate;
pub mod faer_ndarray;
pub mod gibbs;
pub mod link;
pub mod metropolis;
pub mod model;
pub mod pirls;
pub mod predict;
pub mod prior;
pub mod progress;
pub mod sampler;
pub mod simulate;
pub mod summary;
pub mod types;
