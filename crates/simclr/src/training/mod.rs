//! Contrastive training pipeline: pair-batch construction, NT-Xent loss,
//! and the epoch-level training loop.

pub mod loss;
pub mod pairs;
pub mod trainer;

pub use pairs::{PairBatch, PairBatchBuilder};
