//! SimCLR-style contrastive representation learning.
//!
//! Learns an image encoder without labels by pulling two augmented views of
//! the same image together in embedding space (NT-Xent loss over in-batch
//! negatives), and periodically measures representation quality with a
//! linear probe over frozen encoder features.

pub mod config;
pub mod error;
pub mod eval;
pub mod metrics;
pub mod model;
pub mod training;

pub use config::{InputConfig, ModelConfig, RunConfig};
pub use error::TrainError;
pub use metrics::{JsonlSink, MemorySink, MetricEvent, MetricSink};
pub use training::trainer::{build_trainer, FeatureLearner, FitOptions, SimClrTrainer};
