//! Typed run configuration with three persisted buckets.
//!
//! The model / input / augment partition is expressed as named sub-structs
//! rather than a runtime key-membership lookup, so bucket placement is
//! checked at compile time. The whole record is written once per run to
//! `<logdir>/config.toml` for reproducibility and never read back by this
//! crate.

use std::fs;
use std::path::{Path, PathBuf};

use imagedata::AugmentSpec;
use serde::{Deserialize, Serialize};

use crate::error::TrainError;

/// Model and optimization hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Temperature for rescaling cosine similarities before the softmax.
    pub temperature: f64,
    /// Hidden width of the projection head.
    pub num_hidden: usize,
    /// Output dimension of the projection head.
    pub output_dim: usize,
    /// Initial learning rate for Adam.
    pub lr: f64,
    /// Steps for the learning rate to decay by half; 0 disables decay.
    pub lr_decay: usize,
    /// Free-form notes saved alongside the run.
    pub notes: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            temperature: 0.1,
            num_hidden: 128,
            output_dim: 64,
            lr: 0.01,
            lr_decay: 10_000,
            notes: String::new(),
        }
    }
}

/// Input and loader parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Image dimensions (height, width).
    pub imshape: [usize; 2],
    /// Number of image channels.
    pub num_channels: usize,
    /// Normalization constant for raw pixel bytes.
    pub norm: f32,
    /// Source images per contrastive batch (the batch holds twice as many
    /// views).
    pub batch_size: usize,
    /// Worker threads for augmentation; `None` runs on the calling thread.
    pub num_parallel_calls: Option<usize>,
    /// Expect single-channel sources stacked to `num_channels`.
    pub single_channel: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig {
            imshape: [32, 32],
            num_channels: 3,
            norm: 255.0,
            batch_size: 64,
            num_parallel_calls: None,
            single_channel: false,
        }
    }
}

/// Full run configuration: the three persisted buckets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    pub model: ModelConfig,
    pub input: InputConfig,
    /// Augmentation policy; `None` means disabled (rejected for contrastive
    /// training by [`RunConfig::validate`]).
    pub augment: Option<AugmentSpec>,
}

impl RunConfig {
    /// Check the preconditions the training pipeline depends on.
    ///
    /// Called before any model or batch construction so violations fail
    /// fast.
    pub fn validate(&self) -> Result<(), TrainError> {
        if self.augment.is_none() {
            return Err(TrainError::AugmentationRequired);
        }
        if self.input.batch_size < 2 {
            return Err(TrainError::InvalidBatchSize(self.input.batch_size));
        }
        if self.model.temperature <= 0.0 {
            return Err(TrainError::InvalidTemperature(self.model.temperature));
        }
        Ok(())
    }

    /// Serialize the three buckets to `<logdir>/config.toml`, overwriting.
    ///
    /// Deterministic: field order comes from the struct definitions.
    pub fn write_to(&self, logdir: &Path) -> Result<PathBuf, TrainError> {
        let rendered = toml::to_string_pretty(self)?;
        fs::create_dir_all(logdir)?;
        let path = logdir.join("config.toml");
        fs::write(&path, rendered)?;
        Ok(path)
    }
}
