//! Error taxonomy for contrastive pretraining.
//!
//! Precondition violations are raised before any tensor computation.
//! Storage and config-serialization failures are fatal and surface to the
//! caller. Evaluation-quality problems (probe non-convergence, degenerate
//! similarities) are warnings only and never interrupt training.

/// Errors surfaced by the pretraining pipeline.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    /// Contrastive training with augmentation disabled is degenerate: the
    /// positive pair would be two identical views.
    #[error("augmentation is required for contrastive pretraining (augment was disabled)")]
    AugmentationRequired,

    /// A batch must hold at least two source images (an even number of
    /// views >= 4) to form a negative-sample pool.
    #[error("invalid batch size {0}: need at least 2 source images per batch")]
    InvalidBatchSize(usize),

    /// Temperature must be strictly positive.
    #[error("temperature must be > 0, got {0}")]
    InvalidTemperature(f64),

    /// An offset label points outside the batch, or the label array length
    /// disagrees with the number of views.
    #[error("pair labels are inconsistent with the batch: {0}")]
    InvalidPairLabels(String),

    /// Train and test splits of the probe data disagree on label encoding.
    #[error("inconsistent label encoding: train has {train_classes} classes, test uses label {test_label}")]
    InconsistentLabels {
        train_classes: usize,
        test_label: usize,
    },

    /// Failed to persist a model artifact. Fatal: the fit loop must not
    /// continue as if the save succeeded.
    #[error("failed to persist model artifact '{name}': {source}")]
    Storage {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// The run config could not be serialized at construction time.
    #[error("failed to serialize run config: {0}")]
    ConfigSerialization(#[from] toml::ser::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] imagedata::ImageError),
}
