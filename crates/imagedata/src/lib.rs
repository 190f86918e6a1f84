//! In-memory image data for contrastive pretraining.
//!
//! Provides the owned [`Image`] tensor type, labeled train/test splits for
//! downstream evaluation, the stochastic augmentation collaborator, and the
//! batching loader used by both the pair-batch pipeline and the linear probe.

pub mod augment;
pub mod loader;
pub mod types;

pub use augment::{AugmentSpec, Augmenter};
pub use loader::batches;
pub use types::{Image, ImageError, LabeledImages};
