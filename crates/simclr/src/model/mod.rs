//! Model components: base conv encoder, embedding model with projection
//! head, and the image-to-tensor bridge.

pub mod bridge;
pub mod embedding;
pub mod encoder;

pub use embedding::{EmbeddingModel, EmbeddingModelConfig};
pub use encoder::{ConvEncoder, ConvEncoderConfig};
