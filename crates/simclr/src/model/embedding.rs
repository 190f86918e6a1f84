//! Embedding model: base encoder plus projection head.
//!
//! The projection head (flatten → dense/ReLU → linear dense) maps encoder
//! features into the space where similarity is computed. Encoder and head
//! sit on one autodiff graph and are updated jointly; no normalization is
//! applied here; the loss step normalizes.

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

use crate::model::encoder::{ConvEncoder, ConvEncoderConfig};

/// Configuration for the full embedding model.
#[derive(Config, Debug)]
pub struct EmbeddingModelConfig {
    /// Input image height.
    pub height: usize,
    /// Input image width.
    pub width: usize,
    /// Number of input channels.
    pub num_channels: usize,
    /// Hidden width of the projection head.
    #[config(default = 128)]
    pub num_hidden: usize,
    /// Output embedding dimension.
    #[config(default = 64)]
    pub output_dim: usize,
}

/// Base encoder with the contrastive projection head appended.
#[derive(Module, Debug)]
pub struct EmbeddingModel<B: Backend> {
    /// The feature extractor being pretrained. Public so the trainer can
    /// checkpoint it and the probe can evaluate it on its own.
    pub encoder: ConvEncoder<B>,
    fc_hidden: Linear<B>,
    fc_out: Linear<B>,
}

impl EmbeddingModelConfig {
    /// Initialize the encoder and projection head for these dimensions.
    pub fn init<B: Backend>(&self, device: &B::Device) -> EmbeddingModel<B> {
        let encoder_config = ConvEncoderConfig::new(self.num_channels);
        let flat_dim = encoder_config.feature_dim()
            * encoder_config.spatial_out(self.height)
            * encoder_config.spatial_out(self.width);
        EmbeddingModel {
            encoder: encoder_config.init(device),
            fc_hidden: LinearConfig::new(flat_dim, self.num_hidden).init(device),
            fc_out: LinearConfig::new(self.num_hidden, self.output_dim).init(device),
        }
    }
}

impl<B: Backend> EmbeddingModel<B> {
    /// One embedding vector per input image.
    ///
    /// Input shape: `(batch, channels, h, w)`
    /// Output shape: `(batch, output_dim)`, unnormalized.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let feat = self.encoder.forward(images);
        let [batch, channels, h, w] = feat.dims();
        let flat = feat.reshape([batch, channels * h * w]);
        let hidden = relu(self.fc_hidden.forward(flat));
        self.fc_out.forward(hidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::optim::GradientsParams;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = EmbeddingModelConfig::new(32, 32, 3)
            .init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::random(
            [4, 3, 32, 32],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        assert_eq!(model.forward(input).dims(), [4, 64]);
    }

    #[test]
    fn test_custom_dims() {
        let device = Default::default();
        let model = EmbeddingModelConfig::new(16, 16, 1)
            .with_num_hidden(32)
            .with_output_dim(8)
            .init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::random(
            [2, 1, 16, 16],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        assert_eq!(model.forward(input).dims(), [2, 8]);
    }

    #[test]
    fn test_gradient_reaches_encoder() {
        // Encoder weights must be trained jointly with the head: one Adam
        // step on the full model has to change the encoder's own output.
        use burn::module::AutodiffModule;
        use burn::optim::{AdamConfig, Optimizer};

        let device = Default::default();
        let model = EmbeddingModelConfig::new(8, 8, 1)
            .with_num_hidden(16)
            .with_output_dim(4)
            .init::<TestAutodiffBackend>(&device);
        let mut optimizer = AdamConfig::new().init();

        let probe = Tensor::<TestBackend, 4>::random(
            [2, 1, 8, 8],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let before = model.encoder.valid().forward(probe.clone());

        let input = Tensor::<TestAutodiffBackend, 4>::random(
            [2, 1, 8, 8],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let loss = model.forward(input).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        let model = optimizer.step(0.1, model, grads);

        let after = model.encoder.valid().forward(probe);
        let delta: f32 = (after - before).abs().sum().into_scalar();
        assert!(delta > 0.0, "encoder output unchanged after update");
    }
}
