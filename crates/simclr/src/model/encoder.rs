//! Base convolutional encoder.
//!
//! The contrastive objective is encoder-agnostic; this is the default
//! fully-convolutional network trained as the feature extractor. Swapping
//! encoders means changing [`ConvEncoderConfig`], not the training code;
//! the rest of the pipeline only sees a spatial feature map.

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;
use burn::tensor::activation::relu;

/// Configuration for the default three-stage conv encoder.
#[derive(Config, Debug)]
pub struct ConvEncoderConfig {
    /// Number of input channels.
    pub num_channels: usize,
    /// Channel width after the first stride-2 conv.
    #[config(default = 32)]
    pub width1: usize,
    /// Channel width after the second stride-2 conv.
    #[config(default = 64)]
    pub width2: usize,
    /// Channel width after the third stride-2 conv (the feature dimension).
    #[config(default = 128)]
    pub width3: usize,
}

/// Three stride-2 3x3 convolutions with ReLU, NCHW layout.
///
/// Maps `(batch, num_channels, h, w)` to `(batch, width3, h/8, w/8)`
/// (spatial dims rounded up for odd sizes).
#[derive(Module, Debug)]
pub struct ConvEncoder<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
}

impl ConvEncoderConfig {
    /// Initialize a ConvEncoder with the given configuration.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvEncoder<B> {
        let conv = |d_in: usize, d_out: usize| {
            Conv2dConfig::new([d_in, d_out], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device)
        };
        ConvEncoder {
            conv1: conv(self.num_channels, self.width1),
            conv2: conv(self.width1, self.width2),
            conv3: conv(self.width2, self.width3),
        }
    }

    /// Feature-map channel count produced by [`ConvEncoder::forward`].
    pub fn feature_dim(&self) -> usize {
        self.width3
    }

    /// Spatial output size for a given input size.
    ///
    /// Each stage halves the spatial dims, rounding up (stride 2, kernel 3,
    /// padding 1).
    pub fn spatial_out(&self, size: usize) -> usize {
        let mut s = size;
        for _ in 0..3 {
            s = (s + 1) / 2;
        }
        s
    }
}

impl<B: Backend> ConvEncoder<B> {
    /// Forward pass to the spatial feature map.
    ///
    /// Input shape: `(batch, num_channels, h, w)`
    /// Output shape: `(batch, width3, h', w')`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.conv1.forward(x));
        let x = relu(self.conv2.forward(x));
        relu(self.conv3.forward(x))
    }

    /// Spatially average-pooled features, one vector per image.
    ///
    /// Output shape: `(batch, width3)`. This is the representation the
    /// linear probe evaluates; the projection head never sees it.
    pub fn pooled(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let feat = self.forward(x);
        let [batch, channels, _, _] = feat.dims();
        feat.mean_dim(3).mean_dim(2).reshape([batch, channels])
    }
}
