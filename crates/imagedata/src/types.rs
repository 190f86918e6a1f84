//! Core image data types.

use serde::{Deserialize, Serialize};

/// Errors from image construction and dataset assembly.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// Buffer length does not match the declared shape.
    #[error("image data has {got} values, expected {expected} for shape {height}x{width}x{channels}")]
    BadLength {
        got: usize,
        expected: usize,
        height: usize,
        width: usize,
        channels: usize,
    },

    /// Two images in one batch have different shapes.
    #[error("image shape {got:?} does not match batch shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        got: (usize, usize, usize),
    },

    /// A dataset or batch request over zero images.
    #[error("dataset contains no images")]
    EmptyDataset,

    /// Label vector length differs from image count.
    #[error("{labels} labels for {images} images")]
    LabelMismatch { labels: usize, images: usize },
}

/// An owned H×W×C image tensor, row-major, values normalized to [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    data: Vec<f32>,
    height: usize,
    width: usize,
    channels: usize,
}

impl Image {
    /// Wrap an existing buffer. The buffer must hold `height * width * channels`
    /// values in HWC row-major order.
    pub fn new(
        data: Vec<f32>,
        height: usize,
        width: usize,
        channels: usize,
    ) -> Result<Self, ImageError> {
        let expected = height * width * channels;
        if data.len() != expected {
            return Err(ImageError::BadLength {
                got: data.len(),
                expected,
                height,
                width,
                channels,
            });
        }
        Ok(Image {
            data,
            height,
            width,
            channels,
        })
    }

    /// Build a normalized image from raw byte pixel values.
    ///
    /// Each byte is divided by `norm` (255 for standard 8-bit images) so the
    /// result lands in the unit interval.
    pub fn from_bytes(
        bytes: &[u8],
        height: usize,
        width: usize,
        channels: usize,
        norm: f32,
    ) -> Result<Self, ImageError> {
        let data = bytes.iter().map(|&b| f32::from(b) / norm).collect();
        Self::new(data, height, width, channels)
    }

    /// An all-zero image of the given shape.
    pub fn zeros(height: usize, width: usize, channels: usize) -> Self {
        Image {
            data: vec![0.0; height * width * channels],
            height,
            width,
            channels,
        }
    }

    /// Stack a single-channel image into `channels` identical channels.
    ///
    /// Used when a grayscale source must feed a multi-channel encoder.
    pub fn stack_channels(&self, channels: usize) -> Result<Self, ImageError> {
        if self.channels != 1 {
            return Err(ImageError::ShapeMismatch {
                expected: (self.height, self.width, 1),
                got: self.shape(),
            });
        }
        let mut data = Vec::with_capacity(self.height * self.width * channels);
        for &v in &self.data {
            for _ in 0..channels {
                data.push(v);
            }
        }
        Ok(Image {
            data,
            height: self.height,
            width: self.width,
            channels,
        })
    }

    /// Shape as (height, width, channels).
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Flat HWC pixel buffer.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Pixel value at (row, col, channel).
    #[inline]
    pub fn get(&self, row: usize, col: usize, channel: usize) -> f32 {
        self.data[(row * self.width + col) * self.channels + channel]
    }

    /// Set the pixel value at (row, col, channel).
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, channel: usize, value: f32) {
        self.data[(row * self.width + col) * self.channels + channel] = value;
    }

    /// Mean pixel value over all positions and channels.
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }
}

/// A labeled image split for downstream (linear probe) evaluation.
#[derive(Debug, Clone)]
pub struct LabeledImages {
    images: Vec<Image>,
    labels: Vec<usize>,
}

impl LabeledImages {
    /// Pair images with integer class labels.
    ///
    /// # Errors
    /// Fails if the vectors disagree in length, the set is empty, or the
    /// images do not all share one shape.
    pub fn new(images: Vec<Image>, labels: Vec<usize>) -> Result<Self, ImageError> {
        if images.is_empty() {
            return Err(ImageError::EmptyDataset);
        }
        if images.len() != labels.len() {
            return Err(ImageError::LabelMismatch {
                labels: labels.len(),
                images: images.len(),
            });
        }
        let shape = images[0].shape();
        for img in &images[1..] {
            if img.shape() != shape {
                return Err(ImageError::ShapeMismatch {
                    expected: shape,
                    got: img.shape(),
                });
            }
        }
        Ok(LabeledImages { images, labels })
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Number of distinct classes implied by the labels (max label + 1).
    pub fn num_classes(&self) -> usize {
        self.labels.iter().copied().max().map_or(0, |m| m + 1)
    }
}
