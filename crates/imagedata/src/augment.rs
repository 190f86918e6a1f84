//! Stochastic image augmentation.
//!
//! Each [`Augmenter::apply`] call draws fresh random parameters, so two
//! augmentations of the same source image differ with probability 1, which
//! is the property the contrastive objective depends on.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::Image;

/// Parameters for the stochastic augmentation policy.
///
/// The defaults mirror a standard light policy for small natural images:
/// pad-and-random-crop, horizontal flip, brightness and contrast jitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentSpec {
    /// Zero-padding (pixels per side) before a random crop back to the
    /// original size. 0 disables the crop.
    pub crop_pad: usize,
    /// Flip left-right with probability 0.5.
    pub flip_left_right: bool,
    /// Maximum absolute additive brightness shift, drawn uniformly.
    pub max_brightness_delta: f32,
    /// Contrast factor drawn uniformly from `[1 - d, 1 + d]` around the
    /// per-image mean.
    pub max_contrast_delta: f32,
}

impl Default for AugmentSpec {
    fn default() -> Self {
        AugmentSpec {
            crop_pad: 4,
            flip_left_right: true,
            max_brightness_delta: 0.2,
            max_contrast_delta: 0.4,
        }
    }
}

impl AugmentSpec {
    /// Map the boolean convention from upstream configs: `true` selects the
    /// default policy, `false` disables augmentation entirely.
    pub fn from_flag(enabled: bool) -> Option<Self> {
        enabled.then(Self::default)
    }
}

/// Applies an [`AugmentSpec`] to images with fresh random draws per call.
#[derive(Debug, Clone)]
pub struct Augmenter {
    spec: AugmentSpec,
}

impl Augmenter {
    pub fn new(spec: AugmentSpec) -> Self {
        Augmenter { spec }
    }

    pub fn spec(&self) -> &AugmentSpec {
        &self.spec
    }

    /// One independent stochastic augmentation of `image`.
    ///
    /// Output keeps the input shape and is clamped to [0, 1].
    pub fn apply(&self, image: &Image, rng: &mut impl Rng) -> Image {
        let mut out = image.clone();
        if self.spec.crop_pad > 0 {
            out = random_crop(&out, self.spec.crop_pad, rng);
        }
        if self.spec.flip_left_right && rng.gen::<bool>() {
            out = flip_left_right(&out);
        }
        if self.spec.max_brightness_delta > 0.0 {
            let delta = rng.gen_range(-self.spec.max_brightness_delta..self.spec.max_brightness_delta);
            adjust_brightness(&mut out, delta);
        }
        if self.spec.max_contrast_delta > 0.0 {
            let factor =
                rng.gen_range(1.0 - self.spec.max_contrast_delta..1.0 + self.spec.max_contrast_delta);
            adjust_contrast(&mut out, factor);
        }
        clamp_unit(&mut out);
        out
    }
}

/// Zero-pad by `pad` on every side, then crop back to the original size at a
/// random offset.
fn random_crop(image: &Image, pad: usize, rng: &mut impl Rng) -> Image {
    let (h, w, c) = image.shape();
    let row_off = rng.gen_range(0..=2 * pad);
    let col_off = rng.gen_range(0..=2 * pad);

    let mut out = Image::zeros(h, w, c);
    for row in 0..h {
        // Source coordinates in the padded frame; outside the original image
        // the padding contributes zeros, which are already in place.
        let src_row = row + row_off;
        if src_row < pad || src_row >= h + pad {
            continue;
        }
        for col in 0..w {
            let src_col = col + col_off;
            if src_col < pad || src_col >= w + pad {
                continue;
            }
            for ch in 0..c {
                out.set(row, col, ch, image.get(src_row - pad, src_col - pad, ch));
            }
        }
    }
    out
}

fn flip_left_right(image: &Image) -> Image {
    let (h, w, c) = image.shape();
    let mut out = Image::zeros(h, w, c);
    for row in 0..h {
        for col in 0..w {
            for ch in 0..c {
                out.set(row, col, ch, image.get(row, w - 1 - col, ch));
            }
        }
    }
    out
}

fn adjust_brightness(image: &mut Image, delta: f32) {
    let (h, w, c) = image.shape();
    for row in 0..h {
        for col in 0..w {
            for ch in 0..c {
                image.set(row, col, ch, image.get(row, col, ch) + delta);
            }
        }
    }
}

/// Rescale deviations from the per-image mean by `factor`.
fn adjust_contrast(image: &mut Image, factor: f32) {
    let mean = image.mean();
    let (h, w, c) = image.shape();
    for row in 0..h {
        for col in 0..w {
            for ch in 0..c {
                let v = image.get(row, col, ch);
                image.set(row, col, ch, mean + (v - mean) * factor);
            }
        }
    }
}

fn clamp_unit(image: &mut Image) {
    let (h, w, c) = image.shape();
    for row in 0..h {
        for col in 0..w {
            for ch in 0..c {
                image.set(row, col, ch, image.get(row, col, ch).clamp(0.0, 1.0));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gradient_image() -> Image {
        let mut img = Image::zeros(8, 8, 3);
        for row in 0..8 {
            for col in 0..8 {
                for ch in 0..3 {
                    img.set(row, col, ch, (row * 8 + col) as f32 / 64.0);
                }
            }
        }
        img
    }

    #[test]
    fn test_from_flag() {
        assert_eq!(AugmentSpec::from_flag(true), Some(AugmentSpec::default()));
        assert_eq!(AugmentSpec::from_flag(false), None);
    }

    #[test]
    fn test_apply_preserves_shape_and_range() {
        let aug = Augmenter::new(AugmentSpec::default());
        let mut rng = StdRng::seed_from_u64(7);
        let img = gradient_image();
        for _ in 0..10 {
            let out = aug.apply(&img, &mut rng);
            assert_eq!(out.shape(), img.shape());
            for &v in out.data() {
                assert!((0.0..=1.0).contains(&v), "pixel {v} outside unit interval");
            }
        }
    }

    #[test]
    fn test_two_draws_differ() {
        // Continuous brightness/contrast jitter makes identical draws a
        // measure-zero event.
        let aug = Augmenter::new(AugmentSpec::default());
        let mut rng = StdRng::seed_from_u64(11);
        let img = gradient_image();
        let a = aug.apply(&img, &mut rng);
        let b = aug.apply(&img, &mut rng);
        assert_ne!(a.data(), b.data());
    }

    #[test]
    fn test_flip_reverses_columns() {
        let img = gradient_image();
        let flipped = flip_left_right(&img);
        assert_eq!(flipped.get(3, 0, 0), img.get(3, 7, 0));
        assert_eq!(flipped.get(3, 7, 1), img.get(3, 0, 1));
    }

    #[test]
    fn test_contrast_preserves_mean() {
        let mut img = gradient_image();
        let before = img.mean();
        adjust_contrast(&mut img, 1.7);
        assert!((img.mean() - before).abs() < 1e-4);
    }

    #[test]
    fn test_identity_spec_is_identity() {
        let aug = Augmenter::new(AugmentSpec {
            crop_pad: 0,
            flip_left_right: false,
            max_brightness_delta: 0.0,
            max_contrast_delta: 0.0,
        });
        let mut rng = StdRng::seed_from_u64(3);
        let img = gradient_image();
        assert_eq!(aug.apply(&img, &mut rng), img);
    }
}
