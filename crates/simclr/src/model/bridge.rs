//! Tensor bridge between the `imagedata` crate and burn.
//!
//! Images are stored HWC on the data side; burn conv layers want NCHW.
//! The conversion happens here, at the boundary, so neither side needs to
//! know about the other's layout.

use burn::prelude::*;
use burn::tensor::TensorData;
use imagedata::Image;

/// Convert a batch of images to an NCHW float tensor.
///
/// # Panics
/// Panics if the batch is empty or the images disagree in shape; both are
/// programming errors in this pipeline (the loader validates shapes).
pub fn images_to_tensor<B: Backend>(images: &[Image], device: &B::Device) -> Tensor<B, 4> {
    assert!(!images.is_empty(), "image batch must not be empty");
    let (h, w, c) = images[0].shape();
    for (i, img) in images.iter().enumerate() {
        assert_eq!(
            img.shape(),
            (h, w, c),
            "image {i} has shape {:?}, expected {:?}",
            img.shape(),
            (h, w, c)
        );
    }

    let batch = images.len();
    let mut flat = Vec::with_capacity(batch * c * h * w);
    for img in images {
        // HWC -> CHW
        for ch in 0..c {
            for row in 0..h {
                for col in 0..w {
                    flat.push(img.get(row, col, ch));
                }
            }
        }
    }
    Tensor::from_data(TensorData::new(flat, [batch, c, h, w]), device)
}

/// Extract a 2D float tensor as row vectors.
pub fn tensor_to_rows<B: Backend>(tensor: Tensor<B, 2>) -> Vec<Vec<f32>> {
    let [rows, cols] = tensor.dims();
    let flat: Vec<f32> = tensor.into_data().to_vec().unwrap();
    flat.chunks(cols).take(rows).map(<[f32]>::to_vec).collect()
}

/// Extract f64 values from a 1D float tensor.
pub fn tensor_to_vec<B: Backend>(tensor: Tensor<B, 1>) -> Vec<f64> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .unwrap()
        .into_iter()
        .map(f64::from)
        .collect()
}
