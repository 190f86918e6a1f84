//! Batching loader over in-memory images.
//!
//! The single entry point [`batches`] slices an image sequence into
//! fixed-size batches and reports the steps-per-epoch count, after checking
//! the shared-shape invariant every batch relies on downstream.

use crate::types::{Image, ImageError};

/// Split `images` into batches of `batch_size` in order.
///
/// Returns the batch sequence and the number of steps per epoch. With
/// `drop_remainder` a trailing partial batch is discarded (required by the
/// contrastive pipeline, where batch shape is part of the loss contract);
/// without it the remainder is kept (feature-extraction passes must see
/// every image).
///
/// # Errors
/// Fails if `images` is empty, `batch_size` is zero, or the images do not
/// all share one shape.
pub fn batches(
    images: &[Image],
    batch_size: usize,
    drop_remainder: bool,
) -> Result<(Vec<Vec<Image>>, usize), ImageError> {
    if images.is_empty() || batch_size == 0 {
        return Err(ImageError::EmptyDataset);
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

    let mut out = Vec::with_capacity(images.len() / batch_size + 1);
    for chunk in images.chunks(batch_size) {
        if drop_remainder && chunk.len() < batch_size {
            tracing::debug!(dropped = chunk.len(), batch_size, "Dropped partial batch");
            break;
        }
        out.push(chunk.to_vec());
    }
    let steps = out.len();
    Ok((out, steps))
}
