//! NT-Xent: normalized temperature-scaled cross-entropy.
//!
//! Embeddings are L2-normalized, pairwise cosine similarities form a
//! `2N x 2N` matrix, a large constant is subtracted on the diagonal so
//! self-similarity vanishes from the softmax denominator without any
//! reshaping or gathering, and each row is scored against its augmented
//! twin with softmax cross-entropy over the full row.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;
use burn::tensor::TensorData;

use crate::error::TrainError;

/// Subtracted on the diagonal before the softmax. Large enough that
/// `exp((sim - MASK_VALUE) / tau)` underflows to ~0 for any cosine
/// similarity in [-1, 1] and any reasonable temperature.
pub const MASK_VALUE: f32 = 1000.0;

/// L2-normalize each row of a `(batch, dim)` tensor.
pub fn l2_normalize<B: Backend>(embeddings: Tensor<B, 2>) -> Tensor<B, 2> {
    let norms = embeddings
        .clone()
        .powf_scalar(2.0)
        .sum_dim(1)
        .sqrt()
        .clamp_min(1e-12);
    embeddings / norms
}

/// Full pairwise cosine-similarity matrix of a batch of embeddings.
///
/// Rows are normalized first, so entry `(i, j)` is the cosine of the angle
/// between embeddings `i` and `j`. The result is symmetric with a unit
/// diagonal.
pub fn similarity_matrix<B: Backend>(embeddings: Tensor<B, 2>) -> Tensor<B, 2> {
    let normed = l2_normalize(embeddings);
    normed.clone().matmul(normed.transpose())
}

/// Mask self-similarities and rescale by temperature.
///
/// Subtracts [`MASK_VALUE`] on the diagonal only (off-diagonal entries and
/// their relative ordering within each row are untouched), then divides the
/// whole matrix by `temperature`.
pub fn masked_logits<B: Backend>(sim: Tensor<B, 2>, temperature: f64) -> Tensor<B, 2> {
    let [n, _] = sim.dims();
    let device = sim.device();

    let mut eye = vec![0.0_f32; n * n];
    for i in 0..n {
        eye[i * n + i] = 1.0;
    }
    let eye = Tensor::<B, 2>::from_data(TensorData::new(eye, [n, n]), &device);

    (sim - eye * MASK_VALUE) / temperature
}

/// NT-Xent loss over a batch of `2N` view embeddings.
///
/// `labels[i]` is the signed offset to view `i`'s augmented twin, so the
/// target class for row `i` is `i + labels[i]`. The loss is the mean
/// softmax cross-entropy over all `2N` rows, divided by `replicas` for
/// correct gradient averaging under data-parallel training (pass 1 on a
/// single device).
///
/// # Errors
/// All preconditions are checked before any tensor work: the batch must be
/// even-sized and hold at least 4 views, `temperature` must be positive,
/// and every `i + labels[i]` must land inside the batch.
pub fn nt_xent_loss<B: Backend>(
    embeddings: Tensor<B, 2>,
    labels: &[i64],
    temperature: f64,
    replicas: usize,
) -> Result<Tensor<B, 1>, TrainError> {
    let [n, _dim] = embeddings.dims();
    if n % 2 != 0 || n < 4 {
        return Err(TrainError::InvalidBatchSize(n / 2));
    }
    if temperature <= 0.0 {
        return Err(TrainError::InvalidTemperature(temperature));
    }
    if labels.len() != n {
        return Err(TrainError::InvalidPairLabels(format!(
            "{} labels for {n} views",
            labels.len()
        )));
    }
    let mut targets = Vec::with_capacity(n);
    for (i, &label) in labels.iter().enumerate() {
        let target = i as i64 + label;
        if target < 0 || target as usize >= n || target as usize == i {
            return Err(TrainError::InvalidPairLabels(format!(
                "label {label} at index {i} targets {target}"
            )));
        }
        targets.push(target);
    }

    let device = embeddings.device();
    let logits = masked_logits(similarity_matrix(embeddings), temperature);
    let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(targets, [n]), &device);

    let loss = CrossEntropyLossConfig::new()
        .init(&device)
        .forward(logits, targets);
    Ok(loss / replicas as f64)
}
