//! Linear probe: quantify representation quality without fine-tuning.
//!
//! The frozen encoder maps both labeled splits to spatially pooled feature
//! vectors; a standardizing scaler is fit on the train vectors only; a
//! multinomial logistic classifier (one linear layer, softmax
//! cross-entropy, full-batch Adam) is fit on train and scored on test.
//! Classifier non-convergence degrades evaluation quality but never halts
//! training, so it is a warning rather than an error.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::nn::{Linear, LinearConfig};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;
use imagedata::{Image, LabeledImages};

use crate::error::TrainError;
use crate::eval::scaler::StandardScaler;
use crate::model::bridge::{images_to_tensor, tensor_to_rows};
use crate::model::encoder::ConvEncoder;

/// Labeled train/test splits for the probe. Examples must be disjoint
/// between the splits.
#[derive(Debug, Clone)]
pub struct ProbeData {
    train: LabeledImages,
    test: LabeledImages,
}

impl ProbeData {
    /// Pair the splits, checking that they agree on shape and label
    /// encoding (every test label must exist in the train encoding).
    pub fn new(train: LabeledImages, test: LabeledImages) -> Result<Self, TrainError> {
        let shape = train.images()[0].shape();
        if test.images()[0].shape() != shape {
            return Err(imagedata::ImageError::ShapeMismatch {
                expected: shape,
                got: test.images()[0].shape(),
            }
            .into());
        }
        let train_classes = train.num_classes();
        if let Some(&bad) = test.labels().iter().find(|&&l| l >= train_classes) {
            return Err(TrainError::InconsistentLabels {
                train_classes,
                test_label: bad,
            });
        }
        Ok(ProbeData { train, test })
    }

    pub fn train(&self) -> &LabeledImages {
        &self.train
    }

    pub fn test(&self) -> &LabeledImages {
        &self.test
    }
}

/// Fitting parameters for the logistic classifier.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Maximum full-batch gradient steps.
    pub max_iter: usize,
    /// Adam learning rate.
    pub lr: f64,
    /// Convergence tolerance on the absolute loss improvement.
    pub tol: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            max_iter: 300,
            lr: 0.1,
            tol: 1e-6,
        }
    }
}

/// Probe outcome: out-of-sample accuracy and the confusion matrix
/// (rows = true class, columns = predicted class).
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub accuracy: f64,
    pub confusion: Vec<Vec<u64>>,
}

impl ProbeReport {
    /// Confusion matrix as an image-shaped metric, normalized to [0, 1] by
    /// its maximum entry.
    pub fn confusion_image(&self) -> (usize, usize, Vec<f32>) {
        let rows = self.confusion.len();
        let cols = self.confusion.first().map_or(0, Vec::len);
        let max = self
            .confusion
            .iter()
            .flatten()
            .copied()
            .max()
            .unwrap_or(0)
            .max(1) as f32;
        let values = self
            .confusion
            .iter()
            .flatten()
            .map(|&v| v as f32 / max)
            .collect();
        (rows, cols, values)
    }

    /// True when every off-diagonal entry is zero.
    pub fn is_diagonal(&self) -> bool {
        self.confusion.iter().enumerate().all(|(i, row)| {
            row.iter()
                .enumerate()
                .all(|(j, &v)| i == j || v == 0)
        })
    }
}

/// Run the encoder in inference mode over `images` and average-pool each
/// feature map to one vector per image.
///
/// Every image is seen exactly once (no remainder dropping here).
pub fn pooled_features<B: Backend>(
    encoder: &ConvEncoder<B>,
    images: &[Image],
    batch_size: usize,
    device: &B::Device,
) -> Result<Vec<Vec<f32>>, TrainError> {
    let (batches, _steps) = imagedata::batches(images, batch_size, false)?;
    let mut out = Vec::with_capacity(images.len());
    for batch in &batches {
        let tensor = images_to_tensor::<B>(batch, device);
        out.extend(tensor_to_rows(encoder.pooled(tensor)));
    }
    Ok(out)
}

/// Fit a multinomial logistic classifier and score it on the test vectors.
///
/// The scaler is fit on the train vectors only and applied to both splits.
pub fn fit_and_score<B: AutodiffBackend>(
    train_x: &[Vec<f32>],
    train_y: &[usize],
    test_x: &[Vec<f32>],
    test_y: &[usize],
    n_classes: usize,
    config: &ProbeConfig,
    device: &B::Device,
) -> ProbeReport {
    let scaler = StandardScaler::fit(train_x);
    let train_x = scaler.transform(train_x);
    let test_x = scaler.transform(test_x);

    let classifier = fit_logistic::<B>(&train_x, train_y, n_classes, config, device);
    let preds = predict(&classifier, &test_x, device);

    let correct = preds
        .iter()
        .zip(test_y)
        .filter(|(p, t)| p == t)
        .count();
    let mut confusion = vec![vec![0_u64; n_classes]; n_classes];
    for (&truth, &pred) in test_y.iter().zip(&preds) {
        confusion[truth][pred] += 1;
    }

    ProbeReport {
        accuracy: correct as f64 / test_y.len() as f64,
        confusion,
    }
}

/// Full linear-classification test against a frozen encoder.
pub fn linear_classification_test<B: AutodiffBackend>(
    encoder: &ConvEncoder<B::InnerBackend>,
    data: &ProbeData,
    batch_size: usize,
    config: &ProbeConfig,
    device: &B::Device,
) -> Result<ProbeReport, TrainError> {
    let train_x = pooled_features(encoder, data.train.images(), batch_size, device)?;
    let test_x = pooled_features(encoder, data.test.images(), batch_size, device)?;

    Ok(fit_and_score::<B>(
        &train_x,
        data.train.labels(),
        &test_x,
        data.test.labels(),
        data.train.num_classes(),
        config,
        device,
    ))
}

fn vectors_to_tensor<B: Backend>(rows: &[Vec<f32>], device: &B::Device) -> Tensor<B, 2> {
    let n = rows.len();
    let dim = rows[0].len();
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Tensor::from_data(TensorData::new(flat, [n, dim]), device)
}

/// Full-batch softmax-regression fit.
fn fit_logistic<B: AutodiffBackend>(
    train_x: &[Vec<f32>],
    train_y: &[usize],
    n_classes: usize,
    config: &ProbeConfig,
    device: &B::Device,
) -> Linear<B> {
    let dim = train_x[0].len();
    let x = vectors_to_tensor::<B>(train_x, device);
    let y: Vec<i64> = train_y.iter().map(|&l| l as i64).collect();
    let y = Tensor::<B, 1, Int>::from_data(TensorData::new(y, [train_y.len()]), device);

    let mut classifier = LinearConfig::new(dim, n_classes).init(device);
    let mut optimizer = AdamConfig::new().init();
    let loss_fn = CrossEntropyLossConfig::new().init(device);

    let mut prev_loss = f64::INFINITY;
    let mut converged = false;
    for _ in 0..config.max_iter {
        let logits = classifier.forward(x.clone());
        let loss = loss_fn.forward(logits, y.clone());
        let value: f64 = loss.clone().into_scalar().elem();

        let grads = GradientsParams::from_grads(loss.backward(), &classifier);
        classifier = optimizer.step(config.lr, classifier, grads);

        if (prev_loss - value).abs() < config.tol {
            converged = true;
            break;
        }
        prev_loss = value;
    }
    if !converged {
        tracing::warn!(
            max_iter = config.max_iter,
            "linear probe classifier did not converge; accuracy may be understated"
        );
    }
    classifier
}

fn predict<B: Backend>(
    classifier: &Linear<B>,
    test_x: &[Vec<f32>],
    device: &B::Device,
) -> Vec<usize> {
    let x = vectors_to_tensor::<B>(test_x, device);
    let preds = classifier.forward(x).argmax(1);
    preds
        .into_data()
        .to_vec::<i64>()
        .unwrap()
        .into_iter()
        .map(|p| p as usize)
        .collect()
}
