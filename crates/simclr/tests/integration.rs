//! Integration tests for the contrastive pretraining pipeline.
//!
//! Exercise cross-module interactions: pair batches -> embedding model ->
//! NT-Xent loss -> Adam updates, config persistence, checkpoint saving,
//! metric emission, and the linear probe over a live encoder. All tests
//! use the NdArray backend and synthetic data.

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use tempfile::TempDir;

use imagedata::{AugmentSpec, Image, LabeledImages};
use simclr::eval::linear_probe::{linear_classification_test, ProbeConfig, ProbeData};
use simclr::model::ConvEncoderConfig;
use simclr::training::pairs::PairBatchBuilder;
use simclr::{build_trainer, FeatureLearner, FitOptions, MemorySink, RunConfig};

type TestAutodiffBackend = Autodiff<NdArray<f32>>;

/// Synthetic 8x8 single-class-per-pattern images: class 0 is bright in the
/// top half, class 1 in the bottom half.
fn patterned_image(class: usize, jitter: f32) -> Image {
    let mut img = Image::zeros(8, 8, 3);
    for row in 0..8 {
        let bright = if class == 0 { row < 4 } else { row >= 4 };
        for col in 0..8 {
            for ch in 0..3 {
                let base = if bright { 0.8 } else { 0.1 };
                img.set(row, col, ch, (base + jitter * (col as f32 / 16.0)).clamp(0.0, 1.0));
            }
        }
    }
    img
}

fn synthetic_images(n: usize) -> Vec<Image> {
    (0..n)
        .map(|i| patterned_image(i % 2, 0.1 + (i as f32) * 0.01))
        .collect()
}

fn small_config() -> RunConfig {
    let mut config = RunConfig {
        augment: Some(AugmentSpec::default()),
        ..Default::default()
    };
    config.input.imshape = [8, 8];
    config.input.batch_size = 2;
    config.model.num_hidden = 16;
    config.model.output_dim = 8;
    config.model.lr = 0.001;
    config.model.lr_decay = 0;
    config
}

#[test]
fn test_fit_saves_once_per_epoch_with_monotone_steps() {
    let dir = TempDir::new().unwrap();
    let device = Default::default();

    let mut trainer = build_trainer::<TestAutodiffBackend>(
        dir.path(),
        synthetic_images(8),
        None,
        small_config(),
        Box::new(MemorySink::new()),
        device,
        13,
    )
    .unwrap();

    assert_eq!(trainer.step(), 0);
    trainer
        .fit(&FitOptions {
            epochs: 3,
            save: true,
            evaluate: false,
        })
        .unwrap();

    // One save per epoch, step counter advanced by steps_per_epoch each
    // epoch without resetting: 8 images / 2 per batch = 4 steps per epoch.
    assert_eq!(trainer.saves_completed(), 3);
    assert_eq!(trainer.step(), 12);

    // Both named artifacts exist on disk, alongside the config record.
    assert!(dir.path().join("encoder.mpk").exists());
    assert!(dir.path().join("embedding_model.mpk").exists());
    assert!(dir.path().join("config.toml").exists());
}

#[test]
fn test_training_reduces_loss_on_easy_data() {
    let dir = TempDir::new().unwrap();
    let device = Default::default();
    let mut config = small_config();
    config.model.lr = 0.01;

    let mut trainer = build_trainer::<TestAutodiffBackend>(
        dir.path(),
        synthetic_images(8),
        None,
        config,
        Box::new(MemorySink::new()),
        device,
        5,
    )
    .unwrap();

    let first = trainer.run_training_epoch().unwrap();
    for _ in 0..4 {
        trainer.run_training_epoch().unwrap();
    }
    let last = trainer.run_training_epoch().unwrap();

    assert!(first.mean_loss.is_finite());
    assert!(last.mean_loss.is_finite());
    assert!(
        last.mean_loss < first.mean_loss,
        "loss did not decrease: {} -> {}",
        first.mean_loss,
        last.mean_loss
    );
}

#[test]
fn test_loss_metric_emitted_per_step() {
    let dir = TempDir::new().unwrap();
    let device = Default::default();
    let sink = simclr::JsonlSink::create(dir.path()).unwrap();

    let mut trainer = build_trainer::<TestAutodiffBackend>(
        dir.path(),
        synthetic_images(6),
        None,
        small_config(),
        Box::new(sink),
        device,
        1,
    )
    .unwrap();

    trainer
        .fit(&FitOptions {
            epochs: 2,
            save: false,
            evaluate: false,
        })
        .unwrap();
    drop(trainer);

    // One finite loss scalar per step, steps strictly increasing across
    // the epoch boundary: 6 images / 2 per batch = 3 batches per epoch.
    let contents = std::fs::read_to_string(dir.path().join("metrics.jsonl")).unwrap();
    let losses: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .filter(|v: &serde_json::Value| v["kind"] == "scalar" && v["name"] == "loss")
        .collect();
    assert_eq!(losses.len(), 6);
    for (i, event) in losses.iter().enumerate() {
        assert_eq!(event["step"], i as u64);
        assert!(event["value"].as_f64().unwrap().is_finite());
    }
}

#[test]
fn test_disabled_augmentation_fails_before_training() {
    let dir = TempDir::new().unwrap();
    let device = Default::default();
    let config = RunConfig {
        augment: None,
        ..small_config()
    };

    let err = build_trainer::<TestAutodiffBackend>(
        dir.path(),
        synthetic_images(4),
        None,
        config,
        Box::new(MemorySink::new()),
        device,
        0,
    )
    .err()
    .expect("must fail fast");
    assert!(matches!(err, simclr::TrainError::AugmentationRequired));
}

#[test]
fn test_config_record_written_at_construction() {
    let dir = TempDir::new().unwrap();
    let device = Default::default();

    let _trainer = build_trainer::<TestAutodiffBackend>(
        dir.path(),
        synthetic_images(4),
        None,
        small_config(),
        Box::new(MemorySink::new()),
        device,
        0,
    )
    .unwrap();

    let rendered = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(rendered.contains("[model]"));
    assert!(rendered.contains("[input]"));
    assert!(rendered.contains("[augment]"));
    assert!(rendered.contains("temperature"));
    assert!(rendered.contains("imshape"));
}

#[test]
fn test_evaluation_records_probe_metrics_and_hparams_once() {
    let dir = TempDir::new().unwrap();
    let device = Default::default();
    let sink = simclr::JsonlSink::create(dir.path()).unwrap();

    let labeled = |n: usize| {
        let images: Vec<Image> = (0..n).map(|i| patterned_image(i % 2, 0.05)).collect();
        let labels: Vec<usize> = (0..n).map(|i| i % 2).collect();
        LabeledImages::new(images, labels).unwrap()
    };
    let probe_data = ProbeData::new(labeled(8), labeled(4)).unwrap();

    let mut trainer = build_trainer::<TestAutodiffBackend>(
        dir.path(),
        synthetic_images(8),
        Some(probe_data),
        small_config(),
        Box::new(sink),
        device,
        21,
    )
    .unwrap();

    trainer
        .fit(&FitOptions {
            epochs: 2,
            save: false,
            evaluate: true,
        })
        .unwrap();
    drop(trainer);

    // Two evaluation passes: accuracy and confusion matrix per pass, but
    // hyperparameters registered only on the first.
    let contents = std::fs::read_to_string(dir.path().join("metrics.jsonl")).unwrap();
    let events: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let count = |pred: &dyn Fn(&serde_json::Value) -> bool| events.iter().filter(|v| pred(v)).count();

    assert_eq!(
        count(&|v| v["kind"] == "scalar" && v["name"] == "linear_classification_accuracy"),
        2
    );
    assert_eq!(count(&|v| v["kind"] == "image"), 2);
    assert_eq!(count(&|v| v["kind"] == "hparams_config"), 1);
    assert_eq!(count(&|v| v["kind"] == "hparams"), 1);
}

#[test]
fn test_probe_on_live_encoder_separates_patterned_classes() {
    // The two synthetic classes differ strongly in pooled intensity, so
    // even an untrained encoder's features should be linearly separable.
    let device = Default::default();
    let encoder = ConvEncoderConfig::new(3)
        .with_width1(8)
        .with_width2(16)
        .with_width3(16)
        .init::<NdArray<f32>>(&device);

    let labeled = |n: usize, seed_jitter: f32| {
        let images: Vec<Image> = (0..n)
            .map(|i| patterned_image(i % 2, seed_jitter + i as f32 * 0.01))
            .collect();
        let labels: Vec<usize> = (0..n).map(|i| i % 2).collect();
        LabeledImages::new(images, labels).unwrap()
    };
    let data = ProbeData::new(labeled(12, 0.02), labeled(6, 0.03)).unwrap();

    let report = linear_classification_test::<TestAutodiffBackend>(
        &encoder,
        &data,
        4,
        &ProbeConfig::default(),
        &device,
    )
    .unwrap();

    assert_eq!(report.accuracy, 1.0, "confusion: {:?}", report.confusion);
    assert!(report.is_diagonal());
}

#[test]
fn test_pair_batches_feed_loss_without_reordering() {
    // The pairing contract survives the full pipeline: every batch the
    // builder yields passes the loss step's label validation.
    let builder = PairBatchBuilder::new(
        synthetic_images(6),
        Some(AugmentSpec::default()),
        3,
    )
    .unwrap();

    let device = Default::default();
    for batch in builder.epoch(9) {
        let views =
            simclr::model::bridge::images_to_tensor::<NdArray<f32>>(&batch.views, &device);
        let model = simclr::model::EmbeddingModelConfig::new(8, 8, 3)
            .with_num_hidden(8)
            .with_output_dim(4)
            .init::<NdArray<f32>>(&device);
        let embeddings = model.forward(views);
        let loss = simclr::training::loss::nt_xent_loss(embeddings, &batch.labels, 0.1, 1);
        assert!(loss.is_ok());
    }
}
