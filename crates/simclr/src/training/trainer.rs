//! Epoch-level contrastive training loop.
//!
//! [`FeatureLearner`] is the generic loop: concrete trainers provide
//! `run_training_epoch` / `save` / `evaluate` and inherit `fit`.
//! [`SimClrTrainer`] is the concrete contrastive trainer: one Adam gradient
//! step per pair batch, a scalar loss metric per step, periodic console
//! reporting, per-epoch checkpointing, and an optional linear-probe
//! evaluation pass.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;
use imagedata::Image;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::RunConfig;
use crate::error::TrainError;
use crate::eval::linear_probe::{linear_classification_test, ProbeConfig, ProbeData};
use crate::metrics::MetricSink;
use crate::model::bridge::images_to_tensor;
use crate::model::{EmbeddingModel, EmbeddingModelConfig};
use crate::training::loss::nt_xent_loss;
use crate::training::pairs::{PairBatch, PairBatchBuilder};

/// Options for a [`FeatureLearner::fit`] run.
///
/// Evaluation is an explicit toggle, off by default: a probe pass is
/// expensive relative to a training epoch and callers decide its cadence.
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// Number of epochs to train for.
    pub epochs: usize,
    /// Persist all tracked model artifacts after each epoch.
    pub save: bool,
    /// Run the evaluation pass after each epoch.
    pub evaluate: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        FitOptions {
            epochs: 1,
            save: true,
            evaluate: false,
        }
    }
}

/// Summary of one completed training epoch.
#[derive(Debug, Clone)]
pub struct EpochSummary {
    /// Batches processed this epoch.
    pub batches: usize,
    /// Mean per-batch loss.
    pub mean_loss: f64,
    /// Global step counter after the epoch.
    pub final_step: u64,
}

/// The generic training loop: epoch body, checkpointing, and evaluation
/// are the capability set; `fit` is the loop itself.
pub trait FeatureLearner {
    /// Consume every batch of one epoch pass, one gradient step per batch.
    fn run_training_epoch(&mut self) -> Result<EpochSummary, TrainError>;

    /// Persist all tracked model artifacts, overwriting previous copies.
    fn save(&mut self) -> Result<(), TrainError>;

    /// Run evaluation metrics against the current encoder.
    fn evaluate(&mut self) -> Result<(), TrainError>;

    /// Train for `opts.epochs` epochs, saving and/or evaluating at each
    /// epoch boundary. Save failures abort the run.
    fn fit(&mut self, opts: &FitOptions) -> Result<(), TrainError> {
        for epoch in 0..opts.epochs {
            let summary = self.run_training_epoch()?;
            tracing::info!(
                epoch,
                batches = summary.batches,
                mean_loss = format!("{:.4}", summary.mean_loss),
                step = summary.final_step,
                "Epoch complete"
            );
            if opts.save {
                self.save()?;
            }
            if opts.evaluate {
                self.evaluate()?;
            }
        }
        Ok(())
    }
}

/// Learning rate with exponential decay: halves every `half_life` steps,
/// continuously rather than in staircase jumps. `half_life == 0` disables
/// decay.
pub fn exp_decay_schedule(base_lr: f64, half_life: usize, step: u64) -> f64 {
    if half_life == 0 {
        base_lr
    } else {
        base_lr * 0.5_f64.powf(step as f64 / half_life as f64)
    }
}

/// Contrastive trainer: pair batches through the embedding model, NT-Xent
/// loss, Adam updates.
pub struct SimClrTrainer<B: AutodiffBackend, O> {
    config: RunConfig,
    logdir: PathBuf,
    device: B::Device,
    model: EmbeddingModel<B>,
    optimizer: O,
    batches: PairBatchBuilder,
    sink: Box<dyn MetricSink>,
    probe_data: Option<ProbeData>,
    probe_config: ProbeConfig,
    hparams_registered: bool,
    step: u64,
    saves_completed: u64,
    started: Instant,
    rng: StdRng,
}

/// Build a [`SimClrTrainer`] with an Adam optimizer.
///
/// Validates the config (fail-fast preconditions), writes the three-bucket
/// config record to `<logdir>/config.toml`, initializes the embedding
/// model, and sets up the pair-batch pipeline. `probe_data` supplies the
/// labeled splits for [`FeatureLearner::evaluate`]; without it evaluation
/// is skipped with a warning.
pub fn build_trainer<B: AutodiffBackend>(
    logdir: &Path,
    train_images: Vec<Image>,
    probe_data: Option<ProbeData>,
    config: RunConfig,
    sink: Box<dyn MetricSink>,
    device: B::Device,
    seed: u64,
) -> Result<SimClrTrainer<B, impl Optimizer<EmbeddingModel<B>, B>>, TrainError> {
    config.validate()?;
    config.write_to(logdir)?;

    let train_images = if config.input.single_channel {
        train_images
            .iter()
            .map(|img| img.stack_channels(config.input.num_channels))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        train_images
    };

    let model = EmbeddingModelConfig::new(
        config.input.imshape[0],
        config.input.imshape[1],
        config.input.num_channels,
    )
    .with_num_hidden(config.model.num_hidden)
    .with_output_dim(config.model.output_dim)
    .init(&device);

    let batches = PairBatchBuilder::new(
        train_images,
        config.augment.clone(),
        config.input.batch_size,
    )?
    .with_parallelism(config.input.num_parallel_calls);

    tracing::info!(
        logdir = %logdir.display(),
        steps_per_epoch = batches.steps_per_epoch(),
        temperature = config.model.temperature,
        "SimCLR trainer initialized"
    );

    Ok(SimClrTrainer {
        config,
        logdir: logdir.to_path_buf(),
        device,
        model,
        optimizer: AdamConfig::new().init(),
        batches,
        sink,
        probe_data,
        probe_config: ProbeConfig::default(),
        hparams_registered: false,
        step: 0,
        saves_completed: 0,
        started: Instant::now(),
        rng: StdRng::seed_from_u64(seed),
    })
}

impl<B: AutodiffBackend, O> SimClrTrainer<B, O>
where
    O: Optimizer<EmbeddingModel<B>, B>,
{
    /// Global step counter: one increment per batch, monotone across
    /// epochs, never reset mid-run.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Number of completed checkpoint saves.
    pub fn saves_completed(&self) -> u64 {
        self.saves_completed
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Override the linear-probe fitting parameters.
    pub fn set_probe_config(&mut self, probe_config: ProbeConfig) {
        self.probe_config = probe_config;
    }

    /// One forward/backward/update on a pair batch. Returns the loss value.
    fn training_step(&mut self, batch: &PairBatch) -> Result<f64, TrainError> {
        let views = images_to_tensor::<B>(&batch.views, &self.device);
        let embeddings = self.model.forward(views);
        let loss = nt_xent_loss(embeddings, &batch.labels, self.config.model.temperature, 1)?;
        let loss_value: f64 = loss.clone().into_scalar().elem();

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        let lr = exp_decay_schedule(self.config.model.lr, self.config.model.lr_decay, self.step);
        self.model = self.optimizer.step(lr, self.model.clone(), grads);
        Ok(loss_value)
    }
}

impl<B: AutodiffBackend, O> FeatureLearner for SimClrTrainer<B, O>
where
    O: Optimizer<EmbeddingModel<B>, B>,
{
    fn run_training_epoch(&mut self) -> Result<EpochSummary, TrainError> {
        let epoch_seed: u64 = self.rng.gen();
        let mut batches_done = 0usize;
        let mut loss_sum = 0.0;

        // Batch construction runs one batch ahead of consumption on a
        // background thread; the (batch -> loss -> update) order is the
        // same as a sequential pass.
        for batch in self.batches.epoch_prefetched(epoch_seed) {
            let loss = self.training_step(&batch)?;
            self.sink.record_scalar("loss", self.step, loss);
            if self.step % 100 == 0 {
                tracing::info!(
                    step = self.step,
                    elapsed_secs = format!("{:.2}", self.started.elapsed().as_secs_f64()),
                    train_loss = format!("{:.4}", loss),
                    "Training step"
                );
            }
            self.step += 1;
            batches_done += 1;
            loss_sum += loss;
        }

        Ok(EpochSummary {
            batches: batches_done,
            mean_loss: if batches_done > 0 {
                loss_sum / batches_done as f64
            } else {
                0.0
            },
            final_step: self.step,
        })
    }

    /// Persist the two named artifacts (the base encoder and the full
    /// embedding model), overwriting previous copies.
    fn save(&mut self) -> Result<(), TrainError> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();

        self.model
            .encoder
            .clone()
            .save_file(self.logdir.join("encoder"), &recorder)
            .map_err(|e| TrainError::Storage {
                name: "encoder".to_string(),
                source: anyhow::anyhow!(e),
            })?;

        self.model
            .clone()
            .save_file(self.logdir.join("embedding_model"), &recorder)
            .map_err(|e| TrainError::Storage {
                name: "embedding_model".to_string(),
                source: anyhow::anyhow!(e),
            })?;

        self.saves_completed += 1;
        tracing::info!(
            step = self.step,
            saves = self.saves_completed,
            "Saved encoder and embedding model"
        );
        Ok(())
    }

    /// Linear-probe evaluation of the frozen encoder.
    ///
    /// Emits accuracy as a scalar and the max-normalized confusion matrix
    /// as an image metric. On the first invocation only, registers the
    /// run's hyperparameters against the accuracy metric.
    fn evaluate(&mut self) -> Result<(), TrainError> {
        let Some(data) = &self.probe_data else {
            tracing::warn!("evaluate() called without probe data; skipping");
            return Ok(());
        };

        let frozen = self.model.valid();
        let report = linear_classification_test::<B>(
            &frozen.encoder,
            data,
            self.config.input.batch_size,
            &self.probe_config,
            &self.device,
        )?;

        self.sink
            .record_scalar("linear_classification_accuracy", self.step, report.accuracy);
        let (rows, cols, values) = report.confusion_image();
        self.sink
            .record_image("linear_classification_confusion_matrix", self.step, rows, cols, values);

        if !self.hparams_registered {
            self.sink.record_hparams_config(
                vec![
                    "temperature".to_string(),
                    "num_hidden".to_string(),
                    "output_dim".to_string(),
                ],
                "linear_classification_accuracy",
            );
            let mut values = BTreeMap::new();
            values.insert("temperature".to_string(), self.config.model.temperature);
            values.insert("num_hidden".to_string(), self.config.model.num_hidden as f64);
            values.insert("output_dim".to_string(), self.config.model.output_dim as f64);
            self.sink.record_hparams(values);
            self.hparams_registered = true;
        }

        tracing::info!(
            step = self.step,
            accuracy = format!("{:.4}", report.accuracy),
            "Linear probe evaluation"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exp_decay_schedule() {
        let base = 0.01;

        // Disabled decay holds the base rate.
        assert_eq!(exp_decay_schedule(base, 0, 0), base);
        assert_eq!(exp_decay_schedule(base, 0, 10_000), base);

        // Step 0 is the base rate.
        assert!((exp_decay_schedule(base, 1000, 0) - base).abs() < 1e-12);

        // Exactly one half-life halves the rate.
        let half = exp_decay_schedule(base, 1000, 1000);
        assert!((half - base / 2.0).abs() < 1e-12, "got {half}");

        // Two half-lives quarter it.
        let quarter = exp_decay_schedule(base, 1000, 2000);
        assert!((quarter - base / 4.0).abs() < 1e-12, "got {quarter}");

        // Continuous (non-staircase): midpoint sits between, at base/sqrt(2).
        let mid = exp_decay_schedule(base, 1000, 500);
        assert!((mid - base / 2.0_f64.sqrt()).abs() < 1e-12, "got {mid}");

        // Monotone decreasing.
        assert!(exp_decay_schedule(base, 1000, 1) < base);
    }

    #[test]
    fn test_fit_options_default_gates_evaluation() {
        let opts = FitOptions::default();
        assert_eq!(opts.epochs, 1);
        assert!(opts.save);
        assert!(!opts.evaluate);
    }
}
