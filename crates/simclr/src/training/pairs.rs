//! Augmented-pair batch construction.
//!
//! Each source image is augmented twice with independent random draws and
//! the two views are interleaved so that view `2k` and view `2k+1` are the
//! augmentations of source image `k`. The label array carries the *offset*
//! to the twin (`+1, -1, +1, -1, ...`), not its absolute index; the loss
//! step resolves `index + label` into the target class. Any change to this
//! interleaving silently breaks the loss, so [`PairBatch::new`] asserts the
//! contract.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use imagedata::{Augmenter, AugmentSpec, Image};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::TrainError;

/// A batch of `2N` augmented views with twin-offset labels.
#[derive(Debug, Clone)]
pub struct PairBatch {
    /// `2N` views, interleaved `[img0_v0, img0_v1, img1_v0, img1_v1, ...]`.
    pub views: Vec<Image>,
    /// Signed offset from each view to its twin: `[+1, -1, +1, -1, ...]`.
    pub labels: Vec<i64>,
}

impl PairBatch {
    /// Assemble a batch from interleaved views and offset labels.
    ///
    /// Debug-asserts the pairing contract: every `index + label` must land
    /// inside the batch at the even/odd partner position.
    pub fn new(views: Vec<Image>, labels: Vec<i64>) -> Self {
        debug_assert_eq!(views.len(), labels.len());
        debug_assert!(views.len() % 2 == 0);
        for (i, &label) in labels.iter().enumerate() {
            let twin = i as i64 + label;
            debug_assert!(
                twin >= 0 && (twin as usize) < views.len() && twin as usize == (i ^ 1),
                "label {label} at index {i} does not point at the twin"
            );
        }
        PairBatch { views, labels }
    }

    /// Index of view `i`'s augmented twin.
    pub fn twin_of(&self, i: usize) -> usize {
        (i as i64 + self.labels[i]) as usize
    }

    /// Number of views (`2N`).
    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

/// Builds a restartable sequence of augmented-pair batches.
///
/// Every call to [`epoch`](Self::epoch) starts a fresh pass over the source
/// images in order, pairing-then-flattening-then-rebatching so the two views
/// of one image always land in the same physical batch. Trailing images
/// that do not fill a batch are dropped.
#[derive(Debug)]
pub struct PairBatchBuilder {
    images: Arc<Vec<Image>>,
    augmenter: Augmenter,
    batch_size: usize,
    num_parallel_calls: Option<usize>,
}

impl PairBatchBuilder {
    /// Create a builder over `images` with `batch_size` source images per
    /// batch (so each batch holds `2 * batch_size` views).
    ///
    /// # Errors
    /// - `AugmentationRequired` if `augment` is `None`: un-augmented
    ///   duplicate views make the contrastive objective degenerate. Checked
    ///   here, before any batch exists.
    /// - `InvalidBatchSize` for `batch_size < 2`.
    /// - `Image` errors for an empty set or mixed shapes.
    pub fn new(
        images: Vec<Image>,
        augment: Option<AugmentSpec>,
        batch_size: usize,
    ) -> Result<Self, TrainError> {
        let spec = augment.ok_or(TrainError::AugmentationRequired)?;
        if batch_size < 2 {
            return Err(TrainError::InvalidBatchSize(batch_size));
        }
        if images.is_empty() {
            return Err(imagedata::ImageError::EmptyDataset.into());
        }
        let shape = images[0].shape();
        for img in &images[1..] {
            if img.shape() != shape {
                return Err(imagedata::ImageError::ShapeMismatch {
                    expected: shape,
                    got: img.shape(),
                }
                .into());
            }
        }
        Ok(PairBatchBuilder {
            images: Arc::new(images),
            augmenter: Augmenter::new(spec),
            batch_size,
            num_parallel_calls: None,
        })
    }

    /// Set the number of augmentation worker threads per batch.
    pub fn with_parallelism(mut self, num_parallel_calls: Option<usize>) -> Self {
        self.num_parallel_calls = num_parallel_calls;
        self
    }

    /// Source images per batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Batches per epoch pass (remainder dropped).
    pub fn steps_per_epoch(&self) -> usize {
        self.images.len() / self.batch_size
    }

    /// One lazy pass over the source images.
    pub fn epoch(&self, seed: u64) -> EpochBatches<'_> {
        EpochBatches {
            builder: self,
            rng: StdRng::seed_from_u64(seed),
            cursor: 0,
        }
    }

    /// One pass with construction overlapped ahead of consumption.
    ///
    /// A background thread builds batches into a bounded channel (look-ahead
    /// of one batch). Observable batch order is identical to [`epoch`];
    /// this is purely a throughput optimization.
    pub fn epoch_prefetched(&self, seed: u64) -> mpsc::IntoIter<PairBatch> {
        let (tx, rx) = mpsc::sync_channel(1);
        let images = Arc::clone(&self.images);
        let augmenter = self.augmenter.clone();
        let batch_size = self.batch_size;
        let parallelism = self.num_parallel_calls;

        thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut cursor = 0;
            while cursor + batch_size <= images.len() {
                let batch = build_batch(
                    &images[cursor..cursor + batch_size],
                    &augmenter,
                    parallelism,
                    &mut rng,
                );
                cursor += batch_size;
                // Receiver dropped mid-epoch: the consumer stopped early.
                if tx.send(batch).is_err() {
                    return;
                }
            }
        });
        rx.into_iter()
    }

    /// Construct the batch starting at `cursor`, or `None` past the last
    /// full batch.
    fn next_batch(&self, cursor: usize, rng: &mut StdRng) -> Option<PairBatch> {
        if cursor + self.batch_size > self.images.len() {
            return None;
        }
        Some(build_batch(
            &self.images[cursor..cursor + self.batch_size],
            &self.augmenter,
            self.num_parallel_calls,
            rng,
        ))
    }
}

/// Augment each source image twice and interleave the views with their
/// offset labels.
fn build_batch(
    sources: &[Image],
    augmenter: &Augmenter,
    num_parallel_calls: Option<usize>,
    rng: &mut StdRng,
) -> PairBatch {
    let pairs: Vec<(Image, Image)> = match num_parallel_calls {
        Some(workers) if workers > 1 && sources.len() > 1 => {
            augment_pairs_parallel(sources, augmenter, workers, rng)
        }
        _ => sources
            .iter()
            .map(|img| (augmenter.apply(img, rng), augmenter.apply(img, rng)))
            .collect(),
    };

    let mut views = Vec::with_capacity(sources.len() * 2);
    let mut labels = Vec::with_capacity(sources.len() * 2);
    for (a, b) in pairs {
        views.push(a);
        views.push(b);
        labels.push(1);
        labels.push(-1);
    }
    PairBatch::new(views, labels)
}

/// Augment across `workers` threads, each chunk with its own seeded RNG so
/// the result does not depend on thread scheduling.
fn augment_pairs_parallel(
    sources: &[Image],
    augmenter: &Augmenter,
    workers: usize,
    rng: &mut StdRng,
) -> Vec<(Image, Image)> {
    let chunk_size = sources.len().div_ceil(workers);
    let seeds: Vec<u64> = sources
        .chunks(chunk_size)
        .map(|_| rng.gen::<u64>())
        .collect();

    thread::scope(|scope| {
        let handles: Vec<_> = sources
            .chunks(chunk_size)
            .zip(seeds)
            .map(|(chunk, seed)| {
                scope.spawn(move || {
                    let mut chunk_rng = StdRng::seed_from_u64(seed);
                    chunk
                        .iter()
                        .map(|img| {
                            (
                                augmenter.apply(img, &mut chunk_rng),
                                augmenter.apply(img, &mut chunk_rng),
                            )
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().expect("augmentation worker panicked"))
            .collect()
    })
}

/// Lazy iterator over one epoch's pair batches.
pub struct EpochBatches<'a> {
    builder: &'a PairBatchBuilder,
    rng: StdRng,
    cursor: usize,
}

impl Iterator for EpochBatches<'_> {
    type Item = PairBatch;

    fn next(&mut self) -> Option<PairBatch> {
        let batch = self.builder.next_batch(self.cursor, &mut self.rng)?;
        self.cursor += self.builder.batch_size();
        Some(batch)
    }
}
