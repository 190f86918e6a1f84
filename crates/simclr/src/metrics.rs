//! Metric emission.
//!
//! Every component that reports metrics holds an explicit [`MetricSink`]
//! handle; there is no ambient global writer. Emission is fire-and-forget:
//! a slow or failing sink logs a warning and never fails a training step.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

/// A single metric event, keyed by the global step where applicable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricEvent {
    /// Named scalar value at a step.
    Scalar { name: String, step: u64, value: f64 },
    /// Named image-shaped tensor at a step (row-major, `rows * cols` values).
    Image {
        name: String,
        step: u64,
        rows: usize,
        cols: usize,
        values: Vec<f32>,
    },
    /// Named histogram sample at a step.
    Histogram {
        name: String,
        step: u64,
        values: Vec<f64>,
    },
    /// One-time registration of hyperparameter names against a metric, for
    /// downstream comparison tooling.
    HparamsConfig { hparams: Vec<String>, metric: String },
    /// The hyperparameter values chosen for this run.
    Hparams { values: BTreeMap<String, f64> },
}

/// Destination for metric events.
pub trait MetricSink {
    fn record(&mut self, event: MetricEvent);

    fn record_scalar(&mut self, name: &str, step: u64, value: f64) {
        self.record(MetricEvent::Scalar {
            name: name.to_string(),
            step,
            value,
        });
    }

    fn record_image(&mut self, name: &str, step: u64, rows: usize, cols: usize, values: Vec<f32>) {
        self.record(MetricEvent::Image {
            name: name.to_string(),
            step,
            rows,
            cols,
            values,
        });
    }

    fn record_histogram(&mut self, name: &str, step: u64, values: Vec<f64>) {
        self.record(MetricEvent::Histogram {
            name: name.to_string(),
            step,
            values,
        });
    }

    fn record_hparams_config(&mut self, hparams: Vec<String>, metric: &str) {
        self.record(MetricEvent::HparamsConfig {
            hparams,
            metric: metric.to_string(),
        });
    }

    fn record_hparams(&mut self, values: BTreeMap<String, f64>) {
        self.record(MetricEvent::Hparams { values });
    }
}

/// Line-oriented JSON sink under the run's log directory.
///
/// One event per line in `metrics.jsonl`. Write failures are logged and
/// dropped.
pub struct JsonlSink {
    writer: BufWriter<File>,
}

impl JsonlSink {
    /// Create (or truncate) `<logdir>/metrics.jsonl`.
    pub fn create(logdir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(logdir)?;
        let file = File::create(logdir.join("metrics.jsonl"))?;
        Ok(JsonlSink {
            writer: BufWriter::new(file),
        })
    }
}

impl MetricSink for JsonlSink {
    fn record(&mut self, event: MetricEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("dropping unserializable metric event: {e}");
                return;
            }
        };
        if let Err(e) = writeln!(self.writer, "{line}").and_then(|()| self.writer.flush()) {
            tracing::warn!("metric sink write failed: {e}");
        }
    }
}

/// In-memory sink retaining events in emission order. Test double.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<MetricEvent>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All scalar values recorded under `name`, in emission order.
    pub fn scalars(&self, name: &str) -> Vec<(u64, f64)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                MetricEvent::Scalar {
                    name: n,
                    step,
                    value,
                } if n == name => Some((*step, *value)),
                _ => None,
            })
            .collect()
    }
}

impl MetricSink for MemorySink {
    fn record(&mut self, event: MetricEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_sink_preserves_order() {
        let mut sink = MemorySink::new();
        sink.record_scalar("loss", 0, 2.0);
        sink.record_scalar("loss", 1, 1.5);
        sink.record_scalar("other", 1, 9.0);
        assert_eq!(sink.scalars("loss"), vec![(0, 2.0), (1, 1.5)]);
    }

    #[test]
    fn test_jsonl_sink_writes_parseable_lines() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonlSink::create(dir.path()).unwrap();
        sink.record_scalar("loss", 3, 0.75);
        sink.record_image("confusion", 3, 2, 2, vec![1.0, 0.0, 0.0, 1.0]);
        sink.record_hparams_config(
            vec!["temperature".into()],
            "linear_classification_accuracy",
        );
        drop(sink);

        let contents = std::fs::read_to_string(dir.path().join("metrics.jsonl")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("kind").is_some());
        }

        let first: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(first["kind"], "scalar");
        assert_eq!(first["name"], "loss");
        assert_eq!(first["step"], 3);
    }
}
