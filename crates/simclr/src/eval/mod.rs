//! Representation-quality evaluation: feature standardization and the
//! linear probe over frozen encoder features.

pub mod linear_probe;
pub mod scaler;

pub use linear_probe::{linear_classification_test, ProbeConfig, ProbeData, ProbeReport};
pub use scaler::StandardScaler;
