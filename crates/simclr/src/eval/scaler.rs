//! Per-feature standardization for probe features.

/// Zero-mean, unit-variance scaler fit on training features only.
///
/// The same fitted transform is applied to the test split so no test
/// statistics leak into the probe.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl StandardScaler {
    const EPS: f32 = 1e-7;

    /// Fit per-feature mean and standard deviation.
    ///
    /// # Panics
    /// Panics on an empty feature set or inconsistent dimensions; both are
    /// programming errors upstream of the probe.
    pub fn fit(features: &[Vec<f32>]) -> Self {
        assert!(!features.is_empty(), "cannot fit a scaler on zero vectors");
        let dim = features[0].len();
        let n = features.len() as f32;

        let mut mean = vec![0.0_f32; dim];
        for row in features {
            assert_eq!(row.len(), dim, "inconsistent feature dimensions");
            for (m, &v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut var = vec![0.0_f32; dim];
        for row in features {
            for ((s, &v), &m) in var.iter_mut().zip(row).zip(&mean) {
                *s += (v - m) * (v - m);
            }
        }
        let std = var
            .into_iter()
            .map(|s| (s / n).sqrt().max(Self::EPS))
            .collect();

        StandardScaler { mean, std }
    }

    /// Apply the fitted transform.
    pub fn transform(&self, features: &[Vec<f32>]) -> Vec<Vec<f32>> {
        features
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&self.mean)
                    .zip(&self.std)
                    .map(|((&v, &m), &s)| (v - m) / s)
                    .collect()
            })
            .collect()
    }
}
