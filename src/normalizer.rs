// src/normalizer.rs - Standard-score feature scaling fitted once per training run
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub mean: Vec<f64>,
    /// Standard deviation per feature; 1.0 where the feature never varied.
    pub scale: Vec<f64>,
}

impl NormalizationStats {
    /// Fits over every row. Returns `None` for an empty corpus.
    pub fn fit<'a, I>(rows: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a DVector<f64>>,
    {
        let mut rows = rows.into_iter();
        let first = rows.next()?;
        let mut count = 1usize;
        let mut sum = first.clone();
        let mut sum_sq = first.component_mul(first);

        for row in rows {
            count += 1;
            sum += row;
            sum_sq += row.component_mul(row);
        }

        let n = count as f64;
        let mean = sum / n;
        let scale = DVector::from_iterator(
            mean.len(),
            mean.iter().zip(sum_sq.iter()).map(|(m, sq)| {
                let variance = (sq / n - m * m).max(0.0);
                let std = variance.sqrt();
                if std > 1e-8 {
                    std
                } else {
                    1.0
                }
            }),
        );

        Some(Self {
            mean: mean.as_slice().to_vec(),
            scale: scale.as_slice().to_vec(),
        })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, row: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            row.len(),
            row.iter()
                .zip(self.mean.iter().zip(self.scale.iter()))
                .map(|(x, (m, s))| (x - m) / s),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_mean_and_scale() {
        let rows = vec![
            DVector::from_vec(vec![1.0, 5.0]),
            DVector::from_vec(vec![3.0, 5.0]),
        ];
        let stats = NormalizationStats::fit(&rows).unwrap();
        assert_eq!(stats.mean, vec![2.0, 5.0]);
        assert!((stats.scale[0] - 1.0).abs() < 1e-12);
        // Constant feature keeps unit scale.
        assert_eq!(stats.scale[1], 1.0);

        let t = stats.transform(&rows[0]);
        assert!((t[0] + 1.0).abs() < 1e-12);
        assert_eq!(t[1], 0.0);
    }

    #[test]
    fn test_fit_empty_is_none() {
        let rows: Vec<DVector<f64>> = Vec::new();
        assert!(NormalizationStats::fit(&rows).is_none());
    }
}
