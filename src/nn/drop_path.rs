//! Drop path (stochastic depth).

use crate::masking::NoisePrecision;
use crate::tensor::{Result, Tensor, TensorElem, TensorError};
use num_traits::Float;
use rand::Rng;
use rand::distr::{Distribution, StandardUniform};
use rayon::prelude::*;

/// Drops whole samples of a residual branch during training.
///
/// Each sample along the leading axis is kept with probability
/// `1 - drop_prob` and scaled by `1 / (1 - drop_prob)`, so the expected
/// output equals the input. Outside training it is the identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DropPath {
    drop_prob: f64,
    precision: NoisePrecision,
}

/// Checks that `drop_prob` is a finite probability in `[0, 1)`.
///
/// # Errors
///
/// Returns [`TensorError::InvalidDropProbability`] otherwise.
pub fn validate_drop_prob(drop_prob: f64) -> Result<()> {
    if drop_prob.is_finite() && (0.0..1.0).contains(&drop_prob) {
        Ok(())
    } else {
        Err(TensorError::InvalidDropProbability(drop_prob))
    }
}

impl DropPath {
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidDropProbability`] unless `drop_prob` is in `[0, 1)`.
    pub fn new(drop_prob: f64) -> Result<Self> {
        validate_drop_prob(drop_prob)?;
        Ok(Self {
            drop_prob,
            precision: NoisePrecision::Native,
        })
    }

    /// Sets how the per-sample uniform draw is produced.
    pub fn with_precision(mut self, precision: NoisePrecision) -> Self {
        self.precision = precision;
        self
    }

    pub fn drop_prob(&self) -> f64 {
        self.drop_prob
    }

    /// # Shapes
    /// - `x`: `[N, ...]`
    /// - returns: `[N, ...]`
    pub fn forward<T, const RANK: usize, R>(
        &self,
        x: &Tensor<T, RANK>,
        training: bool,
        rng: &mut R,
    ) -> Result<Tensor<T, RANK>>
    where
        T: TensorElem + Float,
        StandardUniform: Distribution<T>,
        R: Rng + ?Sized,
    {
        if self.drop_prob == 0.0 || !training || RANK == 0 || x.size() == 0 {
            return Ok(x.clone());
        }

        let n = x.shape()[0];
        let keep_prob = T::from_f64(1.0 - self.drop_prob).ok_or_else(|| {
            TensorError::Unsupported(format!(
                "cannot represent keep probability as {}",
                std::any::type_name::<T>()
            ))
        })?;

        // floor(keep_prob + u) is 1 with probability keep_prob.
        let mut scales = Vec::with_capacity(n);
        for _ in 0..n {
            let u = self.precision.sample::<T, R>(rng)?;
            scales.push((keep_prob + u).floor() / keep_prob);
        }

        let mut out = x.clone();
        let stride = x.size() / n;
        out.data_mut()
            .par_chunks_mut(stride)
            .zip(scales.par_iter())
            .for_each(|(sample, &scale)| {
                for v in sample.iter_mut() {
                    *v = *v * scale;
                }
            });
        Ok(out)
    }
}

/// Per-block drop rates increasing linearly from `0` to `max_rate`.
///
/// Matches `linspace(0, max_rate, depth)`: a single block gets `0`.
pub fn linear_schedule(max_rate: f64, depth: usize) -> Vec<f64> {
    match depth {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => {
            let step = max_rate / (depth - 1) as f64;
            (0..depth).map(|i| step * i as f64).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_identity_when_disabled() {
        let mut rng = StdRng::seed_from_u64(0);
        let x = Tensor::<f32, 3>::ones([4, 2, 2]);

        let eval = DropPath::new(0.5)
            .unwrap()
            .forward(&x, false, &mut rng)
            .unwrap();
        assert_eq!(eval, x);

        let zero = DropPath::new(0.0)
            .unwrap()
            .forward(&x, true, &mut rng)
            .unwrap();
        assert_eq!(zero, x);
    }

    #[test]
    fn test_samples_dropped_or_scaled() {
        let mut rng = StdRng::seed_from_u64(17);
        let x = Tensor::<f64, 3>::ones([64, 3, 2]);
        let out = DropPath::new(0.5)
            .unwrap()
            .with_precision(NoisePrecision::Widened)
            .forward(&x, true, &mut rng)
            .unwrap();

        let mut kept = 0;
        for sample in out.data().chunks(6) {
            // Whole samples share one decision.
            assert!(sample.iter().all(|&v| v == sample[0]));
            assert!(sample[0] == 0.0 || sample[0] == 2.0);
            if sample[0] == 2.0 {
                kept += 1;
            }
        }
        assert!(kept > 0 && kept < 64);
    }

    #[test]
    fn test_rejects_invalid_probability() {
        for p in [1.0, -0.1, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                DropPath::new(p),
                Err(TensorError::InvalidDropProbability(_))
            ));
        }
        assert!(validate_drop_prob(0.0).is_ok());
        assert!(validate_drop_prob(0.99).is_ok());
    }

    #[test]
    fn test_linear_schedule() {
        assert!(linear_schedule(0.1, 0).is_empty());
        assert_eq!(linear_schedule(0.1, 1), vec![0.0]);

        let rates = linear_schedule(0.1, 5);
        assert_eq!(rates.len(), 5);
        assert_eq!(rates[0], 0.0);
        assert!((rates[4] - 0.1).abs() < 1e-12);
        assert!((rates[2] - 0.05).abs() < 1e-12);
    }
}
