//! Uniform noise for per-sample shuffling.

use crate::tensor::{Result, Tensor, TensorElem, TensorError};
use rand::Rng;
use rand::distr::{Distribution, StandardUniform};
use serde::{Deserialize, Serialize};

/// How uniform noise is produced for a given element type.
///
/// The policy is chosen by the caller; it is never inferred from `T`.
/// Sorting low-precision noise produces many ties, which biases the stable
/// argsort towards low indices. `Widened` avoids that by drawing in `f64`
/// and narrowing afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoisePrecision {
    /// Draw directly in the working element type.
    #[default]
    Native,
    /// Draw in `f64`, then narrow to the working element type.
    Widened,
}

impl NoisePrecision {
    /// Draws one value in `[0, 1)` (narrowing may round up to exactly `1`).
    ///
    /// # Errors
    ///
    /// Returns `TensorError::Unsupported` if `T` cannot represent the widened draw.
    pub fn sample<T, R>(self, rng: &mut R) -> Result<T>
    where
        T: TensorElem,
        StandardUniform: Distribution<T>,
        R: Rng + ?Sized,
    {
        match self {
            NoisePrecision::Native => Ok(Distribution::<T>::sample(&StandardUniform, rng)),
            NoisePrecision::Widened => {
                let wide = Distribution::<f64>::sample(&StandardUniform, rng);
                T::from_f64(wide).ok_or_else(|| {
                    TensorError::Unsupported(format!(
                        "cannot narrow noise {wide} to {}",
                        std::any::type_name::<T>()
                    ))
                })
            }
        }
    }
}

/// Draws a `[N, L]` noise tensor from a single shared stream.
///
/// Values are drawn in row-major order, so a fixed seed always yields the same
/// tensor regardless of how later per-row work is scheduled.
pub fn draw_noise<T, R>(
    shape: [usize; 2],
    precision: NoisePrecision,
    rng: &mut R,
) -> Result<Tensor<T, 2>>
where
    T: TensorElem,
    StandardUniform: Distribution<T>,
    R: Rng + ?Sized,
{
    let size = shape[0] * shape[1];
    let mut data = Vec::with_capacity(size);
    for _ in 0..size {
        data.push(precision.sample::<T, R>(rng)?);
    }
    Tensor::new(data, shape)
}
