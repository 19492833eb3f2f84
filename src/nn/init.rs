//! Parameter initialisers.
//!
//! Every initialiser builds a fresh tensor from a shape and a caller-provided
//! RNG; nothing is initialised in place. Samples are drawn in `f64` and
//! narrowed to the element type.

use crate::tensor::{Result, Tensor, TensorElem, TensorError};
use num_traits::Float;
use rand::Rng;
use rand::distr::{Distribution, Uniform};
use rand_distr::Normal;

/// Rejection attempts per element before the truncated normal falls back to clipping.
const MAX_TRUNC_TRIES: usize = 64;

/// How to fill a new parameter tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Initializer {
    Constant(f64),
    Zeros,
    Ones,
    Normal { mean: f64, std: f64 },
    /// Normal distribution restricted to `[a, b]`.
    TruncatedNormal { mean: f64, std: f64, a: f64, b: f64 },
    /// Glorot uniform: `U(-limit, limit)` with `limit = sqrt(6 / (fan_in + fan_out))`.
    XavierUniform,
}

impl Initializer {
    /// Truncated normal with mean 0 and bounds `[-2, 2]`.
    pub fn trunc_normal(std: f64) -> Self {
        Initializer::TruncatedNormal {
            mean: 0.0,
            std,
            a: -2.0,
            b: 2.0,
        }
    }

    /// Builds a new tensor of `shape`.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::Unsupported` for invalid distribution parameters
    /// (non-positive or non-finite `std`, empty truncation interval) or when
    /// Xavier fans cannot be derived from a rank-0 shape.
    pub fn build<T, const RANK: usize, R>(
        &self,
        shape: [usize; RANK],
        rng: &mut R,
    ) -> Result<Tensor<T, RANK>>
    where
        T: TensorElem + Float,
        R: Rng + ?Sized,
    {
        let size: usize = shape.iter().product();
        let data: Vec<f64> = match *self {
            Initializer::Constant(value) => vec![value; size],
            Initializer::Zeros => return Ok(Tensor::zeros(shape)),
            Initializer::Ones => return Ok(Tensor::ones(shape)),
            Initializer::Normal { mean, std } => {
                let normal = normal(mean, std)?;
                (0..size).map(|_| normal.sample(rng)).collect()
            }
            Initializer::TruncatedNormal { mean, std, a, b } => {
                trunc_normal_samples(mean, std, a, b, size, rng)?
            }
            Initializer::XavierUniform => {
                if size == 0 {
                    return Ok(Tensor::zeros(shape));
                }
                let (fan_in, fan_out) = fans(&shape)?;
                let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
                let uniform = Uniform::new(-limit, limit)
                    .map_err(|e| TensorError::Unsupported(format!("xavier uniform: {e}")))?;
                (0..size).map(|_| uniform.sample(rng)).collect()
            }
        };

        let data = data
            .into_iter()
            .map(|v| {
                T::from_f64(v).ok_or_else(|| {
                    TensorError::Unsupported(format!(
                        "cannot represent {v} as {}",
                        std::any::type_name::<T>()
                    ))
                })
            })
            .collect::<Result<Vec<T>>>()?;
        Tensor::new(data, shape)
    }
}

fn normal(mean: f64, std: f64) -> Result<Normal<f64>> {
    if !(std.is_finite() && std > 0.0) {
        return Err(TensorError::Unsupported(format!(
            "normal std must be positive, got {std}"
        )));
    }
    Normal::new(mean, std).map_err(|e| TensorError::Unsupported(format!("normal: {e}")))
}

fn trunc_normal_samples<R: Rng + ?Sized>(
    mean: f64,
    std: f64,
    a: f64,
    b: f64,
    size: usize,
    rng: &mut R,
) -> Result<Vec<f64>> {
    if !(a < b) {
        return Err(TensorError::Unsupported(format!(
            "truncation interval [{a}, {b}] is empty"
        )));
    }
    let normal = normal(mean, std)?;
    if mean < a - 2.0 * std || mean > b + 2.0 * std {
        tracing::warn!(
            mean,
            std,
            a,
            b,
            "mean is more than 2 std from [a, b] in trunc_normal; \
             the distribution of values may be incorrect"
        );
    }

    let mut out = Vec::with_capacity(size);
    for _ in 0..size {
        let mut value = normal.sample(rng);
        let mut tries = 1;
        while !(a..=b).contains(&value) && tries < MAX_TRUNC_TRIES {
            value = normal.sample(rng);
            tries += 1;
        }
        out.push(value.clamp(a, b));
    }
    Ok(out)
}

/// Fan-in / fan-out of a weight shape laid out as `[out, in, *receptive]`.
fn fans<const RANK: usize>(shape: &[usize; RANK]) -> Result<(usize, usize)> {
    match RANK {
        0 => Err(TensorError::Unsupported(
            "xavier uniform needs a tensor of rank >= 1".to_string(),
        )),
        1 => Ok((shape[0], shape[0])),
        _ => {
            let receptive: usize = shape[2..].iter().product();
            Ok((shape[1] * receptive, shape[0] * receptive))
        }
    }
}
