//! CPU index kernels for `maskvit`.
//!
//! Every kernel works on flat, row-major slices and parallelises over the
//! leading (batch) axis with `rayon`. Rows never depend on each other, so the
//! results are identical to a sequential pass.

use num_traits::{FromPrimitive, Num, NumAssign, ToPrimitive};
use std::fmt::Debug;
use thiserror::Error;

pub mod cpu_argsort;
pub mod cpu_concat;
pub mod cpu_gather;

pub use cpu_argsort::{cpu_argsort, cpu_inverse_permutation};
pub use cpu_concat::cpu_concat_rows;
pub use cpu_gather::cpu_gather_rows;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("Index {index} out of bounds for axis of length {bound}")]
    IndexOutOfBounds { index: usize, bound: usize },
    #[error("Row {row} is not a permutation")]
    InvalidPermutation { row: usize },
}

pub type Result<T> = std::result::Result<T, KernelError>;

/// Trait bound for elements that can be processed by kernels.
/// This mirrors `TensorElem` in the main crate to avoid circular dependencies.
pub trait KernelElem:
    Num + NumAssign + Copy + Clone + Debug + Send + Sync + FromPrimitive + ToPrimitive + PartialOrd
{
}

impl<T> KernelElem for T where
    T: Num
        + NumAssign
        + Copy
        + Clone
        + Debug
        + Send
        + Sync
        + FromPrimitive
        + ToPrimitive
        + PartialOrd
{
}

/// Checks that a flat buffer holds exactly `shape.iter().product()` elements.
pub(crate) fn check_len(len: usize, shape: &[usize]) -> Result<()> {
    let expected: usize = shape.iter().product();
    if len != expected {
        return Err(KernelError::ShapeMismatch {
            expected: shape.to_vec(),
            got: vec![len],
        });
    }
    Ok(())
}
