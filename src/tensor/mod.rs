//! Core Tensor implementation.
//!
//! This module defines the `Tensor` struct, a dense, row-major N-dimensional
//! array on the CPU. It is deliberately small: the masking codec only needs
//! element-wise arithmetic and a handful of index operations along the
//! sequence axis (see [`ops`]).
//!
//! # Key Components
//!
//! - [`Tensor`]: The main struct representing an N-dimensional array.
//! - [`TensorError`]: Error type for tensor operations.
//! - [`TensorElem`]: Trait bound for elements that can be stored in a tensor.
//!
//! # Examples
//!
//! ```rust
//! use maskvit::tensor::Tensor;
//!
//! let data = vec![1.0, 2.0, 3.0, 4.0];
//! let tensor = Tensor::<f32, 2>::new(data, [2, 2]).unwrap();
//! assert_eq!(tensor.shape(), &[2, 2]);
//! ```

use maskvit_kernels::KernelError;
use num_traits::{FromPrimitive, Num, NumAssign, ToPrimitive};
use std::fmt::Debug;
use thiserror::Error;

pub mod ops;

/// Error type for Tensor operations.
#[derive(Error, Debug)]
pub enum TensorError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("Index out of bounds: index {index:?} for shape {shape:?}")]
    IndexOutOfBounds {
        index: Vec<usize>,
        shape: Vec<usize>,
    },
    #[error("Row {row} of the index tensor is not a permutation")]
    InvalidPermutation { row: usize },
    #[error("Drop probability must be in [0, 1), got {0}")]
    InvalidDropProbability(f64),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl From<KernelError> for TensorError {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::ShapeMismatch { expected, got } => {
                TensorError::ShapeMismatch { expected, got }
            }
            KernelError::IndexOutOfBounds { index, bound } => TensorError::IndexOutOfBounds {
                index: vec![index],
                shape: vec![bound],
            },
            KernelError::InvalidPermutation { row } => TensorError::InvalidPermutation { row },
        }
    }
}

pub type Result<T> = std::result::Result<T, TensorError>;

/// Trait bound for elements that can be stored in a Tensor.
///
/// # Requirements
/// - `Copy + Clone`: Elements live in a contiguous `Vec<T>` and are copied freely.
/// - `Num + ...`: Provides the numeric operations used by the tensor math.
/// - `Send + Sync`: Required for parallel execution via `rayon`.
///
/// Index tensors use `usize`, which satisfies the same bound.
pub trait TensorElem:
    Num + NumAssign + Copy + Clone + Debug + Send + Sync + FromPrimitive + ToPrimitive + PartialOrd
{
}

impl<T> TensorElem for T where
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

/// The core Tensor struct.
///
/// # Generics
///
/// - `T`: The element type (must implement `TensorElem`).
/// - `RANK`: The number of dimensions (const generic).
#[derive(Clone, PartialEq)]
pub struct Tensor<T, const RANK: usize>
where
    T: TensorElem,
{
    shape: [usize; RANK],
    data: Vec<T>,
}

impl<T, const RANK: usize> Tensor<T, RANK>
where
    T: TensorElem,
{
    /// Creates a new Tensor from a vector of data and a shape.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` if the length of `data` does not match
    /// the product of `shape`.
    pub fn new(data: Vec<T>, shape: [usize; RANK]) -> Result<Self> {
        let size: usize = shape.iter().product();
        if data.len() != size {
            return Err(TensorError::ShapeMismatch {
                expected: vec![size],
                got: vec![data.len()],
            });
        }
        Ok(Self { shape, data })
    }

    /// Creates a new Tensor filled with `value`.
    pub fn full(value: T, shape: [usize; RANK]) -> Self {
        let size: usize = shape.iter().product();
        Self {
            shape,
            data: vec![value; size],
        }
    }

    /// Creates a new Tensor filled with zeros.
    pub fn zeros(shape: [usize; RANK]) -> Self {
        Self::full(T::zero(), shape)
    }

    /// Creates a new Tensor filled with ones.
    pub fn ones(shape: [usize; RANK]) -> Self {
        Self::full(T::one(), shape)
    }

    /// Reshapes the tensor to a new shape.
    ///
    /// The number of elements must remain the same.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` if the total number of elements in `new_shape`
    /// does not match the current size of the tensor.
    pub fn reshape<const NEW_RANK: usize>(
        self,
        new_shape: [usize; NEW_RANK],
    ) -> Result<Tensor<T, NEW_RANK>> {
        let current_size: usize = self.shape.iter().product();
        let new_size: usize = new_shape.iter().product();

        if current_size != new_size {
            return Err(TensorError::ShapeMismatch {
                expected: vec![current_size],
                got: vec![new_size],
            });
        }

        Ok(Tensor {
            shape: new_shape,
            data: self.data,
        })
    }

    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[usize; RANK] {
        &self.shape
    }

    /// Returns a reference to the underlying data as a slice.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Returns a mutable reference to the underlying data as a slice.
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consumes the tensor and returns its flat, row-major data.
    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Returns the total number of elements in the tensor.
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }
}

impl<T, const RANK: usize> Debug for Tensor<T, RANK>
where
    T: TensorElem,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("data_len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_creation() {
        // Positive case
        let data = vec![1.0, 2.0, 3.0, 4.0];
        let tensor = Tensor::<f32, 2>::new(data.clone(), [2, 2]).unwrap();
        assert_eq!(tensor.shape(), &[2, 2]);
        assert_eq!(tensor.data(), &data[..]);

        // Negative case: Size mismatch
        let err = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0], [2, 2]);
        assert!(matches!(err, Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_zeros_ones_full() {
        let zeros = Tensor::<f32, 2>::zeros([2, 3]);
        assert_eq!(zeros.data(), &[0.0; 6]);

        let ones = Tensor::<f32, 2>::ones([2, 3]);
        assert_eq!(ones.data(), &[1.0; 6]);

        let sevens = Tensor::<usize, 1>::full(7, [3]);
        assert_eq!(sevens.data(), &[7, 7, 7]);
    }

    #[test]
    fn test_reshape() {
        let tensor = Tensor::<f32, 3>::zeros([2, 3, 4]);

        let flat = tensor.reshape([2, 12]).unwrap();
        assert_eq!(flat.shape(), &[2, 12]);

        let err = flat.reshape([5, 5]);
        assert!(matches!(err, Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_kernel_error_conversion() {
        let err: TensorError = KernelError::IndexOutOfBounds { index: 5, bound: 4 }.into();
        assert!(matches!(
            err,
            TensorError::IndexOutOfBounds { ref index, ref shape } if index == &[5] && shape == &[4]
        ));
    }

    #[test]
    fn test_macro() {
        let t = crate::tensor!([1.0, 2.0, 3.0, 4.0], [2, 2]);
        assert_eq!(t.shape(), &[2, 2]);
        assert_eq!(t.data(), &[1.0, 2.0, 3.0, 4.0]);
    }
}
