use crate::tensor::{Result, Tensor, TensorElem};
use std::fmt::Debug;

/// An encoder block operating on a `[N, L, D]` token sequence.
///
/// Blocks return the full updated sequence (residual included). They must
/// accept any sequence length, because during masked training they only see
/// the visible subset of the patches.
///
/// `Send + Sync` lets a pipeline be shared across threads; `Debug` keeps
/// pipelines inspectable.
pub trait SequenceBlock<T: TensorElem>: Debug + Send + Sync {
    /// # Shapes
    /// - `x`: `[N, L, D]`
    /// - returns: `[N, L, D]`
    fn forward(&self, x: &Tensor<T, 3>) -> Result<Tensor<T, 3>>;
}

impl<T: TensorElem, B: SequenceBlock<T> + ?Sized> SequenceBlock<T> for Box<B> {
    fn forward(&self, x: &Tensor<T, 3>) -> Result<Tensor<T, 3>> {
        (**self).forward(x)
    }
}

/// A block that returns its input unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityBlock;

impl<T: TensorElem> SequenceBlock<T> for IdentityBlock {
    fn forward(&self, x: &Tensor<T, 3>) -> Result<Tensor<T, 3>> {
        Ok(x.clone())
    }
}
