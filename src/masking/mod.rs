//! Random patch masking.
//!
//! Masked training drops a random subset of patch tokens before the encoder
//! stack and later puts learned placeholder tokens back at the dropped
//! positions. The scheme is a shuffle / unshuffle pair:
//!
//! 1. Draw one uniform noise value per position and argsort each row
//!    (`ids_shuffle`). Small noise is kept, large noise is removed.
//! 2. The inverse permutation (`ids_restore`) maps shuffle order back to the
//!    original patch order.
//! 3. [`restore`] appends mask tokens after the visible tokens (that is, in
//!    shuffle order) and gathers with `ids_restore`.
//!
//! # Components
//!
//! - [`random_masking`] / [`mask_with_noise`]: the masking half of the codec.
//! - [`restore`]: the unmasking half.
//! - [`NoisePrecision`]: how the noise is drawn relative to the element type.
//! - [`MaskingStage`]: the training-mode switch plus the learned mask token.

use crate::tensor::TensorError;
use thiserror::Error;

pub mod codec;
pub mod noise;
pub mod stage;

pub use codec::{
    MaskedSequence, RestoreIndices, len_keep, mask_with_noise, random_masking, restore,
};
pub use noise::{NoisePrecision, draw_noise};
pub use stage::{MaskingOutcome, MaskingStage};

/// Errors raised by the masking codec.
///
/// All of them are precondition failures, reported before any array work.
#[derive(Error, Debug)]
pub enum MaskingError {
    #[error("mask ratio must be in [0, 1), got {0}")]
    InvalidMaskRatio(f64),
    #[error("sequence batch needs at least one position and feature, got shape {0:?}")]
    EmptySequence(Vec<usize>),
    #[error("shape mismatch for {what}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

pub type Result<T> = std::result::Result<T, MaskingError>;

/// Checks that `mask_ratio` is a finite value in `[0, 1)`.
pub fn validate_mask_ratio(mask_ratio: f64) -> Result<()> {
    if mask_ratio.is_finite() && (0.0..1.0).contains(&mask_ratio) {
        Ok(())
    } else {
        Err(MaskingError::InvalidMaskRatio(mask_ratio))
    }
}
