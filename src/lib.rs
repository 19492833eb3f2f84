//! # maskvit
//!
//! `maskvit` implements the random patch masking used for masked training of
//! Vision Transformers, in pure Rust on a small CPU tensor type.
//!
//! During training a fraction of the patch tokens is dropped before the encoder
//! stack, and placeholder mask tokens are put back afterwards so the pooled
//! feature still sees a full-length sequence in the original patch order.
//!
//! ## Modules
//!
//! - [`mod@tensor`]: Dense row-major N-dimensional tensor with the index ops masking needs.
//! - [`masking`]: Random masking / restore codec and the training-time masking stage.
//! - [`nn`]: Parameter initialisers, drop-path and the encoder block trait.
//! - [`models`]: The masked face-ViT feature pipeline.
//! - [`config`]: Serde-backed configuration.
//!
//! ## Example
//!
//! ```rust
//! use maskvit::masking::{random_masking, restore, NoisePrecision};
//! use maskvit::tensor::Tensor;
//! use rand::SeedableRng;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let x = Tensor::<f32, 3>::ones([2, 16, 8]);
//!
//! let masked = random_masking(&x, 0.25, NoisePrecision::Native, &mut rng).unwrap();
//! assert_eq!(masked.x_masked.shape(), &[2, 12, 8]);
//!
//! let token = Tensor::<f32, 1>::zeros([8]);
//! let full = restore(&masked.x_masked, &token, &masked.ids_restore).unwrap();
//! assert_eq!(full.shape(), &[2, 16, 8]);
//! ```
//!
//! Small tensors can be written inline with [`tensor!`], and
//! [`RestoreIndices`](masking::RestoreIndices) ties a restore to the call
//! that produced the visible tokens:
//!
//! ```rust
//! use maskvit::masking::mask_with_noise;
//! use maskvit::tensor;
//!
//! let x = tensor!([10.0f32, 11.0, 12.0, 13.0], [1, 4, 1]);
//! let noise = tensor!([0.2f32, 0.9, 0.1, 0.5], [1, 4]);
//! let masked = mask_with_noise(&x, 0.5, &noise).unwrap();
//! assert_eq!(masked.ids_keep.data(), &[2, 0]);
//!
//! let (visible, indices) = masked.into_visible();
//! let full = indices.restore(&visible, &tensor!([-1.0f32], [1])).unwrap();
//! assert_eq!(full.data(), &[10.0, -1.0, 12.0, -1.0]);
//! ```

/// Macro for creating a Tensor with compile-time shape checking.
///
/// # Examples
///
/// ```rust
/// use maskvit::tensor;
///
/// // Works
/// let t = tensor!([1.0, 2.0, 3.0, 4.0], [2, 2]);
///
/// // Fails to compile:
/// // let t = tensor!([1.0, 2.0, 3.0], [2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    ($data:expr, $shape:expr) => {{
        const DATA_LEN: usize = $data.len();
        const SHAPE: [usize; $shape.len()] = $shape;
        const EXPECTED_SIZE: usize = {
            let mut size = 1;
            let mut i = 0;
            while i < SHAPE.len() {
                size *= SHAPE[i];
                i += 1;
            }
            size
        };

        const _: () = assert!(
            DATA_LEN == EXPECTED_SIZE,
            "Shape mismatch: data length does not match shape product"
        );

        // Checked at compile time above.
        $crate::tensor::Tensor::new($data.to_vec(), $shape).unwrap()
    }};
}

pub mod config;
pub mod masking;
pub mod models;
pub mod nn;
pub mod tensor;

pub use masking::{MaskedSequence, MaskingError, MaskingStage, NoisePrecision};
pub use tensor::{Tensor, TensorElem, TensorError};
