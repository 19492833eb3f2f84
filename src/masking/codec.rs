//! The masking / restore pair.

use super::noise::{NoisePrecision, draw_noise};
use super::{MaskingError, Result, validate_mask_ratio};
use crate::tensor::{Tensor, TensorElem};
use rand::Rng;
use rand::distr::{Distribution, StandardUniform};

/// Result of masking a `[N, L, D]` batch.
#[derive(Debug, Clone)]
pub struct MaskedSequence<T: TensorElem> {
    /// Visible tokens, `[N, len_keep, D]`, in shuffle order.
    pub x_masked: Tensor<T, 3>,
    /// Binary mask in original order, `[N, L]`. `0` is kept, `1` is removed.
    pub mask: Tensor<T, 2>,
    /// Per-sample shuffle permutation, `[N, L]`.
    pub ids_shuffle: Tensor<usize, 2>,
    /// Inverse of `ids_shuffle`, `[N, L]`.
    pub ids_restore: Tensor<usize, 2>,
    /// First `len_keep` columns of `ids_shuffle`, `[N, len_keep]`.
    pub ids_keep: Tensor<usize, 2>,
    pub len_keep: usize,
}

impl<T: TensorElem> MaskedSequence<T> {
    /// The restore permutation of this call, paired with its keep count.
    pub fn restore_indices(&self) -> RestoreIndices {
        RestoreIndices {
            ids_restore: self.ids_restore.clone(),
            len_keep: self.len_keep,
        }
    }

    /// Splits off the visible tokens and the matching [`RestoreIndices`].
    pub fn into_visible(self) -> (Tensor<T, 3>, RestoreIndices) {
        let indices = RestoreIndices {
            ids_restore: self.ids_restore,
            len_keep: self.len_keep,
        };
        (self.x_masked, indices)
    }
}

/// Restore permutation of one masking call together with the number of
/// tokens that call kept.
///
/// Unlike the bare [`restore`], [`RestoreIndices::restore`] rejects visible
/// sequences produced by a different masking call.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreIndices {
    /// `[N, L]`
    pub ids_restore: Tensor<usize, 2>,
    pub len_keep: usize,
}

impl RestoreIndices {
    pub fn seq_len(&self) -> usize {
        self.ids_restore.shape()[1]
    }

    /// Reinserts `mask_token` like [`restore`], after checking that
    /// `x_visible` holds exactly `len_keep` tokens.
    ///
    /// # Errors
    ///
    /// [`MaskingError::ShapeMismatch`] with `what == "visible length"` when the
    /// visible length differs from `len_keep`, plus any error of [`restore`].
    pub fn restore<T: TensorElem>(
        &self,
        x_visible: &Tensor<T, 3>,
        mask_token: &Tensor<T, 1>,
    ) -> Result<Tensor<T, 3>> {
        let visible = x_visible.shape()[1];
        if visible != self.len_keep || self.len_keep > self.seq_len() {
            return Err(MaskingError::ShapeMismatch {
                what: "visible length",
                expected: vec![self.len_keep],
                got: vec![visible],
            });
        }
        restore(x_visible, mask_token, &self.ids_restore)
    }
}

/// Number of positions kept out of `seq_len`: `floor(seq_len * (1 - mask_ratio))`.
///
/// # Errors
///
/// Returns [`MaskingError::InvalidMaskRatio`] unless `mask_ratio` is in `[0, 1)`.
pub fn len_keep(seq_len: usize, mask_ratio: f64) -> Result<usize> {
    validate_mask_ratio(mask_ratio)?;
    let keep = (seq_len as f64 * (1.0 - mask_ratio)).floor() as usize;
    Ok(keep.min(seq_len))
}

fn check_batch<T: TensorElem>(x: &Tensor<T, 3>) -> Result<()> {
    if x.shape()[1] == 0 || x.shape()[2] == 0 {
        return Err(MaskingError::EmptySequence(x.shape().to_vec()));
    }
    Ok(())
}

/// Per-sample random masking by per-sample shuffling.
///
/// Draws `N * L` uniform values from `rng` under `precision`, then behaves
/// exactly like [`mask_with_noise`].
///
/// # Shapes
/// - `x`: `[N, L, D]`
/// - `x_masked`: `[N, floor(L * (1 - mask_ratio)), D]`
///
/// # Errors
///
/// [`MaskingError::InvalidMaskRatio`] or [`MaskingError::EmptySequence`]; no
/// randomness is consumed when the inputs are rejected.
pub fn random_masking<T, R>(
    x: &Tensor<T, 3>,
    mask_ratio: f64,
    precision: NoisePrecision,
    rng: &mut R,
) -> Result<MaskedSequence<T>>
where
    T: TensorElem,
    StandardUniform: Distribution<T>,
    R: Rng + ?Sized,
{
    validate_mask_ratio(mask_ratio)?;
    check_batch(x)?;

    let [n, l, _] = *x.shape();
    let noise = draw_noise::<T, R>([n, l], precision, rng)?;
    mask_with_noise(x, mask_ratio, &noise)
}

/// Masks `x` using caller-provided noise.
///
/// Positions with the smallest noise are kept. Ties keep their index order,
/// and NaN noise sorts after every number, so those positions are removed first.
///
/// # Shapes
/// - `x`: `[N, L, D]`
/// - `noise`: `[N, L]`
///
/// # Errors
///
/// [`MaskingError::InvalidMaskRatio`], [`MaskingError::EmptySequence`], or
/// [`MaskingError::ShapeMismatch`] when `noise` is not `[N, L]`.
pub fn mask_with_noise<T>(
    x: &Tensor<T, 3>,
    mask_ratio: f64,
    noise: &Tensor<T, 2>,
) -> Result<MaskedSequence<T>>
where
    T: TensorElem,
{
    validate_mask_ratio(mask_ratio)?;
    check_batch(x)?;

    let [n, l, _] = *x.shape();
    if noise.shape() != &[n, l] {
        return Err(MaskingError::ShapeMismatch {
            what: "noise",
            expected: vec![n, l],
            got: noise.shape().to_vec(),
        });
    }
    let len_keep = len_keep(l, mask_ratio)?;

    // ascend: small is keep, large is remove
    let ids_shuffle = noise.argsort_rows()?;
    let ids_restore = ids_shuffle.inverse_permutation()?;
    let ids_keep = ids_shuffle.narrow_cols(len_keep)?;

    let x_masked = x.gather_rows(&ids_keep)?;

    // 0 is keep, 1 is remove; built in shuffle order, then unshuffled.
    let mut shuffled_mask = Vec::with_capacity(n * l);
    for _ in 0..n {
        shuffled_mask.extend((0..l).map(|j| if j < len_keep { T::zero() } else { T::one() }));
    }
    let mask = Tensor::new(shuffled_mask, [n, l])?.gather_cols(&ids_restore)?;

    tracing::debug!(batch = n, seq_len = l, len_keep, "masked patch sequence");

    Ok(MaskedSequence {
        x_masked,
        mask,
        ids_shuffle,
        ids_restore,
        ids_keep,
        len_keep,
    })
}

/// Reinserts `mask_token` at the removed positions and restores original order.
///
/// The mask token is tiled to fill the `L - len_visible` missing positions,
/// appended after `x_visible`, and the result is gathered with `ids_restore`.
///
/// # Shapes
/// - `x_visible`: `[N, len_visible, D]` with `len_visible <= L`
/// - `mask_token`: `[D]`
/// - `ids_restore`: `[N, L]`
/// - returns: `[N, L, D]`
///
/// # Errors
///
/// [`MaskingError::ShapeMismatch`] if the batch sizes differ, `x_visible` is
/// longer than `ids_restore`, or the mask token width differs from `D`.
///
/// `ids_restore` alone does not record how many tokens its masking call
/// kept; prefer [`RestoreIndices::restore`] when that pairing is available.
pub fn restore<T>(
    x_visible: &Tensor<T, 3>,
    mask_token: &Tensor<T, 1>,
    ids_restore: &Tensor<usize, 2>,
) -> Result<Tensor<T, 3>>
where
    T: TensorElem,
{
    let [n, visible, d] = *x_visible.shape();
    let [restore_n, l] = *ids_restore.shape();

    if restore_n != n {
        return Err(MaskingError::ShapeMismatch {
            what: "restore batch",
            expected: vec![n],
            got: vec![restore_n],
        });
    }
    if visible > l {
        return Err(MaskingError::ShapeMismatch {
            what: "visible length",
            expected: vec![l],
            got: vec![visible],
        });
    }
    if mask_token.shape()[0] != d {
        return Err(MaskingError::ShapeMismatch {
            what: "mask token",
            expected: vec![d],
            got: mask_token.shape().to_vec(),
        });
    }

    let tokens = Tensor::tile_rows(mask_token, n, l - visible);
    let shuffled = x_visible.concat_rows(&tokens)?;
    Ok(shuffled.gather_rows(ids_restore)?)
}
