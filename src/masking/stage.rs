//! Training-time masking stage.

use super::codec::{MaskedSequence, RestoreIndices, random_masking};
use super::noise::NoisePrecision;
use super::{MaskingError, Result, validate_mask_ratio};
use crate::config::MaskingConfig;
use crate::nn::Initializer;
use crate::tensor::{Tensor, TensorElem};
use num_traits::Float;
use rand::Rng;
use rand::distr::{Distribution, StandardUniform};

/// What [`MaskingStage::apply`] did with a batch.
#[derive(Debug, Clone)]
pub enum MaskingOutcome<T: TensorElem> {
    /// Masking ran; the encoder should see `x_masked`.
    Masked(MaskedSequence<T>),
    /// Masking was bypassed; the batch is returned untouched.
    Passthrough(Tensor<T, 3>),
}

impl<T: TensorElem> MaskingOutcome<T> {
    pub fn is_masked(&self) -> bool {
        matches!(self, MaskingOutcome::Masked(_))
    }

    /// Tokens to feed to the encoder stack.
    pub fn tokens(&self) -> &Tensor<T, 3> {
        match self {
            MaskingOutcome::Masked(masked) => &masked.x_masked,
            MaskingOutcome::Passthrough(x) => x,
        }
    }

    /// Splits into the encoder input and, when masked, the restore indices.
    pub fn into_parts(self) -> (Tensor<T, 3>, Option<RestoreIndices>) {
        match self {
            MaskingOutcome::Masked(masked) => {
                let (visible, indices) = masked.into_visible();
                (visible, Some(indices))
            }
            MaskingOutcome::Passthrough(x) => (x, None),
        }
    }
}

/// Masking stage of a masked ViT: a learned mask token plus the masking policy.
///
/// Masking only happens in training mode with a positive ratio; otherwise the
/// stage is a pass-through.
#[derive(Debug, Clone)]
pub struct MaskingStage<T: TensorElem> {
    mask_token: Tensor<T, 1>,
    mask_ratio: f64,
    precision: NoisePrecision,
}

impl<T: TensorElem + Float> MaskingStage<T> {
    /// Creates a stage whose mask token is drawn from a truncated normal (std 1, bounds `[-2, 2]`).
    ///
    /// # Errors
    ///
    /// [`MaskingError::InvalidMaskRatio`] for a ratio outside `[0, 1)`.
    pub fn new<R: Rng + ?Sized>(
        embed_dim: usize,
        config: &MaskingConfig,
        rng: &mut R,
    ) -> Result<Self> {
        validate_mask_ratio(config.mask_ratio)?;
        let mask_token = Initializer::trunc_normal(1.0).build([embed_dim], rng)?;
        Self::from_parts(mask_token, config.mask_ratio, config.precision)
    }
}

impl<T: TensorElem> MaskingStage<T> {
    /// Creates a stage around an existing mask token.
    pub fn from_parts(
        mask_token: Tensor<T, 1>,
        mask_ratio: f64,
        precision: NoisePrecision,
    ) -> Result<Self> {
        validate_mask_ratio(mask_ratio)?;
        Ok(Self {
            mask_token,
            mask_ratio,
            precision,
        })
    }

    pub fn mask_token(&self) -> &Tensor<T, 1> {
        &self.mask_token
    }

    pub fn mask_ratio(&self) -> f64 {
        self.mask_ratio
    }

    pub fn precision(&self) -> NoisePrecision {
        self.precision
    }

    pub fn embed_dim(&self) -> usize {
        self.mask_token.shape()[0]
    }

    /// Whether [`apply`](Self::apply) masks in the given mode.
    pub fn is_active(&self, training: bool) -> bool {
        training && self.mask_ratio > 0.0
    }

    /// Masks `x` when active, otherwise hands it back unchanged.
    ///
    /// # Errors
    ///
    /// [`MaskingError::ShapeMismatch`] if the feature width of `x` differs from
    /// the mask token, plus any error of [`random_masking`].
    pub fn apply<R>(
        &self,
        x: Tensor<T, 3>,
        training: bool,
        rng: &mut R,
    ) -> Result<MaskingOutcome<T>>
    where
        StandardUniform: Distribution<T>,
        R: Rng + ?Sized,
    {
        if x.shape()[2] != self.embed_dim() {
            return Err(MaskingError::ShapeMismatch {
                what: "embedding width",
                expected: vec![self.embed_dim()],
                got: vec![x.shape()[2]],
            });
        }

        if !self.is_active(training) {
            tracing::debug!(training, mask_ratio = self.mask_ratio, "masking bypassed");
            return Ok(MaskingOutcome::Passthrough(x));
        }

        let masked = random_masking(&x, self.mask_ratio, self.precision, rng)?;
        Ok(MaskingOutcome::Masked(masked))
    }

    /// Puts the mask token back at every removed position.
    ///
    /// # Errors
    ///
    /// [`MaskingError::ShapeMismatch`] when `x` does not hold exactly
    /// `indices.len_keep` tokens or its width differs from the mask token.
    pub fn restore(&self, x: &Tensor<T, 3>, indices: &RestoreIndices) -> Result<Tensor<T, 3>> {
        indices.restore(x, &self.mask_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn stage(ratio: f64) -> MaskingStage<f32> {
        let token = Tensor::<f32, 1>::full(-1.0, [4]);
        MaskingStage::from_parts(token, ratio, NoisePrecision::Native).unwrap()
    }

    #[test]
    fn test_passthrough_outside_training() {
        let mut rng = StdRng::seed_from_u64(0);
        let x = Tensor::<f32, 3>::ones([2, 9, 4]);

        let out = stage(0.5).apply(x.clone(), false, &mut rng).unwrap();
        assert!(!out.is_masked());
        assert_eq!(out.tokens(), &x);

        let out = stage(0.0).apply(x.clone(), true, &mut rng).unwrap();
        assert!(!out.is_masked());
    }

    #[test]
    fn test_masked_in_training() {
        let mut rng = StdRng::seed_from_u64(1);
        let x = Tensor::<f32, 3>::ones([2, 9, 4]);
        let stage = stage(1.0 / 3.0);

        let out = stage.apply(x, true, &mut rng).unwrap();
        assert!(out.is_masked());
        assert_eq!(out.tokens().shape(), &[2, 6, 4]);

        let (visible, indices) = out.into_parts();
        let indices = indices.unwrap();
        assert_eq!(indices.len_keep, 6);
        let full = stage.restore(&visible, &indices).unwrap();
        assert_eq!(full.shape(), &[2, 9, 4]);

        let placeholders = full.data().iter().filter(|&&v| v == -1.0).count();
        assert_eq!(placeholders, 2 * 3 * 4);
    }

    #[test]
    fn test_restore_rejects_tokens_of_another_call() {
        let mut rng = StdRng::seed_from_u64(4);
        let x = Tensor::<f32, 3>::ones([1, 8, 4]);
        let (visible, _) = stage(0.5).apply(x.clone(), true, &mut rng).unwrap().into_parts();
        let (_, other) = stage(0.25).apply(x, true, &mut rng).unwrap().into_parts();
        let other = other.unwrap();

        assert_eq!(visible.shape(), &[1, 4, 4]);
        assert_eq!(other.len_keep, 6);
        assert!(matches!(
            stage(0.5).restore(&visible, &other),
            Err(MaskingError::ShapeMismatch {
                what: "visible length",
                ..
            })
        ));
    }

    #[test]
    fn test_width_checked() {
        let mut rng = StdRng::seed_from_u64(2);
        let x = Tensor::<f32, 3>::ones([1, 4, 5]);
        assert!(matches!(
            stage(0.5).apply(x, false, &mut rng),
            Err(MaskingError::ShapeMismatch { what: "embedding width", .. })
        ));
    }

    #[test]
    fn test_new_initialises_token() {
        let mut rng = StdRng::seed_from_u64(3);
        let stage = MaskingStage::<f32>::new(16, &MaskingConfig::default(), &mut rng).unwrap();
        assert_eq!(stage.embed_dim(), 16);
        assert_eq!(stage.mask_ratio(), 0.1);
        assert!(stage.mask_token().data().iter().all(|&v| (-2.0..=2.0).contains(&v)));

        let bad = MaskingConfig {
            mask_ratio: 1.2,
            ..MaskingConfig::default()
        };
        assert!(matches!(
            MaskingStage::<f32>::new(16, &bad, &mut rng),
            Err(MaskingError::InvalidMaskRatio(_))
        ));
    }
}
