//! Masked feature extraction of the face-recognition ViT.
//!
//! The pipeline around the encoder stack is:
//!
//! ```text
//! tokens [N, L, D] -> + pos_embed -> mask (training) -> blocks -> restore -> flatten [N, L * D]
//! ```
//!
//! Patch embedding and the blocks themselves are supplied by the caller; the
//! pipeline owns the positional embedding, the masking stage and the per-block
//! drop-path schedule.

use super::{ModelError, Result};
use crate::config::{self, ConfigError, MaskingConfig, Validate};
use crate::masking::MaskingStage;
use crate::nn::{DropPath, Initializer, SequenceBlock, linear_schedule, validate_drop_prob};
use crate::tensor::{Tensor, TensorElem};
use num_traits::Float;
use rand::Rng;
use rand::distr::{Distribution, StandardUniform};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceViTConfig {
    pub img_size: usize,
    pub patch_size: usize,
    pub in_channels: usize,
    pub embed_dim: usize,
    pub depth: usize,
    pub num_heads: usize,
    pub mlp_ratio: usize,
    /// Largest drop-path rate, reached by the last block.
    pub drop_path_rate: f64,
    pub masking: MaskingConfig,
}

impl Default for FaceViTConfig {
    fn default() -> Self {
        Self {
            img_size: 112,
            patch_size: 16,
            in_channels: 3,
            embed_dim: 768,
            depth: 12,
            num_heads: 12,
            mlp_ratio: 4,
            drop_path_rate: 0.0,
            masking: MaskingConfig::default(),
        }
    }
}

impl FaceViTConfig {
    fn patch9_112(embed_dim: usize, depth: usize, drop_path_rate: f64, mask_ratio: f64) -> Self {
        Self {
            img_size: 112,
            patch_size: 9,
            embed_dim,
            depth,
            num_heads: 8,
            mlp_ratio: 4,
            drop_path_rate,
            masking: MaskingConfig {
                mask_ratio,
                ..MaskingConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn tiny_patch9_112() -> Self {
        Self::patch9_112(256, 12, 0.1, 0.1)
    }

    pub fn small_patch9_112() -> Self {
        Self::patch9_112(512, 12, 0.1, 0.1)
    }

    pub fn base_patch9_112() -> Self {
        Self::patch9_112(512, 24, 0.1, 0.1)
    }

    pub fn large_patch9_112() -> Self {
        Self::patch9_112(768, 24, 0.05, 0.05)
    }

    /// Number of patch tokens: `(img_size / patch_size)^2`, rounding down.
    pub fn num_patches(&self) -> usize {
        let side = self.img_size / self.patch_size.max(1);
        side * side
    }

    /// Loads and validates a JSON config file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> config::Result<Self> {
        config::from_file(path)
    }
}

impl Validate for FaceViTConfig {
    fn validate(&self) -> config::Result<()> {
        if self.patch_size == 0 || self.patch_size > self.img_size {
            return Err(ConfigError::Invalid(format!(
                "patch size {} does not fit image size {}",
                self.patch_size, self.img_size
            )));
        }
        if self.embed_dim == 0 || self.num_heads == 0 || self.embed_dim % self.num_heads != 0 {
            return Err(ConfigError::Invalid(format!(
                "embed dim {} is not divisible into {} heads",
                self.embed_dim, self.num_heads
            )));
        }
        validate_drop_prob(self.drop_path_rate).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.masking.validate()
    }
}

/// Feature extractor of a masked ViT over caller-supplied encoder blocks.
#[derive(Debug)]
pub struct MaskedFeatureExtractor<T: TensorElem, B> {
    config: FaceViTConfig,
    /// Learned positional embedding, `[num_patches, embed_dim]`.
    pos_embed: Tensor<T, 2>,
    masking: MaskingStage<T>,
    blocks: Vec<B>,
    drop_paths: Vec<DropPath>,
}

impl<T, B> MaskedFeatureExtractor<T, B>
where
    T: TensorElem + Float,
    B: SequenceBlock<T>,
{
    /// Builds the pipeline. Positional embedding and mask token are drawn from
    /// a truncated normal (std 1, bounds `[-2, 2]`).
    ///
    /// # Errors
    ///
    /// [`ModelError::Config`] for an invalid config and [`ModelError::BlockCount`]
    /// when `blocks.len() != config.depth`.
    pub fn new<R: Rng + ?Sized>(
        config: FaceViTConfig,
        blocks: Vec<B>,
        rng: &mut R,
    ) -> Result<Self> {
        config.validate()?;
        if blocks.len() != config.depth {
            return Err(ModelError::BlockCount {
                expected: config.depth,
                got: blocks.len(),
            });
        }

        let pos_embed =
            Initializer::trunc_normal(1.0).build([config.num_patches(), config.embed_dim], rng)?;
        let masking = MaskingStage::new(config.embed_dim, &config.masking, rng)?;
        let drop_paths = linear_schedule(config.drop_path_rate, config.depth)
            .into_iter()
            .map(|rate| {
                DropPath::new(rate).map(|dp| dp.with_precision(config.masking.precision))
            })
            .collect::<crate::tensor::Result<Vec<_>>>()?;

        Ok(Self {
            config,
            pos_embed,
            masking,
            blocks,
            drop_paths,
        })
    }

    pub fn config(&self) -> &FaceViTConfig {
        &self.config
    }

    pub fn pos_embed(&self) -> &Tensor<T, 2> {
        &self.pos_embed
    }

    pub fn masking(&self) -> &MaskingStage<T> {
        &self.masking
    }

    pub fn blocks(&self) -> &[B] {
        &self.blocks
    }

    pub fn drop_paths(&self) -> &[DropPath] {
        &self.drop_paths
    }

    /// Runs the pipeline and returns the flattened feature.
    ///
    /// In training, each block's whole residual contribution `block(x) - x`
    /// goes through that block's drop-path, so a dropped sample skips the
    /// entire block (attention and MLP together). Blocks must keep the
    /// sequence length, since the masked positions are restored afterwards.
    ///
    /// # Shapes
    /// - `tokens`: `[N, num_patches, embed_dim]` (already patch-embedded)
    /// - returns: `[N, num_patches * embed_dim]`
    pub fn forward<R>(
        &self,
        tokens: &Tensor<T, 3>,
        training: bool,
        rng: &mut R,
    ) -> Result<Tensor<T, 2>>
    where
        StandardUniform: Distribution<T>,
        R: Rng + ?Sized,
    {
        let x = tokens.add_rows(&self.pos_embed)?;
        let (mut x, restore_indices) = self.masking.apply(x, training, rng)?.into_parts();

        for (block, drop_path) in self.blocks.iter().zip(&self.drop_paths) {
            let y = block.forward(&x)?;
            x = if training && drop_path.drop_prob() > 0.0 {
                // x + drop_path(block(x) - x)
                let branch = (&y - &x)?;
                let branch = drop_path.forward(&branch, training, rng)?;
                (&x + &branch)?
            } else {
                y
            };
        }

        if let Some(indices) = restore_indices {
            x = self.masking.restore(&x, &indices)?;
        }

        let [n, l, d] = *x.shape();
        Ok(x.reshape([n, l * d])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::IdentityBlock;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn tiny_config() -> FaceViTConfig {
        FaceViTConfig {
            img_size: 12,
            patch_size: 3,
            embed_dim: 8,
            depth: 2,
            num_heads: 2,
            drop_path_rate: 0.0,
            masking: MaskingConfig {
                mask_ratio: 0.25,
                ..MaskingConfig::default()
            },
            ..FaceViTConfig::default()
        }
    }

    #[test]
    fn test_presets() {
        let tiny = FaceViTConfig::tiny_patch9_112();
        assert_eq!(tiny.num_patches(), 144);
        assert_eq!(tiny.embed_dim, 256);
        assert!(tiny.validate().is_ok());

        let large = FaceViTConfig::large_patch9_112();
        assert_eq!(large.depth, 24);
        assert_eq!(large.masking.mask_ratio, 0.05);
        assert!(large.validate().is_ok());

        assert!(FaceViTConfig::small_patch9_112().validate().is_ok());
        assert!(FaceViTConfig::base_patch9_112().validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let bad = FaceViTConfig {
            num_heads: 3,
            ..tiny_config()
        };
        assert!(matches!(bad.validate(), Err(ConfigError::Invalid(_))));

        let bad = FaceViTConfig {
            patch_size: 0,
            ..tiny_config()
        };
        assert!(bad.validate().is_err());

        for drop_path_rate in [1.0, -0.5, f64::NAN] {
            let bad = FaceViTConfig {
                drop_path_rate,
                ..tiny_config()
            };
            assert!(matches!(
                bad.validate(),
                Err(ConfigError::Invalid(msg)) if msg.contains("Drop")
            ));
        }
    }

    #[test]
    fn test_block_count_checked() {
        let mut rng = StdRng::seed_from_u64(0);
        let err =
            MaskedFeatureExtractor::<f32, _>::new(tiny_config(), vec![IdentityBlock], &mut rng);
        assert!(matches!(
            err,
            Err(ModelError::BlockCount { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn test_eval_forward_is_tokens_plus_pos_embed() {
        let mut rng = StdRng::seed_from_u64(1);
        let model =
            MaskedFeatureExtractor::<f32, _>::new(tiny_config(), vec![IdentityBlock; 2], &mut rng)
                .unwrap();

        let tokens = Tensor::<f32, 3>::zeros([2, 16, 8]);
        let out = model.forward(&tokens, false, &mut rng).unwrap();
        assert_eq!(out.shape(), &[2, 16 * 8]);
        assert_eq!(&out.data()[..128], model.pos_embed().data());
        assert_eq!(&out.data()[128..], model.pos_embed().data());
    }

    #[test]
    fn test_training_forward_inserts_mask_tokens() {
        let mut rng = StdRng::seed_from_u64(2);
        let model =
            MaskedFeatureExtractor::<f32, _>::new(tiny_config(), vec![IdentityBlock; 2], &mut rng)
                .unwrap();

        let tokens = Tensor::<f32, 3>::zeros([1, 16, 8]);
        let out = model.forward(&tokens, true, &mut rng).unwrap();
        assert_eq!(out.shape(), &[1, 128]);

        let token = model.masking().mask_token().data();
        let pos = model.pos_embed().data();
        let mut masked = 0;
        for (row, pos_row) in out.data().chunks(8).zip(pos.chunks(8)) {
            if row == token {
                masked += 1;
            } else {
                assert_eq!(row, pos_row);
            }
        }
        // floor(16 * 0.75) = 12 kept
        assert_eq!(masked, 4);
    }

    #[test]
    fn test_json_round_trip_defaults() {
        let json = r#"{"patch_size": 9, "embed_dim": 256, "num_heads": 8}"#;
        let config: FaceViTConfig = config::from_json_str(json).unwrap();
        assert_eq!(config.img_size, 112);
        assert_eq!(config.num_patches(), 144);
        assert_eq!(config.masking, MaskingConfig::default());
    }
}
