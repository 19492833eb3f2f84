//! Model-level pipelines built on the masking codec.
//!
//! # Available Models
//!
//! - **Face ViT**: the masked feature extractor of the face-recognition ViT
//!   recipes. See [`face_vit`].

use crate::config::ConfigError;
use crate::masking::MaskingError;
use crate::tensor::TensorError;
use thiserror::Error;

pub mod face_vit;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Masking(#[from] MaskingError),
    #[error(transparent)]
    Tensor(#[from] TensorError),
    #[error("expected {expected} encoder blocks, got {got}")]
    BlockCount { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, ModelError>;
