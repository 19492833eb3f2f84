//! Neural network building blocks around the masking codec.
//!
//! Attention, MLP and convolution layers are not part of this crate: encoder
//! blocks are supplied by the caller through [`SequenceBlock`].

pub mod block;
pub mod drop_path;
pub mod init;

pub use block::{IdentityBlock, SequenceBlock};
pub use drop_path::{DropPath, linear_schedule, validate_drop_prob};
pub use init::Initializer;
