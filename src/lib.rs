//! Training and checkpointing for a small feed-forward image classifier,
//! built on [burn](https://burn.dev).
//!
//! Tensor algebra, autodiff, the optimizer, and dataset download all belong
//! to burn; this crate adds the model definition, the training loop, and a
//! checkpoint record that refuses to load into a model of the wrong shape.

pub mod checkpoint;
pub mod data;
pub mod model;
pub mod training;

pub mod prelude {
    pub use crate::checkpoint::{Checkpoint, CheckpointError};
    pub use crate::data::{FlatImageBatch, FlatImageBatcher, FlatImageItem};
    pub use crate::model::{Mlp, MlpConfig};
    pub use crate::training::{TrainingConfig, TrainingSummary, train};
}
