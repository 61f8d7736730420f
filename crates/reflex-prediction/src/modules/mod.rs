//! The built-in prediction modules.

mod block;
mod entity;

pub use block::BlockPredictionModule;
pub use entity::EntityPredictionModule;
