//! Optimistic prediction: objects the player destroys locally are treated as
//! gone immediately, then reconciled against the server's events.
//!
//! Every speculative entry ends exactly once, by confirmation, rollback, or
//! timeout, and each outcome is counted per kind in [`Telemetry`].

pub mod engine;
pub mod events;
pub mod module;
pub mod modules;
pub mod store;
pub mod telemetry;

pub use engine::{EXPLOSION_RADIUS, PredictionEngine};
pub use events::{
    ActionKind, BlockKind, BlockPos, EntityId, EntityKind, EntityRef, LocalAction, ServerEvent,
};
pub use module::{PredictionKind, PredictionModule};
pub use modules::{BlockPredictionModule, EntityPredictionModule};
pub use store::{PredictionEntry, PredictionKey, PredictionStore};
pub use telemetry::{KindStats, Telemetry, TelemetrySnapshot};
