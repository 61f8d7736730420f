//! The plug-in contract shared by every prediction module.

use std::fmt;
use std::time::Instant;

use reflex_config::PredictionConfig;
use serde::{Deserialize, Serialize};

use crate::events::{LocalAction, ServerEvent};
use crate::store::PredictionStore;

/// Which kind of object a prediction is about. Also the telemetry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PredictionKind {
    /// End crystals.
    Crystal,
    /// Beds detonated outside the overworld.
    Bed,
    /// Respawn anchors.
    Anchor,
    /// TNT minecarts.
    TntMinecart,
}

impl PredictionKind {
    /// Every kind, in registration order.
    pub const ALL: [PredictionKind; 4] = [
        PredictionKind::Crystal,
        PredictionKind::Bed,
        PredictionKind::Anchor,
        PredictionKind::TntMinecart,
    ];

    /// Stable tag used in config and logs.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Crystal => "crystal",
            Self::Bed => "bed",
            Self::Anchor => "anchor",
            Self::TntMinecart => "tnt_minecart",
        }
    }
}

impl fmt::Display for PredictionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A module predicts one kind of destruction and reconciles it.
///
/// Modules hold no prediction state of their own; everything pending lives in
/// the [`PredictionStore`] handed to each call.
pub trait PredictionModule: Send {
    /// Human-readable module name.
    fn name(&self) -> &'static str;

    /// The kind this module predicts.
    fn kind(&self) -> PredictionKind;

    /// Whether the module currently reacts to input.
    fn is_enabled(&self) -> bool;

    /// Record a prediction if `action` is this module's trigger.
    fn on_local_action(&mut self, action: &LocalAction, store: &mut PredictionStore, now: Instant);

    /// Confirm or roll back predictions in response to `event`.
    fn on_server_event(&mut self, event: &ServerEvent, store: &mut PredictionStore);

    /// Pick up the current timeout and enabled flag from live config.
    fn tick(&mut self, config: &PredictionConfig);
}
