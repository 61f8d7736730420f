//! Location-keyed predictions: beds and respawn anchors that explode on use.

use std::time::{Duration, Instant};

use reflex_config::PredictionConfig;

use crate::events::{ActionKind, BlockKind, LocalAction, ServerEvent};
use crate::module::{PredictionKind, PredictionModule};
use crate::store::PredictionStore;

/// Predicts that a used explosive block is destroyed.
#[derive(Debug, Clone)]
pub struct BlockPredictionModule {
    name: &'static str,
    kind: PredictionKind,
    trigger: ActionKind,
    block: BlockKind,
    enabled: bool,
    timeout: Duration,
}

impl BlockPredictionModule {
    /// Using a bed.
    pub fn bed(config: &PredictionConfig) -> Self {
        Self::build(
            "BedPrediction",
            PredictionKind::Bed,
            ActionKind::BedUse,
            BlockKind::Bed,
            config,
        )
    }

    /// Using a respawn anchor.
    pub fn anchor(config: &PredictionConfig) -> Self {
        Self::build(
            "AnchorPrediction",
            PredictionKind::Anchor,
            ActionKind::AnchorUse,
            BlockKind::RespawnAnchor,
            config,
        )
    }

    fn build(
        name: &'static str,
        kind: PredictionKind,
        trigger: ActionKind,
        block: BlockKind,
        config: &PredictionConfig,
    ) -> Self {
        let mut module = Self {
            name,
            kind,
            trigger,
            block,
            enabled: true,
            timeout: Duration::from_millis(400),
        };
        module.tick(config);
        module
    }

    /// Current prediction timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl PredictionModule for BlockPredictionModule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> PredictionKind {
        self.kind
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn on_local_action(&mut self, action: &LocalAction, store: &mut PredictionStore, now: Instant) {
        if !self.enabled || action.kind != self.trigger {
            return;
        }
        if let Some(pos) = action.position {
            store.predict_destroyed(pos, self.kind, self.timeout, now);
            tracing::debug!(%pos, kind = %self.kind, "Predicted destroyed");
        }
    }

    fn on_server_event(&mut self, event: &ServerEvent, store: &mut PredictionStore) {
        if !self.enabled {
            return;
        }
        // Explosions are confirmed engine-wide, see `PredictionEngine::on_server_event`.
        let ServerEvent::BlockUpdate { pos, block } = *event else {
            return;
        };
        if store.get(pos).map(|e| e.kind) != Some(self.kind) {
            return;
        }
        // Still the same block: the use did not destroy it.
        if block == self.block {
            store.rollback(pos);
        } else {
            store.confirm(pos);
        }
    }

    fn tick(&mut self, config: &PredictionConfig) {
        if let Some(kind) = config.kind(self.kind.tag()) {
            self.enabled = kind.enabled;
            if kind.timeout_ms > 0 {
                self.timeout = Duration::from_millis(kind.timeout_ms);
            }
        }
    }
}
