//! Entity-keyed predictions: end crystals and TNT minecarts.

use std::time::{Duration, Instant};

use reflex_config::PredictionConfig;

use crate::events::{ActionKind, EntityKind, LocalAction, ServerEvent};
use crate::module::{PredictionKind, PredictionModule};
use crate::store::PredictionStore;

/// Predicts that an attacked entity is destroyed.
#[derive(Debug, Clone)]
pub struct EntityPredictionModule {
    name: &'static str,
    kind: PredictionKind,
    trigger: ActionKind,
    target: EntityKind,
    rollback_on_status: bool,
    enabled: bool,
    timeout: Duration,
}

impl EntityPredictionModule {
    /// Breaking an end crystal. A status update for the crystal rolls back.
    pub fn crystal(config: &PredictionConfig) -> Self {
        Self::build(
            "CrystalPrediction",
            PredictionKind::Crystal,
            ActionKind::CrystalBreak,
            EntityKind::EndCrystal,
            true,
            config,
        )
    }

    /// Breaking a TNT minecart. Only removal is reconciled.
    pub fn tnt_minecart(config: &PredictionConfig) -> Self {
        Self::build(
            "TntMinecartPrediction",
            PredictionKind::TntMinecart,
            ActionKind::TntMinecartBreak,
            EntityKind::TntMinecart,
            false,
            config,
        )
    }

    fn build(
        name: &'static str,
        kind: PredictionKind,
        trigger: ActionKind,
        target: EntityKind,
        rollback_on_status: bool,
        config: &PredictionConfig,
    ) -> Self {
        let mut module = Self {
            name,
            kind,
            trigger,
            target,
            rollback_on_status,
            enabled: true,
            timeout: Duration::from_millis(500),
        };
        module.tick(config);
        module
    }

    /// Current prediction timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl PredictionModule for EntityPredictionModule {
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
        let Some(target) = action.target.filter(|t| t.kind == self.target) else {
            return;
        };
        store.predict_destroyed(target.id, self.kind, self.timeout, now);
        tracing::debug!(entity = %target.id, kind = %self.kind, "Predicted destroyed");
    }

    fn on_server_event(&mut self, event: &ServerEvent, store: &mut PredictionStore) {
        if !self.enabled {
            return;
        }
        let (entity, confirms) = match *event {
            ServerEvent::EntityDestroyed { entity } => (entity, true),
            ServerEvent::EntityStatus { entity } if self.rollback_on_status => (entity, false),
            _ => return,
        };
        if entity.kind != self.target
            || store.get(entity.id).map(|e| e.kind) != Some(self.kind)
        {
            return;
        }

        if confirms {
            store.confirm(entity.id);
            tracing::debug!(entity = %entity.id, kind = %self.kind, "Prediction confirmed");
        } else {
            store.rollback(entity.id);
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
