//! The prediction engine: module registry plus the shared store.

use std::time::{Duration, Instant};

use reflex_config::{PredictionConfig, PredictionMode};

use crate::events::{LocalAction, ServerEvent};
use crate::module::{PredictionKind, PredictionModule};
use crate::modules::{BlockPredictionModule, EntityPredictionModule};
use crate::store::{PredictionKey, PredictionStore};
use crate::telemetry::{Telemetry, TelemetrySnapshot};

/// Half-width of the cube around an explosion in which location
/// predictions are confirmed.
pub const EXPLOSION_RADIUS: i32 = 2;

/// Routes actions and events to modules and owns all pending predictions.
pub struct PredictionEngine {
    mode: PredictionMode,
    modules: Vec<Box<dyn PredictionModule>>,
    store: PredictionStore,
}

impl PredictionEngine {
    /// An engine with no modules.
    pub fn new(config: &PredictionConfig) -> Self {
        Self {
            mode: config.mode,
            modules: Vec::new(),
            store: PredictionStore::new(),
        }
    }

    /// An engine with the crystal, bed, anchor and TNT minecart modules.
    pub fn with_default_modules(config: &PredictionConfig) -> Self {
        let mut engine = Self::new(config);
        engine.register(Box::new(EntityPredictionModule::crystal(config)));
        engine.register(Box::new(BlockPredictionModule::bed(config)));
        engine.register(Box::new(BlockPredictionModule::anchor(config)));
        engine.register(Box::new(EntityPredictionModule::tnt_minecart(config)));
        engine
    }

    /// Add a module. A second module with the same name is ignored.
    pub fn register(&mut self, module: Box<dyn PredictionModule>) {
        if self.modules.iter().any(|m| m.name() == module.name()) {
            tracing::warn!(module = module.name(), "Prediction module already registered");
            return;
        }
        tracing::info!(module = module.name(), kind = %module.kind(), "Registered prediction module");
        self.modules.push(module);
    }

    /// Feed a local player action. Ignored when prediction is off.
    pub fn on_local_action(&mut self, action: &LocalAction, now: Instant) {
        if self.mode == PredictionMode::Off {
            return;
        }
        for module in self.modules.iter_mut().filter(|m| m.is_enabled()) {
            module.on_local_action(action, &mut self.store, now);
        }
    }

    /// Feed a server event for reconciliation.
    ///
    /// An explosion confirms every pending location prediction in the cube
    /// around its origin, whatever module made it and whether or not that
    /// module is still enabled.
    pub fn on_server_event(&mut self, event: &ServerEvent) {
        if let ServerEvent::Explosion { origin } = *event {
            let confirmed = self.store.confirm_within(origin, EXPLOSION_RADIUS);
            if confirmed > 0 {
                tracing::debug!(%origin, confirmed, "Explosion confirmed predictions");
            }
        }
        for module in self.modules.iter_mut().filter(|m| m.is_enabled()) {
            module.on_server_event(event, &mut self.store);
        }
    }

    /// Per-tick housekeeping: expire stale predictions, then let modules
    /// pick up config changes. Returns the number expired.
    pub fn tick(&mut self, now: Instant, config: &PredictionConfig) -> usize {
        self.mode = config.mode;
        let expired = self.store.sweep_expired(now);
        if expired > 0 {
            tracing::debug!(expired, "Predictions expired without server answer");
        }
        for module in &mut self.modules {
            module.tick(config);
        }
        expired
    }

    /// Record a prediction directly.
    pub fn predict_destroyed(
        &mut self,
        key: impl Into<PredictionKey>,
        kind: PredictionKind,
        timeout: Duration,
        now: Instant,
    ) {
        self.store.predict_destroyed(key, kind, timeout, now);
    }

    /// Confirm a prediction. No-op if absent.
    pub fn confirm(&mut self, key: impl Into<PredictionKey>) -> bool {
        self.store.confirm(key)
    }

    /// Roll back a prediction. No-op if absent.
    pub fn rollback(&mut self, key: impl Into<PredictionKey>) -> bool {
        self.store.rollback(key)
    }

    /// Expire stale predictions without ticking modules.
    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        self.store.sweep_expired(now)
    }

    /// Whether `key` is believed destroyed.
    pub fn is_predicted_destroyed(&self, key: impl Into<PredictionKey>) -> bool {
        self.store.is_predicted_destroyed(key)
    }

    /// Whether host interaction with `key` should be suppressed. Only the
    /// aggressive mode hides predicted objects from targeting.
    pub fn should_suppress_interaction(&self, key: impl Into<PredictionKey>) -> bool {
        self.mode == PredictionMode::Aggressive && self.store.is_predicted_destroyed(key)
    }

    /// Drop every pending prediction, keeping the counters. Used on disconnect.
    pub fn clear_all(&mut self) {
        self.store.clear_all();
    }

    /// Current mode.
    pub fn mode(&self) -> PredictionMode {
        self.mode
    }

    /// Number of pending predictions.
    pub fn pending_count(&self) -> usize {
        self.store.len()
    }

    /// Registered module names, in registration order.
    pub fn module_names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Outcome counters.
    pub fn telemetry(&self) -> &Telemetry {
        self.store.telemetry()
    }

    /// Copy of all outcome counters.
    pub fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        self.store.telemetry().snapshot()
    }

    /// Operator reset of the counters.
    pub fn reset_telemetry(&mut self) {
        self.store.telemetry_mut().reset();
    }
}
