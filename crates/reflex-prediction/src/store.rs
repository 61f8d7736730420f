//! Pending speculative destructions, keyed by entity or block position.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::events::{BlockPos, EntityId};
use crate::module::PredictionKind;
use crate::telemetry::Telemetry;

/// What a prediction is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredictionKey {
    /// An entity, e.g. an end crystal.
    Entity(EntityId),
    /// A block, e.g. a bed.
    Location(BlockPos),
}

impl From<EntityId> for PredictionKey {
    fn from(id: EntityId) -> Self {
        Self::Entity(id)
    }
}

impl From<BlockPos> for PredictionKey {
    fn from(pos: BlockPos) -> Self {
        Self::Location(pos)
    }
}

impl fmt::Display for PredictionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(id) => write!(f, "entity {id}"),
            Self::Location(pos) => write!(f, "block {pos}"),
        }
    }
}

/// One pending prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictionEntry {
    /// Predicted object.
    pub key: PredictionKey,
    /// Module kind that made the prediction.
    pub kind: PredictionKind,
    /// When it was made.
    pub created_at: Instant,
    /// How long to wait for the server before giving up.
    pub timeout: Duration,
}

impl PredictionEntry {
    /// Whether the entry has outlived its timeout at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.timeout
    }
}

/// The two prediction maps plus their outcome counters.
///
/// Each entry is removed at most once; removing an absent key is a no-op
/// with no counter effect.
#[derive(Debug, Default)]
pub struct PredictionStore {
    entities: HashMap<EntityId, PredictionEntry>,
    locations: HashMap<BlockPos, PredictionEntry>,
    telemetry: Telemetry,
}

impl PredictionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `key` is believed destroyed. A pending entry for the same
    /// key is replaced.
    pub fn predict_destroyed(
        &mut self,
        key: impl Into<PredictionKey>,
        kind: PredictionKind,
        timeout: Duration,
        now: Instant,
    ) {
        let key = key.into();
        let entry = PredictionEntry {
            key,
            kind,
            created_at: now,
            timeout,
        };
        let replaced = match key {
            PredictionKey::Entity(id) => self.entities.insert(id, entry),
            PredictionKey::Location(pos) => self.locations.insert(pos, entry),
        };
        if replaced.is_some() {
            tracing::trace!(%key, %kind, "Replacing pending prediction");
        }
        self.telemetry.record_prediction(kind);
    }

    /// The server agrees `key` is gone. Returns whether an entry was removed.
    pub fn confirm(&mut self, key: impl Into<PredictionKey>) -> bool {
        match self.remove(key.into()) {
            Some(entry) => {
                self.telemetry.record_success(entry.kind);
                true
            }
            None => false,
        }
    }

    /// The server shows `key` still exists. Returns whether an entry was removed.
    pub fn rollback(&mut self, key: impl Into<PredictionKey>) -> bool {
        match self.remove(key.into()) {
            Some(entry) => {
                tracing::debug!(key = %entry.key, kind = %entry.kind, "Prediction rolled back");
                self.telemetry.record_rollback(entry.kind);
                true
            }
            None => false,
        }
    }

    /// Drop every entry older than its timeout. Returns how many expired.
    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        let mut expired = Vec::new();
        self.entities.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                expired.push(entry.kind);
            }
            keep
        });
        self.locations.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                expired.push(entry.kind);
            }
            keep
        });
        for kind in &expired {
            self.telemetry.record_expired(*kind);
        }
        expired.len()
    }

    /// Whether `key` has a pending prediction.
    pub fn is_predicted_destroyed(&self, key: impl Into<PredictionKey>) -> bool {
        self.get(key).is_some()
    }

    /// Pending entry for `key`.
    pub fn get(&self, key: impl Into<PredictionKey>) -> Option<&PredictionEntry> {
        match key.into() {
            PredictionKey::Entity(id) => self.entities.get(&id),
            PredictionKey::Location(pos) => self.locations.get(&pos),
        }
    }

    /// Predicted block positions within `radius` of `origin`, any kind.
    pub fn locations_within(&self, origin: BlockPos, radius: i32) -> Vec<BlockPos> {
        self.locations
            .keys()
            .copied()
            .filter(|pos| origin.within(*pos, radius))
            .collect()
    }

    /// Confirm every location prediction within `radius` of `origin`.
    /// Returns how many were confirmed.
    pub fn confirm_within(&mut self, origin: BlockPos, radius: i32) -> usize {
        let hits = self.locations_within(origin, radius);
        hits.into_iter().filter(|pos| self.confirm(*pos)).count()
    }

    /// Drop every pending entry without touching the counters.
    pub fn clear_all(&mut self) {
        self.entities.clear();
        self.locations.clear();
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.entities.len() + self.locations.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Outcome counters.
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Outcome counters, mutably (for [`Telemetry::reset`]).
    pub fn telemetry_mut(&mut self) -> &mut Telemetry {
        &mut self.telemetry
    }

    fn remove(&mut self, key: PredictionKey) -> Option<PredictionEntry> {
        match key {
            PredictionKey::Entity(id) => self.entities.remove(&id),
            PredictionKey::Location(pos) => self.locations.remove(&pos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(500);

    #[test]
    fn test_confirm_counts_once() {
        let mut store = PredictionStore::new();
        let now = Instant::now();
        store.predict_destroyed(EntityId(1), PredictionKind::Crystal, TIMEOUT, now);

        assert!(store.confirm(EntityId(1)));
        assert!(!store.confirm(EntityId(1)), "second confirm is a no-op");
        assert!(!store.rollback(EntityId(1)));

        let stats = store.telemetry().stats(PredictionKind::Crystal);
        assert_eq!(stats.predictions, 1);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.rollbacks, 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_rollback_counts_once() {
        let mut store = PredictionStore::new();
        let pos = BlockPos::new(1, 2, 3);
        store.predict_destroyed(pos, PredictionKind::Bed, TIMEOUT, Instant::now());

        assert!(store.rollback(pos));
        assert!(!store.rollback(pos));
        let stats = store.telemetry().stats(PredictionKind::Bed);
        assert_eq!(stats.rollbacks, 1);
        assert!(!store.is_predicted_destroyed(pos));
    }

    #[test]
    fn test_entity_and_location_keys_are_separate() {
        let mut store = PredictionStore::new();
        let now = Instant::now();
        store.predict_destroyed(EntityId(5), PredictionKind::Crystal, TIMEOUT, now);
        store.predict_destroyed(BlockPos::new(5, 0, 0), PredictionKind::Anchor, TIMEOUT, now);
        assert_eq!(store.len(), 2);
        assert!(store.confirm(BlockPos::new(5, 0, 0)));
        assert!(store.is_predicted_destroyed(EntityId(5)));
    }

    #[test]
    fn test_overwrite_keeps_one_entry() {
        let mut store = PredictionStore::new();
        let start = Instant::now();
        store.predict_destroyed(EntityId(9), PredictionKind::Crystal, TIMEOUT, start);
        let later = start + Duration::from_millis(300);
        store.predict_destroyed(EntityId(9), PredictionKind::Crystal, TIMEOUT, later);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(EntityId(9)).map(|e| e.created_at), Some(later));

        // The first prediction's deadline passes, the replacement's has not.
        assert_eq!(store.sweep_expired(start + Duration::from_millis(600)), 0);
        assert!(store.confirm(EntityId(9)));

        let stats = store.telemetry().stats(PredictionKind::Crystal);
        assert_eq!(stats.predictions, 2);
        assert_eq!(stats.successes, 1);
    }

    #[test]
    fn test_sweep_expires_after_timeout() {
        let mut store = PredictionStore::new();
        let start = Instant::now();
        store.predict_destroyed(EntityId(1), PredictionKind::TntMinecart, TIMEOUT, start);
        store.predict_destroyed(BlockPos::new(0, 0, 0), PredictionKind::Bed, TIMEOUT, start);

        assert_eq!(store.sweep_expired(start + TIMEOUT), 0, "not past the timeout yet");
        assert_eq!(store.sweep_expired(start + TIMEOUT + Duration::from_millis(1)), 2);

        assert!(!store.is_predicted_destroyed(EntityId(1)));
        assert_eq!(store.telemetry().stats(PredictionKind::TntMinecart).expired, 1);
        assert_eq!(store.telemetry().stats(PredictionKind::Bed).expired, 1);
        assert!(!store.confirm(EntityId(1)), "expired entries cannot be confirmed");
    }

    #[test]
    fn test_confirm_within_ignores_kind() {
        let mut store = PredictionStore::new();
        let now = Instant::now();
        store.predict_destroyed(BlockPos::new(1, 0, 0), PredictionKind::Bed, TIMEOUT, now);
        store.predict_destroyed(BlockPos::new(5, 0, 0), PredictionKind::Bed, TIMEOUT, now);
        store.predict_destroyed(BlockPos::new(0, 1, 0), PredictionKind::Anchor, TIMEOUT, now);
        store.predict_destroyed(EntityId(0), PredictionKind::Crystal, TIMEOUT, now);

        let mut near = store.locations_within(BlockPos::new(0, 0, 0), 2);
        near.sort();
        assert_eq!(near, vec![BlockPos::new(0, 1, 0), BlockPos::new(1, 0, 0)]);

        assert_eq!(store.confirm_within(BlockPos::new(0, 0, 0), 2), 2);
        assert_eq!(store.telemetry().stats(PredictionKind::Bed).successes, 1);
        assert_eq!(store.telemetry().stats(PredictionKind::Anchor).successes, 1);
        assert!(store.is_predicted_destroyed(BlockPos::new(5, 0, 0)));
        assert!(store.is_predicted_destroyed(EntityId(0)));
    }

    #[test]
    fn test_clear_all_keeps_counters() {
        let mut store = PredictionStore::new();
        store.predict_destroyed(EntityId(1), PredictionKind::Crystal, TIMEOUT, Instant::now());
        store.clear_all();
        assert!(store.is_empty());
        assert_eq!(store.telemetry().stats(PredictionKind::Crystal).predictions, 1);
    }
}
