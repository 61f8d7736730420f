//! Mapping from outbound message categories to priority tiers.

use reflex_config::{PriorityConfig, PriorityTier};

use crate::dispatch::PriorityClassifier;

/// Coarse category of an outbound game message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCategory {
    /// Position, rotation and on-ground updates.
    Movement,
    /// Attacks and arm swings.
    Attack,
    /// Block placement.
    BlockPlace,
    /// Using items or interacting with entities.
    Interact,
    /// Inventory clicks and slot changes.
    Inventory,
    /// Chat and commands.
    Chat,
    /// Keep-alive replies.
    KeepAlive,
    /// Anything not listed above.
    Other,
}

/// Messages that know their own category.
pub trait Categorized {
    /// Category used for tier lookup.
    fn category(&self) -> MessageCategory;
}

/// An opaque encoded message tagged with its category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Category used for tier lookup.
    pub category: MessageCategory,
    /// Encoded packet bytes.
    pub payload: Vec<u8>,
}

impl OutboundMessage {
    /// Create a message.
    pub fn new(category: MessageCategory, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            category,
            payload: payload.into(),
        }
    }
}

impl Categorized for OutboundMessage {
    fn category(&self) -> MessageCategory {
        self.category
    }
}

/// Category-to-tier table, built from [`PriorityConfig`].
///
/// Categories without a config entry ([`MessageCategory::Other`]) are Medium.
/// With prioritization switched off every message is Medium, so the queue
/// degenerates to a single FIFO.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorityPolicy {
    config: PriorityConfig,
}

impl Default for PriorityPolicy {
    fn default() -> Self {
        Self::new(PriorityConfig::default())
    }
}

impl PriorityPolicy {
    /// Build a policy from config.
    pub fn new(config: PriorityConfig) -> Self {
        Self { config }
    }

    /// Replace the table, e.g. after a config reload.
    pub fn update(&mut self, config: &PriorityConfig) {
        self.config = config.clone();
    }

    /// Tier for a category.
    pub fn tier_for(&self, category: MessageCategory) -> PriorityTier {
        let c = &self.config;
        if !c.enabled {
            return PriorityTier::Medium;
        }
        match category {
            MessageCategory::Movement => c.movement,
            MessageCategory::Attack => c.attack,
            MessageCategory::BlockPlace => c.block_place,
            MessageCategory::Interact => c.interact,
            MessageCategory::Inventory => c.inventory,
            MessageCategory::Chat => c.chat,
            MessageCategory::KeepAlive => c.keep_alive,
            MessageCategory::Other => PriorityTier::Medium,
        }
    }
}

impl<M: Categorized> PriorityClassifier<M> for PriorityPolicy {
    fn tier(&self, message: &M) -> PriorityTier {
        self.tier_for(message.category())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tiers() {
        let policy = PriorityPolicy::default();
        assert_eq!(policy.tier_for(MessageCategory::Movement), PriorityTier::High);
        assert_eq!(policy.tier_for(MessageCategory::Attack), PriorityTier::High);
        assert_eq!(policy.tier_for(MessageCategory::BlockPlace), PriorityTier::High);
        assert_eq!(policy.tier_for(MessageCategory::Interact), PriorityTier::Medium);
        assert_eq!(policy.tier_for(MessageCategory::KeepAlive), PriorityTier::Medium);
        assert_eq!(policy.tier_for(MessageCategory::Inventory), PriorityTier::Low);
        assert_eq!(policy.tier_for(MessageCategory::Chat), PriorityTier::Low);
        assert_eq!(policy.tier_for(MessageCategory::Other), PriorityTier::Medium);
    }

    #[test]
    fn test_update_changes_mapping() {
        let mut policy = PriorityPolicy::default();
        let config = PriorityConfig {
            chat: PriorityTier::High,
            ..Default::default()
        };
        policy.update(&config);
        assert_eq!(policy.tier_for(MessageCategory::Chat), PriorityTier::High);
    }

    #[test]
    fn test_disabled_policy_is_single_tier() {
        let policy = PriorityPolicy::new(PriorityConfig {
            enabled: false,
            ..Default::default()
        });
        assert_eq!(policy.tier_for(MessageCategory::Movement), PriorityTier::Medium);
        assert_eq!(policy.tier_for(MessageCategory::Chat), PriorityTier::Medium);
    }

    #[test]
    fn test_classifies_categorized_messages() {
        let policy = PriorityPolicy::default();
        let msg = OutboundMessage::new(MessageCategory::Inventory, vec![1, 2]);
        assert_eq!(policy.tier(&msg), PriorityTier::Low);
    }
}
