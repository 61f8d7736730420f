//! Inputs to the prediction engine: local player actions and server events.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Server-assigned entity id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Integer block coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    /// East-west.
    pub x: i32,
    /// Vertical.
    pub y: i32,
    /// North-south.
    pub z: i32,
}

impl BlockPos {
    /// Create a position.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// This position shifted by the given deltas.
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.z.saturating_add(dz),
        )
    }

    /// Whether `other` lies in the cube of half-width `radius` around `self`.
    pub fn within(self, other: BlockPos, radius: i32) -> bool {
        let near = |a: i32, b: i32| i64::from(a).abs_diff(i64::from(b)) <= u64::from(radius.unsigned_abs());
        near(self.x, other.x) && near(self.y, other.y) && near(self.z, other.z)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// What an entity is, as far as prediction cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// End crystal.
    EndCrystal,
    /// Minecart carrying TNT.
    TntMinecart,
    /// Anything else.
    Other,
}

/// An entity involved in an action or event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity id.
    pub id: EntityId,
    /// Entity kind.
    pub kind: EntityKind,
}

impl EntityRef {
    /// Create a reference.
    pub fn new(id: u32, kind: EntityKind) -> Self {
        Self {
            id: EntityId(id),
            kind,
        }
    }
}

/// Block type reported by a block update, as far as prediction cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    /// Any bed.
    Bed,
    /// Respawn anchor.
    RespawnAnchor,
    /// Empty space.
    Air,
    /// Anything else.
    Other,
}

// ---------------------------------------------------------------------------
// Local actions
// ---------------------------------------------------------------------------

/// Local player action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Placing an end crystal.
    CrystalPlace,
    /// Attacking an end crystal.
    CrystalBreak,
    /// Using a bed where beds explode.
    BedUse,
    /// Using a charged respawn anchor.
    AnchorUse,
    /// Placing a TNT minecart.
    TntMinecartPlace,
    /// Breaking or igniting a TNT minecart.
    TntMinecartBreak,
    /// Breaking a block.
    BlockBreak,
    /// Placing a block.
    BlockPlace,
}

/// Something the local player just did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAction {
    /// Action type.
    pub kind: ActionKind,
    /// Block the action targeted, if any.
    pub position: Option<BlockPos>,
    /// Entity the action targeted, if any.
    pub target: Option<EntityRef>,
}

impl LocalAction {
    /// An action aimed at an entity.
    pub fn on_entity(kind: ActionKind, target: EntityRef) -> Self {
        Self {
            kind,
            position: None,
            target: Some(target),
        }
    }

    /// An action aimed at a block.
    pub fn at_block(kind: ActionKind, position: BlockPos) -> Self {
        Self {
            kind,
            position: Some(position),
            target: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Server events
// ---------------------------------------------------------------------------

/// Inbound server event relevant to reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// An entity appeared.
    EntitySpawn {
        /// The entity.
        entity: EntityRef,
    },
    /// The server removed an entity.
    EntityDestroyed {
        /// The entity.
        entity: EntityRef,
    },
    /// The server sent a status update for an entity, which proves it still exists.
    EntityStatus {
        /// The entity.
        entity: EntityRef,
    },
    /// Authoritative block state at a position.
    BlockUpdate {
        /// Position.
        pos: BlockPos,
        /// New block.
        block: BlockKind,
    },
    /// An explosion centred on `origin`.
    Explosion {
        /// Centre.
        origin: BlockPos,
    },
    /// Anything else.
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_is_a_cube() {
        let origin = BlockPos::new(0, 64, 0);
        assert!(origin.within(BlockPos::new(2, 66, -2), 2));
        assert!(!origin.within(BlockPos::new(3, 64, 0), 2));
        assert!(!origin.within(BlockPos::new(0, 61, 0), 2));
    }

    #[test]
    fn test_offset_saturates() {
        let p = BlockPos::new(i32::MAX, 0, i32::MIN);
        assert_eq!(p.offset(1, 1, -1), BlockPos::new(i32::MAX, 1, i32::MIN));
    }

    #[test]
    fn test_within_handles_extremes() {
        let a = BlockPos::new(i32::MIN, 0, 0);
        let b = BlockPos::new(i32::MAX, 0, 0);
        assert!(!a.within(b, 2));
    }
}
