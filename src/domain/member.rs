//! Members and their place in the binary tree.

use crate::domain::{LegSide, MemberId, Role, TimeMs};
use serde::{Deserialize, Serialize};

/// A registered member. Every member except the root is a tree node under a parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub referral_code: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    /// Member who referred this one. None only for the root.
    pub sponsor_id: Option<MemberId>,
    /// Placement owner; differs from the sponsor after spillover.
    pub parent_id: Option<MemberId>,
    /// Slot occupied under `parent_id`.
    pub side: Option<LegSide>,
    pub depth: i64,
    pub plan_id: Option<i64>,
    pub activated_at: Option<TimeMs>,
    pub joined_at: TimeMs,
}

impl Member {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_active(&self) -> bool {
        self.plan_id.is_some()
    }
}

/// Child slots of one node, as seen by the placement search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeSlots {
    pub left: Option<MemberId>,
    pub right: Option<MemberId>,
}

impl NodeSlots {
    pub fn get(&self, side: LegSide) -> Option<MemberId> {
        match side {
            LegSide::Left => self.left,
            LegSide::Right => self.right,
        }
    }

    pub fn set(&mut self, side: LegSide, child: MemberId) {
        match side {
            LegSide::Left => self.left = Some(child),
            LegSide::Right => self.right = Some(child),
        }
    }
}

/// A resolved empty slot: `parent`'s `side` child position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub parent: MemberId,
    pub side: LegSide,
    /// Depth the new member will have (root is 0).
    pub depth: i64,
}

/// Everything needed to create the member row at a resolved placement.
#[derive(Debug, Clone)]
pub struct NewMember {
    pub referral_code: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub password_salt: String,
    pub role: Role,
    pub sponsor_id: Option<MemberId>,
    pub placement: Option<Placement>,
    pub joined_at: TimeMs,
}

/// One step of the upward walk: `ancestor` reached the activating member through its `side` child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AncestorStep {
    pub ancestor: MemberId,
    pub side: LegSide,
}

/// Compact node view used by the team tree endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamNode {
    pub id: MemberId,
    pub referral_code: String,
    pub name: String,
    pub parent_id: Option<MemberId>,
    pub side: Option<LegSide>,
    pub plan_id: Option<i64>,
    pub joined_at: TimeMs,
    pub child_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_slots_set_and_get() {
        let mut slots = NodeSlots::default();
        assert_eq!(slots.get(LegSide::Left), None);
        slots.set(LegSide::Right, MemberId::new(7));
        assert_eq!(slots.get(LegSide::Right), Some(MemberId::new(7)));
        assert_eq!(slots.get(LegSide::Left), None);
    }
}
