//! Spillover placement: finds the empty slot a new member is inserted into.
//!
//! Policy: if the sponsor's slot on the requested side is empty, the member goes
//! there. Otherwise the search runs breadth-first through the subtree under the
//! sponsor's requested-side child. Levels are visited shallowest first; within
//! a level nodes are visited in the order their parents were, left child
//! before right child; at each node the left slot is tried before the right
//! slot. The first empty slot wins.

use crate::domain::{LegSide, MemberId, NodeSlots, Placement};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Read access to the tree shape needed by the search.
#[async_trait]
pub trait SlotLookup: Send + Sync {
    /// Depth of `id` (root is 0), or None if the member does not exist.
    async fn depth_of(&self, id: MemberId) -> Result<Option<i64>, sqlx::Error>;

    /// Child slots for each of `ids`. Every requested id is present in the result.
    async fn node_slots(
        &self,
        ids: &[MemberId],
    ) -> Result<HashMap<MemberId, NodeSlots>, sqlx::Error>;
}

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("sponsor {0} not found")]
    SponsorNotFound(MemberId),
    #[error("no empty slot within {max_depth} levels below sponsor {sponsor}")]
    TreeFull { sponsor: MemberId, max_depth: u32 },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlacementResolver {
    /// Deepest level below the sponsor a member may be placed at (direct slot = 1).
    max_depth: Option<u32>,
}

impl PlacementResolver {
    pub fn new(max_depth: Option<u32>) -> Self {
        Self { max_depth }
    }

    /// Resolve the slot a member sponsored by `sponsor` on `side` is inserted into.
    ///
    /// Pure lookup; the caller inserts and re-resolves if the slot is taken
    /// concurrently.
    pub async fn resolve<L: SlotLookup + ?Sized>(
        &self,
        lookup: &L,
        sponsor: MemberId,
        side: LegSide,
    ) -> Result<Placement, PlacementError> {
        let sponsor_depth = lookup
            .depth_of(sponsor)
            .await?
            .ok_or(PlacementError::SponsorNotFound(sponsor))?;

        let sponsor_slots = lookup
            .node_slots(&[sponsor])
            .await?
            .get(&sponsor)
            .copied()
            .unwrap_or_default();

        let mut frontier = match sponsor_slots.get(side) {
            None => {
                return Ok(Placement {
                    parent: sponsor,
                    side,
                    depth: sponsor_depth + 1,
                })
            }
            Some(child) => vec![child],
        };

        // Levels below the sponsor at which `frontier` sits.
        let mut level: u32 = 1;
        loop {
            if let Some(max_depth) = self.max_depth {
                if level >= max_depth {
                    return Err(PlacementError::TreeFull { sponsor, max_depth });
                }
            }

            let slots = lookup.node_slots(&frontier).await?;
            let mut next = Vec::with_capacity(frontier.len() * 2);

            for node in &frontier {
                let node_slots = slots.get(node).copied().unwrap_or_default();
                for slot in LegSide::both() {
                    match node_slots.get(slot) {
                        None => {
                            debug!(
                                sponsor = %sponsor,
                                requested = %side,
                                parent = %node,
                                slot = %slot,
                                level = level + 1,
                                "Spillover placement resolved"
                            );
                            return Ok(Placement {
                                parent: *node,
                                side: slot,
                                depth: sponsor_depth + i64::from(level) + 1,
                            });
                        }
                        Some(child) => next.push(child),
                    }
                }
            }

            frontier = next;
            level += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-memory tree keyed by member id.
    #[derive(Default)]
    struct MemoryTree {
        nodes: Mutex<HashMap<MemberId, (i64, NodeSlots)>>,
        lookups: Mutex<usize>,
    }

    impl MemoryTree {
        fn with_root(root: i64) -> Self {
            let tree = MemoryTree::default();
            tree.nodes
                .lock()
                .unwrap()
                .insert(MemberId::new(root), (0, NodeSlots::default()));
            tree
        }

        fn insert(&self, placement: Placement, id: i64) {
            let mut nodes = self.nodes.lock().unwrap();
            let child = MemberId::new(id);
            nodes
                .get_mut(&placement.parent)
                .expect("parent exists")
                .1
                .set(placement.side, child);
            nodes.insert(child, (placement.depth, NodeSlots::default()));
        }
    }

    #[async_trait]
    impl SlotLookup for MemoryTree {
        async fn depth_of(&self, id: MemberId) -> Result<Option<i64>, sqlx::Error> {
            Ok(self.nodes.lock().unwrap().get(&id).map(|(d, _)| *d))
        }

        async fn node_slots(
            &self,
            ids: &[MemberId],
        ) -> Result<HashMap<MemberId, NodeSlots>, sqlx::Error> {
            *self.lookups.lock().unwrap() += 1;
            let nodes = self.nodes.lock().unwrap();
            Ok(ids
                .iter()
                .map(|id| (*id, nodes.get(id).map(|(_, s)| *s).unwrap_or_default()))
                .collect())
        }
    }

    fn id(n: i64) -> MemberId {
        MemberId::new(n)
    }

    async fn place(
        tree: &MemoryTree,
        resolver: &PlacementResolver,
        sponsor: i64,
        side: LegSide,
        new_id: i64,
    ) -> Placement {
        let placement = resolver.resolve(tree, id(sponsor), side).await.unwrap();
        tree.insert(placement, new_id);
        placement
    }

    #[tokio::test]
    async fn test_direct_slot_when_empty() {
        let tree = MemoryTree::with_root(1);
        let resolver = PlacementResolver::default();

        let p = resolver.resolve(&tree, id(1), LegSide::Right).await.unwrap();
        assert_eq!(
            p,
            Placement {
                parent: id(1),
                side: LegSide::Right,
                depth: 1
            }
        );
    }

    #[tokio::test]
    async fn test_spillover_is_breadth_first_left_to_right() {
        let tree = MemoryTree::with_root(1);
        let resolver = PlacementResolver::default();

        // Every member below is sponsored by the root on the left.
        let p2 = place(&tree, &resolver, 1, LegSide::Left, 2).await;
        assert_eq!((p2.parent, p2.side), (id(1), LegSide::Left));
        let p3 = place(&tree, &resolver, 1, LegSide::Left, 3).await;
        assert_eq!((p3.parent, p3.side, p3.depth), (id(2), LegSide::Left, 2));
        let p4 = place(&tree, &resolver, 1, LegSide::Left, 4).await;
        assert_eq!((p4.parent, p4.side), (id(2), LegSide::Right));
        // Level 2 is full: next level, starting under 3 (left child of 2).
        let p5 = place(&tree, &resolver, 1, LegSide::Left, 5).await;
        assert_eq!((p5.parent, p5.side, p5.depth), (id(3), LegSide::Left, 3));
        let p6 = place(&tree, &resolver, 1, LegSide::Left, 6).await;
        assert_eq!((p6.parent, p6.side), (id(3), LegSide::Right));
        let p7 = place(&tree, &resolver, 1, LegSide::Left, 7).await;
        assert_eq!((p7.parent, p7.side), (id(4), LegSide::Left));
    }

    #[tokio::test]
    async fn test_spillover_stays_in_requested_leg() {
        let tree = MemoryTree::with_root(1);
        let resolver = PlacementResolver::default();

        place(&tree, &resolver, 1, LegSide::Right, 2).await;
        // Left slot of the root is empty, but a RIGHT request must spill under 2.
        let p = place(&tree, &resolver, 1, LegSide::Right, 3).await;
        assert_eq!((p.parent, p.side), (id(2), LegSide::Left));
    }

    #[tokio::test]
    async fn test_shallower_gap_wins_over_left_bias() {
        let tree = MemoryTree::with_root(1);
        let resolver = PlacementResolver::default();

        place(&tree, &resolver, 1, LegSide::Left, 2).await;
        place(&tree, &resolver, 2, LegSide::Left, 3).await;
        place(&tree, &resolver, 3, LegSide::Left, 4).await;
        // 2's right slot (level 2) is shallower than anything under 3.
        let p = place(&tree, &resolver, 1, LegSide::Left, 5).await;
        assert_eq!((p.parent, p.side), (id(2), LegSide::Right));
    }

    #[tokio::test]
    async fn test_unknown_sponsor() {
        let tree = MemoryTree::with_root(1);
        let err = PlacementResolver::default()
            .resolve(&tree, id(99), LegSide::Left)
            .await
            .unwrap_err();
        assert!(matches!(err, PlacementError::SponsorNotFound(s) if s == id(99)));
    }

    #[tokio::test]
    async fn test_bounded_depth_reports_tree_full() {
        let tree = MemoryTree::with_root(1);
        let resolver = PlacementResolver::new(Some(1));

        place(&tree, &resolver, 1, LegSide::Left, 2).await;
        let err = resolver.resolve(&tree, id(1), LegSide::Left).await.unwrap_err();
        assert!(matches!(err, PlacementError::TreeFull { max_depth: 1, .. }));

        // The other leg still has room at level 1.
        assert!(resolver.resolve(&tree, id(1), LegSide::Right).await.is_ok());
    }

    #[tokio::test]
    async fn test_one_slot_query_per_level() {
        let tree = MemoryTree::with_root(1);
        let resolver = PlacementResolver::default();
        for n in 2..=8 {
            place(&tree, &resolver, 1, LegSide::Left, n).await;
        }

        *tree.lookups.lock().unwrap() = 0;
        // Nodes on levels 1 and 2 are full; the first gap is under level 3.
        let p = resolver.resolve(&tree, id(1), LegSide::Left).await.unwrap();
        assert_eq!(p.depth, 4);
        assert_eq!(*tree.lookups.lock().unwrap(), 1 + 3);
    }
}
