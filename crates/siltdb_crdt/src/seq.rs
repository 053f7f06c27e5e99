//! Ordered sequence with positional tombstones.

use crate::id::ItemId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One item of a sequence, as carried in updates.
///
/// A `None` payload is a positional tombstone: the identity survives so
/// that delete-vs-insert races resolve the same way on every replica,
/// but the stored bytes are reclaimed immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Position identity.
    pub id: ItemId,
    /// Stored bytes, or `None` once deleted.
    pub payload: Option<Vec<u8>>,
}

impl Item {
    /// Returns true if this item is a tombstone.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.payload.is_none()
    }
}

/// An ordered sequence of items.
///
/// Items are kept in structural order (the total order of [`ItemId`]).
/// Deleting an item replaces its payload with a tombstone; the item's
/// identity is never removed, so merging the same set of operations in
/// any order produces the same sequence on every replica.
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    items: BTreeMap<ItemId, Option<Vec<u8>>>,
}

impl Sequence {
    /// Creates an empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an item with a known identity.
    pub(crate) fn insert(&mut self, id: ItemId, payload: Vec<u8>) {
        self.items.insert(id, Some(payload));
    }

    /// Returns the live payload at `id`, if any.
    #[must_use]
    pub fn get(&self, id: ItemId) -> Option<&[u8]> {
        self.items.get(&id).and_then(|p| p.as_deref())
    }

    /// Returns true if `id` refers to a live item.
    #[must_use]
    pub fn contains(&self, id: ItemId) -> bool {
        self.get(id).is_some()
    }

    /// Turns the item at `id` into a tombstone.
    ///
    /// Returns whether the item was live. Deleting a tombstone or an
    /// unknown identity is a no-op; unknown deletes are recorded so a
    /// delete that races ahead of its insert still wins after merge.
    pub(crate) fn delete(&mut self, id: ItemId) -> bool {
        match self.items.get_mut(&id) {
            Some(slot @ Some(_)) => {
                *slot = None;
                true
            }
            Some(None) => false,
            None => {
                self.items.insert(id, None);
                false
            }
        }
    }

    /// Iterates live items in structural order.
    pub fn iter_live(&self) -> impl Iterator<Item = (ItemId, &[u8])> {
        self.items
            .iter()
            .filter_map(|(id, p)| p.as_deref().map(|bytes| (*id, bytes)))
    }

    /// Number of live items.
    #[must_use]
    pub fn len_live(&self) -> usize {
        self.items.values().filter(|p| p.is_some()).count()
    }

    /// Number of tombstone shells retained for merge correctness.
    #[must_use]
    pub fn tombstone_count(&self) -> usize {
        self.items.values().filter(|p| p.is_none()).count()
    }

    /// Total number of item identities, live and tombstoned.
    #[must_use]
    pub fn len_total(&self) -> usize {
        self.items.len()
    }

    /// Exports all items, including tombstones, for update encoding.
    pub(crate) fn export(&self) -> Vec<Item> {
        self.items
            .iter()
            .map(|(id, p)| Item {
                id: *id,
                payload: p.clone(),
            })
            .collect()
    }

    /// Merges remote items into this sequence.
    ///
    /// Tombstones win over live items with the same identity; two live
    /// items with the same identity are the same append and carry the
    /// same payload. Returns whether anything changed.
    pub(crate) fn merge(&mut self, incoming: Vec<Item>) -> bool {
        let mut changed = false;
        for item in incoming {
            match self.items.get_mut(&item.id) {
                None => {
                    self.items.insert(item.id, item.payload);
                    changed = true;
                }
                Some(slot @ Some(_)) if item.payload.is_none() => {
                    *slot = None;
                    changed = true;
                }
                Some(_) => {}
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ReplicaId;

    fn id(stamp: u64) -> ItemId {
        ItemId::new(stamp, ReplicaId::from_bytes([1u8; 16]))
    }

    #[test]
    fn insert_and_get() {
        let mut seq = Sequence::new();
        seq.insert(id(1), vec![1, 2, 3]);

        assert_eq!(seq.get(id(1)), Some([1, 2, 3].as_slice()));
        assert_eq!(seq.len_live(), 1);
    }

    #[test]
    fn delete_leaves_tombstone() {
        let mut seq = Sequence::new();
        seq.insert(id(1), vec![9]);

        assert!(seq.delete(id(1)));
        assert_eq!(seq.get(id(1)), None);
        assert_eq!(seq.len_live(), 0);
        assert_eq!(seq.tombstone_count(), 1);
        assert_eq!(seq.len_total(), 1);
    }

    #[test]
    fn delete_of_unknown_id_is_recorded() {
        let mut seq = Sequence::new();

        assert!(!seq.delete(id(5)));
        // A later merge of the insert must not resurrect the item.
        let changed = seq.merge(vec![Item {
            id: id(5),
            payload: Some(vec![1]),
        }]);
        assert!(!changed);
        assert_eq!(seq.get(id(5)), None);
    }

    #[test]
    fn iter_live_in_structural_order() {
        let a = ReplicaId::from_bytes([1u8; 16]);
        let b = ReplicaId::from_bytes([2u8; 16]);

        let mut seq = Sequence::new();
        seq.insert(ItemId::new(2, b), vec![2]);
        seq.insert(ItemId::new(1, a), vec![1]);
        seq.insert(ItemId::new(2, a), vec![3]);

        let order: Vec<Vec<u8>> = seq.iter_live().map(|(_, p)| p.to_vec()).collect();
        assert_eq!(order, vec![vec![1], vec![3], vec![2]]);
    }

    #[test]
    fn merge_is_idempotent_and_commutative() {
        let items = vec![
            Item {
                id: id(1),
                payload: Some(vec![1]),
            },
            Item {
                id: id(2),
                payload: None,
            },
        ];

        let mut left = Sequence::new();
        left.merge(items.clone());
        left.merge(items.clone());

        let mut right = Sequence::new();
        let mut reversed = items;
        reversed.reverse();
        right.merge(reversed);

        assert_eq!(left.export(), right.export());
    }

    #[test]
    fn merge_tombstone_wins() {
        let mut seq = Sequence::new();
        seq.insert(id(3), vec![7]);

        let changed = seq.merge(vec![Item {
            id: id(3),
            payload: None,
        }]);

        assert!(changed);
        assert_eq!(seq.get(id(3)), None);
        assert_eq!(seq.tombstone_count(), 1);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Merging any item set in any order yields the same
            /// sequence. Ids are unique per append, so the only
            /// duplicates a merge can see are item/tombstone pairs.
            #[test]
            fn merge_is_order_independent(
                specs in prop::collection::vec(
                    (
                        0u8..3,
                        prop::option::of(prop::collection::vec(any::<u8>(), 0..6)),
                        prop::bool::ANY,
                    ),
                    0..16,
                ),
            ) {
                let mut items = Vec::new();
                for (i, (replica, payload, also_tombstone)) in specs.into_iter().enumerate() {
                    let item_id = ItemId::new(i as u64 + 1, ReplicaId::from_bytes([replica; 16]));
                    items.push(Item { id: item_id, payload });
                    if also_tombstone {
                        items.push(Item { id: item_id, payload: None });
                    }
                }

                let mut forward = Sequence::new();
                forward.merge(items.clone());

                let mut backward = Sequence::new();
                let mut reversed = items;
                reversed.reverse();
                backward.merge(reversed);

                prop_assert_eq!(forward.export(), backward.export());
            }
        }
    }
}
