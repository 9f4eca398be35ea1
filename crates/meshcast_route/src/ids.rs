//! Opaque ID newtypes for routing entities.
//!
//! [`PartitionId`], [`NodeId`], and [`EntityId`] are thin `u32` wrappers.
//! Node ids index the routing tree arena; partition ids key routing table
//! entries; entity ids index the application graph. They are `Copy`, `Hash`,
//! `Ord`, and `Serialize`/`Deserialize`.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Identifier of one multicast partition; routing table entries are
    /// keyed by `(chip, partition)`.
    PartitionId
);

define_id!(
    /// Index of a node in a [`RoutingTree`](crate::RoutingTree) arena.
    NodeId
);

define_id!(
    /// Index of a logical entity in an [`AppGraph`](crate::AppGraph).
    EntityId
);

impl PartitionId {
    /// Returns the partition `n` places after this one.
    ///
    /// Used to give each physical source of an application partition its
    /// own table key.
    pub fn offset(self, n: u32) -> Self {
        Self(self.0.wrapping_add(n))
    }
}

/// Hands out contiguous blocks of partition ids.
///
/// An application partition with `n` physical sources needs `n` consecutive
/// ids, one per source.
#[derive(Debug, Clone, Default)]
pub struct PartitionAllocator {
    next: u32,
}

impl PartitionAllocator {
    /// Creates an allocator whose first block starts at `first`.
    pub fn starting_at(first: PartitionId) -> Self {
        Self { next: first.0 }
    }

    /// Reserves `count` consecutive ids and returns the first of them.
    pub fn allocate(&mut self, count: u32) -> PartitionId {
        let base = PartitionId(self.next);
        self.next = self.next.wrapping_add(count);
        base
    }
}

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn partition_roundtrip() {
        let id = PartitionId::from_raw(42);
        assert_eq!(id.as_raw(), 42);
    }

    #[test]
    fn partition_offset() {
        let base = PartitionId::from_raw(10);
        assert_eq!(base.offset(0), base);
        assert_eq!(base.offset(3).as_raw(), 13);
    }

    #[test]
    fn allocator_hands_out_disjoint_blocks() {
        let mut alloc = PartitionAllocator::starting_at(PartitionId::from_raw(100));
        assert_eq!(alloc.allocate(3).as_raw(), 100);
        assert_eq!(alloc.allocate(1).as_raw(), 103);
        assert_eq!(alloc.allocate(0).as_raw(), 104);
        assert_eq!(alloc.allocate(2).as_raw(), 104);
    }

    #[test]
    fn ids_order_by_raw_value() {
        let set: BTreeSet<_> = [5, 1, 3].into_iter().map(PartitionId::from_raw).collect();
        let raw: Vec<u32> = set.into_iter().map(PartitionId::as_raw).collect();
        assert_eq!(raw, vec![1, 3, 5]);
    }

    #[test]
    fn id_serde_roundtrip() {
        let id = EntityId::from_raw(55);
        let json = serde_json::to_string(&id).unwrap();
        let restored: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, restored);
    }

    #[test]
    fn id_display() {
        assert_eq!(format!("{}", NodeId::from_raw(7)), "7");
    }
}
