//! ExtentSet — fixed-width bitset over extent numbers
//!
//! The key used to decide where a condition can first be evaluated: a
//! condition may run at an extent once every extent it references is bound.

use crate::error::{PlannerError, PlannerResult};
use std::fmt;

/// Number of extents a query can reference.
pub const MAX_EXTENTS: usize = 64;

/// Deepest position `create_all_extent_sets` enumerates: `2^16` sets.
pub const MAX_ENUMERATED_POSITION: usize = 16;

/// Set of extent numbers in `[0, 64)`. The raw value 0 is the empty set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtentSet(u64);

impl ExtentSet {
    pub const EMPTY: ExtentSet = ExtentSet(0);

    pub fn new() -> Self {
        Self::EMPTY
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn single(extent: usize) -> PlannerResult<Self> {
        let mut set = Self::EMPTY;
        set.add(extent)?;
        Ok(set)
    }

    pub fn from_extents(extents: impl IntoIterator<Item = usize>) -> PlannerResult<Self> {
        let mut set = Self::EMPTY;
        for extent in extents {
            set.add(extent)?;
        }
        Ok(set)
    }

    /// Add an extent. Idempotent.
    pub fn add(&mut self, extent: usize) -> PlannerResult<()> {
        if extent >= MAX_EXTENTS {
            return Err(PlannerError::internal(format!(
                "extent number {extent} out of range [0, {MAX_EXTENTS})"
            )));
        }
        self.0 |= 1u64 << extent;
        Ok(())
    }

    /// Membership test; numbers outside `[0, 64)` are never members.
    pub fn includes(self, extent: usize) -> bool {
        extent < MAX_EXTENTS && self.0 & (1u64 << extent) != 0
    }

    pub fn union(self, other: ExtentSet) -> ExtentSet {
        ExtentSet(self.0 | other.0)
    }

    pub fn intersects(self, other: ExtentSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_subset_of(self, other: ExtentSet) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Members in ascending order.
    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..MAX_EXTENTS).filter(move |&e| self.includes(e))
    }

    /// Every subset of the extents preceding `current` in `extent_order`,
    /// each combined with `current` itself: `2^p` sets where `p` is the
    /// position of `current`.
    ///
    /// In a nested-loop plan all preceding extents are bound when `current`
    /// is visited, so a condition whose key is any of these sets can be
    /// evaluated at `current`. Positions past [`MAX_ENUMERATED_POSITION`]
    /// are an internal error; use [`ExtentSet::first_covering_position`]
    /// to place a single key.
    pub fn create_all_extent_sets(
        current: usize,
        extent_order: &[usize],
    ) -> PlannerResult<Vec<ExtentSet>> {
        let position = extent_order
            .iter()
            .position(|&e| e == current)
            .ok_or_else(|| {
                PlannerError::internal(format!(
                    "extent {current} missing from extent order {extent_order:?}"
                ))
            })?;
        if position > MAX_ENUMERATED_POSITION {
            return Err(PlannerError::internal(format!(
                "extent {current} at position {position} exceeds subset enumeration bound {MAX_ENUMERATED_POSITION}"
            )));
        }
        let base = ExtentSet::single(current)?;
        let preceding = &extent_order[..position];
        let mut singles = Vec::with_capacity(preceding.len());
        for &extent in preceding {
            singles.push(ExtentSet::single(extent)?);
        }

        let mut sets = Vec::with_capacity(1usize << position);
        for mask in 0..(1u64 << position) {
            let mut set = base;
            for (bit, single) in singles.iter().enumerate() {
                if mask & (1u64 << bit) != 0 {
                    set = set.union(*single);
                }
            }
            sets.push(set);
        }
        Ok(sets)
    }

    /// Position in `extent_order` at which every extent of `self` is bound,
    /// or `None` when `self` names an extent outside the order. The empty
    /// set is bound at position 0.
    pub fn first_covering_position(self, extent_order: &[usize]) -> Option<usize> {
        let mut visited = ExtentSet::EMPTY;
        for (position, &extent) in extent_order.iter().enumerate() {
            if extent < MAX_EXTENTS {
                visited.0 |= 1u64 << extent;
            }
            if self.is_subset_of(visited) {
                return Some(position);
            }
        }
        None
    }
}

impl fmt::Display for ExtentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, extent) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{extent}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent() {
        let mut set = ExtentSet::new();
        set.add(5).unwrap();
        let once = set;
        set.add(5).unwrap();
        assert_eq!(set, once);
        assert!(set.includes(5));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_empty_set_is_zero() {
        assert!(ExtentSet::EMPTY.is_empty());
        assert_eq!(ExtentSet::default().raw(), 0);
        assert!(!ExtentSet::EMPTY.includes(0));
    }

    #[test]
    fn test_out_of_range_is_internal_error() {
        let mut set = ExtentSet::new();
        let err = set.add(64).unwrap_err();
        assert!(err.is_internal());
        assert!(set.add(63).is_ok());
        assert!(!set.includes(64));
    }

    #[test]
    fn test_union_and_subset() {
        let a = ExtentSet::from_extents([0, 2]).unwrap();
        let b = ExtentSet::from_extents([2, 3]).unwrap();
        let u = a.union(b);
        assert_eq!(u.iter().collect::<Vec<_>>(), vec![0, 2, 3]);
        assert!(a.is_subset_of(u));
        assert!(!u.is_subset_of(a));
        assert!(a.intersects(b));
        assert_eq!(u.to_string(), "{0, 2, 3}");
    }

    #[test]
    fn test_create_all_extent_sets_count() {
        let sets = ExtentSet::create_all_extent_sets(1, &[0, 2, 3, 1, 4]).unwrap();
        assert_eq!(sets.len(), 8);
        assert!(sets.iter().all(|s| s.includes(1)));
        assert!(sets.iter().all(|s| !s.includes(4)));
        assert!(sets.contains(&ExtentSet::single(1).unwrap()));
        assert!(sets.contains(&ExtentSet::from_extents([0, 1, 2, 3]).unwrap()));
    }

    #[test]
    fn test_create_all_extent_sets_first_extent() {
        let sets = ExtentSet::create_all_extent_sets(7, &[7, 1]).unwrap();
        assert_eq!(sets, vec![ExtentSet::single(7).unwrap()]);
    }

    #[test]
    fn test_create_all_extent_sets_position_bound() {
        let order: Vec<usize> = (0..MAX_EXTENTS).collect();
        let deepest = ExtentSet::create_all_extent_sets(MAX_ENUMERATED_POSITION, &order).unwrap();
        assert_eq!(deepest.len(), 1 << MAX_ENUMERATED_POSITION);

        let err = ExtentSet::create_all_extent_sets(MAX_ENUMERATED_POSITION + 1, &order).unwrap_err();
        assert!(err.is_internal());
        let err = ExtentSet::create_all_extent_sets(63, &order).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_first_covering_position() {
        let order = [0, 2, 3, 1, 4];
        assert_eq!(ExtentSet::EMPTY.first_covering_position(&order), Some(0));
        assert_eq!(ExtentSet::from_extents([1]).unwrap().first_covering_position(&order), Some(3));
        assert_eq!(ExtentSet::from_extents([0, 3]).unwrap().first_covering_position(&order), Some(2));
        assert_eq!(ExtentSet::from_extents([5]).unwrap().first_covering_position(&order), None);

        // agrees with subset enumeration
        for key in ExtentSet::create_all_extent_sets(1, &order).unwrap() {
            assert_eq!(key.first_covering_position(&order), Some(3));
        }

        let wide: Vec<usize> = (0..MAX_EXTENTS).collect();
        assert_eq!(ExtentSet::single(63).unwrap().first_covering_position(&wide), Some(63));
    }

    #[test]
    fn test_create_all_extent_sets_missing_extent() {
        let err = ExtentSet::create_all_extent_sets(9, &[0, 1]).unwrap_err();
        assert!(err.is_internal());
    }
}
