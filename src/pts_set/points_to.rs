// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;
use std::slice;

pub trait PointsToSet<T> {
    type Iter<'a>: Iterator<Item = T>
    where
        Self: 'a;

    fn new() -> Self;
    fn count(&self) -> usize;
    fn contains(&self, elem: T) -> bool;
    fn is_empty(&self) -> bool;
    fn superset(&self, other: &Self) -> bool;
    fn insert(&mut self, elem: T) -> bool;
    fn union(&mut self, other: &Self) -> bool;
    fn iter<'a>(&'a self) -> Self::Iter<'a>;
}

/// Points-to set kept as an insertion-sorted, duplicate-free vector.
///
/// Every mutation preserves strict ordering, so iteration order is
/// canonical and subset/union operations are linear merges.
#[derive(Clone, PartialEq, Eq)]
pub struct SortedPointsToSet<T> {
    elems: Vec<T>,
}

impl<T: fmt::Debug> fmt::Debug for SortedPointsToSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.elems.fmt(f)
    }
}

impl<'a, T: Copy + Ord> IntoIterator for &'a SortedPointsToSet<T> {
    type Item = T;
    type IntoIter = SortedIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Copy + Ord> PointsToSet<T> for SortedPointsToSet<T> {
    fn new() -> Self {
        SortedPointsToSet { elems: Vec::new() }
    }

    fn count(&self) -> usize {
        self.elems.len()
    }

    fn contains(&self, elem: T) -> bool {
        self.elems.binary_search(&elem).is_ok()
    }

    fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Is `self` a superset of `other`?
    fn superset(&self, other: &Self) -> bool {
        // Both sides are sorted: one merge scan suffices.
        let mut mine = self.elems.iter();
        'outer: for x in &other.elems {
            for y in mine.by_ref() {
                match y.cmp(x) {
                    std::cmp::Ordering::Less => continue,
                    std::cmp::Ordering::Equal => continue 'outer,
                    std::cmp::Ordering::Greater => return false,
                }
            }
            return false;
        }
        true
    }

    /// Adds `elem`, returns true if it was not already present.
    fn insert(&mut self, elem: T) -> bool {
        match self.elems.binary_search(&elem) {
            Ok(_) => false,
            Err(pos) => {
                self.elems.insert(pos, elem);
                true
            }
        }
    }

    /// Unions `other` into `self`, returns true if `self` grew.
    fn union(&mut self, other: &Self) -> bool {
        if other.elems.is_empty() {
            return false;
        }
        let before = self.elems.len();
        let mut merged = Vec::with_capacity(before + other.elems.len());
        let (mut a, mut b) = (self.elems.iter().peekable(), other.elems.iter().peekable());
        loop {
            match (a.peek(), b.peek()) {
                (Some(&x), Some(&y)) => match x.cmp(y) {
                    std::cmp::Ordering::Less => {
                        merged.push(*x);
                        a.next();
                    }
                    std::cmp::Ordering::Greater => {
                        merged.push(*y);
                        b.next();
                    }
                    std::cmp::Ordering::Equal => {
                        merged.push(*x);
                        a.next();
                        b.next();
                    }
                },
                (Some(&x), None) => {
                    merged.push(*x);
                    a.next();
                }
                (None, Some(&y)) => {
                    merged.push(*y);
                    b.next();
                }
                (None, None) => break,
            }
        }
        self.elems = merged;
        self.elems.len() != before
    }

    type Iter<'a>
        = SortedIter<'a, T>
    where
        Self: 'a;

    fn iter(&self) -> SortedIter<'_, T> {
        SortedIter(self.elems.iter())
    }
}

pub struct SortedIter<'a, T>(slice::Iter<'a, T>);

impl<'a, T: Copy> Iterator for SortedIter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.0.next().copied()
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use rand::Rng;

    use super::{PointsToSet, SortedPointsToSet};

    fn random_set(len: usize) -> BTreeSet<u32> {
        let mut rng = rand::thread_rng();
        let mut set = BTreeSet::new();
        while set.len() < len {
            set.insert(rng.gen_range(1..1000));
        }
        set
    }

    fn from_elems(elems: &BTreeSet<u32>) -> SortedPointsToSet<u32> {
        let mut set = SortedPointsToSet::new();
        // Insert in reverse to exercise the sorted insertion path.
        let mut shuffled: Vec<u32> = elems.iter().copied().collect();
        shuffled.reverse();
        for x in shuffled {
            assert!(set.insert(x));
        }
        set
    }

    fn is_strictly_sorted(set: &SortedPointsToSet<u32>) -> bool {
        let elems: Vec<u32> = set.iter().collect();
        elems.windows(2).all(|w| w[0] < w[1])
    }

    #[test]
    fn insert_contains_dedup() {
        let reference = random_set(16);
        let mut set = from_elems(&reference);
        assert_eq!(set.count(), 16);
        assert!(is_strictly_sorted(&set));

        let existing = *reference.iter().next().unwrap();
        assert!(set.contains(existing));
        assert!(!set.insert(existing));
        assert_eq!(set.count(), 16);
        assert_eq!(set.iter().collect::<BTreeSet<_>>(), reference);
    }

    #[test]
    fn union_matches_reference_union() {
        let lhs = random_set(24);
        let rhs = random_set(40);
        let mut set = from_elems(&lhs);
        let other = from_elems(&rhs);

        let grew = set.union(&other);
        let expected: BTreeSet<u32> = lhs.union(&rhs).copied().collect();
        assert_eq!(grew, expected.len() != lhs.len());
        assert_eq!(set.iter().collect::<BTreeSet<_>>(), expected);
        assert!(is_strictly_sorted(&set));

        // A second union with the same operand is a no-op.
        assert!(!set.union(&other));
        assert!(set.superset(&other));
    }

    #[test]
    fn superset_checks() {
        let base = random_set(32);
        let set = from_elems(&base);

        let mut small = BTreeSet::new();
        for x in base.iter().take(7) {
            small.insert(*x);
        }
        let subset = from_elems(&small);
        assert!(set.superset(&subset));
        assert!(!subset.superset(&set));
        assert!(set.superset(&SortedPointsToSet::new()));

        let mut outside = from_elems(&small);
        outside.insert(1001);
        assert!(!set.superset(&outside));
    }
}
