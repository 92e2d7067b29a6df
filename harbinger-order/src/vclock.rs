//! Vector clocks.
//!
//! One counter per routine, 1-based routine ids mapped onto 0-based
//! components. Clocks are value types: `sync` mutates in place and
//! never aliases another routine's current clock.

use harbinger_trace::RoutineId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of comparing two vector clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HbRelation {
    /// Left happens before right
    Before,
    /// Left happens after right
    After,
    /// Neither orders the other
    Concurrent,
    /// Clocks are not comparable (length mismatch)
    None,
}

/// Fixed-length vector of per-routine counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VectorClock {
    clocks: Vec<u64>,
}

impl VectorClock {
    /// Zero clock over `n` routines
    pub fn new(n: usize) -> Self {
        Self {
            clocks: vec![0; n],
        }
    }

    /// Number of routine components
    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }

    /// Counter of one routine; 0 for out-of-range components
    pub fn get(&self, routine: RoutineId) -> u64 {
        self.clocks.get(routine.index()).copied().unwrap_or(0)
    }

    /// Increment the component of `routine`
    pub fn inc(&mut self, routine: RoutineId) {
        let idx = routine.index();
        if idx < self.clocks.len() {
            self.clocks[idx] += 1;
        }
    }

    /// Elementwise maximum with `other`, in place
    pub fn sync(&mut self, other: &VectorClock) {
        if other.clocks.len() > self.clocks.len() {
            self.clocks.resize(other.clocks.len(), 0);
        }
        for (mine, theirs) in self.clocks.iter_mut().zip(&other.clocks) {
            *mine = (*mine).max(*theirs);
        }
    }

    /// Compare two clocks.
    ///
    /// `Before` iff `self <= other` pointwise with at least one strict
    /// component, `After` symmetric, otherwise `Concurrent`. Clocks of
    /// different lengths are not comparable.
    pub fn relation(&self, other: &VectorClock) -> HbRelation {
        if self.clocks.len() != other.clocks.len() {
            return HbRelation::None;
        }
        let mut less = false;
        let mut greater = false;
        for (a, b) in self.clocks.iter().zip(&other.clocks) {
            if a < b {
                less = true;
            } else if a > b {
                greater = true;
            }
        }
        match (less, greater) {
            (true, false) => HbRelation::Before,
            (false, true) => HbRelation::After,
            _ => HbRelation::Concurrent,
        }
    }

    /// True iff neither clock orders the other
    pub fn is_concurrent(&self, other: &VectorClock) -> bool {
        self.relation(other) == HbRelation::Concurrent
    }

    /// True iff `self` happens before `other`
    pub fn is_before(&self, other: &VectorClock) -> bool {
        self.relation(other) == HbRelation::Before
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, c) in self.clocks.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{c}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn vc(values: &[u64]) -> VectorClock {
        VectorClock {
            clocks: values.to_vec(),
        }
    }

    #[test]
    fn test_inc_and_get() {
        let mut c = VectorClock::new(3);
        c.inc(RoutineId(2));
        c.inc(RoutineId(2));
        assert_eq!(c.get(RoutineId(2)), 2);
        assert_eq!(c.get(RoutineId(1)), 0);
    }

    #[test]
    fn test_sync_is_elementwise_max() {
        let mut a = vc(&[1, 5, 0]);
        a.sync(&vc(&[3, 2, 4]));
        assert_eq!(a, vc(&[3, 5, 4]));
    }

    #[test]
    fn test_relation_basic() {
        assert_eq!(vc(&[1, 0]).relation(&vc(&[1, 2])), HbRelation::Before);
        assert_eq!(vc(&[1, 2]).relation(&vc(&[1, 0])), HbRelation::After);
        assert_eq!(vc(&[2, 0]).relation(&vc(&[0, 2])), HbRelation::Concurrent);
        // equal clocks do not order each other
        assert_eq!(vc(&[1, 1]).relation(&vc(&[1, 1])), HbRelation::Concurrent);
    }

    #[test]
    fn test_relation_length_mismatch() {
        assert_eq!(vc(&[1]).relation(&vc(&[1, 0])), HbRelation::None);
    }

    proptest! {
        #[test]
        fn prop_relation_is_antisymmetric(a in proptest::collection::vec(0u64..8, 4),
                                          b in proptest::collection::vec(0u64..8, 4)) {
            let (a, b) = (vc(&a), vc(&b));
            let forward = a.relation(&b);
            let backward = b.relation(&a);
            let flipped = match forward {
                HbRelation::Before => HbRelation::After,
                HbRelation::After => HbRelation::Before,
                other => other,
            };
            prop_assert_eq!(backward, flipped);
        }

        #[test]
        fn prop_sync_is_upper_bound(a in proptest::collection::vec(0u64..8, 4),
                                    b in proptest::collection::vec(0u64..8, 4)) {
            let (a, b) = (vc(&a), vc(&b));
            let mut joined = a.clone();
            joined.sync(&b);
            prop_assert!(a.relation(&joined) == HbRelation::Before || a == joined);
            prop_assert!(b.relation(&joined) == HbRelation::Before || b == joined);
        }

        #[test]
        fn prop_inc_makes_strictly_later(values in proptest::collection::vec(0u64..8, 4),
                                         r in 1u32..=4) {
            let before = vc(&values);
            let mut after = before.clone();
            after.inc(RoutineId(r));
            prop_assert_eq!(before.relation(&after), HbRelation::Before);
        }
    }
}
