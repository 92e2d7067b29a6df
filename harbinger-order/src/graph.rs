//! Partial-order graph (PoG).
//!
//! Nodes are events addressed by [`EventId`]; edges are the observed
//! happens-before edges (same-routine program order plus cross-routine
//! synchronization). Inverted adjacency is kept alongside forward
//! adjacency so reachable sets can be collected in either direction.
//!
//! Synchronous channel pairings insert the edge in both directions;
//! reachability therefore treats the two partners as mutually ordered
//! and the traversal tolerates those two-cycles.

use harbinger_trace::EventId;
use serde::{Deserialize, Serialize};

/// Traversal direction over the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

/// Happens-before graph over trace events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HbGraph {
    succ: Vec<Vec<EventId>>,
    pred: Vec<Vec<EventId>>,
}

impl HbGraph {
    /// Graph sized for `n` events
    pub fn new(n: usize) -> Self {
        Self {
            succ: vec![Vec::new(); n],
            pred: vec![Vec::new(); n],
        }
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.succ.len()
    }

    pub fn is_empty(&self) -> bool {
        self.succ.is_empty()
    }

    fn ensure(&mut self, id: EventId) {
        let needed = id.index() + 1;
        if needed > self.succ.len() {
            self.succ.resize_with(needed, Vec::new);
            self.pred.resize_with(needed, Vec::new);
        }
    }

    /// Insert an observed HB edge; duplicates are ignored
    pub fn add_edge(&mut self, from: EventId, to: EventId) {
        if from == to {
            return;
        }
        self.ensure(from);
        self.ensure(to);
        let out = &mut self.succ[from.index()];
        if out.contains(&to) {
            return;
        }
        out.push(to);
        self.pred[to.index()].push(from);
    }

    pub fn successors(&self, id: EventId) -> &[EventId] {
        self.succ.get(id.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn predecessors(&self, id: EventId) -> &[EventId] {
        self.pred.get(id.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `from →* to`: a directed path exists (trivially for `from == to`)
    pub fn reachable(&self, from: EventId, to: EventId) -> bool {
        if from == to {
            return true;
        }
        let mut visited = vec![false; self.succ.len()];
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            let idx = node.index();
            if idx >= visited.len() || visited[idx] {
                continue;
            }
            visited[idx] = true;
            stack.extend_from_slice(self.successors(node));
        }
        false
    }

    /// All events reachable from `from` in the given direction,
    /// including `from` itself, as a membership mask over event ids
    pub fn reachable_set(&self, from: EventId, direction: Direction) -> Vec<bool> {
        let mut visited = vec![false; self.succ.len()];
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            let idx = node.index();
            if idx >= visited.len() || visited[idx] {
                continue;
            }
            visited[idx] = true;
            let next = match direction {
                Direction::Forward => self.successors(node),
                Direction::Backward => self.predecessors(node),
            };
            stack.extend_from_slice(next);
        }
        visited
    }

    /// Concurrent iff neither `a →* b` nor `b →* a`
    pub fn are_concurrent(&self, a: EventId, b: EventId) -> bool {
        !self.reachable(a, b) && !self.reachable(b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(n: u32) -> EventId {
        EventId(n)
    }

    #[test]
    fn test_reachability_over_path() {
        let mut g = HbGraph::new(4);
        g.add_edge(e(0), e(1));
        g.add_edge(e(1), e(2));
        assert!(g.reachable(e(0), e(2)));
        assert!(!g.reachable(e(2), e(0)));
        assert!(g.reachable(e(3), e(3)));
        assert!(!g.reachable(e(0), e(3)));
    }

    #[test]
    fn test_concurrency_is_mutual_unreachability() {
        let mut g = HbGraph::new(4);
        g.add_edge(e(0), e(1));
        g.add_edge(e(0), e(2));
        assert!(g.are_concurrent(e(1), e(2)));
        assert!(!g.are_concurrent(e(0), e(1)));
    }

    #[test]
    fn test_sync_pair_cycle_is_tolerated() {
        let mut g = HbGraph::new(3);
        g.add_edge(e(0), e(1));
        g.add_edge(e(1), e(0));
        g.add_edge(e(1), e(2));
        assert!(g.reachable(e(0), e(2)));
        assert!(!g.are_concurrent(e(0), e(1)));
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let mut g = HbGraph::new(2);
        g.add_edge(e(0), e(1));
        g.add_edge(e(0), e(1));
        assert_eq!(g.successors(e(0)).len(), 1);
        assert_eq!(g.predecessors(e(1)).len(), 1);
    }

    #[test]
    fn test_backward_set_mirrors_forward() {
        let mut g = HbGraph::new(4);
        g.add_edge(e(0), e(1));
        g.add_edge(e(1), e(2));
        let fwd = g.reachable_set(e(0), Direction::Forward);
        let bwd = g.reachable_set(e(2), Direction::Backward);
        assert!(fwd[0] && fwd[1] && fwd[2] && !fwd[3]);
        assert!(bwd[0] && bwd[1] && bwd[2] && !bwd[3]);
    }

    #[test]
    fn test_grows_on_demand() {
        let mut g = HbGraph::default();
        g.add_edge(e(5), e(9));
        assert!(g.reachable(e(5), e(9)));
        assert_eq!(g.len(), 10);
    }
}
