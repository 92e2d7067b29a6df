//! Uniform concurrency queries.
//!
//! All three happens-before representations answer the same two
//! questions: *is A concurrent with B?* and *which events are
//! concurrent with A?* The driver owns the clocks, graphs and CSSTs;
//! the query backends borrow them together with the trace.
//!
//! The graph and CSST carry the same edges and always agree with each
//! other. The clock backend diverges in two documented spots: the two
//! partners of a synchronous channel pairing compare concurrent while
//! the graph holds the pairing edge in both directions, and orderings
//! carried by clock-only syncs (cond wakes, atomic last-writer reads)
//! are visible to the clocks alone.

use crate::csst::{ChainPos, Csst};
use crate::graph::{Direction, HbGraph};
use crate::vclock::VectorClock;
use harbinger_trace::{EventId, Trace};
use serde::{Deserialize, Serialize};

/// Per-event strong and weak clock stamps, indexed by [`EventId`].
///
/// The driver stamps events in total (timestamp) order, which differs
/// from arena order, so the store is preallocated and written through
/// [`ClockStamps::set`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClockStamps {
    vc: Vec<VectorClock>,
    wvc: Vec<VectorClock>,
    stamped: Vec<bool>,
}

impl ClockStamps {
    /// Stamp store for `n` events
    pub fn new(n: usize) -> Self {
        Self {
            vc: vec![VectorClock::default(); n],
            wvc: vec![VectorClock::default(); n],
            stamped: vec![false; n],
        }
    }

    /// Record both stamps of one event
    pub fn set(&mut self, id: EventId, vc: VectorClock, wvc: VectorClock) {
        let idx = id.index();
        if idx >= self.stamped.len() {
            return;
        }
        self.vc[idx] = vc;
        self.wvc[idx] = wvc;
        self.stamped[idx] = true;
    }

    /// True once [`ClockStamps::set`] ran for the event
    pub fn is_set(&self, id: EventId) -> bool {
        self.stamped.get(id.index()).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.vc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vc.is_empty()
    }

    /// Strong happens-before stamp
    pub fn vc(&self, id: EventId) -> Option<&VectorClock> {
        self.is_set(id).then(|| &self.vc[id.index()])
    }

    /// Weak must-happens-before stamp
    pub fn wvc(&self, id: EventId) -> Option<&VectorClock> {
        self.is_set(id).then(|| &self.wvc[id.index()])
    }

    /// The stamp selected by `weak`
    pub fn clock(&self, id: EventId, weak: bool) -> Option<&VectorClock> {
        if weak {
            self.wvc(id)
        } else {
            self.vc(id)
        }
    }
}

/// Filter for [`ConcurrencyQuery::concurrent_with`]
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueryFilter {
    /// Restrict hits to events on the same object id
    pub same_object: bool,
    /// Query the weak must-HB relation instead of strong HB
    pub weak: bool,
}

impl QueryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn same_object() -> Self {
        Self {
            same_object: true,
            ..Self::default()
        }
    }

    pub fn with_weak(mut self, weak: bool) -> Self {
        self.weak = weak;
        self
    }
}

/// Uniform API over the interchangeable HB backends
pub trait ConcurrencyQuery {
    /// True iff neither event happens before the other
    fn are_concurrent(&self, a: EventId, b: EventId, weak: bool) -> bool;

    /// Events concurrent with `a`, ascending by event id
    fn concurrent_with(&self, a: EventId, filter: QueryFilter) -> Vec<EventId>;
}

fn passes_object_filter(trace: &Trace, a: EventId, b: EventId, filter: QueryFilter) -> bool {
    if !filter.same_object {
        return true;
    }
    match (trace[a].object_id(), trace[b].object_id()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Clock-comparison backend: linear scan over the routines other than
/// the probe's own, comparing weak (or strong) stamps
#[derive(Debug, Clone, Copy)]
pub struct VectorClockQuery<'a> {
    trace: &'a Trace,
    stamps: &'a ClockStamps,
}

impl<'a> VectorClockQuery<'a> {
    pub fn new(trace: &'a Trace, stamps: &'a ClockStamps) -> Self {
        Self { trace, stamps }
    }
}

impl ConcurrencyQuery for VectorClockQuery<'_> {
    fn are_concurrent(&self, a: EventId, b: EventId, weak: bool) -> bool {
        match (self.stamps.clock(a, weak), self.stamps.clock(b, weak)) {
            (Some(ca), Some(cb)) => ca.is_concurrent(cb),
            _ => false,
        }
    }

    fn concurrent_with(&self, a: EventId, filter: QueryFilter) -> Vec<EventId> {
        let own = self.trace[a].routine;
        let mut hits = Vec::new();
        for routine in self.trace.routine_ids() {
            if routine == own {
                continue;
            }
            for &b in self.trace.routine(routine) {
                if self.are_concurrent(a, b, filter.weak)
                    && passes_object_filter(self.trace, a, b, filter)
                {
                    hits.push(b);
                }
            }
        }
        hits.sort();
        hits
    }
}

/// PoG backend: two DFS traversals, forward and backward; an event is
/// concurrent iff it lands in neither reachable set
#[derive(Debug, Clone, Copy)]
pub struct GraphQuery<'a> {
    trace: &'a Trace,
    strong: &'a HbGraph,
    weak: &'a HbGraph,
}

impl<'a> GraphQuery<'a> {
    pub fn new(trace: &'a Trace, strong: &'a HbGraph, weak: &'a HbGraph) -> Self {
        Self {
            trace,
            strong,
            weak,
        }
    }

    fn graph(&self, weak: bool) -> &HbGraph {
        if weak {
            self.weak
        } else {
            self.strong
        }
    }
}

impl ConcurrencyQuery for GraphQuery<'_> {
    fn are_concurrent(&self, a: EventId, b: EventId, weak: bool) -> bool {
        a != b && self.graph(weak).are_concurrent(a, b)
    }

    fn concurrent_with(&self, a: EventId, filter: QueryFilter) -> Vec<EventId> {
        let graph = self.graph(filter.weak);
        let after = graph.reachable_set(a, Direction::Forward);
        let before = graph.reachable_set(a, Direction::Backward);
        let mut hits = Vec::new();
        for idx in 0..self.trace.len() {
            let b = EventId(idx as u32);
            if b == a {
                continue;
            }
            let ordered =
                after.get(idx).copied().unwrap_or(false) || before.get(idx).copied().unwrap_or(false);
            if !ordered && passes_object_filter(self.trace, a, b, filter) {
                hits.push(b);
            }
        }
        hits
    }
}

/// CSST backend: chain-local index compare plus cross-chain
/// suffix-minimum lookups
#[derive(Debug, Clone, Copy)]
pub struct CsstQuery<'a> {
    trace: &'a Trace,
    strong: &'a Csst,
    weak: &'a Csst,
}

impl<'a> CsstQuery<'a> {
    pub fn new(trace: &'a Trace, strong: &'a Csst, weak: &'a Csst) -> Self {
        Self {
            trace,
            strong,
            weak,
        }
    }

    fn csst(&self, weak: bool) -> &Csst {
        if weak {
            self.weak
        } else {
            self.strong
        }
    }

    fn pos(&self, id: EventId) -> ChainPos {
        let ev = &self.trace[id];
        ChainPos::new(ev.routine.index(), ev.index)
    }
}

impl ConcurrencyQuery for CsstQuery<'_> {
    fn are_concurrent(&self, a: EventId, b: EventId, weak: bool) -> bool {
        a != b && self.csst(weak).are_concurrent(self.pos(a), self.pos(b))
    }

    fn concurrent_with(&self, a: EventId, filter: QueryFilter) -> Vec<EventId> {
        let mut hits = Vec::new();
        for idx in 0..self.trace.len() {
            let b = EventId(idx as u32);
            if b == a {
                continue;
            }
            if self.are_concurrent(a, b, filter.weak)
                && passes_object_filter(self.trace, a, b, filter)
            {
                hits.push(b);
            }
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbinger_trace::{EventKind, Position, RoutineId, Trace};

    /// Two routines, two events each, one cross edge 1/0 → 2/1
    fn fixture() -> (Trace, ClockStamps, HbGraph, Csst) {
        let mut b = Trace::builder();
        for (routine, t) in [(1u32, 1u64), (1, 3), (2, 2), (2, 4)] {
            b.push(
                RoutineId(routine),
                t,
                t + 10,
                Position::new("main.go", t as u32),
                EventKind::RoutineEnd,
            );
        }
        let trace = b.finish().unwrap();

        let mut stamps = ClockStamps::new(trace.len());
        let clocks = [
            (vec![1, 0], vec![1, 0]), // 1/0
            (vec![2, 0], vec![2, 0]), // 1/1
            (vec![0, 1], vec![0, 1]), // 2/0
            (vec![2, 2], vec![2, 2]), // 2/1 (saw 1/0 via the edge)
        ];
        for (i, (vc, wvc)) in clocks.iter().enumerate() {
            let mk = |values: &Vec<u64>| {
                let mut c = VectorClock::new(2);
                for (r, &v) in values.iter().enumerate() {
                    for _ in 0..v {
                        c.inc(RoutineId(r as u32 + 1));
                    }
                }
                c
            };
            stamps.set(EventId(i as u32), mk(vc), mk(wvc));
        }

        let mut graph = HbGraph::new(4);
        graph.add_edge(EventId(0), EventId(1)); // program order r1
        graph.add_edge(EventId(2), EventId(3)); // program order r2
        graph.add_edge(EventId(1), EventId(3)); // cross edge

        let mut csst = Csst::new(vec![2, 2]);
        csst.add_edge(ChainPos::new(0, 1), ChainPos::new(1, 1)).unwrap();

        (trace, stamps, graph, csst)
    }

    #[test]
    fn test_backends_agree_on_fixture() {
        let (trace, stamps, graph, csst) = fixture();
        let vcq = VectorClockQuery::new(&trace, &stamps);
        let gq = GraphQuery::new(&trace, &graph, &graph);
        let cq = CsstQuery::new(&trace, &csst, &csst);

        for a in 0..4u32 {
            for b in 0..4u32 {
                if a == b {
                    continue;
                }
                let (a, b) = (EventId(a), EventId(b));
                let expected = vcq.are_concurrent(a, b, false);
                assert_eq!(gq.are_concurrent(a, b, false), expected, "graph {a} {b}");
                assert_eq!(cq.are_concurrent(a, b, false), expected, "csst {a} {b}");
            }
        }
    }

    #[test]
    fn test_concurrent_with_excludes_ordered_events() {
        let (trace, stamps, graph, csst) = fixture();
        let gq = GraphQuery::new(&trace, &graph, &graph);
        // 1/1 is ordered with 1/0 (program) and 2/1 (edge), concurrent with 2/0
        assert_eq!(gq.concurrent_with(EventId(1), QueryFilter::all()), vec![EventId(2)]);

        let vcq = VectorClockQuery::new(&trace, &stamps);
        assert_eq!(vcq.concurrent_with(EventId(1), QueryFilter::all()), vec![EventId(2)]);

        let cq = CsstQuery::new(&trace, &csst, &csst);
        assert_eq!(cq.concurrent_with(EventId(1), QueryFilter::all()), vec![EventId(2)]);
    }

    #[test]
    fn test_same_object_filter() {
        let (trace, _, graph, _) = fixture();
        let gq = GraphQuery::new(&trace, &graph, &graph);
        // routine-end events carry no object id, so the filter drops everything
        assert!(gq
            .concurrent_with(EventId(1), QueryFilter::same_object())
            .is_empty());
    }
}
