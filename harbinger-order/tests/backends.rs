//! Backend agreement on a hand-built fork/join diamond.
//!
//! Two chains, a fork edge at the top and a join edge at the bottom:
//!
//! ```text
//! a0 ── a1 ───────── a2
//!   \               /
//!    b0 ── b1 ── b2
//! ```
//!
//! Everything is ordered except `a1` against the b-chain.

use harbinger_order::{
    ChainPos, ClockStamps, ConcurrencyQuery, Csst, CsstQuery, GraphQuery, HbGraph, QueryFilter,
    VectorClock, VectorClockQuery,
};
use harbinger_trace::{EventId, EventKind, Position, RoutineId, Trace};

fn clock(components: &[u64]) -> VectorClock {
    let mut c = VectorClock::new(components.len());
    for (i, &value) in components.iter().enumerate() {
        for _ in 0..value {
            c.inc(RoutineId(i as u32 + 1));
        }
    }
    c
}

struct Diamond {
    trace: Trace,
    stamps: ClockStamps,
    graph: HbGraph,
    csst: Csst,
}

fn diamond() -> Diamond {
    let mut b = Trace::builder();
    for (routine, t) in [(1u32, 1u64), (1, 4), (1, 20), (2, 2), (2, 6), (2, 8)] {
        b.push(
            RoutineId(routine),
            t,
            t + 1,
            Position::new("main.go", t as u32),
            EventKind::RoutineEnd,
        );
    }
    let trace = b.finish().unwrap();
    // arena order groups routines: a0 a1 a2 b0 b1 b2
    let (a0, a1, a2) = (EventId(0), EventId(1), EventId(2));
    let (b0, b1, b2) = (EventId(3), EventId(4), EventId(5));

    let mut stamps = ClockStamps::new(trace.len());
    stamps.set(a0, clock(&[1, 0]), clock(&[1, 0]));
    stamps.set(a1, clock(&[2, 0]), clock(&[2, 0]));
    stamps.set(a2, clock(&[2, 4]), clock(&[2, 4]));
    stamps.set(b0, clock(&[1, 1]), clock(&[1, 1]));
    stamps.set(b1, clock(&[1, 2]), clock(&[1, 2]));
    stamps.set(b2, clock(&[1, 3]), clock(&[1, 3]));

    let mut graph = HbGraph::new(trace.len());
    graph.add_edge(a0, a1);
    graph.add_edge(a1, a2);
    graph.add_edge(b0, b1);
    graph.add_edge(b1, b2);
    graph.add_edge(a0, b0);
    graph.add_edge(b2, a2);

    let mut csst = Csst::new(vec![3, 3]);
    csst.add_edge(ChainPos::new(0, 0), ChainPos::new(1, 0)).unwrap();
    csst.add_edge(ChainPos::new(1, 2), ChainPos::new(0, 2)).unwrap();

    Diamond {
        trace,
        stamps,
        graph,
        csst,
    }
}

#[test]
fn test_all_backends_agree_on_every_pair() {
    let d = diamond();
    let vcq = VectorClockQuery::new(&d.trace, &d.stamps);
    let gq = GraphQuery::new(&d.trace, &d.graph, &d.graph);
    let cq = CsstQuery::new(&d.trace, &d.csst, &d.csst);

    for a in 0..d.trace.len() as u32 {
        for b in 0..d.trace.len() as u32 {
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
fn test_only_the_left_arm_is_concurrent() {
    let d = diamond();
    let gq = GraphQuery::new(&d.trace, &d.graph, &d.graph);
    let a1 = EventId(1);
    let b_chain = vec![EventId(3), EventId(4), EventId(5)];
    assert_eq!(gq.concurrent_with(a1, QueryFilter::all()), b_chain);

    let cq = CsstQuery::new(&d.trace, &d.csst, &d.csst);
    assert_eq!(cq.concurrent_with(a1, QueryFilter::all()), b_chain);

    let vcq = VectorClockQuery::new(&d.trace, &d.stamps);
    assert_eq!(vcq.concurrent_with(a1, QueryFilter::all()), b_chain);
}

#[test]
fn test_join_sees_both_arms() {
    let d = diamond();
    let a2 = EventId(2);
    for other in 0..5u32 {
        assert!(
            d.graph.reachable(EventId(other), a2),
            "everything precedes the join"
        );
        assert!(d.csst.reachable(
            ChainPos::new(if other < 3 { 0 } else { 1 }, (other % 3) as usize),
            ChainPos::new(0, 2)
        ));
    }
}
