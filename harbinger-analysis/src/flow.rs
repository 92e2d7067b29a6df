//! Bipartite max-flow analyses.
//!
//! Negative wait-group counters and unlock-before-lock share one
//! construction: a bipartite residual graph with a synthetic source
//! feeding every "consuming" event (done / unlock) and every
//! "providing" event (add / lock) feeding a synthetic sink, with an
//! edge consumer → provider wherever the provider happens before the
//! consumer. If the maximum flow leaves consumers unmatched, a legal
//! schedule exists in which a consumer runs without its provider.

use crate::context::AnalysisContext;
use harbinger_report::{BugKind, Report, Severity};
use harbinger_trace::EventId;

/// Result of one bipartite matching
struct Matching {
    matched: usize,
    /// Consumers the flow never saturated
    unmatched_consumers: Vec<usize>,
    /// Providers the flow never saturated
    unmatched_providers: Vec<usize>,
}

/// Ford–Fulkerson with BFS augmenting paths over a residual matrix.
///
/// `edges` lists `(consumer, provider)` pairs. Returns `None` when the
/// round cap (1e5 · V³) is breached, which only malformed input can
/// provoke.
fn bipartite_max_flow(
    consumers: usize,
    providers: usize,
    edges: &[(usize, usize)],
) -> Option<Matching> {
    let n = consumers + providers + 2;
    let source = 0usize;
    let sink = n - 1;
    let consumer = |i: usize| 1 + i;
    let provider = |j: usize| 1 + consumers + j;

    let mut residual = vec![vec![0u64; n]; n];
    for i in 0..consumers {
        residual[source][consumer(i)] = 1;
    }
    for j in 0..providers {
        residual[provider(j)][sink] = 1;
    }
    for &(i, j) in edges {
        residual[consumer(i)][provider(j)] = 1;
    }

    let round_cap = 100_000u64.saturating_mul((n as u64).pow(3));
    let mut rounds = 0u64;
    let mut matched = 0usize;

    loop {
        rounds += 1;
        if rounds > round_cap {
            return None;
        }
        // BFS for an augmenting path
        let mut parent = vec![usize::MAX; n];
        parent[source] = source;
        let mut queue = std::collections::VecDeque::from([source]);
        while let Some(u) = queue.pop_front() {
            for v in 0..n {
                if parent[v] == usize::MAX && residual[u][v] > 0 {
                    parent[v] = u;
                    queue.push_back(v);
                }
            }
        }
        if parent[sink] == usize::MAX {
            break;
        }
        // unit capacities: augment by one
        let mut v = sink;
        while v != source {
            let u = parent[v];
            residual[u][v] -= 1;
            residual[v][u] += 1;
            v = u;
        }
        matched += 1;
    }

    // a consumer is unmatched iff its source edge kept its capacity,
    // a provider iff its sink edge did
    let unmatched_consumers = (0..consumers)
        .filter(|&i| residual[source][consumer(i)] > 0)
        .collect();
    let unmatched_providers = (0..providers)
        .filter(|&j| residual[provider(j)][sink] > 0)
        .collect();

    Some(Matching {
        matched,
        unmatched_consumers,
        unmatched_providers,
    })
}

/// Shared driver: match consumers against providers under the
/// provider-happens-before-consumer edge rule and report every
/// unmatched consumer paired with a concurrent unmatched provider.
fn run_flow_analysis(
    ctx: &mut AnalysisContext,
    consumers: &[EventId],
    providers: &[EventId],
    kind: BugKind,
    consumer_label: &str,
    provider_label: &str,
) {
    if consumers.is_empty() {
        return;
    }

    let mut edges = Vec::new();
    for (i, &c) in consumers.iter().enumerate() {
        for (j, &p) in providers.iter().enumerate() {
            let ordered = match (ctx.stamps.vc(p), ctx.stamps.vc(c)) {
                (Some(pv), Some(cv)) => pv.is_before(cv),
                _ => false,
            };
            if ordered {
                edges.push((i, j));
            }
        }
    }

    let Some(matching) = bipartite_max_flow(consumers.len(), providers.len(), &edges) else {
        tracing::error!(
            kind = kind.code(),
            consumers = consumers.len(),
            providers = providers.len(),
            "max-flow round cap breached, skipping object"
        );
        return;
    };

    if matching.matched >= consumers.len() {
        return;
    }

    for &i in &matching.unmatched_consumers {
        let consumer = consumers[i];
        let partner = matching
            .unmatched_providers
            .iter()
            .map(|&j| providers[j])
            .find(|&p| ctx.concurrent(consumer, p));
        let secondary = partner.map(|p| vec![ctx.element(p)]).unwrap_or_default();
        let report = Report::new(
            Severity::Critical,
            kind,
            consumer_label,
            vec![ctx.element(consumer)],
            provider_label,
            secondary,
        );
        ctx.submit(report);
    }
}

/// Negative wait-group counter: a done with no add forced before it
pub fn done_before_add(ctx: &mut AnalysisContext) {
    let groups: Vec<_> = ctx
        .wait_groups
        .iter()
        .map(|(id, state)| (*id, state.dones.clone(), state.adds.clone()))
        .collect();
    for (id, dones, adds) in groups {
        tracing::debug!(%id, dones = dones.len(), adds = adds.len(), "done-before-add flow");
        run_flow_analysis(
            ctx,
            &dones,
            &adds,
            BugKind::PotentialNegativeWaitGroup,
            "done",
            "add",
        );
    }
}

/// Unlock of a mutex whose lock is not forced before it
pub fn unlock_before_lock(ctx: &mut AnalysisContext) {
    let mutexes: Vec<_> = ctx
        .mutexes
        .iter()
        .map(|(id, state)| (*id, state.releases.clone(), state.acquires.clone()))
        .collect();
    for (id, releases, acquires) in mutexes {
        if releases.is_empty() {
            continue;
        }
        // program order rules the bug out when one routine does it all
        let mut routines: Vec<_> = releases
            .iter()
            .chain(&acquires)
            .map(|&e| ctx.trace[e].routine)
            .collect();
        routines.sort();
        routines.dedup();
        if routines.len() <= 1 {
            continue;
        }
        tracing::debug!(%id, releases = releases.len(), acquires = acquires.len(), "unlock-before-lock flow");
        run_flow_analysis(
            ctx,
            &releases,
            &acquires,
            BugKind::PotentialUnlockBeforeLock,
            "unlock",
            "lock",
        );
    }
}
