//! Cyclic resource deadlocks.
//!
//! Phase 1 records, per routine, the lockset held at every blocking
//! acquire together with the acquire events (the *requests*). Phase 2
//! searches chains of dependencies across distinct routines whose
//! locks and locksets close a could-block cycle, then filters cycles
//! whose requests are not pairwise concurrent, since those cannot interleave
//! into a deadlock under any legal schedule.

use crate::context::AnalysisContext;
use hashbrown::HashMap;
use harbinger_report::{BugKind, ObjectTypeCode, Report, Severity};
use harbinger_trace::{EventId, EventKind, ObjectId, RoutineId};

/// A lock key: numeric id plus the read/write side it was taken on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockId {
    pub id: ObjectId,
    pub read: bool,
}

impl LockId {
    pub fn write(id: ObjectId) -> Self {
        Self { id, read: false }
    }

    pub fn read(id: ObjectId) -> Self {
        Self { id, read: true }
    }

    /// Two holds of the same lock block each other unless both are
    /// read-side
    pub fn could_block(self, other: LockId) -> bool {
        self.id == other.id && !(self.read && other.read)
    }
}

/// One lock currently held by a routine; read locks count reentrant
/// reader holds
#[derive(Debug, Clone)]
struct HeldLock {
    lock: LockId,
    count: u32,
}

/// A recorded dependency: requests for one lock taken under one lockset
#[derive(Debug, Clone)]
pub struct DepEntry {
    pub lockset: Vec<LockId>,
    pub requests: Vec<EventId>,
}

/// Phase-1 state: locksets and dependencies per routine
#[derive(Debug, Default)]
pub struct LockTracker {
    locksets: HashMap<RoutineId, Vec<HeldLock>>,
    deps: HashMap<RoutineId, HashMap<LockId, Vec<DepEntry>>>,
    /// Set on a release of a lock the routine does not hold; disables
    /// the cycle search (unsupported cross-routine unlock)
    pub failed: bool,
}

impl LockTracker {
    /// Current lockset of a routine, sorted
    pub fn lockset(&self, routine: RoutineId) -> Vec<LockId> {
        let mut set: Vec<LockId> = self
            .locksets
            .get(&routine)
            .map(|held| held.iter().map(|h| h.lock).collect())
            .unwrap_or_default();
        set.sort();
        set
    }

    /// True iff the routine holds the lock on either side
    pub fn holds(&self, routine: RoutineId, id: ObjectId) -> bool {
        self.locksets
            .get(&routine)
            .is_some_and(|held| held.iter().any(|h| h.lock.id == id))
    }

    /// Record a blocking acquire request. Called for every Lock/RLock
    /// event, executed or stuck, before the lockset changes.
    pub fn note_request(&mut self, routine: RoutineId, lock: LockId, event: EventId) {
        let lockset = self.lockset(routine);
        if lockset.is_empty() {
            return;
        }
        let entries = self
            .deps
            .entry(routine)
            .or_default()
            .entry(lock)
            .or_default();
        if let Some(entry) = entries.iter_mut().find(|e| e.lockset == lockset) {
            entry.requests.push(event);
        } else {
            entries.push(DepEntry {
                lockset,
                requests: vec![event],
            });
        }
    }

    /// Record a completed acquire
    pub fn note_acquired(&mut self, routine: RoutineId, lock: LockId) {
        let held = self.locksets.entry(routine).or_default();
        if lock.read {
            if let Some(h) = held.iter_mut().find(|h| h.lock == lock) {
                h.count += 1;
                return;
            }
        }
        held.push(HeldLock { lock, count: 1 });
    }

    /// Record a release; read releases decrement the reader count
    pub fn note_released(&mut self, routine: RoutineId, lock: LockId) {
        let held = self.locksets.entry(routine).or_default();
        if let Some(idx) = held.iter().position(|h| h.lock == lock) {
            held[idx].count -= 1;
            if held[idx].count == 0 {
                held.remove(idx);
            }
        } else {
            tracing::warn!(
                %routine,
                lock = %lock.id,
                "release of a lock not in the lockset, disabling cycle search"
            );
            self.failed = true;
        }
    }

    /// Flatten phase-1 state into per-routine dependency lists
    fn dependencies(&self) -> Vec<(RoutineId, Vec<(LockId, DepEntry)>)> {
        let mut routines: Vec<RoutineId> = self.deps.keys().copied().collect();
        routines.sort();
        routines
            .into_iter()
            .map(|routine| {
                let mut deps: Vec<(LockId, DepEntry)> = self.deps[&routine]
                    .iter()
                    .flat_map(|(lock, entries)| {
                        entries.iter().map(|e| (*lock, e.clone()))
                    })
                    .collect();
                deps.sort_by_key(|(lock, _)| *lock);
                (routine, deps)
            })
            .collect()
    }
}

/// A dependency chain member during the cycle search
#[derive(Debug, Clone)]
struct ChainDep {
    routine: RoutineId,
    lock: LockId,
    lockset: Vec<LockId>,
    requests: Vec<EventId>,
}

/// No lock of `a` may block against a lock of `b` (guard-lock rule)
fn locksets_disjoint(a: &[LockId], b: &[LockId]) -> bool {
    !a.iter().any(|la| b.iter().any(|lb| la.could_block(*lb)))
}

fn lock_in_lockset(lock: LockId, lockset: &[LockId]) -> bool {
    lockset.iter().any(|l| lock.could_block(*l))
}

/// Phase 2: depth-first chain enumeration and feasibility filtering
pub fn resource_deadlock(ctx: &mut AnalysisContext) {
    if ctx.locks.failed {
        tracing::warn!("lock tracking failed, skipping resource-deadlock search");
        return;
    }
    let by_thread: Vec<(RoutineId, Vec<(LockId, DepEntry)>)> = ctx.locks.dependencies();
    if by_thread.len() < 2 {
        return;
    }

    let deps: Vec<Vec<ChainDep>> = by_thread
        .iter()
        .map(|(routine, deps)| {
            deps.iter()
                .map(|(lock, entry)| ChainDep {
                    routine: *routine,
                    lock: *lock,
                    lockset: entry.lockset.clone(),
                    requests: entry.requests.clone(),
                })
                .collect()
        })
        .collect();

    let mut cycles = Vec::new();
    for start in 0..deps.len() {
        for dep in &deps[start] {
            let mut visited = vec![false; deps.len()];
            visited[start] = true;
            let mut chain = vec![dep.clone()];
            search(start, &deps, &mut chain, &mut visited, &mut cycles);
        }
    }

    for cycle in cycles {
        report_cycle(ctx, &cycle);
    }
}

fn search(
    start: usize,
    deps: &[Vec<ChainDep>],
    chain: &mut Vec<ChainDep>,
    visited: &mut Vec<bool>,
    cycles: &mut Vec<Vec<ChainDep>>,
) {
    let last = chain.last().expect("chain never empty").clone();
    if chain.len() >= 2 && lock_in_lockset(last.lock, &chain[0].lockset) {
        cycles.push(chain.clone());
    }
    for (t, thread_deps) in deps.iter().enumerate() {
        // the start routine is the least member of every reported cycle
        if t <= start || visited[t] {
            continue;
        }
        for dep in thread_deps {
            if !lock_in_lockset(last.lock, &dep.lockset) {
                continue;
            }
            if !chain.iter().all(|member| locksets_disjoint(&member.lockset, &dep.lockset)) {
                continue;
            }
            visited[t] = true;
            chain.push(dep.clone());
            search(start, deps, chain, visited, cycles);
            chain.pop();
            visited[t] = false;
        }
    }
}

/// Keep only requests pairwise concurrent with both neighbours; a
/// member losing every request eliminates the cycle
fn report_cycle(ctx: &mut AnalysisContext, cycle: &[ChainDep]) {
    let n = cycle.len();
    let mut representatives = Vec::with_capacity(n);
    for (i, member) in cycle.iter().enumerate() {
        let prev = &cycle[(i + n - 1) % n];
        let next = &cycle[(i + 1) % n];
        let surviving = member.requests.iter().copied().find(|&r| {
            prev.requests.iter().any(|&p| ctx.concurrent(r, p))
                && next.requests.iter().any(|&s| ctx.concurrent(r, s))
        });
        match surviving {
            Some(request) => representatives.push(request),
            None => {
                tracing::debug!(
                    routine = %member.routine,
                    lock = %member.lock.id,
                    "cycle member lost all requests, infeasible"
                );
                return;
            }
        }
    }

    // the stuck element is the latest member of the cycle
    let stuck = representatives
        .iter()
        .copied()
        .max_by_key(|&r| {
            let ev = &ctx.trace[r];
            (ev.t_pre, ev.routine, ev.index)
        })
        .expect("cycle has members");

    let secondary: Vec<_> = representatives
        .iter()
        .map(|&r| ctx.element_with_code(r, ObjectTypeCode::DeadlockCycleMember))
        .collect();
    let report = Report::new(
        Severity::Critical,
        BugKind::PotentialCyclicDeadlock,
        "stuck",
        vec![ctx.element_with_code(stuck, ObjectTypeCode::DeadlockStuckMember)],
        "cycle",
        secondary,
    );
    ctx.submit(report);
}

/// Mixed mutex/channel deadlock: a stuck acquire whose holder routine
/// is itself stuck forever on a channel operation. Reported through
/// the cyclic-deadlock kind with the channel operation as a member.
pub fn mixed_deadlock(ctx: &mut AnalysisContext) {
    let trace = ctx.trace;
    let mut findings = Vec::new();
    for (idx, ev) in trace.events().iter().enumerate() {
        let EventKind::Mutex(m) = &ev.kind else {
            continue;
        };
        if !ev.is_leaked() || !m.op.is_acquire() || m.op.is_try() {
            continue;
        }
        let Some(holder) = ctx.mutexes.get(&m.id).and_then(|s| s.holder) else {
            continue;
        };
        let holder_routine = ctx.trace[holder].routine;
        if holder_routine == ev.routine {
            continue;
        }
        let blocked_after_acquire = ctx
            .trace
            .routine(holder_routine)
            .iter()
            .copied()
            .filter(|&e| ctx.trace[e].index > ctx.trace[holder].index)
            .find(|&e| {
                ctx.trace[e].is_leaked()
                    && matches!(
                        ctx.trace[e].kind,
                        EventKind::Channel(_) | EventKind::Select(_)
                    )
            });
        if let Some(channel_op) = blocked_after_acquire {
            findings.push((EventId(idx as u32), holder, channel_op));
        }
    }

    for (stuck, holder, channel_op) in findings {
        let report = Report::new(
            Severity::Critical,
            BugKind::PotentialCyclicDeadlock,
            "stuck",
            vec![ctx.element_with_code(stuck, ObjectTypeCode::DeadlockStuckMember)],
            "cycle",
            vec![
                ctx.element_with_code(holder, ObjectTypeCode::DeadlockCycleMember),
                ctx.element_with_code(channel_op, ObjectTypeCode::DeadlockCycleMember),
            ],
        );
        ctx.submit(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_could_block_rules() {
        let a = ObjectId(1);
        assert!(LockId::write(a).could_block(LockId::write(a)));
        assert!(LockId::write(a).could_block(LockId::read(a)));
        assert!(LockId::read(a).could_block(LockId::write(a)));
        assert!(!LockId::read(a).could_block(LockId::read(a)));
        assert!(!LockId::write(a).could_block(LockId::write(ObjectId(2))));
    }

    #[test]
    fn test_lockset_tracks_reader_counts() {
        let mut tracker = LockTracker::default();
        let r = RoutineId(1);
        let lock = LockId::read(ObjectId(5));
        tracker.note_acquired(r, lock);
        tracker.note_acquired(r, lock);
        assert!(tracker.holds(r, ObjectId(5)));
        tracker.note_released(r, lock);
        assert!(tracker.holds(r, ObjectId(5)));
        tracker.note_released(r, lock);
        assert!(!tracker.holds(r, ObjectId(5)));
        assert!(!tracker.failed);
    }

    #[test]
    fn test_release_of_unheld_lock_fails_tracking() {
        let mut tracker = LockTracker::default();
        tracker.note_released(RoutineId(1), LockId::write(ObjectId(9)));
        assert!(tracker.failed);
    }

    #[test]
    fn test_requests_group_by_equal_lockset() {
        let mut tracker = LockTracker::default();
        let r = RoutineId(1);
        tracker.note_acquired(r, LockId::write(ObjectId(1)));
        tracker.note_request(r, LockId::write(ObjectId(2)), EventId(10));
        tracker.note_request(r, LockId::write(ObjectId(2)), EventId(11));
        let deps = tracker.dependencies();
        assert_eq!(deps.len(), 1);
        let (_, entries) = &deps[0];
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1.requests, vec![EventId(10), EventId(11)]);
    }

    #[test]
    fn test_request_without_held_locks_is_not_a_dependency() {
        let mut tracker = LockTracker::default();
        tracker.note_request(RoutineId(1), LockId::write(ObjectId(2)), EventId(0));
        assert!(tracker.dependencies().is_empty());
    }

    #[test]
    fn test_locksets_disjoint_respects_guard_locks() {
        let guard = LockId::write(ObjectId(7));
        let a = vec![guard, LockId::write(ObjectId(1))];
        let b = vec![guard, LockId::write(ObjectId(2))];
        assert!(!locksets_disjoint(&a, &b));

        let read_shared = vec![LockId::read(ObjectId(7)), LockId::write(ObjectId(1))];
        let read_shared_too = vec![LockId::read(ObjectId(7)), LockId::write(ObjectId(2))];
        assert!(locksets_disjoint(&read_shared, &read_shared_too));
    }
}
