//! Mutex and rw-mutex update rules.
//!
//! Acquires synchronize with the recorded release points: a write
//! acquire orders after both the last write-release and the
//! accumulated read-releases, a read acquire only after the last
//! write-release. The weak must-HB clocks never take these syncs;
//! critical-section ordering is observed, not forced. With
//! `ignore_critical_sections` even the strong clocks skip them,
//! which widens the set of candidate concurrent events.

use crate::context::{AnalysisContext, Release};
use crate::deadlock::LockId;
use harbinger_fuzz::FeedbackKind;
use harbinger_trace::{EventId, MutexEvent, MutexOp};

/// Update rule for a mutex event
pub fn update_mutex(ctx: &mut AnalysisContext, id: EventId, m: &MutexEvent) {
    if m.op.is_acquire() {
        update_acquire(ctx, id, m);
    } else {
        update_release(ctx, id, m);
    }
}

fn update_acquire(ctx: &mut AnalysisContext, id: EventId, m: &MutexEvent) {
    let routine = ctx.trace[id].routine;
    let lock = LockId {
        id: m.id,
        read: m.op.is_read(),
    };

    // blocking acquires are deadlock requests, stuck or not
    if !m.op.is_try() {
        ctx.locks.note_request(routine, lock, id);
    }

    if ctx.trace[id].is_leaked() {
        ctx.inc_both(routine);
        return;
    }
    if m.op.is_try() && !m.success {
        ctx.inc_both(routine);
        return;
    }

    if ctx.opts.fuzzing {
        let last = ctx.mutexes.get(&m.id).and_then(|s| s.last_acquire);
        if let Some(last) = last {
            if ctx.concurrent(id, last) {
                let element = ctx.element(id);
                ctx.feedback.record(FeedbackKind::Mutex, element, 1);
            }
        }
    }

    if !ctx.opts.ignore_critical_sections {
        let releases: Vec<Release> = {
            let state = ctx.mutexes.get(&m.id);
            let rel_w = state.and_then(|s| s.rel_w.clone());
            let rel_r = if m.op.is_read() {
                None
            } else {
                state.and_then(|s| s.rel_r.clone())
            };
            rel_w.into_iter().chain(rel_r).collect()
        };
        for release in releases {
            ctx.sync_strong(routine, &release.vc);
            ctx.add_edge_strong(release.event, id);
        }
    }

    ctx.inc_both(routine);

    let state = ctx.mutex_mut(m.id);
    state.holder = Some(id);
    state.last_acquire = Some(id);
    state.acquires.push(id);
    ctx.locks.note_acquired(routine, lock);
}

fn update_release(ctx: &mut AnalysisContext, id: EventId, m: &MutexEvent) {
    let routine = ctx.trace[id].routine;
    if ctx.trace[id].is_leaked() {
        return;
    }

    let current = ctx.vc[routine.index()].clone();
    match m.op {
        MutexOp::Unlock => {
            let state = ctx.mutex_mut(m.id);
            state.rel_w = Some(Release {
                event: id,
                vc: current.clone(),
            });
            state.rel_r = Some(Release {
                event: id,
                vc: current,
            });
            state.holder = None;
        }
        MutexOp::RUnlock => {
            let state = ctx.mutex_mut(m.id);
            // readers accumulate into the read-release clock
            match &mut state.rel_r {
                Some(release) => {
                    release.vc.sync(&current);
                    release.event = id;
                }
                None => {
                    state.rel_r = Some(Release {
                        event: id,
                        vc: current,
                    });
                }
            }
        }
        _ => {}
    }

    ctx.inc_both(routine);
    ctx.mutex_mut(m.id).releases.push(id);
    ctx.locks.note_released(
        routine,
        LockId {
            id: m.id,
            read: m.op.is_read(),
        },
    );
    if m.op == MutexOp::RUnlock && !ctx.locks.holds(routine, m.id) {
        ctx.mutex_mut(m.id).holder = None;
    }
}
