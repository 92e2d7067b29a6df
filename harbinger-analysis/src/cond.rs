//! Condition-variable update rules.
//!
//! Waits queue up per cond id; a signal wakes the oldest waiter and
//! orders the waiter's continuation after the signaler, a broadcast
//! wakes them all.

use crate::context::AnalysisContext;
use harbinger_trace::{CondEvent, CondOp, EventId};

/// Update rule for a cond event
pub fn update_cond(ctx: &mut AnalysisContext, id: EventId, c: &CondEvent) {
    let routine = ctx.trace[id].routine;
    match c.op {
        CondOp::Wait => {
            // a wait still blocked at the end of the recording was
            // never woken, so no signal may pop it
            if !ctx.trace[id].is_leaked() {
                ctx.cond_waiting.entry(c.id).or_default().push_back(id);
            }
            ctx.inc_both(routine);
        }
        CondOp::Signal => {
            let woken = ctx
                .cond_waiting
                .get_mut(&c.id)
                .and_then(|queue| queue.pop_front());
            if let Some(wait_event) = woken {
                wake(ctx, id, wait_event);
            }
            ctx.inc_both(routine);
        }
        CondOp::Broadcast => {
            let woken: Vec<EventId> = ctx
                .cond_waiting
                .get_mut(&c.id)
                .map(|queue| queue.drain(..).collect())
                .unwrap_or_default();
            for wait_event in woken {
                wake(ctx, id, wait_event);
            }
            ctx.inc_both(routine);
        }
    }
}

/// Order the waiter's continuation after the signaling event. The
/// ordering is carried by the clocks alone; the wait was stamped long
/// before the signal ran, so no graph edge is inserted.
fn wake(ctx: &mut AnalysisContext, signal: EventId, wait_event: EventId) {
    let signaler = ctx.trace[signal].routine;
    let waiter = ctx.trace[wait_event].routine;
    let vc = ctx.vc[signaler.index()].clone();
    let wvc = ctx.wvc[signaler.index()].clone();
    ctx.sync_both(waiter, &vc, &wvc);
}
