//! Atomic update rules.
//!
//! Reads sync with the clock of the address's last writer; writes
//! install the current clock as the new last-writer clock. Swap and
//! compare-and-swap do both. The ordering lives in the clocks only,
//! no graph edges are inserted.

use crate::context::AnalysisContext;
use harbinger_trace::{AtomicEvent, EventId};

/// Update rule for an atomic event; the object id is the address
pub fn update_atomic(ctx: &mut AnalysisContext, id: EventId, a: &AtomicEvent) {
    let routine = ctx.trace[id].routine;

    if a.op.reads() {
        if let Some((vc, wvc)) = ctx.atomic_writer.get(&a.id).cloned() {
            ctx.sync_both(routine, &vc, &wvc);
        }
    }
    if a.op.writes() {
        let vc = ctx.vc[routine.index()].clone();
        let wvc = ctx.wvc[routine.index()].clone();
        ctx.atomic_writer.insert(a.id, (vc, wvc));
    }
    ctx.inc_both(routine);
}
