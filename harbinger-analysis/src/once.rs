//! Once update rules.
//!
//! The winning execution is recorded; every losing call orders after
//! the winner. A loser concurrent with its winner is a fact the fuzzer
//! can exploit (the winner could have been the other call).

use crate::context::AnalysisContext;
use harbinger_fuzz::FeedbackKind;
use harbinger_trace::{EventId, OnceEvent};

/// Update rule for a once event
pub fn update_once(ctx: &mut AnalysisContext, id: EventId, o: &OnceEvent) {
    let routine = ctx.trace[id].routine;
    if o.success {
        let vc = ctx.vc[routine.index()].clone();
        let wvc = ctx.wvc[routine.index()].clone();
        ctx.once_winner.insert(o.id, (id, vc, wvc));
    } else if let Some((winner, vc, wvc)) = ctx.once_winner.get(&o.id).cloned() {
        if ctx.opts.fuzzing && ctx.concurrent(id, winner) {
            let element = ctx.element(id);
            ctx.feedback.record(FeedbackKind::Once, element, 1);
        }
        ctx.sync_both(routine, &vc, &wvc);
        ctx.add_edge_both(winner, id);
    }
    ctx.inc_both(routine);
}
