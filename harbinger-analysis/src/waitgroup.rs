//! Wait-group update rules.
//!
//! Counter changes chain through the latest change on the same group;
//! a wait orders after the latest change. Adds and dones also feed the
//! done-before-add flow analysis (`flow.rs`).

use crate::context::AnalysisContext;
use harbinger_trace::{EventId, WaitGroupEvent, WaitGroupOp};

/// Update rule for a wait-group event
pub fn update_wait_group(ctx: &mut AnalysisContext, id: EventId, w: &WaitGroupEvent) {
    let routine = ctx.trace[id].routine;
    match w.op {
        WaitGroupOp::Change => {
            sync_with_last_change(ctx, id, w);
            let vc = ctx.vc[routine.index()].clone();
            let wvc = ctx.wvc[routine.index()].clone();
            let state = ctx.wait_group_mut(w.id);
            state.last_change = Some((id, vc, wvc));
            if w.is_add() {
                state.adds.push(id);
            } else if w.is_done() {
                state.dones.push(id);
            }
            ctx.inc_both(routine);
        }
        WaitGroupOp::Wait => {
            if ctx.trace[id].is_leaked() {
                ctx.inc_both(routine);
                return;
            }
            sync_with_last_change(ctx, id, w);
            ctx.inc_both(routine);
        }
    }
}

fn sync_with_last_change(ctx: &mut AnalysisContext, id: EventId, w: &WaitGroupEvent) {
    let routine = ctx.trace[id].routine;
    let previous = ctx
        .wait_groups
        .get(&w.id)
        .and_then(|s| s.last_change.clone());
    if let Some((prev_event, prev_vc, prev_wvc)) = previous {
        ctx.sync_both(routine, &prev_vc, &prev_wvc);
        ctx.add_edge_both(prev_event, id);
    }
}
