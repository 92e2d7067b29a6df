//! Channel update rules and the closed-channel analysis.
//!
//! Unbuffered operations carry a partner link and synchronize both
//! routines pairwise at whichever partner the total order reaches
//! first. Buffered operations go through per-channel slots matched by
//! the channel ordinal; sends observed while the buffer was full and
//! recvs observed while it was empty are parked and settled once the
//! buffer moves. Close events feed the closed-channel probes.

use crate::context::{AnalysisContext, BufferSlot};
use crate::leak;
use crate::select;
use harbinger_fuzz::FeedbackKind;
use harbinger_report::{BugKind, Report, Severity};
use harbinger_trace::{ChannelEvent, ChannelOp, EventId, ObjectId, RoutineId};

/// A channel-side operation: either a plain channel event or the
/// chosen case of a select
#[derive(Debug, Clone, Copy)]
pub struct ChanOpView {
    pub id: ObjectId,
    pub op: ChannelOp,
    pub op_id: u64,
    pub q_size: u64,
    pub partner: Option<EventId>,
}

impl From<&ChannelEvent> for ChanOpView {
    fn from(ch: &ChannelEvent) -> Self {
        Self {
            id: ch.id,
            op: ch.op,
            op_id: ch.op_id,
            q_size: ch.q_size,
            partner: ch.partner,
        }
    }
}

/// Update rule for a channel event
pub fn update_channel(ctx: &mut AnalysisContext, id: EventId, ch: &ChannelEvent) {
    match ch.op {
        ChannelOp::Close => update_close(ctx, id, ch),
        ChannelOp::Send | ChannelOp::Recv => channel_op(ctx, id, ChanOpView::from(ch)),
    }
}

/// Shared send/recv rule
pub fn channel_op(ctx: &mut AnalysisContext, id: EventId, view: ChanOpView) {
    let routine = ctx.trace[id].routine;
    let leaked = ctx.trace[id].is_leaked();

    if !leaked {
        check_against_close(ctx, id, &view);
        if view.op == ChannelOp::Recv && ctx.opts.analyses.concurrent_recv {
            concurrent_recv_probe(ctx, id, view.id, routine);
        }
        if view.op == ChannelOp::Send && ctx.opts.fuzzing {
            concurrent_send_feedback(ctx, id, view.id, routine);
        }
        if ctx.opts.analyses.leak {
            leak::try_resolve(ctx, view.id, view.op, id);
        }
        select::probe_partner(ctx, view.id, view.op, id);
        ctx.note_channel_op(routine, view.id, view.op, id);
    }

    if ctx.paired.remove(&id) {
        // clock work already ran when the partner paired with us
        return;
    }
    if leaked {
        ctx.inc_both(routine);
        return;
    }
    if view.q_size == 0 {
        unbuffered_op(ctx, id, view, routine);
    } else {
        buffered_op(ctx, id, view, routine);
    }
}

/// Synchronous pairing: both routines sync pairwise, both advance, and
/// the pairing is recorded in both directions
fn unbuffered_op(ctx: &mut AnalysisContext, id: EventId, view: ChanOpView, routine: RoutineId) {
    let Some(partner) = view.partner else {
        // executed, but the recording carries no pairing
        ctx.inc_both(routine);
        return;
    };

    let partner_routine = ctx.trace[partner].routine;
    // the partner is stamped with its pre-sync clocks here; when the
    // total order reaches it, only its bookkeeping probes run
    ctx.stamps.set(
        partner,
        ctx.vc[partner_routine.index()].clone(),
        ctx.wvc[partner_routine.index()].clone(),
    );

    let (a, b) = (routine.index(), partner_routine.index());
    if a != b {
        let own_vc = ctx.vc[a].clone();
        let own_wvc = ctx.wvc[a].clone();
        let other_vc = ctx.vc[b].clone();
        let other_wvc = ctx.wvc[b].clone();
        ctx.vc[a].sync(&other_vc);
        ctx.wvc[a].sync(&other_wvc);
        ctx.vc[b].sync(&own_vc);
        ctx.wvc[b].sync(&own_wvc);
    }
    ctx.inc_both(routine);
    if partner_routine != routine {
        ctx.inc_both(partner_routine);
    }

    ctx.add_edge_both(id, partner);
    ctx.add_edge_both(partner, id);
    ctx.paired.insert(partner);
}

/// Buffered slot matching by channel ordinal
fn buffered_op(ctx: &mut AnalysisContext, id: EventId, view: ChanOpView, routine: RoutineId) {
    match view.op {
        ChannelOp::Send => {
            let full = {
                let state = ctx.channel_mut(view.id, view.q_size);
                state.slots.len() >= view.q_size as usize
            };
            if full {
                ctx.channels
                    .get_mut(&view.id)
                    .expect("channel state exists")
                    .hold_send
                    .push_back(id);
                tracing::debug!(channel = %view.id, event = %id, "send deferred, buffer full");
            } else {
                let slot = BufferSlot {
                    op_id: view.op_id,
                    vc: ctx.vc[routine.index()].clone(),
                    wvc: ctx.wvc[routine.index()].clone(),
                    sender: routine,
                    event: id,
                };
                ctx.channels
                    .get_mut(&view.id)
                    .expect("channel state exists")
                    .slots
                    .push_back(slot);
            }
            if ctx.opts.assume_fifo_channels {
                fifo_sync(ctx, routine, view.id, ChannelOp::Send);
            }
            ctx.inc_both(routine);
            if !full {
                settle(ctx, view.id);
            }
        }
        ChannelOp::Recv => {
            let slot = {
                let state = ctx.channel_mut(view.id, view.q_size);
                state
                    .slots
                    .iter()
                    .position(|s| s.op_id == view.op_id)
                    .and_then(|idx| state.slots.remove(idx))
            };
            match slot {
                None => {
                    ctx.channels
                        .get_mut(&view.id)
                        .expect("channel state exists")
                        .hold_recv
                        .push_back(id);
                    tracing::debug!(channel = %view.id, event = %id, "recv deferred, buffer empty");
                    ctx.inc_both(routine);
                }
                Some(slot) => {
                    ctx.sync_both(routine, &slot.vc, &slot.wvc);
                    ctx.add_edge_both(slot.event, id);
                    if ctx.opts.assume_fifo_channels {
                        fifo_sync(ctx, routine, view.id, ChannelOp::Recv);
                    }
                    ctx.inc_both(routine);
                    settle(ctx, view.id);
                }
            }
        }
        ChannelOp::Close => {}
    }
}

/// FIFO assumption: a total order over the sends (and over the recvs)
/// of one channel, carried by the strong clocks only
fn fifo_sync(ctx: &mut AnalysisContext, routine: RoutineId, id: ObjectId, op: ChannelOp) {
    let prev = ctx.channels.get(&id).and_then(|s| match op {
        ChannelOp::Send => s.last_send_vc.clone(),
        ChannelOp::Recv => s.last_recv_vc.clone(),
        ChannelOp::Close => None,
    });
    if let Some(prev) = prev {
        ctx.sync_strong(routine, &prev);
    }
    let current = ctx.vc[routine.index()].clone();
    let state = ctx.channel_mut(id, 0);
    match op {
        ChannelOp::Send => state.last_send_vc = Some(current),
        ChannelOp::Recv => state.last_recv_vc = Some(current),
        ChannelOp::Close => {}
    }
}

/// Drain deferred operations while the buffer permits: held sends move
/// into freed slots, held recvs consume matching slots
fn settle(ctx: &mut AnalysisContext, id: ObjectId) {
    loop {
        let mut progress = false;

        let free_slot = ctx
            .channels
            .get(&id)
            .map(|s| !s.hold_send.is_empty() && s.slots.len() < s.size as usize)
            .unwrap_or(false);
        if free_slot {
            let state = ctx.channels.get_mut(&id).expect("channel state exists");
            let held = state.hold_send.pop_front().expect("hold_send non-empty");
            let (op_id, sender) = match &ctx.trace[held].kind {
                harbinger_trace::EventKind::Channel(ch) => (ch.op_id, ctx.trace[held].routine),
                _ => (0, ctx.trace[held].routine),
            };
            let vc = ctx.stamps.vc(held).cloned().unwrap_or_default();
            let wvc = ctx.stamps.wvc(held).cloned().unwrap_or_default();
            ctx.channels
                .get_mut(&id)
                .expect("channel state exists")
                .slots
                .push_back(BufferSlot {
                    op_id,
                    vc,
                    wvc,
                    sender,
                    event: held,
                });
            progress = true;
        }

        let matched = ctx.channels.get(&id).and_then(|state| {
            state.hold_recv.iter().enumerate().find_map(|(ri, &recv)| {
                state
                    .slots
                    .iter()
                    .position(|s| {
                        matches!(&ctx.trace[recv].kind,
                            harbinger_trace::EventKind::Channel(ch) if ch.op_id == s.op_id)
                    })
                    .map(|si| (ri, si))
            })
        });
        if let Some((ri, si)) = matched {
            let state = ctx.channels.get_mut(&id).expect("channel state exists");
            let recv = state.hold_recv.remove(ri).expect("held recv exists");
            let slot = state.slots.remove(si).expect("slot exists");
            let recv_routine = ctx.trace[recv].routine;
            ctx.sync_both(recv_routine, &slot.vc, &slot.wvc);
            ctx.add_edge_both(slot.event, recv);
            progress = true;
        }

        if !progress {
            return;
        }
    }
}

/// Probe an executed send/recv against a recorded close on the channel
fn check_against_close(ctx: &mut AnalysisContext, id: EventId, view: &ChanOpView) {
    let Some(&close) = ctx.close_data.get(&view.id) else {
        return;
    };
    if ordered_before(ctx, id, close) {
        return;
    }
    emit_closed_channel(ctx, id, close, view.op);
}

/// Close rule: close-on-closed, then record the close and probe the
/// recorded most-recent operations against it
fn update_close(ctx: &mut AnalysisContext, id: EventId, ch: &ChannelEvent) {
    let routine = ctx.trace[id].routine;

    if ctx.opts.analyses.close_on_closed {
        if let Some(&previous) = ctx.close_data.get(&ch.id) {
            let report = Report::new(
                Severity::Critical,
                BugKind::ActualCloseOnClosed,
                "close",
                vec![ctx.element(id)],
                "closed before at",
                vec![ctx.element(previous)],
            );
            ctx.submit(report);
        }
    }

    ctx.inc_both(routine);
    ctx.close_data.insert(ch.id, id);

    for send in ctx.recent_ops(ch.id, ChannelOp::Send) {
        if !ordered_before(ctx, send, id) {
            emit_closed_channel(ctx, send, id, ChannelOp::Send);
        }
    }
    for recv in ctx.recent_ops(ch.id, ChannelOp::Recv) {
        if !ordered_before(ctx, recv, id) {
            emit_closed_channel(ctx, recv, id, ChannelOp::Recv);
        }
    }
}

fn emit_closed_channel(ctx: &mut AnalysisContext, op: EventId, close: EventId, dir: ChannelOp) {
    let (enabled, kind, severity) = match dir {
        ChannelOp::Send => (
            ctx.opts.analyses.send_on_closed,
            BugKind::PotentialSendOnClosed,
            Severity::Critical,
        ),
        ChannelOp::Recv => (
            ctx.opts.analyses.recv_on_closed,
            BugKind::PotentialRecvOnClosed,
            Severity::Warning,
        ),
        ChannelOp::Close => return,
    };
    if !enabled {
        return;
    }
    let label = if dir == ChannelOp::Send { "send" } else { "recv" };
    let report = Report::new(
        severity,
        kind,
        label,
        vec![ctx.element(op)],
        "close",
        vec![ctx.element(close)],
    );
    ctx.submit(report);
}

/// Compare strong stamps; unstamped events are never ordered
fn ordered_before(ctx: &AnalysisContext, a: EventId, b: EventId) -> bool {
    match (ctx.stamps.vc(a), ctx.stamps.vc(b)) {
        (Some(x), Some(y)) => x.is_before(y),
        _ => false,
    }
}

/// Warn about recvs on the channel concurrent with this one, and feed
/// the fuzzer on the first hit
fn concurrent_recv_probe(ctx: &mut AnalysisContext, id: EventId, channel: ObjectId, routine: RoutineId) {
    let hits: Vec<EventId> = ctx
        .recent_ops_elsewhere(routine, channel, ChannelOp::Recv)
        .into_iter()
        .filter(|&other| ctx.concurrent(id, other))
        .collect();
    for &other in &hits {
        let report = Report::new(
            Severity::Warning,
            BugKind::ActualConcurrentRecv,
            "recv",
            vec![ctx.element(id)],
            "concurrent recv",
            vec![ctx.element(other)],
        );
        ctx.submit(report);
    }
    if ctx.opts.fuzzing && !hits.is_empty() {
        let element = ctx.element(id);
        ctx.feedback
            .record(FeedbackKind::Recv, element, hits.len() as u64);
    }
}

fn concurrent_send_feedback(ctx: &mut AnalysisContext, id: EventId, channel: ObjectId, routine: RoutineId) {
    let hits = ctx
        .recent_ops_elsewhere(routine, channel, ChannelOp::Send)
        .into_iter()
        .filter(|&other| ctx.concurrent(id, other))
        .count();
    if hits > 0 {
        let element = ctx.element(id);
        ctx.feedback.record(FeedbackKind::Send, element, hits as u64);
    }
}
