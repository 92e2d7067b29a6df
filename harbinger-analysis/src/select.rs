//! Select statements: clock updates and partner analysis.
//!
//! Every case of every select is recorded in a table. Channel
//! operations observed during the run probe the table and mark cases
//! whose clocks admit a pairing; after the main pass the whole trace
//! is re-scanned so partners observed *before* their select was
//! processed are picked up too, and cases are finally paired across
//! selects. Cases that never find a partner surface through the leak
//! path.

use crate::channel::{self, ChanOpView};
use crate::context::AnalysisContext;
use crate::leak;
use harbinger_order::HbRelation;
use harbinger_report::{BugKind, Report, Severity};
use harbinger_trace::{ChannelOp, EventId, EventKind, ObjectId, SelectEvent};

/// One recorded select case
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectCaseRecord {
    pub select: EventId,
    pub case_index: usize,
    pub channel: ObjectId,
    pub op: ChannelOp,
    pub buffered: bool,
    /// Matching operation found by the partner probes
    pub partner: Option<EventId>,
}

/// Update rule for a select event
pub fn update_select(ctx: &mut AnalysisContext, id: EventId) {
    let EventKind::Select(sel) = &ctx.trace[id].kind else {
        return;
    };
    let sel: SelectEvent = sel.clone();
    let routine = ctx.trace[id].routine;
    let chosen = usize::try_from(sel.chosen_index).ok();

    // every case, chosen or not, enters the partner table and counts
    // as a candidate operation on its channel
    for (case_index, case) in sel.cases.iter().enumerate() {
        ctx.select_cases.push(SelectCaseRecord {
            select: id,
            case_index,
            channel: case.channel,
            op: case.op,
            buffered: case.is_buffered(),
            partner: None,
        });
        ctx.note_channel_op(routine, case.channel, case.op, id);

        if Some(case_index) != chosen {
            potential_closed_case(ctx, id, case.channel, case.op);
        }
    }

    if ctx.paired.remove(&id) {
        // clock work ran when the partner paired with the chosen case
        return;
    }

    let executed_case = (!ctx.trace[id].is_leaked())
        .then_some(chosen)
        .flatten()
        .and_then(|i| sel.cases.get(i));
    match executed_case {
        Some(case) => {
            let view = ChanOpView {
                id: case.channel,
                op: case.op,
                op_id: case.op_id,
                q_size: case.q_size,
                partner: case.partner,
            };
            channel::channel_op(ctx, id, view);
        }
        None => {
            // default case, or still blocked at the end of the recording
            ctx.inc_both(routine);
        }
    }
}

/// A non-chosen case on an already-closed channel is a potential
/// closed-channel operation under another schedule
fn potential_closed_case(ctx: &mut AnalysisContext, id: EventId, channel: ObjectId, op: ChannelOp) {
    let Some(&close) = ctx.close_data.get(&channel) else {
        return;
    };
    let (enabled, kind, severity) = match op {
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
    let report = Report::new(
        severity,
        kind,
        "select case",
        vec![ctx.element(id)],
        "close",
        vec![ctx.element(close)],
    );
    ctx.submit(report);
}

/// Mark recorded cases that the observed operation could pair with
pub fn probe_partner(ctx: &mut AnalysisContext, channel: ObjectId, op: ChannelOp, event: EventId) {
    let mut records = std::mem::take(&mut ctx.select_cases);
    for rec in records.iter_mut() {
        if rec.partner.is_some()
            || rec.select == event
            || rec.channel != channel
            || rec.op != op.opposite()
        {
            continue;
        }
        if case_matches(ctx, rec, event) {
            rec.partner = Some(event);
        }
    }
    ctx.select_cases = records;
}

/// Pairing condition by bufferedness: unbuffered cases need a
/// concurrent partner; a buffered send-side case pairs with a recv
/// concurrent with or after it, a buffered recv-side case with a send
/// concurrent with or before it
fn case_matches(ctx: &AnalysisContext, rec: &SelectCaseRecord, event: EventId) -> bool {
    let (Some(case_clock), Some(op_clock)) =
        (ctx.stamps.wvc(rec.select), ctx.stamps.wvc(event))
    else {
        return false;
    };
    let relation = case_clock.relation(op_clock);
    if !rec.buffered {
        return relation == HbRelation::Concurrent;
    }
    match rec.op {
        ChannelOp::Send => matches!(relation, HbRelation::Concurrent | HbRelation::Before),
        ChannelOp::Recv => matches!(relation, HbRelation::Concurrent | HbRelation::After),
        ChannelOp::Close => false,
    }
}

/// Post-pass rerun: re-probe the table with every executed channel
/// operation and chosen select case, then pair cases across selects
pub fn rerun(ctx: &mut AnalysisContext) {
    let trace = ctx.trace;
    for (idx, ev) in trace.events().iter().enumerate() {
        if ev.is_leaked() {
            continue;
        }
        let event = EventId(idx as u32);
        match &ev.kind {
            EventKind::Channel(ch) if ch.op != ChannelOp::Close => {
                probe_partner_rerun(ctx, ch.id, ch.op, event);
            }
            EventKind::Select(sel) => {
                if let Some(case) = sel.chosen_case() {
                    probe_partner_rerun(ctx, case.channel, case.op, event);
                }
            }
            _ => {}
        }
    }
    cross_pairing(ctx);
}

fn probe_partner_rerun(ctx: &mut AnalysisContext, channel: ObjectId, op: ChannelOp, event: EventId) {
    probe_partner(ctx, channel, op, event);
    // executed operations may also resolve a registered stuck select
    leak::try_resolve(ctx, channel, op, event);
}

/// Pair cases of different selects against each other
fn cross_pairing(ctx: &mut AnalysisContext) {
    let mut records = std::mem::take(&mut ctx.select_cases);
    for i in 0..records.len() {
        for j in (i + 1)..records.len() {
            if records[i].select == records[j].select
                || records[i].channel != records[j].channel
                || records[i].op != records[j].op.opposite()
            {
                continue;
            }
            let (send_side, recv_side) = if records[i].op == ChannelOp::Send {
                (i, j)
            } else {
                (j, i)
            };
            if !selects_match(ctx, &records[send_side], &records[recv_side]) {
                continue;
            }
            let (si, sj) = (records[i].select, records[j].select);
            if records[i].partner.is_none() {
                records[i].partner = Some(sj);
            }
            if records[j].partner.is_none() {
                records[j].partner = Some(si);
            }
        }
    }
    ctx.select_cases = records;
}

fn selects_match(
    ctx: &AnalysisContext,
    send_case: &SelectCaseRecord,
    recv_case: &SelectCaseRecord,
) -> bool {
    let (Some(send_clock), Some(recv_clock)) = (
        ctx.stamps.wvc(send_case.select),
        ctx.stamps.wvc(recv_case.select),
    ) else {
        return false;
    };
    let relation = send_clock.relation(recv_clock);
    if !send_case.buffered {
        relation == HbRelation::Concurrent
    } else {
        matches!(relation, HbRelation::Concurrent | HbRelation::Before)
    }
}
