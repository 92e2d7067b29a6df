//! Leak detection.
//!
//! An operation with no post-timestamp was still blocked when the
//! recording ended. The per-event probe classifies the stuck operation
//! and looks for a *candidate partner*, an operation on the same
//! object whose clock allows a schedule in which the two meet. Stuck
//! channel operations without a partner are parked in a registry;
//! later executed operations on the same channel resolve them
//! retroactively, and the post-pass flushes whatever never found one.

use crate::context::{AnalysisContext, StuckOp};
use harbinger_order::HbRelation;
use harbinger_report::{BugKind, Report, Severity};
use harbinger_trace::{ChannelEvent, ChannelOp, EventId, EventKind, ObjectId};

/// Per-event probe, run for every event with `t_post == 0`
pub fn probe(ctx: &mut AnalysisContext, id: EventId) {
    let ev = &ctx.trace[id];
    match &ev.kind {
        EventKind::Channel(ch) => probe_channel(ctx, id, ch.clone()),
        EventKind::Select(_) => probe_select(ctx, id),
        EventKind::Mutex(m) if m.op.is_acquire() => {
            let last_acquire = ctx
                .mutexes
                .get(&m.id)
                .and_then(|s| s.last_acquire)
                .filter(|&a| a != id);
            let secondary = last_acquire
                .map(|a| vec![ctx.element(a)])
                .unwrap_or_default();
            let report = Report::new(
                Severity::Warning,
                BugKind::LeakMutex,
                "stuck",
                vec![ctx.element(id)],
                "held by",
                secondary,
            );
            ctx.submit(report);
        }
        EventKind::WaitGroup(w) if w.op == harbinger_trace::WaitGroupOp::Wait => {
            let report = Report::new(
                Severity::Warning,
                BugKind::LeakWaitGroup,
                "stuck",
                vec![ctx.element(id)],
                "",
                vec![],
            );
            ctx.submit(report);
        }
        EventKind::Cond(c) if c.op == harbinger_trace::CondOp::Wait => {
            let report = Report::new(
                Severity::Warning,
                BugKind::LeakCond,
                "stuck",
                vec![ctx.element(id)],
                "",
                vec![],
            );
            ctx.submit(report);
        }
        _ => {}
    }
}

fn probe_channel(ctx: &mut AnalysisContext, id: EventId, ch: ChannelEvent) {
    if ch.op == ChannelOp::Close {
        return;
    }
    if ch.id.is_nil() {
        let report = Report::new(
            Severity::Warning,
            BugKind::LeakNilChannel,
            "stuck",
            vec![ctx.element(id)],
            "",
            vec![],
        );
        ctx.submit(report);
        return;
    }
    if created_in_runtime_library(ctx, ch.id) {
        let report = Report::new(
            Severity::Warning,
            BugKind::LeakContext,
            "stuck",
            vec![ctx.element(id)],
            "",
            vec![],
        );
        ctx.submit(report);
        return;
    }

    if let Some(partner) = find_candidate_partner(ctx, id, ch.id, ch.op, ch.is_buffered()) {
        consume_registry_entries(ctx, ch.id, partner);
        if is_stuck_select(ctx, partner) {
            // the pair surfaces as a select leak, anchored at the select
            let report = Report::new(
                Severity::Critical,
                BugKind::LeakSelectWith,
                "stuck",
                vec![ctx.element(partner)],
                "partner",
                vec![ctx.element(id)],
            );
            ctx.submit(report);
        } else {
            let kind = if ch.is_buffered() {
                BugKind::LeakBufferedWith
            } else {
                BugKind::LeakUnbufferedWith
            };
            let report = Report::new(
                Severity::Critical,
                kind,
                "stuck",
                vec![ctx.element(id)],
                "partner",
                vec![ctx.element(partner)],
            );
            ctx.submit(report);
        }
        return;
    }

    if let Some(stuck) = take_stuck_partner(ctx, id, ch.id, ch.op) {
        let (kind, primary, secondary) = if stuck.from_select {
            (BugKind::LeakSelectWith, stuck.event, id)
        } else if ch.is_buffered() {
            (BugKind::LeakBufferedWith, id, stuck.event)
        } else {
            (BugKind::LeakUnbufferedWith, id, stuck.event)
        };
        let report = Report::new(
            Severity::Critical,
            kind,
            "stuck",
            vec![ctx.element(primary)],
            "partner",
            vec![ctx.element(secondary)],
        );
        ctx.submit(report);
        return;
    }

    ctx.leaking_channels.entry(ch.id).or_default().push(StuckOp {
        event: id,
        op: ch.op,
        buffered: ch.is_buffered(),
        from_select: false,
    });
    tracing::debug!(channel = %ch.id, event = %id, "stuck channel operation registered");
}

fn probe_select(ctx: &mut AnalysisContext, id: EventId) {
    let EventKind::Select(sel) = &ctx.trace[id].kind else {
        return;
    };
    let cases: Vec<_> = sel
        .cases
        .iter()
        .map(|c| (c.channel, c.op, c.is_buffered()))
        .collect();

    for (channel, op, buffered) in &cases {
        let partner = match find_candidate_partner(ctx, id, *channel, *op, *buffered) {
            Some(partner) => {
                consume_registry_entries(ctx, *channel, partner);
                Some(partner)
            }
            None => take_stuck_partner(ctx, id, *channel, *op).map(|stuck| stuck.event),
        };
        if let Some(partner) = partner {
            let report = Report::new(
                Severity::Critical,
                BugKind::LeakSelectWith,
                "stuck",
                vec![ctx.element(id)],
                "partner",
                vec![ctx.element(partner)],
            );
            ctx.submit(report);
            return;
        }
    }

    for (channel, op, buffered) in cases {
        if channel.is_nil() {
            continue;
        }
        ctx.leaking_channels.entry(channel).or_default().push(StuckOp {
            event: id,
            op,
            buffered,
            from_select: true,
        });
    }
}

/// Candidate partner for a stuck channel-side operation: a concurrent
/// opposite operation in another routine, or, for a stuck buffered
/// recv, a message still queued in the buffer
fn find_candidate_partner(
    ctx: &AnalysisContext,
    stuck: EventId,
    channel: ObjectId,
    op: ChannelOp,
    buffered: bool,
) -> Option<EventId> {
    let own = ctx.trace[stuck].routine;
    let candidate = ctx
        .recent_ops_elsewhere(own, channel, op.opposite())
        .into_iter()
        .find(|&other| ctx.concurrent(stuck, other));
    if candidate.is_some() {
        return candidate;
    }
    if buffered && op == ChannelOp::Recv {
        if let Some(state) = ctx.channels.get(&channel) {
            let stuck_wvc = ctx.stamps.wvc(stuck)?;
            return state
                .slots
                .iter()
                .find(|slot| {
                    matches!(
                        slot.wvc.relation(stuck_wvc),
                        HbRelation::Before | HbRelation::Concurrent
                    )
                })
                .map(|slot| slot.event);
        }
    }
    None
}

/// A registered stuck operation of the opposite direction whose clock
/// is concurrent with the probe pairs the two stuck sides with each
/// other; the registry entry is consumed so only one report surfaces
fn take_stuck_partner(
    ctx: &mut AnalysisContext,
    stuck: EventId,
    channel: ObjectId,
    op: ChannelOp,
) -> Option<StuckOp> {
    let entries = ctx.leaking_channels.get(&channel)?;
    let idx = entries
        .iter()
        .position(|e| e.op == op.opposite() && e.event != stuck && ctx.concurrent(stuck, e.event))?;
    let entries = ctx.leaking_channels.get_mut(&channel)?;
    let partner = entries.remove(idx);
    if entries.is_empty() {
        ctx.leaking_channels.remove(&channel);
    }
    Some(partner)
}

/// Drop every registry entry belonging to an event that just became a
/// reported partner, so it does not surface a second time
fn consume_registry_entries(ctx: &mut AnalysisContext, channel: ObjectId, partner: EventId) {
    if let Some(entries) = ctx.leaking_channels.get_mut(&channel) {
        entries.retain(|e| e.event != partner);
        if entries.is_empty() {
            ctx.leaking_channels.remove(&channel);
        }
    }
}

fn is_stuck_select(ctx: &AnalysisContext, event: EventId) -> bool {
    ctx.trace[event].is_leaked() && matches!(ctx.trace[event].kind, EventKind::Select(_))
}

/// Retroactive resolution: an executed operation on a channel unsticks
/// a registered opposite operation
pub fn try_resolve(ctx: &mut AnalysisContext, channel: ObjectId, op: ChannelOp, event: EventId) {
    let Some(entries) = ctx.leaking_channels.get_mut(&channel) else {
        return;
    };
    let Some(idx) = entries.iter().position(|e| e.op == op.opposite()) else {
        return;
    };
    let stuck = entries.remove(idx);
    if entries.is_empty() {
        ctx.leaking_channels.remove(&channel);
    }
    let kind = if stuck.from_select {
        BugKind::LeakSelectWith
    } else if stuck.buffered {
        BugKind::LeakBufferedWith
    } else {
        BugKind::LeakUnbufferedWith
    };
    let report = Report::new(
        Severity::Critical,
        kind,
        "stuck",
        vec![ctx.element(stuck.event)],
        "partner",
        vec![ctx.element(event)],
    );
    ctx.submit(report);
}

/// Post-pass: flush stuck operations that never found a partner and
/// scan for routines blocked outside any recorded operation
pub fn finalize(ctx: &mut AnalysisContext) {
    let entries: Vec<(ObjectId, Vec<StuckOp>)> = ctx.leaking_channels.drain().collect();
    for (_, stuck_ops) in entries {
        for stuck in stuck_ops {
            if stuck.from_select {
                // the partner rerun may have found one in the meantime
                let partner = ctx
                    .select_cases
                    .iter()
                    .filter(|rec| rec.select == stuck.event)
                    .find_map(|rec| rec.partner);
                let (kind, secondary) = match partner {
                    Some(p) => (BugKind::LeakSelectWith, vec![ctx.element(p)]),
                    None => (BugKind::LeakSelectWithout, vec![]),
                };
                let severity = if partner.is_some() {
                    Severity::Critical
                } else {
                    Severity::Warning
                };
                let report = Report::new(
                    severity,
                    kind,
                    "stuck",
                    vec![ctx.element(stuck.event)],
                    "partner",
                    secondary,
                );
                ctx.submit(report);
            } else {
                let kind = if stuck.buffered {
                    BugKind::LeakBufferedWithout
                } else {
                    BugKind::LeakUnbufferedWithout
                };
                let report = Report::new(
                    Severity::Warning,
                    kind,
                    "stuck",
                    vec![ctx.element(stuck.event)],
                    "",
                    vec![],
                );
                ctx.submit(report);
            }
        }
    }

    stuck_routine_scan(ctx);
}

/// A routine whose last recorded event completed but that never ended
/// is blocked somewhere the recorder could not see
fn stuck_routine_scan(ctx: &mut AnalysisContext) {
    for routine in ctx.trace.routine_ids() {
        let Some(last) = ctx.trace.last_of_routine(routine) else {
            continue;
        };
        if ctx.trace[last].is_leaked() || ctx.trace.routine_ended(routine) {
            continue;
        }
        let report = Report::new(
            Severity::Information,
            BugKind::LeakUnknown,
            "last event",
            vec![ctx.element(last)],
            "",
            vec![],
        );
        ctx.submit(report);
    }
}

fn created_in_runtime_library(ctx: &AnalysisContext, channel: ObjectId) -> bool {
    ctx.new_elems
        .get(&channel)
        .map(|&e| {
            let file = &ctx.trace[e].pos.file;
            file.split('/').any(|seg| seg == "context" || seg == "time")
        })
        .unwrap_or(false)
}
