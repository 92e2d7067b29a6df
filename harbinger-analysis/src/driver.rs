//! The HB analysis driver.
//!
//! One pass over the trace in total order: program-order edges, clock
//! stamping, per-variant update rules and per-event probes. The
//! post-passes then interpret the accumulated state: select-partner
//! rerun, leak finalization, the two flow analyses and the deadlock
//! cycle search. Each post-pass runs behind a panic shield so an
//! unexpected crash in one analysis cancels that analysis only, and
//! the cancellation token is polled between event batches and between
//! post-passes.

use crate::cancel::CancelToken;
use crate::context::AnalysisContext;
use crate::options::AnalysisOptions;
use crate::{atomic, channel, cond, deadlock, flow, leak, mutex, once, select, waitgroup};
use crate::{AnalysisError, AnalysisResult};
use harbinger_fuzz::FuzzFeedback;
use harbinger_order::{ClockStamps, Csst, CsstQuery, GraphQuery, HbGraph, VectorClockQuery};
use harbinger_report::Report;
use harbinger_trace::{EventId, EventKind, Trace};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// How many events run between two cancellation polls
const CANCEL_POLL_BATCH: usize = 1024;

/// Results and derived HB state of one run
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub reports: Vec<Report>,
    pub feedback: FuzzFeedback,
    pub stamps: ClockStamps,
    pub strong_graph: HbGraph,
    pub weak_graph: HbGraph,
    pub strong_csst: Csst,
    pub weak_csst: Csst,
}

impl AnalysisOutcome {
    /// Clock-comparison query over the derived stamps
    pub fn clock_query<'a>(&'a self, trace: &'a Trace) -> VectorClockQuery<'a> {
        VectorClockQuery::new(trace, &self.stamps)
    }

    /// PoG query over the derived graphs
    pub fn graph_query<'a>(&'a self, trace: &'a Trace) -> GraphQuery<'a> {
        GraphQuery::new(trace, &self.strong_graph, &self.weak_graph)
    }

    /// CSST query over the derived trees
    pub fn csst_query<'a>(&'a self, trace: &'a Trace) -> CsstQuery<'a> {
        CsstQuery::new(trace, &self.strong_csst, &self.weak_csst)
    }
}

/// Run the full analysis over a trace
pub fn run(trace: &Trace, opts: AnalysisOptions) -> AnalysisResult<AnalysisOutcome> {
    run_with_cancel(trace, opts, &CancelToken::new())
}

/// Run the full analysis with an external cancellation token
pub fn run_with_cancel(
    trace: &Trace,
    opts: AnalysisOptions,
    cancel: &CancelToken,
) -> AnalysisResult<AnalysisOutcome> {
    tracing::info!(
        events = trace.len(),
        routines = trace.routine_count(),
        "analysis run starting"
    );
    let mut ctx = AnalysisContext::new(trace, opts);

    // the per-run panic shield: a crash inside the event pass fails
    // this run, never the process
    let event_pass = catch_unwind(AssertUnwindSafe(|| -> AnalysisResult<()> {
        for (count, event) in trace.ordered().enumerate() {
            if count % CANCEL_POLL_BATCH == 0 && cancel.is_cancelled() {
                tracing::info!("analysis cancelled during the event pass");
                return Err(AnalysisError::Cancelled);
            }
            step(&mut ctx, event);
        }
        Ok(())
    }));
    match event_pass {
        Ok(result) => result?,
        Err(_) => {
            tracing::error!("event pass panicked, aborting the run");
            return Err(AnalysisError::Internal("event pass panicked".into()));
        }
    }

    run_post_passes(&mut ctx, cancel)?;

    tracing::info!(reports = ctx.collector.len(), "analysis run finished");
    Ok(AnalysisOutcome {
        reports: ctx.collector.into_reports(),
        feedback: ctx.feedback,
        stamps: ctx.stamps,
        strong_graph: ctx.strong_graph,
        weak_graph: ctx.weak_graph,
        strong_csst: ctx.strong_csst,
        weak_csst: ctx.weak_csst,
    })
}

/// Process one event: program-order edge, stamp, update rule, probes
fn step(ctx: &mut AnalysisContext, event: EventId) {
    let trace = ctx.trace;
    let routine = trace[event].routine;

    if let Some(previous) = ctx.last_in_routine[routine.index()] {
        ctx.add_edge_both(previous, event);
    }

    if !ctx.stamps.is_set(event) {
        ctx.stamps.set(
            event,
            ctx.vc[routine.index()].clone(),
            ctx.wvc[routine.index()].clone(),
        );
    }

    dispatch(ctx, event);

    if ctx.opts.analyses.leak && trace[event].is_leaked() {
        leak::probe(ctx, event);
    }

    ctx.last_in_routine[routine.index()] = Some(event);
}

fn dispatch(ctx: &mut AnalysisContext, event: EventId) {
    let trace = ctx.trace;
    let routine = trace[event].routine;
    match &trace[event].kind {
        EventKind::Channel(ch) => channel::update_channel(ctx, event, ch),
        EventKind::Select(_) => select::update_select(ctx, event),
        EventKind::Mutex(m) => mutex::update_mutex(ctx, event, m),
        EventKind::WaitGroup(w) => waitgroup::update_wait_group(ctx, event, w),
        EventKind::Cond(c) => cond::update_cond(ctx, event, c),
        EventKind::Once(o) => once::update_once(ctx, event, o),
        EventKind::Atomic(a) => atomic::update_atomic(ctx, event, a),
        EventKind::Fork(fork) => {
            let child = fork.child;
            ctx.vc[child.index()] = ctx.vc[routine.index()].clone();
            ctx.wvc[child.index()] = ctx.wvc[routine.index()].clone();
            ctx.inc_both(routine);
            ctx.inc_both(child);
            if let Some(&first) = trace.routine(child).first() {
                ctx.add_edge_both(event, first);
            }
        }
        EventKind::NewElem(elem) => {
            ctx.new_elems.insert(elem.id, event);
            if elem.kind == harbinger_trace::ElemKind::Channel {
                ctx.channel_mut(elem.id, elem.param);
            }
            ctx.inc_both(routine);
        }
        EventKind::RoutineEnd => {
            // stamp only
        }
    }
}

/// The analyses that need the whole accumulated HB state
fn run_post_passes(ctx: &mut AnalysisContext, cancel: &CancelToken) -> AnalysisResult<()> {
    let selection = ctx.opts.analyses;
    let passes: [(&str, bool, fn(&mut AnalysisContext)); 6] = [
        ("select partner rerun", selection.leak, select::rerun),
        ("leak finalization", selection.leak, leak::finalize),
        ("done before add", selection.done_before_add, flow::done_before_add),
        (
            "unlock before lock",
            selection.unlock_before_lock,
            flow::unlock_before_lock,
        ),
        (
            "resource deadlock",
            selection.resource_deadlock,
            deadlock::resource_deadlock,
        ),
        (
            "mixed deadlock",
            selection.mixed_deadlock,
            deadlock::mixed_deadlock,
        ),
    ];

    for (name, enabled, pass) in passes {
        if !enabled {
            continue;
        }
        if cancel.is_cancelled() {
            tracing::info!(pass = name, "analysis cancelled between post-passes");
            return Err(AnalysisError::Cancelled);
        }
        tracing::debug!(pass = name, "post-pass starting");
        if catch_unwind(AssertUnwindSafe(|| pass(ctx))).is_err() {
            tracing::error!(pass = name, "post-pass panicked and was skipped");
        }
    }
    Ok(())
}
