//! Per-run analysis state.
//!
//! One [`AnalysisContext`] exists per run and is threaded explicitly
//! through the driver and every analysis: the current strong and weak
//! clocks per routine, the per-event stamps, both graphs and CSSTs,
//! and the bookkeeping maps the update rules and analyses share.
//! Entries are created lazily on first use of an object id.

use crate::deadlock::LockTracker;
use crate::options::AnalysisOptions;
use crate::select::SelectCaseRecord;
use hashbrown::{HashMap, HashSet};
use harbinger_fuzz::FuzzFeedback;
use harbinger_order::{ChainPos, ClockStamps, Csst, HbGraph, VectorClock};
use harbinger_report::{
    Element, ObjectTypeCode, Report, ReportCollector, ReportSink,
};
use harbinger_trace::{
    ChannelOp, Event, EventId, EventKind, MutexOp, ObjectId, RoutineId, Trace, WaitGroupOp,
};
use std::collections::VecDeque;

/// One occupied slot of a buffered channel
#[derive(Debug, Clone)]
pub struct BufferSlot {
    pub op_id: u64,
    pub vc: VectorClock,
    pub wvc: VectorClock,
    pub sender: RoutineId,
    pub event: EventId,
}

/// Per-channel bookkeeping
#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    pub slots: VecDeque<BufferSlot>,
    /// Declared buffer size, 0 for unbuffered
    pub size: u64,
    /// Accumulated clock of the latest send, for the FIFO assumption
    pub last_send_vc: Option<VectorClock>,
    /// Accumulated clock of the latest recv, for the FIFO assumption
    pub last_recv_vc: Option<VectorClock>,
    /// Sends observed while the buffer was full, deferred until a slot frees
    pub hold_send: VecDeque<EventId>,
    /// Recvs observed while the buffer was empty, deferred until a send lands
    pub hold_recv: VecDeque<EventId>,
}

/// A release point of a mutex: the releasing event and its clock
#[derive(Debug, Clone)]
pub struct Release {
    pub event: EventId,
    pub vc: VectorClock,
}

/// Per-mutex bookkeeping
#[derive(Debug, Clone, Default)]
pub struct MutexState {
    /// Last write-release
    pub rel_w: Option<Release>,
    /// Accumulated read-releases since the last write-release
    pub rel_r: Option<Release>,
    /// Acquire currently holding the lock
    pub holder: Option<EventId>,
    /// Most recent successful acquire of any kind
    pub last_acquire: Option<EventId>,
    /// All acquire events, for the unlock-before-lock flow
    pub acquires: Vec<EventId>,
    /// All release events, for the unlock-before-lock flow
    pub releases: Vec<EventId>,
}

/// Per-wait-group bookkeeping
#[derive(Debug, Clone, Default)]
pub struct WaitGroupState {
    /// Latest counter change: event plus its accumulated clocks
    pub last_change: Option<(EventId, VectorClock, VectorClock)>,
    pub adds: Vec<EventId>,
    pub dones: Vec<EventId>,
}

/// A stuck (leaked) channel-side operation awaiting a partner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StuckOp {
    pub event: EventId,
    pub op: ChannelOp,
    pub buffered: bool,
    pub from_select: bool,
}

/// All mutable state of one analysis run
pub struct AnalysisContext<'t> {
    pub trace: &'t Trace,
    pub opts: AnalysisOptions,
    /// Number of routines (vector-clock length)
    pub n: usize,

    /// Current strong clock per routine (index `routine - 1`)
    pub vc: Vec<VectorClock>,
    /// Current weak must-HB clock per routine
    pub wvc: Vec<VectorClock>,
    pub stamps: ClockStamps,

    pub strong_graph: HbGraph,
    pub weak_graph: HbGraph,
    pub strong_csst: Csst,
    pub weak_csst: Csst,

    /// Last processed event per routine, for program-order edges
    pub last_in_routine: Vec<Option<EventId>>,
    /// Partner events whose clock work already ran at pairing time
    pub paired: HashSet<EventId>,

    // channels
    pub channels: HashMap<ObjectId, ChannelState>,
    pub close_data: HashMap<ObjectId, EventId>,
    pub most_recent_send: HashMap<RoutineId, HashMap<ObjectId, EventId>>,
    pub most_recent_recv: HashMap<RoutineId, HashMap<ObjectId, EventId>>,
    pub leaking_channels: HashMap<ObjectId, Vec<StuckOp>>,
    pub new_elems: HashMap<ObjectId, EventId>,

    // mutexes
    pub mutexes: HashMap<ObjectId, MutexState>,
    pub locks: LockTracker,

    // wait groups
    pub wait_groups: HashMap<ObjectId, WaitGroupState>,

    // cond
    pub cond_waiting: HashMap<ObjectId, VecDeque<EventId>>,

    // once: winning event plus its accumulated clocks
    pub once_winner: HashMap<ObjectId, (EventId, VectorClock, VectorClock)>,

    // atomics: clocks of the address's last writer
    pub atomic_writer: HashMap<ObjectId, (VectorClock, VectorClock)>,

    // select partner table
    pub select_cases: Vec<SelectCaseRecord>,

    // outputs
    pub collector: ReportCollector,
    pub feedback: FuzzFeedback,
}

impl<'t> AnalysisContext<'t> {
    pub fn new(trace: &'t Trace, opts: AnalysisOptions) -> Self {
        let n = trace.routine_count().max(1);
        let mut vc = vec![VectorClock::new(n); n];
        let mut wvc = vec![VectorClock::new(n); n];
        // every routine starts with its own component alive, so events
        // of never-synchronized routines compare concurrent, not
        // ordered; a fork overwrites the child's clock anyway
        for i in 0..n {
            let routine = RoutineId(i as u32 + 1);
            vc[i].inc(routine);
            wvc[i].inc(routine);
        }

        let chain_len: Vec<usize> = (0..n)
            .map(|i| trace.routine(RoutineId(i as u32 + 1)).len())
            .collect();

        Self {
            trace,
            opts,
            n,
            vc,
            wvc,
            stamps: ClockStamps::new(trace.len()),
            strong_graph: HbGraph::new(trace.len()),
            weak_graph: HbGraph::new(trace.len()),
            strong_csst: Csst::new(chain_len.clone()),
            weak_csst: Csst::new(chain_len),
            last_in_routine: vec![None; n],
            paired: HashSet::new(),
            channels: HashMap::new(),
            close_data: HashMap::new(),
            most_recent_send: HashMap::new(),
            most_recent_recv: HashMap::new(),
            leaking_channels: HashMap::new(),
            new_elems: HashMap::new(),
            mutexes: HashMap::new(),
            locks: LockTracker::default(),
            wait_groups: HashMap::new(),
            cond_waiting: HashMap::new(),
            once_winner: HashMap::new(),
            atomic_writer: HashMap::new(),
            select_cases: Vec::new(),
            collector: ReportCollector::new().with_suppressed_warnings(opts.suppress_warnings),
            feedback: FuzzFeedback::new(),
        }
    }

    /// Current strong clock of a routine
    pub fn clock(&self, routine: RoutineId) -> &VectorClock {
        &self.vc[routine.index()]
    }

    /// Current weak clock of a routine
    pub fn weak_clock(&self, routine: RoutineId) -> &VectorClock {
        &self.wvc[routine.index()]
    }

    /// Increment both clocks of a routine
    pub fn inc_both(&mut self, routine: RoutineId) {
        self.vc[routine.index()].inc(routine);
        self.wvc[routine.index()].inc(routine);
    }

    /// Sync both clocks of a routine with external clocks
    pub fn sync_both(&mut self, routine: RoutineId, vc: &VectorClock, wvc: &VectorClock) {
        self.vc[routine.index()].sync(vc);
        self.wvc[routine.index()].sync(wvc);
    }

    /// Sync only the strong clock (critical-section ordering)
    pub fn sync_strong(&mut self, routine: RoutineId, vc: &VectorClock) {
        self.vc[routine.index()].sync(vc);
    }

    /// Chain position of an event, for the CSSTs
    pub fn chain_pos(&self, id: EventId) -> ChainPos {
        let ev = &self.trace[id];
        ChainPos::new(ev.routine.index(), ev.index)
    }

    /// Insert an edge observed in the strong relation only
    pub fn add_edge_strong(&mut self, from: EventId, to: EventId) {
        self.strong_graph.add_edge(from, to);
        let (a, b) = (self.chain_pos(from), self.chain_pos(to));
        if let Err(err) = self.strong_csst.add_edge(a, b) {
            tracing::warn!(%from, %to, %err, "csst edge rejected");
        }
    }

    /// Insert an edge observed in both relations
    pub fn add_edge_both(&mut self, from: EventId, to: EventId) {
        self.add_edge_strong(from, to);
        self.weak_graph.add_edge(from, to);
        let (a, b) = (self.chain_pos(from), self.chain_pos(to));
        if let Err(err) = self.weak_csst.add_edge(a, b) {
            tracing::warn!(%from, %to, %err, "csst edge rejected");
        }
    }

    /// True iff the weak stamps of two events are concurrent
    pub fn concurrent(&self, a: EventId, b: EventId) -> bool {
        match (self.stamps.wvc(a), self.stamps.wvc(b)) {
            (Some(ca), Some(cb)) => ca.is_concurrent(cb),
            _ => false,
        }
    }

    /// Report element for a recorded event
    pub fn element(&self, id: EventId) -> Element {
        let ev = &self.trace[id];
        self.element_with_code(id, type_code_for(ev))
    }

    /// Report element with an explicit type code (deadlock members)
    pub fn element_with_code(&self, id: EventId, code: ObjectTypeCode) -> Element {
        let ev = &self.trace[id];
        Element::new(
            ev.routine,
            ev.object_id().unwrap_or(ObjectId::NIL),
            ev.t_pre,
            code,
            ev.pos.clone(),
        )
    }

    /// Submit a report through the deduplicating collector
    pub fn submit(&mut self, report: Report) -> bool {
        self.collector.submit(report)
    }

    /// Lazily created per-channel state, sized from the event or a
    /// recorded `NewElem`
    pub fn channel_mut(&mut self, id: ObjectId, q_size: u64) -> &mut ChannelState {
        let state = self.channels.entry(id).or_default();
        if state.size < q_size {
            state.size = q_size;
        }
        state
    }

    pub fn mutex_mut(&mut self, id: ObjectId) -> &mut MutexState {
        self.mutexes.entry(id).or_default()
    }

    pub fn wait_group_mut(&mut self, id: ObjectId) -> &mut WaitGroupState {
        self.wait_groups.entry(id).or_default()
    }

    /// Record an executed send or recv as the routine's most recent
    /// operation on the channel
    pub fn note_channel_op(&mut self, routine: RoutineId, id: ObjectId, op: ChannelOp, ev: EventId) {
        let map = match op {
            ChannelOp::Send => &mut self.most_recent_send,
            ChannelOp::Recv => &mut self.most_recent_recv,
            ChannelOp::Close => return,
        };
        map.entry(routine).or_default().insert(id, ev);
    }

    /// Most recent operations of the given direction on a channel,
    /// one per routine
    pub fn recent_ops(&self, id: ObjectId, op: ChannelOp) -> Vec<EventId> {
        let map = match op {
            ChannelOp::Send => &self.most_recent_send,
            ChannelOp::Recv => &self.most_recent_recv,
            ChannelOp::Close => return Vec::new(),
        };
        let mut hits: Vec<EventId> = map
            .values()
            .filter_map(|per_chan| per_chan.get(&id).copied())
            .collect();
        hits.sort();
        hits
    }

    /// Most recent operations of the given direction on a channel by
    /// routines other than `own`
    pub fn recent_ops_elsewhere(
        &self,
        own: RoutineId,
        id: ObjectId,
        op: ChannelOp,
    ) -> Vec<EventId> {
        let map = match op {
            ChannelOp::Send => &self.most_recent_send,
            ChannelOp::Recv => &self.most_recent_recv,
            ChannelOp::Close => return Vec::new(),
        };
        let mut hits: Vec<EventId> = map
            .iter()
            .filter(|(routine, _)| **routine != own)
            .filter_map(|(_, per_chan)| per_chan.get(&id).copied())
            .collect();
        hits.sort();
        hits
    }
}

/// Object type code of a recorded event
pub fn type_code_for(ev: &Event) -> ObjectTypeCode {
    match &ev.kind {
        EventKind::Channel(ch) => match ch.op {
            ChannelOp::Send => ObjectTypeCode::ChannelSend,
            ChannelOp::Recv => ObjectTypeCode::ChannelRecv,
            ChannelOp::Close => ObjectTypeCode::ChannelClose,
        },
        EventKind::Mutex(m) => match m.op {
            MutexOp::Lock => ObjectTypeCode::MutexLock,
            MutexOp::Unlock => ObjectTypeCode::MutexUnlock,
            MutexOp::TryLock => ObjectTypeCode::MutexTryLock,
            MutexOp::RLock => ObjectTypeCode::MutexRLock,
            MutexOp::RUnlock => ObjectTypeCode::MutexRUnlock,
            MutexOp::TryRLock => ObjectTypeCode::MutexTryRLock,
        },
        EventKind::WaitGroup(w) => match w.op {
            WaitGroupOp::Wait => ObjectTypeCode::WaitGroupWait,
            WaitGroupOp::Change if w.delta < 0 => ObjectTypeCode::WaitGroupDone,
            WaitGroupOp::Change => ObjectTypeCode::WaitGroupAdd,
        },
        EventKind::Cond(c) => match c.op {
            harbinger_trace::CondOp::Wait => ObjectTypeCode::CondWait,
            harbinger_trace::CondOp::Signal => ObjectTypeCode::CondSignal,
            harbinger_trace::CondOp::Broadcast => ObjectTypeCode::CondBroadcast,
        },
        EventKind::Once(o) => {
            if o.success {
                ObjectTypeCode::OnceExecuted
            } else {
                ObjectTypeCode::OnceNotExecuted
            }
        }
        EventKind::Select(_) => ObjectTypeCode::Select,
        EventKind::Fork(_)
        | EventKind::RoutineEnd
        | EventKind::NewElem(_)
        | EventKind::Atomic(_) => ObjectTypeCode::Unknown,
    }
}
