//! The trace container.
//!
//! A [`Trace`] owns every recorded event in one arena and keeps, per
//! routine, the event ids in program order. Cross-routine iteration
//! follows ascending `t_pre`, with ties broken deterministically by
//! `(routine, index)`.

use crate::event::{ChannelOp, Event, EventKind};
use crate::ids::{EventId, ObjectId, Position, RoutineId};
use crate::{TraceError, TraceResult};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::ops::Index;

/// A recorded multi-routine execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trace {
    events: Vec<Event>,
    routines: HashMap<RoutineId, Vec<EventId>>,
    order: Vec<EventId>,
    routine_count: usize,
}

impl Trace {
    pub fn builder() -> TraceBuilder {
        TraceBuilder::default()
    }

    /// Number of events in the trace
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of routines, counting forked children that never ran
    pub fn routine_count(&self) -> usize {
        self.routine_count
    }

    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.events.get(id.index())
    }

    /// All events, arena order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Event ids of one routine, program order
    pub fn routine(&self, routine: RoutineId) -> &[EventId] {
        self.routines
            .get(&routine)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Routine ids present in the trace, ascending
    pub fn routine_ids(&self) -> Vec<RoutineId> {
        let mut ids: Vec<_> = self.routines.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Total-order iteration: ascending `t_pre`, ties by `(routine, index)`
    pub fn ordered(&self) -> impl Iterator<Item = EventId> + '_ {
        self.order.iter().copied()
    }

    /// Last event of a routine in program order
    pub fn last_of_routine(&self, routine: RoutineId) -> Option<EventId> {
        self.routine(routine).last().copied()
    }

    /// True if the routine's recording ends with a routine-end event
    pub fn routine_ended(&self, routine: RoutineId) -> bool {
        self.last_of_routine(routine)
            .is_some_and(|id| matches!(self[id].kind, EventKind::RoutineEnd))
    }
}

impl Index<EventId> for Trace {
    type Output = Event;

    fn index(&self, id: EventId) -> &Event {
        &self.events[id.index()]
    }
}

/// Incremental trace construction.
///
/// Events are pushed per routine in program order; `finish` assigns
/// arena ids, computes the total order and links synchronous channel
/// partners.
#[derive(Debug, Default)]
pub struct TraceBuilder {
    routines: HashMap<RoutineId, Vec<PendingEvent>>,
}

#[derive(Debug)]
struct PendingEvent {
    t_pre: u64,
    t_post: u64,
    pos: Position,
    kind: EventKind,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to a routine's program order
    pub fn push(
        &mut self,
        routine: RoutineId,
        t_pre: u64,
        t_post: u64,
        pos: Position,
        kind: EventKind,
    ) -> &mut Self {
        self.routines.entry(routine).or_default().push(PendingEvent {
            t_pre,
            t_post,
            pos,
            kind,
        });
        self
    }

    /// Finalize into an immutable [`Trace`]
    pub fn finish(self) -> TraceResult<Trace> {
        let mut events = Vec::new();
        let mut routines: HashMap<RoutineId, Vec<EventId>> = HashMap::new();
        let mut routine_count = 0usize;

        let mut routine_ids: Vec<_> = self.routines.keys().copied().collect();
        routine_ids.sort();

        for routine in routine_ids {
            if routine.0 == 0 {
                return Err(TraceError::InvalidRoutine { id: 0 });
            }
            routine_count = routine_count.max(routine.0 as usize);
            let pending = self.routines.get(&routine).expect("routine key");
            let ids = routines.entry(routine).or_default();
            for (index, ev) in pending.iter().enumerate() {
                if let EventKind::Fork(fork) = &ev.kind {
                    routine_count = routine_count.max(fork.child.0 as usize);
                }
                let id = EventId(events.len() as u32);
                events.push(Event {
                    routine,
                    index,
                    t_pre: ev.t_pre,
                    t_post: ev.t_post,
                    pos: ev.pos.clone(),
                    kind: ev.kind.clone(),
                });
                ids.push(id);
            }
        }

        let mut order: Vec<EventId> = (0..events.len() as u32).map(EventId).collect();
        order.sort_by_key(|id| {
            let ev = &events[id.index()];
            (ev.t_pre, ev.routine, ev.index)
        });

        let mut trace = Trace {
            events,
            routines,
            order,
            routine_count,
        };
        link_partners(&mut trace);
        Ok(trace)
    }
}

/// Endpoint of an executed unbuffered operation, for partner linking
#[derive(Debug, Clone, Copy)]
struct SyncEndpoint {
    event: EventId,
    /// Case index when the endpoint is a select case
    case: Option<usize>,
}

/// Link synchronous (unbuffered) sends and recvs that share a channel
/// ordinal, including chosen select cases. Both partner fields are set.
fn link_partners(trace: &mut Trace) {
    let mut sends: HashMap<(ObjectId, u64), SyncEndpoint> = HashMap::new();
    let mut recvs: HashMap<(ObjectId, u64), SyncEndpoint> = HashMap::new();

    for (idx, ev) in trace.events.iter().enumerate() {
        if ev.is_leaked() {
            continue;
        }
        let endpoint = |case| SyncEndpoint {
            event: EventId(idx as u32),
            case,
        };
        match &ev.kind {
            EventKind::Channel(ch) if !ch.is_buffered() => match ch.op {
                ChannelOp::Send => {
                    sends.insert((ch.id, ch.op_id), endpoint(None));
                }
                ChannelOp::Recv => {
                    recvs.insert((ch.id, ch.op_id), endpoint(None));
                }
                ChannelOp::Close => {}
            },
            EventKind::Select(sel) => {
                if let Ok(case_idx) = usize::try_from(sel.chosen_index) {
                    if let Some(case) = sel.cases.get(case_idx) {
                        if !case.is_buffered() {
                            let key = (case.channel, case.op_id);
                            match case.op {
                                ChannelOp::Send => {
                                    sends.insert(key, endpoint(Some(case_idx)));
                                }
                                ChannelOp::Recv => {
                                    recvs.insert(key, endpoint(Some(case_idx)));
                                }
                                ChannelOp::Close => {}
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    for (key, send) in &sends {
        if let Some(recv) = recvs.get(key) {
            set_partner(trace, *send, recv.event);
            set_partner(trace, *recv, send.event);
        }
    }
}

fn set_partner(trace: &mut Trace, endpoint: SyncEndpoint, partner: EventId) {
    let ev = &mut trace.events[endpoint.event.index()];
    match (&mut ev.kind, endpoint.case) {
        (EventKind::Channel(ch), None) => ch.partner = Some(partner),
        (EventKind::Select(sel), Some(case_idx)) => {
            if let Some(case) = sel.cases.get_mut(case_idx) {
                case.partner = Some(partner);
            }
        }
        _ => {}
    }
}
