//! Shared builders for the analysis test suites.

#![allow(dead_code)]

use harbinger_report::{BugKind, Report};
use harbinger_trace::{
    AtomicEvent, AtomicOp, ChannelEvent, ChannelOp, CondEvent, CondOp, ElemKind, EventKind,
    ForkEvent, MutexEvent, MutexOp, NewElemEvent, ObjectId, OnceEvent, Position, RoutineId,
    SelectCase, SelectEvent, WaitGroupEvent, WaitGroupOp,
};

pub fn pos(line: u32) -> Position {
    Position::new("main.go", line)
}

pub fn r(id: u32) -> RoutineId {
    RoutineId(id)
}

pub fn chan(id: u64, op: ChannelOp, op_id: u64, q_size: u64) -> EventKind {
    EventKind::Channel(ChannelEvent {
        id: ObjectId(id),
        op,
        op_id,
        q_size,
        closed: false,
        partner: None,
        number_send: 0,
        number_recv: 0,
    })
}

pub fn mutex(id: u64, op: MutexOp) -> EventKind {
    try_mutex(id, op, true)
}

pub fn try_mutex(id: u64, op: MutexOp, success: bool) -> EventKind {
    EventKind::Mutex(MutexEvent {
        id: ObjectId(id),
        op,
        success,
    })
}

pub fn wg_change(id: u64, delta: i64, counter: i64) -> EventKind {
    EventKind::WaitGroup(WaitGroupEvent {
        id: ObjectId(id),
        op: WaitGroupOp::Change,
        delta,
        counter,
    })
}

pub fn wg_wait(id: u64) -> EventKind {
    EventKind::WaitGroup(WaitGroupEvent {
        id: ObjectId(id),
        op: WaitGroupOp::Wait,
        delta: 0,
        counter: 0,
    })
}

pub fn cond(id: u64, op: CondOp) -> EventKind {
    EventKind::Cond(CondEvent {
        id: ObjectId(id),
        op,
    })
}

pub fn once(id: u64, success: bool) -> EventKind {
    EventKind::Once(OnceEvent {
        id: ObjectId(id),
        success,
    })
}

pub fn atomic(id: u64, op: AtomicOp) -> EventKind {
    EventKind::Atomic(AtomicEvent {
        id: ObjectId(id),
        op,
    })
}

pub fn fork(child: u32) -> EventKind {
    EventKind::Fork(ForkEvent {
        child: RoutineId(child),
    })
}

pub fn end() -> EventKind {
    EventKind::RoutineEnd
}

pub fn new_chan(id: u64, q_size: u64) -> EventKind {
    EventKind::NewElem(NewElemEvent {
        id: ObjectId(id),
        kind: ElemKind::Channel,
        param: q_size,
    })
}

pub fn select_case(channel: u64, op: ChannelOp, q_size: u64, op_id: u64) -> SelectCase {
    SelectCase {
        channel: ObjectId(channel),
        op,
        q_size,
        op_id,
        partner: None,
    }
}

pub fn select(id: u64, cases: Vec<SelectCase>, chosen_index: i32, has_default: bool) -> EventKind {
    EventKind::Select(SelectEvent {
        id: ObjectId(id),
        cases,
        chosen_index,
        has_default,
    })
}

/// All reports of one bug kind
pub fn of_kind<'a>(reports: &'a [Report], kind: BugKind) -> Vec<&'a Report> {
    reports.iter().filter(|r| r.kind == kind).collect()
}

/// The single report of one bug kind, panicking otherwise
pub fn single<'a>(reports: &'a [Report], kind: BugKind) -> &'a Report {
    let hits = of_kind(reports, kind);
    assert_eq!(
        hits.len(),
        1,
        "expected exactly one {} report, got {}: {:?}",
        kind.code(),
        hits.len(),
        reports.iter().map(|r| r.kind.code()).collect::<Vec<_>>()
    );
    hits[0]
}
