//! Recorded events.
//!
//! Every recorded concurrency operation is one [`Event`]: a small base
//! record (routine, timestamps, position) plus a tagged payload for the
//! primitive it touched. The payload carries only what that primitive
//! needs; dispatch in the analyzer is a plain `match` on [`EventKind`].

use crate::ids::{EventId, ObjectId, Position, RoutineId};
use serde::{Deserialize, Serialize};

/// A single recorded operation.
///
/// `t_pre` is the serial observe-timestamp taken when the operation
/// started; `t_post` when it completed. `t_post == 0` means the
/// operation was still blocked when the recording ended, which marks
/// the event as *leaked*.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Routine that executed the operation
    pub routine: RoutineId,
    /// Index of this event within its routine (program order)
    pub index: usize,
    /// Timestamp at operation start
    pub t_pre: u64,
    /// Timestamp at operation completion, 0 if never completed
    pub t_post: u64,
    /// Source position of the operation
    pub pos: Position,
    /// Primitive-specific payload
    pub kind: EventKind,
}

impl Event {
    /// True if the operation never completed in the recorded run
    pub fn is_leaked(&self) -> bool {
        self.t_post == 0
    }

    /// Object the event operates on, if it addresses one
    pub fn object_id(&self) -> Option<ObjectId> {
        match &self.kind {
            EventKind::Channel(c) => Some(c.id),
            EventKind::Mutex(m) => Some(m.id),
            EventKind::WaitGroup(w) => Some(w.id),
            EventKind::Cond(c) => Some(c.id),
            EventKind::Once(o) => Some(o.id),
            EventKind::Select(s) => Some(s.id),
            EventKind::NewElem(n) => Some(n.id),
            EventKind::Atomic(a) => Some(a.id),
            EventKind::Fork(_) | EventKind::RoutineEnd => None,
        }
    }
}

/// Tagged payload of a recorded event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    Channel(ChannelEvent),
    Mutex(MutexEvent),
    WaitGroup(WaitGroupEvent),
    Cond(CondEvent),
    Once(OnceEvent),
    Fork(ForkEvent),
    Select(SelectEvent),
    RoutineEnd,
    NewElem(NewElemEvent),
    Atomic(AtomicEvent),
}

/// Channel operation payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub id: ObjectId,
    pub op: ChannelOp,
    /// Per-channel ordinal of this send or recv, used for buffered
    /// FIFO matching and synchronous partner linking
    pub op_id: u64,
    /// Declared buffer size, 0 for an unbuffered channel
    pub q_size: u64,
    /// True if the channel was already closed when the operation ran
    pub closed: bool,
    /// Synchronous pairing, linked by [`crate::TraceBuilder::finish`]
    pub partner: Option<EventId>,
    /// Channel send counter observed at the operation
    pub number_send: u64,
    /// Channel recv counter observed at the operation
    pub number_recv: u64,
}

impl ChannelEvent {
    pub fn is_buffered(&self) -> bool {
        self.q_size > 0
    }
}

/// Direction of a channel operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelOp {
    Send,
    Recv,
    Close,
}

impl ChannelOp {
    /// The operation a partner on the other side performs
    pub fn opposite(self) -> ChannelOp {
        match self {
            ChannelOp::Send => ChannelOp::Recv,
            ChannelOp::Recv => ChannelOp::Send,
            ChannelOp::Close => ChannelOp::Close,
        }
    }
}

/// Mutex operation payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutexEvent {
    pub id: ObjectId,
    pub op: MutexOp,
    /// Only meaningful for try-operations
    pub success: bool,
}

/// Mutex and rw-mutex operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutexOp {
    Lock,
    Unlock,
    TryLock,
    RLock,
    RUnlock,
    TryRLock,
}

impl MutexOp {
    /// Lock / RLock / TryLock / TryRLock
    pub fn is_acquire(self) -> bool {
        !matches!(self, MutexOp::Unlock | MutexOp::RUnlock)
    }

    /// Unlock / RUnlock
    pub fn is_release(self) -> bool {
        matches!(self, MutexOp::Unlock | MutexOp::RUnlock)
    }

    /// Shared (reader-side) operation
    pub fn is_read(self) -> bool {
        matches!(self, MutexOp::RLock | MutexOp::RUnlock | MutexOp::TryRLock)
    }

    /// TryLock / TryRLock
    pub fn is_try(self) -> bool {
        matches!(self, MutexOp::TryLock | MutexOp::TryRLock)
    }
}

/// Wait-group operation payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitGroupEvent {
    pub id: ObjectId,
    pub op: WaitGroupOp,
    /// Signed counter delta, 0 for a wait
    pub delta: i64,
    /// Counter value after the operation
    pub counter: i64,
}

impl WaitGroupEvent {
    /// An add is a change with positive delta, a done has negative delta
    pub fn is_add(&self) -> bool {
        self.op == WaitGroupOp::Change && self.delta > 0
    }

    pub fn is_done(&self) -> bool {
        self.op == WaitGroupOp::Change && self.delta < 0
    }
}

/// Wait-group operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitGroupOp {
    Change,
    Wait,
}

/// Condition-variable operation payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CondEvent {
    pub id: ObjectId,
    pub op: CondOp,
}

/// Condition-variable operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CondOp {
    Wait,
    Signal,
    Broadcast,
}

/// Once payload; `success` is true iff this event ran the function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnceEvent {
    pub id: ObjectId,
    pub success: bool,
}

/// Routine fork payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkEvent {
    /// Routine started by this fork
    pub child: RoutineId,
}

/// Select statement payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectEvent {
    pub id: ObjectId,
    /// Cases in source order
    pub cases: Vec<SelectCase>,
    /// Index of the executed case, -1 if the default case ran
    pub chosen_index: i32,
    pub has_default: bool,
}

impl SelectEvent {
    /// The executed channel case, if any
    pub fn chosen_case(&self) -> Option<&SelectCase> {
        usize::try_from(self.chosen_index)
            .ok()
            .and_then(|i| self.cases.get(i))
    }
}

/// One case of a select statement.
///
/// `op` is `Send` or `Recv`; `op_id` is only meaningful for the chosen
/// case (it is the channel ordinal the executed operation consumed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectCase {
    pub channel: ObjectId,
    pub op: ChannelOp,
    pub q_size: u64,
    pub op_id: u64,
    /// Synchronous pairing of the chosen case, linked at build time
    pub partner: Option<EventId>,
}

impl SelectCase {
    pub fn is_buffered(&self) -> bool {
        self.q_size > 0
    }
}

/// Object creation payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewElemEvent {
    pub id: ObjectId,
    pub kind: ElemKind,
    /// Numeric parameter, e.g. declared buffer size for a channel
    pub param: u64,
}

/// Kinds of concurrency objects a `NewElem` can birth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElemKind {
    Channel,
    Mutex,
    RwMutex,
    WaitGroup,
    Cond,
    Once,
    Atomic,
}

/// Atomic memory operation payload; `id` is the address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicEvent {
    pub id: ObjectId,
    pub op: AtomicOp,
}

/// Atomic operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtomicOp {
    Load,
    Store,
    Add,
    Swap,
    CompSwap,
    And,
    Or,
}

impl AtomicOp {
    /// Operations that observe the previous value
    pub fn reads(self) -> bool {
        matches!(self, AtomicOp::Load | AtomicOp::Swap | AtomicOp::CompSwap)
    }

    /// Operations that publish a new value
    pub fn writes(self) -> bool {
        !matches!(self, AtomicOp::Load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaked_marker() {
        let ev = Event {
            routine: RoutineId(1),
            index: 0,
            t_pre: 5,
            t_post: 0,
            pos: Position::new("main.go", 10),
            kind: EventKind::RoutineEnd,
        };
        assert!(ev.is_leaked());
    }

    #[test]
    fn test_mutex_op_predicates() {
        assert!(MutexOp::Lock.is_acquire());
        assert!(MutexOp::TryRLock.is_acquire());
        assert!(MutexOp::TryRLock.is_read());
        assert!(MutexOp::TryRLock.is_try());
        assert!(MutexOp::Unlock.is_release());
        assert!(!MutexOp::Unlock.is_read());
        assert!(MutexOp::RUnlock.is_read());
    }

    #[test]
    fn test_wait_group_add_done() {
        let add = WaitGroupEvent {
            id: ObjectId(1),
            op: WaitGroupOp::Change,
            delta: 1,
            counter: 1,
        };
        let done = WaitGroupEvent {
            delta: -1,
            counter: 0,
            ..add.clone()
        };
        let wait = WaitGroupEvent {
            op: WaitGroupOp::Wait,
            delta: 0,
            counter: 0,
            id: ObjectId(1),
        };
        assert!(add.is_add() && !add.is_done());
        assert!(done.is_done() && !done.is_add());
        assert!(!wait.is_add() && !wait.is_done());
    }

    #[test]
    fn test_select_chosen_case() {
        let sel = SelectEvent {
            id: ObjectId(9),
            cases: vec![SelectCase {
                channel: ObjectId(4),
                op: ChannelOp::Recv,
                q_size: 0,
                op_id: 1,
                partner: None,
            }],
            chosen_index: 0,
            has_default: false,
        };
        assert_eq!(sel.chosen_case().unwrap().channel, ObjectId(4));

        let with_default = SelectEvent {
            chosen_index: -1,
            has_default: true,
            ..sel
        };
        assert!(with_default.chosen_case().is_none());
    }

    #[test]
    fn test_atomic_read_write_sets() {
        assert!(AtomicOp::Load.reads() && !AtomicOp::Load.writes());
        assert!(AtomicOp::Store.writes() && !AtomicOp::Store.reads());
        assert!(AtomicOp::Swap.reads() && AtomicOp::Swap.writes());
        assert!(AtomicOp::CompSwap.reads() && AtomicOp::CompSwap.writes());
    }
}
