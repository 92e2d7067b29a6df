//! # Harbinger Trace Model
//!
//! This crate defines the recorded-execution trace the analyzer
//! consumes: the event sum type covering every recorded concurrency
//! primitive, the `Trace` container with per-routine sequences and a
//! deterministic total-order iteration, and the line-oriented wire
//! format emitted by the recorder.
//!
//! ## Architecture
//!
//! ```text
//! Recorder output (text)
//!     ↓ (TraceReader)
//! TraceBuilder
//!     ↓ (finish: sort, index, link partners)
//! Trace
//!     ↓ (total-order iteration)
//! HB analysis driver
//! ```
//!
//! Events are stored in a single arena and addressed by [`EventId`];
//! per-routine order always equals program order, and cross-routine
//! iteration ascends by `(t_pre, routine, index)`.

pub mod event;
pub mod exit;
pub mod ids;
pub mod reader;
pub mod trace;

pub use event::{
    AtomicEvent, AtomicOp, ChannelEvent, ChannelOp, CondEvent, CondOp, ElemKind, Event, EventKind,
    ForkEvent, MutexEvent, MutexOp, NewElemEvent, OnceEvent, SelectCase, SelectEvent,
    WaitGroupEvent, WaitGroupOp,
};
pub use exit::ExitCode;
pub use ids::{EventId, ObjectId, Position, RoutineId};
pub use reader::TraceReader;
pub use trace::{Trace, TraceBuilder};

use thiserror::Error;

/// Errors produced while building or reading a trace
#[derive(Error, Debug)]
pub enum TraceError {
    /// A line in the recorder output could not be parsed
    #[error("malformed trace record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    /// A record carried an unknown event prefix
    #[error("unknown event prefix '{prefix}' at line {line}")]
    UnknownPrefix { prefix: String, line: usize },

    /// An event appeared before any routine header
    #[error("event record at line {line} appears before a routine header")]
    MissingRoutineHeader { line: usize },

    /// A routine id was zero or otherwise out of range
    #[error("invalid routine id {id}")]
    InvalidRoutine { id: u64 },

    /// The trace references an event that does not exist
    #[error("event id {0} out of bounds")]
    UnknownEvent(u32),

    /// I/O error while reading the recorder output
    #[error("trace i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for trace operations
pub type TraceResult<T> = Result<T, TraceError>;
