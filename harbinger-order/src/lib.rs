//! # Harbinger Happens-Before Engines
//!
//! Three interchangeable representations of the happens-before
//! relation over a recorded trace, plus a uniform query API:
//!
//! - [`VectorClock`]: per-routine counter vectors with pairwise
//!   comparison returning [`HbRelation`].
//! - [`HbGraph`] (PoG): per-event DAG with forward and inverted
//!   adjacency and DFS reachability.
//! - [`Csst`]: collective sparse segment tree; chain-local index
//!   order plus incrementally inserted cross-chain edges, queried
//!   through suffix-minimum lookups.
//!
//! The driver maintains each of them twice: once for the strong HB
//! relation and once for the weak must-HB relation, which excludes
//! ordering derivable only from critical sections.

pub mod csst;
pub mod graph;
pub mod query;
pub mod vclock;

pub use csst::{ChainPos, Csst};
pub use graph::{Direction, HbGraph};
pub use query::{
    ClockStamps, ConcurrencyQuery, CsstQuery, GraphQuery, QueryFilter, VectorClockQuery,
};
pub use vclock::{HbRelation, VectorClock};

use thiserror::Error;

/// Errors from the happens-before engines
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// An edge or query referenced a chain the CSST does not have
    #[error("unknown chain {0}")]
    UnknownChain(usize),

    /// An edge or query referenced a position past the end of a chain
    #[error("position {index} out of bounds for chain {chain} of length {len}")]
    ChainIndexOutOfBounds {
        chain: usize,
        index: usize,
        len: usize,
    },
}

/// Result type for happens-before operations
pub type OrderResult<T> = Result<T, OrderError>;
