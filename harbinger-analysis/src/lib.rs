//! # Harbinger Analysis
//!
//! The happens-before analysis core: a single pass over a recorded
//! trace computes vector clocks, the partial-order graphs and the
//! CSSTs, and a family of analyses interprets the relation to predict
//! concurrency bugs an alternative legal schedule would enable:
//! closed-channel operations, leaks, cyclic resource deadlocks,
//! negative wait-group counters, unlock-before-lock, concurrent
//! receives and unmatched select cases.
//!
//! ## Architecture
//!
//! ```text
//! Trace (total order)
//!     ↓ (driver: edges, stamps, update rules, per-event probes)
//! AnalysisContext (clocks, graphs, CSSTs, bookkeeping maps)
//!     ↓ (post-passes: partner rerun, leaks, flows, cycle search)
//! Reports + fuzzing feedback
//! ```
//!
//! The core is single-threaded and cooperative: no I/O happens inside
//! the loop except report emission, and a [`CancelToken`] raised from
//! outside is honoured between event batches and between post-passes.
//!
//! ## Example
//!
//! ```rust,no_run
//! use harbinger_analysis::{run, AnalysisOptions};
//! use harbinger_trace::TraceReader;
//!
//! let trace = TraceReader::read_path("rewritten_trace.log")?;
//! let outcome = run(&trace, AnalysisOptions::default())?;
//! for report in &outcome.reports {
//!     println!("{report}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod atomic;
pub mod cancel;
pub mod channel;
pub mod cond;
pub mod context;
pub mod deadlock;
pub mod driver;
pub mod exitcode;
pub mod flow;
pub mod leak;
pub mod mutex;
pub mod once;
pub mod options;
pub mod select;
pub mod waitgroup;

pub use cancel::CancelToken;
pub use context::AnalysisContext;
pub use driver::{run, run_with_cancel, AnalysisOutcome};
pub use exitcode::{apply_exit_code, report_for_exit};
pub use options::{AnalysisOptions, AnalysisSelection};

use thiserror::Error;

/// Errors of the analyzer itself.
///
/// Diagnostics about the analyzed program are never errors; they go
/// through the report sink. Recoverable trouble inside one analysis is
/// logged and skipped; only cancellation and unrecoverable internal
/// failures surface here.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The cancellation token was raised
    #[error("analysis cancelled")]
    Cancelled,

    /// An internal invariant did not hold
    #[error("internal analysis error: {0}")]
    Internal(String),
}

/// Result type for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;
