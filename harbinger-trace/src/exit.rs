//! Recorder exit codes.
//!
//! The recorder signals how the recorded run terminated through a
//! numeric exit code. Codes other than `Normal` describe a bug that
//! actually manifested; the analyzer maps them to actual-bug reports
//! without any happens-before reasoning.

use serde::{Deserialize, Serialize};

/// Exit code surfaced by the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCode {
    /// Normal termination
    Normal,
    /// Panic with no recognized cause
    UnknownPanic,
    /// Replay ran into its timeout
    ReplayTimeout,
    /// A leaked unbuffered channel operation was unstuck during replay
    LeakUnstuckUnbuffered,
    /// A leaked buffered channel operation was unstuck during replay
    LeakUnstuckBuffered,
    /// A leaked mutex operation was unstuck during replay
    LeakUnstuckMutex,
    /// A leaked cond wait was unstuck during replay
    LeakUnstuckCond,
    /// A leaked wait-group wait was unstuck during replay
    LeakUnstuckWaitGroup,
    /// Send on a closed channel
    SendOnClosed,
    /// Receive on a closed channel
    RecvOnClosed,
    /// Close of a closed channel
    CloseOnClosed,
    /// Close of a nil channel
    CloseOnNil,
    /// Negative wait-group counter
    NegativeWaitGroup,
    /// Unlock of an unlocked mutex
    UnlockOfUnlockedMutex,
    /// A cyclic lock deadlock was reached
    CyclicDeadlock,
}

impl ExitCode {
    /// Decode a recorder exit code; unknown numbers yield `None`
    pub fn from_code(code: u32) -> Option<ExitCode> {
        Some(match code {
            0 => ExitCode::Normal,
            3 => ExitCode::UnknownPanic,
            10 => ExitCode::ReplayTimeout,
            20 => ExitCode::LeakUnstuckUnbuffered,
            21 => ExitCode::LeakUnstuckBuffered,
            22 => ExitCode::LeakUnstuckMutex,
            23 => ExitCode::LeakUnstuckCond,
            24 => ExitCode::LeakUnstuckWaitGroup,
            30 => ExitCode::SendOnClosed,
            31 => ExitCode::RecvOnClosed,
            32 => ExitCode::CloseOnClosed,
            33 => ExitCode::CloseOnNil,
            34 => ExitCode::NegativeWaitGroup,
            35 => ExitCode::UnlockOfUnlockedMutex,
            41 => ExitCode::CyclicDeadlock,
            _ => return None,
        })
    }

    /// The numeric code the recorder emits
    pub fn code(self) -> u32 {
        match self {
            ExitCode::Normal => 0,
            ExitCode::UnknownPanic => 3,
            ExitCode::ReplayTimeout => 10,
            ExitCode::LeakUnstuckUnbuffered => 20,
            ExitCode::LeakUnstuckBuffered => 21,
            ExitCode::LeakUnstuckMutex => 22,
            ExitCode::LeakUnstuckCond => 23,
            ExitCode::LeakUnstuckWaitGroup => 24,
            ExitCode::SendOnClosed => 30,
            ExitCode::RecvOnClosed => 31,
            ExitCode::CloseOnClosed => 32,
            ExitCode::CloseOnNil => 33,
            ExitCode::NegativeWaitGroup => 34,
            ExitCode::UnlockOfUnlockedMutex => 35,
            ExitCode::CyclicDeadlock => 41,
        }
    }

    /// True for every code describing a manifested bug
    pub fn is_bug(self) -> bool {
        self != ExitCode::Normal
    }
}
