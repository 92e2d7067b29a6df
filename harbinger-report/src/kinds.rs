//! Severities, bug kinds and object type codes.

use serde::{Deserialize, Serialize};

/// Severity of a report
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Information,
    Warning,
    Critical,
}

/// Bug classes the analyzer reports.
///
/// `Actual…` kinds were observed in the recorded run (usually via a
/// recorder exit code), `Potential…` kinds are inferred from the HB
/// relation, `Leak…` kinds describe operations stuck at the end of the
/// recording, `Runtime…` kinds describe abnormal recorder termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BugKind {
    ActualSendOnClosed,
    ActualRecvOnClosed,
    ActualCloseOnClosed,
    ActualCloseOnNilChannel,
    ActualNegativeWaitGroup,
    ActualUnlockOfNotLockedMutex,
    ActualDeadlock,
    ActualConcurrentRecv,

    PotentialSendOnClosed,
    PotentialRecvOnClosed,
    PotentialNegativeWaitGroup,
    PotentialUnlockBeforeLock,
    PotentialCyclicDeadlock,

    LeakUnknown,
    LeakUnbufferedWith,
    LeakUnbufferedWithout,
    LeakBufferedWith,
    LeakBufferedWithout,
    LeakNilChannel,
    LeakSelectWith,
    LeakSelectWithout,
    LeakMutex,
    LeakWaitGroup,
    LeakCond,
    LeakContext,

    RuntimeUnknownPanic,
    RuntimeTimeout,
}

impl BugKind {
    /// Machine-short kind code
    pub fn code(self) -> &'static str {
        match self {
            BugKind::ActualSendOnClosed => "ASendOnClosed",
            BugKind::ActualRecvOnClosed => "ARecvOnClosed",
            BugKind::ActualCloseOnClosed => "ACloseOnClosed",
            BugKind::ActualCloseOnNilChannel => "ACloseOnNilChannel",
            BugKind::ActualNegativeWaitGroup => "ANegWG",
            BugKind::ActualUnlockOfNotLockedMutex => "AUnlockOfNotLockedMutex",
            BugKind::ActualDeadlock => "ADeadlock",
            BugKind::ActualConcurrentRecv => "AConcurrentRecv",
            BugKind::PotentialSendOnClosed => "PSendOnClosed",
            BugKind::PotentialRecvOnClosed => "PRecvOnClosed",
            BugKind::PotentialNegativeWaitGroup => "PNegWG",
            BugKind::PotentialUnlockBeforeLock => "PUnlockBeforeLock",
            BugKind::PotentialCyclicDeadlock => "PCyclicDeadlock",
            BugKind::LeakUnknown => "LUnknown",
            BugKind::LeakUnbufferedWith => "LUnbufferedWith",
            BugKind::LeakUnbufferedWithout => "LUnbufferedWithout",
            BugKind::LeakBufferedWith => "LBufferedWith",
            BugKind::LeakBufferedWithout => "LBufferedWithout",
            BugKind::LeakNilChannel => "LNilChan",
            BugKind::LeakSelectWith => "LSelectWith",
            BugKind::LeakSelectWithout => "LSelectWithout",
            BugKind::LeakMutex => "LMutex",
            BugKind::LeakWaitGroup => "LWaitGroup",
            BugKind::LeakCond => "LCond",
            BugKind::LeakContext => "LContext",
            BugKind::RuntimeUnknownPanic => "RUnknownPanic",
            BugKind::RuntimeTimeout => "RTimeout",
        }
    }

    pub fn is_actual(self) -> bool {
        self.code().starts_with('A')
    }

    pub fn is_potential(self) -> bool {
        self.code().starts_with('P')
    }

    pub fn is_leak(self) -> bool {
        self.code().starts_with('L')
    }

    pub fn is_runtime(self) -> bool {
        self.code().starts_with('R')
    }
}

/// Two-letter object type codes carried by report elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectTypeCode {
    ChannelSend,
    ChannelRecv,
    ChannelClose,
    MutexLock,
    MutexUnlock,
    MutexTryLock,
    MutexRLock,
    MutexRUnlock,
    MutexTryRLock,
    WaitGroupAdd,
    WaitGroupDone,
    WaitGroupWait,
    CondWait,
    CondSignal,
    CondBroadcast,
    OnceExecuted,
    OnceNotExecuted,
    Select,
    DeadlockCycleMember,
    DeadlockStuckMember,
    Unknown,
}

impl ObjectTypeCode {
    pub fn code(self) -> &'static str {
        match self {
            ObjectTypeCode::ChannelSend => "CS",
            ObjectTypeCode::ChannelRecv => "CR",
            ObjectTypeCode::ChannelClose => "CC",
            ObjectTypeCode::MutexLock => "ML",
            ObjectTypeCode::MutexUnlock => "MU",
            ObjectTypeCode::MutexTryLock => "MT",
            ObjectTypeCode::MutexRLock => "MR",
            ObjectTypeCode::MutexRUnlock => "MN",
            ObjectTypeCode::MutexTryRLock => "MY",
            ObjectTypeCode::WaitGroupAdd => "WA",
            ObjectTypeCode::WaitGroupDone => "WD",
            ObjectTypeCode::WaitGroupWait => "WW",
            ObjectTypeCode::CondWait => "DW",
            ObjectTypeCode::CondSignal => "DS",
            ObjectTypeCode::CondBroadcast => "DB",
            ObjectTypeCode::OnceExecuted => "OE",
            ObjectTypeCode::OnceNotExecuted => "ON",
            ObjectTypeCode::Select => "SS",
            ObjectTypeCode::DeadlockCycleMember => "DC",
            ObjectTypeCode::DeadlockStuckMember => "DH",
            ObjectTypeCode::Unknown => "XX",
        }
    }
}
