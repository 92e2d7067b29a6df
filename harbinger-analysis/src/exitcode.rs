//! Exit-code mapping.
//!
//! Bugs that manifested in the recorded run arrive as recorder exit
//! codes and become *actual* reports without any happens-before
//! reasoning. Leak-unstuck codes confirm a previously diagnosed leak
//! and are recorded informationally.

use harbinger_report::{BugKind, Element, ObjectTypeCode, Report, ReportSink, Severity};
use harbinger_trace::{ExitCode, ObjectId, Position, RoutineId};

/// Build the report for a recorder exit code; `None` for a normal exit
pub fn report_for_exit(code: ExitCode, pos: Option<Position>) -> Option<Report> {
    let (kind, severity, type_code) = match code {
        ExitCode::Normal => return None,
        ExitCode::UnknownPanic => (
            BugKind::RuntimeUnknownPanic,
            Severity::Critical,
            ObjectTypeCode::Unknown,
        ),
        ExitCode::ReplayTimeout => (
            BugKind::RuntimeTimeout,
            Severity::Information,
            ObjectTypeCode::Unknown,
        ),
        ExitCode::LeakUnstuckUnbuffered => (
            BugKind::LeakUnbufferedWithout,
            Severity::Information,
            ObjectTypeCode::ChannelSend,
        ),
        ExitCode::LeakUnstuckBuffered => (
            BugKind::LeakBufferedWithout,
            Severity::Information,
            ObjectTypeCode::ChannelSend,
        ),
        ExitCode::LeakUnstuckMutex => (
            BugKind::LeakMutex,
            Severity::Information,
            ObjectTypeCode::MutexLock,
        ),
        ExitCode::LeakUnstuckCond => (
            BugKind::LeakCond,
            Severity::Information,
            ObjectTypeCode::CondWait,
        ),
        ExitCode::LeakUnstuckWaitGroup => (
            BugKind::LeakWaitGroup,
            Severity::Information,
            ObjectTypeCode::WaitGroupWait,
        ),
        ExitCode::SendOnClosed => (
            BugKind::ActualSendOnClosed,
            Severity::Critical,
            ObjectTypeCode::ChannelSend,
        ),
        ExitCode::RecvOnClosed => (
            BugKind::ActualRecvOnClosed,
            Severity::Warning,
            ObjectTypeCode::ChannelRecv,
        ),
        ExitCode::CloseOnClosed => (
            BugKind::ActualCloseOnClosed,
            Severity::Critical,
            ObjectTypeCode::ChannelClose,
        ),
        ExitCode::CloseOnNil => (
            BugKind::ActualCloseOnNilChannel,
            Severity::Critical,
            ObjectTypeCode::ChannelClose,
        ),
        ExitCode::NegativeWaitGroup => (
            BugKind::ActualNegativeWaitGroup,
            Severity::Critical,
            ObjectTypeCode::WaitGroupDone,
        ),
        ExitCode::UnlockOfUnlockedMutex => (
            BugKind::ActualUnlockOfNotLockedMutex,
            Severity::Critical,
            ObjectTypeCode::MutexUnlock,
        ),
        ExitCode::CyclicDeadlock => (
            BugKind::ActualDeadlock,
            Severity::Critical,
            ObjectTypeCode::DeadlockStuckMember,
        ),
    };

    // routine and object are unknown at the recorder boundary
    let primary = pos
        .map(|pos| {
            vec![Element::new(
                RoutineId(0),
                ObjectId::NIL,
                0,
                type_code,
                pos,
            )]
        })
        .unwrap_or_default();

    Some(Report::new(severity, kind, "exit", primary, "", vec![]))
}

/// Map an exit code straight into a sink
pub fn apply_exit_code(
    code: ExitCode,
    pos: Option<Position>,
    sink: &mut impl ReportSink,
) -> bool {
    match report_for_exit(code, pos) {
        Some(report) => sink.submit(report),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbinger_report::ReportCollector;
    use test_case::test_case;

    #[test]
    fn test_close_on_closed_exit() {
        let report = report_for_exit(
            ExitCode::CloseOnClosed,
            Some(Position::new("foo.go", 42)),
        )
        .unwrap();
        assert_eq!(report.kind, BugKind::ActualCloseOnClosed);
        assert_eq!(report.severity, Severity::Critical);
        assert_eq!(report.primary[0].type_code, ObjectTypeCode::ChannelClose);
        assert_eq!(report.primary[0].pos.to_string(), "foo.go:42");
    }

    #[test]
    fn test_normal_exit_is_silent() {
        assert!(report_for_exit(ExitCode::Normal, None).is_none());
    }

    #[test]
    fn test_panic_without_position_has_no_elements() {
        let report = report_for_exit(ExitCode::UnknownPanic, None).unwrap();
        assert!(report.primary.is_empty());
        assert_eq!(report.kind, BugKind::RuntimeUnknownPanic);
    }

    #[test_case(ExitCode::LeakUnstuckUnbuffered, BugKind::LeakUnbufferedWithout)]
    #[test_case(ExitCode::LeakUnstuckBuffered, BugKind::LeakBufferedWithout)]
    #[test_case(ExitCode::LeakUnstuckMutex, BugKind::LeakMutex)]
    #[test_case(ExitCode::LeakUnstuckCond, BugKind::LeakCond)]
    #[test_case(ExitCode::LeakUnstuckWaitGroup, BugKind::LeakWaitGroup)]
    fn test_leak_unstuck_is_informational(code: ExitCode, kind: BugKind) {
        let report = report_for_exit(code, Some(Position::new("a.go", 1))).unwrap();
        assert_eq!(report.severity, Severity::Information);
        assert_eq!(report.kind, kind);
    }

    #[test]
    fn test_apply_goes_through_dedup() {
        let mut sink = ReportCollector::new();
        let pos = Position::new("foo.go", 42);
        assert!(apply_exit_code(
            ExitCode::CloseOnClosed,
            Some(pos.clone()),
            &mut sink
        ));
        assert!(!apply_exit_code(ExitCode::CloseOnClosed, Some(pos), &mut sink));
        assert_eq!(sink.len(), 1);
    }
}
