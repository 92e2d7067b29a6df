//! Reading recorder output from disk.

use harbinger_trace::{ChannelOp, EventKind, RoutineId, TraceError, TraceReader};
use std::io::Write;

const RECORDING: &str = "\
# recorded by the tracer, two workers and a coordinator
R 1
N;1;2;4;ch;1;main.go:10
G;3;4;2;main.go:12
G;5;6;3;main.go:13
C;20;21;4;c;0;1;f;2;2;main.go:30
X;25;26;main.go:40

R 2
C;7;9;4;s;1;1;f;1;0;worker.go:8
X;10;11;worker.go:12

R 3
C;8;12;4;s;2;1;f;2;0;worker.go:8
X;13;14;worker.go:12
";

#[test]
fn test_read_path_round_trip() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(RECORDING.as_bytes()).unwrap();

    let trace = TraceReader::read_path(file.path()).unwrap();
    assert_eq!(trace.routine_count(), 3);
    assert_eq!(trace.routine(RoutineId(1)).len(), 5);
    assert_eq!(trace.routine(RoutineId(2)).len(), 2);
    assert_eq!(trace.routine(RoutineId(3)).len(), 2);

    // total order interleaves the three routines by t_pre
    let routines: Vec<u32> = trace.ordered().map(|id| trace[id].routine.0).collect();
    assert_eq!(routines, vec![1, 1, 1, 2, 3, 2, 3, 1, 1]);
}

#[test]
fn test_missing_file_is_an_io_error() {
    let err = TraceReader::read_path("/definitely/not/here.log").unwrap_err();
    assert!(matches!(err, TraceError::Io(_)));
}

#[test]
fn test_trace_serializes() {
    let trace = TraceReader::read_str(RECORDING).unwrap();
    let json = serde_json::to_string(&trace).unwrap();
    let back: harbinger_trace::Trace = serde_json::from_str(&json).unwrap();
    assert_eq!(back.len(), trace.len());
    assert_eq!(back.routine_count(), trace.routine_count());
}

#[test]
fn test_buffered_sends_do_not_pair() {
    let trace = TraceReader::read_str(RECORDING).unwrap();
    for ev in trace.events() {
        if let EventKind::Channel(ch) = &ev.kind {
            if ch.op != ChannelOp::Close {
                assert!(ch.partner.is_none(), "buffered ops never pair");
            }
        }
    }
}
