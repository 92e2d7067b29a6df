//! Full pipeline: recorder text → trace → analysis → reports.

use anyhow::Result;
use harbinger_analysis::{run, AnalysisOptions};
use harbinger_report::BugKind;
use harbinger_trace::TraceReader;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

/// The recording of a program that sends on a channel another routine
/// closes concurrently
const SEND_CLOSE_RACE: &str = "\
R 1
N;1;2;4;ch;0;main.go:10
G;3;4;2;main.go:12
C;10;12;4;s;1;0;f;1;0;main.go:14
X;30;31;main.go:20
R 2
C;15;16;4;c;0;0;f;1;0;main.go:22
X;17;18;main.go:24
";

/// The recording of two routines blocked against each other on locks
const LOCK_INVERSION: &str = "\
R 1
M;1;2;100;l;t;main.go:10
M;5;0;200;l;t;main.go:11
R 2
M;3;4;200;l;t;main.go:20
M;6;0;100;l;t;main.go:21
";

#[test]
fn test_send_close_race_end_to_end() -> Result<()> {
    init_tracing();
    let trace = TraceReader::read_str(SEND_CLOSE_RACE)?;
    let outcome = run(&trace, AnalysisOptions::default())?;

    let hit = outcome
        .reports
        .iter()
        .find(|r| r.kind == BugKind::PotentialSendOnClosed)
        .expect("send-on-closed diagnosed");
    assert_eq!(hit.primary[0].pos.to_string(), "main.go:14");
    assert_eq!(hit.secondary[0].pos.to_string(), "main.go:22");
    Ok(())
}

#[test]
fn test_lock_inversion_end_to_end() -> Result<()> {
    init_tracing();
    let trace = TraceReader::read_str(LOCK_INVERSION)?;
    let outcome = run(&trace, AnalysisOptions::default())?;

    assert!(outcome
        .reports
        .iter()
        .any(|r| r.kind == BugKind::PotentialCyclicDeadlock));
    Ok(())
}

#[test]
fn test_reports_export_as_json() -> Result<()> {
    init_tracing();
    let trace = TraceReader::read_str(SEND_CLOSE_RACE)?;
    let outcome = run(&trace, AnalysisOptions::default())?;
    let json = serde_json::to_string(&outcome.reports)?;
    assert!(json.contains("potential_send_on_closed"));
    Ok(())
}
