//! Reader for the recorder's line-oriented trace format.
//!
//! The recorder writes one section per routine, headed by `R <id>`,
//! followed by one event record per line. A record is a single-letter
//! prefix and semicolon-separated fields, ending with the source
//! position as `file:line`:
//!
//! ```text
//! R 1
//! N;1;2;4;ch;0;main.go:10
//! C;10;12;4;s;1;0;f;1;0;main.go:14
//! G;13;14;2;main.go:15
//! X;20;21;main.go:30
//! R 2
//! C;15;16;4;c;0;0;f;1;0;main.go:22
//! ```
//!
//! Prefixes: `A` atomic, `C` channel, `M` mutex, `O` once, `W` wait
//! group, `D` cond, `S` select, `N` new-elem, `G` fork, `X` routine
//! end. Blank lines and `#` comments are skipped. Anything else is an
//! error naming the offending line.

use crate::event::{
    AtomicEvent, AtomicOp, ChannelEvent, ChannelOp, CondEvent, CondOp, ElemKind, EventKind,
    ForkEvent, MutexEvent, MutexOp, NewElemEvent, OnceEvent, SelectCase, SelectEvent,
    WaitGroupEvent, WaitGroupOp,
};
use crate::ids::{ObjectId, Position, RoutineId};
use crate::trace::{Trace, TraceBuilder};
use crate::{TraceError, TraceResult};
use std::io::BufRead;
use std::path::Path;

/// Parses recorder output into a [`Trace`]
#[derive(Debug, Default)]
pub struct TraceReader;

impl TraceReader {
    /// Read a trace from any buffered reader
    pub fn read(input: impl BufRead) -> TraceResult<Trace> {
        let mut builder = Trace::builder();
        let mut current: Option<RoutineId> = None;

        for (number, line) in input.lines().enumerate() {
            let number = number + 1;
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix("R ") {
                let id: u64 = rest.trim().parse().map_err(|_| TraceError::MalformedRecord {
                    line: number,
                    reason: format!("invalid routine header '{line}'"),
                })?;
                if id == 0 || id > u32::MAX as u64 {
                    return Err(TraceError::InvalidRoutine { id });
                }
                current = Some(RoutineId(id as u32));
                continue;
            }

            let routine = current.ok_or(TraceError::MissingRoutineHeader { line: number })?;
            parse_record(line, number, routine, &mut builder)?;
        }

        let trace = builder.finish()?;
        tracing::debug!(
            events = trace.len(),
            routines = trace.routine_count(),
            "trace read"
        );
        Ok(trace)
    }

    /// Read a trace file from disk
    pub fn read_path(path: impl AsRef<Path>) -> TraceResult<Trace> {
        let file = std::fs::File::open(path)?;
        Self::read(std::io::BufReader::new(file))
    }

    /// Read a trace from an in-memory string
    pub fn read_str(input: &str) -> TraceResult<Trace> {
        Self::read(input.as_bytes())
    }
}

fn parse_record(
    line: &str,
    number: usize,
    routine: RoutineId,
    builder: &mut TraceBuilder,
) -> TraceResult<()> {
    let mut fields = Fields::new(line, number);
    let prefix = fields.next("prefix")?;

    let mut f = |fields: &mut Fields| -> TraceResult<(u64, u64)> {
        Ok((fields.next_u64("t_pre")?, fields.next_u64("t_post")?))
    };

    let (t_pre, t_post, kind) = match prefix {
        "A" => {
            let (pre, post) = f(&mut fields)?;
            let id = ObjectId(fields.next_u64("id")?);
            let op = parse_atomic_op(fields.next("op")?, number)?;
            (pre, post, EventKind::Atomic(AtomicEvent { id, op }))
        }
        "C" => {
            let (pre, post) = f(&mut fields)?;
            let id = ObjectId(fields.next_u64("id")?);
            let op = parse_channel_op(fields.next("op")?, number)?;
            let op_id = fields.next_u64("op_id")?;
            let q_size = fields.next_u64("q_size")?;
            let closed = fields.next_bool("closed")?;
            let number_send = fields.next_u64("number_send")?;
            let number_recv = fields.next_u64("number_recv")?;
            (
                pre,
                post,
                EventKind::Channel(ChannelEvent {
                    id,
                    op,
                    op_id,
                    q_size,
                    closed,
                    partner: None,
                    number_send,
                    number_recv,
                }),
            )
        }
        "M" => {
            let (pre, post) = f(&mut fields)?;
            let id = ObjectId(fields.next_u64("id")?);
            let op = parse_mutex_op(fields.next("op")?, number)?;
            let success = fields.next_bool("success")?;
            (pre, post, EventKind::Mutex(MutexEvent { id, op, success }))
        }
        "O" => {
            let (pre, post) = f(&mut fields)?;
            let id = ObjectId(fields.next_u64("id")?);
            let success = fields.next_bool("success")?;
            (pre, post, EventKind::Once(OnceEvent { id, success }))
        }
        "W" => {
            let (pre, post) = f(&mut fields)?;
            let id = ObjectId(fields.next_u64("id")?);
            let op = match fields.next("op")? {
                "c" => WaitGroupOp::Change,
                "w" => WaitGroupOp::Wait,
                other => return Err(fields.bad(format!("wait-group op '{other}'"))),
            };
            let delta = fields.next_i64("delta")?;
            let counter = fields.next_i64("counter")?;
            (
                pre,
                post,
                EventKind::WaitGroup(WaitGroupEvent {
                    id,
                    op,
                    delta,
                    counter,
                }),
            )
        }
        "D" => {
            let (pre, post) = f(&mut fields)?;
            let id = ObjectId(fields.next_u64("id")?);
            let op = match fields.next("op")? {
                "w" => CondOp::Wait,
                "s" => CondOp::Signal,
                "b" => CondOp::Broadcast,
                other => return Err(fields.bad(format!("cond op '{other}'"))),
            };
            (pre, post, EventKind::Cond(CondEvent { id, op }))
        }
        "S" => {
            let (pre, post) = f(&mut fields)?;
            let id = ObjectId(fields.next_u64("id")?);
            let cases = parse_cases(fields.next("cases")?, number)?;
            let chosen_index = fields.next_i64("chosen")? as i32;
            let has_default = fields.next_bool("default")?;
            (
                pre,
                post,
                EventKind::Select(SelectEvent {
                    id,
                    cases,
                    chosen_index,
                    has_default,
                }),
            )
        }
        "N" => {
            let (pre, post) = f(&mut fields)?;
            let id = ObjectId(fields.next_u64("id")?);
            let kind = parse_elem_kind(fields.next("kind")?, number)?;
            let param = fields.next_u64("param")?;
            (pre, post, EventKind::NewElem(NewElemEvent { id, kind, param }))
        }
        "G" => {
            let (pre, post) = f(&mut fields)?;
            let child = fields.next_u64("child")?;
            if child == 0 || child > u32::MAX as u64 {
                return Err(TraceError::InvalidRoutine { id: child });
            }
            (
                pre,
                post,
                EventKind::Fork(ForkEvent {
                    child: RoutineId(child as u32),
                }),
            )
        }
        "X" => {
            let (pre, post) = f(&mut fields)?;
            (pre, post, EventKind::RoutineEnd)
        }
        other => {
            return Err(TraceError::UnknownPrefix {
                prefix: other.to_string(),
                line: number,
            })
        }
    };

    let pos = fields.finish_pos()?;
    builder.push(routine, t_pre, t_post, pos, kind);
    Ok(())
}

fn parse_channel_op(token: &str, line: usize) -> TraceResult<ChannelOp> {
    match token {
        "s" => Ok(ChannelOp::Send),
        "r" => Ok(ChannelOp::Recv),
        "c" => Ok(ChannelOp::Close),
        other => Err(TraceError::MalformedRecord {
            line,
            reason: format!("channel op '{other}'"),
        }),
    }
}

fn parse_mutex_op(token: &str, line: usize) -> TraceResult<MutexOp> {
    match token {
        "l" => Ok(MutexOp::Lock),
        "u" => Ok(MutexOp::Unlock),
        "t" => Ok(MutexOp::TryLock),
        "r" => Ok(MutexOp::RLock),
        "n" => Ok(MutexOp::RUnlock),
        "y" => Ok(MutexOp::TryRLock),
        other => Err(TraceError::MalformedRecord {
            line,
            reason: format!("mutex op '{other}'"),
        }),
    }
}

fn parse_atomic_op(token: &str, line: usize) -> TraceResult<AtomicOp> {
    match token {
        "load" => Ok(AtomicOp::Load),
        "store" => Ok(AtomicOp::Store),
        "add" => Ok(AtomicOp::Add),
        "swap" => Ok(AtomicOp::Swap),
        "compswap" => Ok(AtomicOp::CompSwap),
        "and" => Ok(AtomicOp::And),
        "or" => Ok(AtomicOp::Or),
        other => Err(TraceError::MalformedRecord {
            line,
            reason: format!("atomic op '{other}'"),
        }),
    }
}

fn parse_elem_kind(token: &str, line: usize) -> TraceResult<ElemKind> {
    match token {
        "ch" => Ok(ElemKind::Channel),
        "mu" => Ok(ElemKind::Mutex),
        "rw" => Ok(ElemKind::RwMutex),
        "wg" => Ok(ElemKind::WaitGroup),
        "co" => Ok(ElemKind::Cond),
        "on" => Ok(ElemKind::Once),
        "at" => Ok(ElemKind::Atomic),
        other => Err(TraceError::MalformedRecord {
            line,
            reason: format!("element kind '{other}'"),
        }),
    }
}

/// Cases are dot-separated `chan,op,q_size,op_id` tuples; `-` means an
/// empty case list (select with only a default case).
fn parse_cases(token: &str, line: usize) -> TraceResult<Vec<SelectCase>> {
    if token == "-" {
        return Ok(Vec::new());
    }
    let mut cases = Vec::new();
    for part in token.split('.') {
        let mut items = part.split(',');
        let bad = |reason: String| TraceError::MalformedRecord { line, reason };
        let channel = items
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| bad(format!("select case '{part}'")))?;
        let op = parse_channel_op(
            items.next().ok_or_else(|| bad(format!("select case '{part}'")))?,
            line,
        )?;
        if op == ChannelOp::Close {
            return Err(bad("select case with close op".into()));
        }
        let q_size = items
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| bad(format!("select case '{part}'")))?;
        let op_id = items
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| bad(format!("select case '{part}'")))?;
        if items.next().is_some() {
            return Err(bad(format!("select case '{part}' has extra fields")));
        }
        cases.push(SelectCase {
            channel: ObjectId(channel),
            op,
            q_size,
            op_id,
            partner: None,
        });
    }
    Ok(cases)
}

/// Cursor over the semicolon-separated fields of one record
struct Fields<'a> {
    parts: std::str::Split<'a, char>,
    line: usize,
}

impl<'a> Fields<'a> {
    fn new(line: &'a str, number: usize) -> Self {
        Self {
            parts: line.split(';'),
            line: number,
        }
    }

    fn bad(&self, reason: String) -> TraceError {
        TraceError::MalformedRecord {
            line: self.line,
            reason,
        }
    }

    fn next(&mut self, what: &str) -> TraceResult<&'a str> {
        self.parts
            .next()
            .ok_or_else(|| self.bad(format!("missing field '{what}'")))
    }

    fn next_u64(&mut self, what: &str) -> TraceResult<u64> {
        let raw = self.next(what)?;
        raw.parse()
            .map_err(|_| self.bad(format!("field '{what}' is not an integer: '{raw}'")))
    }

    fn next_i64(&mut self, what: &str) -> TraceResult<i64> {
        let raw = self.next(what)?;
        raw.parse()
            .map_err(|_| self.bad(format!("field '{what}' is not an integer: '{raw}'")))
    }

    fn next_bool(&mut self, what: &str) -> TraceResult<bool> {
        match self.next(what)? {
            "t" => Ok(true),
            "f" => Ok(false),
            other => Err(self.bad(format!("field '{what}' is not t/f: '{other}'"))),
        }
    }

    /// The final field must be the `file:line` position
    fn finish_pos(&mut self) -> TraceResult<Position> {
        let raw = self.next("position")?;
        if self.parts.next().is_some() {
            return Err(self.bad("record has extra fields".into()));
        }
        Position::parse(raw).ok_or_else(|| self.bad(format!("invalid position '{raw}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    const SAMPLE: &str = "\
# two routines, one unbuffered pairing
R 1
N;1;2;4;ch;0;main.go:10
C;10;12;4;s;1;0;f;1;0;main.go:14
G;13;14;2;main.go:15
X;30;31;main.go:30
R 2
C;10;13;4;r;1;0;f;1;0;main.go:22
";

    #[test]
    fn test_reads_sections_and_events() {
        let trace = TraceReader::read_str(SAMPLE).unwrap();
        assert_eq!(trace.routine(RoutineId(1)).len(), 4);
        assert_eq!(trace.routine(RoutineId(2)).len(), 1);
        assert_eq!(trace.routine_count(), 2);
    }

    #[test]
    fn test_links_partners_while_reading() {
        let trace = TraceReader::read_str(SAMPLE).unwrap();
        let send = trace.routine(RoutineId(1))[1];
        match &trace[send].kind {
            EventKind::Channel(ch) => assert!(ch.partner.is_some()),
            _ => panic!("expected channel send"),
        }
    }

    #[test]
    fn test_event_before_header_is_rejected() {
        let err = TraceReader::read_str("X;1;2;main.go:1\n").unwrap_err();
        assert!(matches!(err, TraceError::MissingRoutineHeader { line: 1 }));
    }

    #[test]
    fn test_unknown_prefix_is_rejected() {
        let err = TraceReader::read_str("R 1\nQ;1;2;main.go:1\n").unwrap_err();
        assert!(matches!(err, TraceError::UnknownPrefix { line: 2, .. }));
    }

    #[test]
    fn test_malformed_number_names_field() {
        let err = TraceReader::read_str("R 1\nM;1;x;3;l;t;main.go:1\n").unwrap_err();
        match err {
            TraceError::MalformedRecord { line, reason } => {
                assert_eq!(line, 2);
                assert!(reason.contains("t_post"), "reason: {reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_select_record() {
        let input = "R 1\nS;5;6;9;4,r,0,1.7,s,2,0;0;f;main.go:40\n";
        let trace = TraceReader::read_str(input).unwrap();
        let id = trace.routine(RoutineId(1))[0];
        match &trace[id].kind {
            EventKind::Select(sel) => {
                assert_eq!(sel.cases.len(), 2);
                assert_eq!(sel.cases[0].channel, ObjectId(4));
                assert_eq!(sel.cases[1].op, ChannelOp::Send);
                assert_eq!(sel.chosen_index, 0);
                assert!(!sel.has_default);
            }
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn test_select_default_only() {
        let input = "R 1\nS;5;6;9;-;-1;t;main.go:40\n";
        let trace = TraceReader::read_str(input).unwrap();
        let id = trace.routine(RoutineId(1))[0];
        match &trace[id].kind {
            EventKind::Select(sel) => {
                assert!(sel.cases.is_empty());
                assert_eq!(sel.chosen_index, -1);
                assert!(sel.has_default);
            }
            _ => panic!("expected select"),
        }
    }
}
