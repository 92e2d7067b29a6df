//! # Harbinger Reports
//!
//! The result contract of the analyzer. Every diagnosed bug is one
//! [`Report`]: a severity, a bug kind, and two labeled argument
//! lists of [`Element`]s pointing at recorded operations. Reports are
//! fed one at a time into the [`ReportCollector`], which deduplicates
//! by kind and argument positions and optionally drops warnings.
//!
//! Diagnostics about the analyzed program always flow through this
//! crate; they are never error values of the analyzer itself.

pub mod collector;
pub mod kinds;

pub use collector::{ReportCollector, ReportSink};
pub use kinds::{BugKind, ObjectTypeCode, Severity};

use harbinger_trace::{ObjectId, Position, RoutineId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One argument of a report: a recorded operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub routine: RoutineId,
    pub object: ObjectId,
    pub t_pre: u64,
    pub type_code: ObjectTypeCode,
    pub pos: Position,
}

impl Element {
    pub fn new(
        routine: RoutineId,
        object: ObjectId,
        t_pre: u64,
        type_code: ObjectTypeCode,
        pos: Position,
    ) -> Self {
        Self {
            routine,
            object,
            t_pre,
            type_code,
            pos,
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{}",
            self.type_code.code(),
            self.pos,
            self.routine
        )
    }
}

/// A diagnosed bug
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub severity: Severity,
    pub kind: BugKind,
    pub primary_label: String,
    pub primary: Vec<Element>,
    pub secondary_label: String,
    pub secondary: Vec<Element>,
}

impl Report {
    pub fn new(
        severity: Severity,
        kind: BugKind,
        primary_label: &str,
        primary: Vec<Element>,
        secondary_label: &str,
        secondary: Vec<Element>,
    ) -> Self {
        Self {
            severity,
            kind,
            primary_label: primary_label.to_string(),
            primary,
            secondary_label: secondary_label.to_string(),
            secondary,
        }
    }

    /// Machine-short dedup key: the kind plus the type codes and
    /// positions of both argument lists
    pub fn dedup_key(&self) -> String {
        let mut key = String::from(self.kind.code());
        for el in &self.primary {
            key.push('|');
            key.push_str(el.type_code.code());
            key.push('@');
            key.push_str(&el.pos.to_string());
        }
        key.push_str("||");
        for el in &self.secondary {
            key.push('|');
            key.push_str(el.type_code.code());
            key.push('@');
            key.push_str(&el.pos.to_string());
        }
        key
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}:", self.severity, self.kind.code())?;
        write!(f, " {}:", self.primary_label)?;
        for el in &self.primary {
            write!(f, " {el}")?;
        }
        if !self.secondary.is_empty() {
            write!(f, "; {}:", self.secondary_label)?;
            for el in &self.secondary {
                write!(f, " {el}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(line: u32, code: ObjectTypeCode) -> Element {
        Element::new(
            RoutineId(1),
            ObjectId(4),
            10,
            code,
            Position::new("main.go", line),
        )
    }

    #[test]
    fn test_dedup_key_covers_kind_and_positions() {
        let a = Report::new(
            Severity::Critical,
            BugKind::PotentialSendOnClosed,
            "send",
            vec![element(14, ObjectTypeCode::ChannelSend)],
            "close",
            vec![element(22, ObjectTypeCode::ChannelClose)],
        );
        let mut b = a.clone();
        assert_eq!(a.dedup_key(), b.dedup_key());

        b.primary[0].pos.line = 15;
        assert_ne!(a.dedup_key(), b.dedup_key());

        let mut c = a.clone();
        c.kind = BugKind::PotentialRecvOnClosed;
        assert_ne!(a.dedup_key(), c.dedup_key());
    }

    #[test]
    fn test_dedup_key_separates_argument_lists() {
        let one = Report::new(
            Severity::Warning,
            BugKind::LeakUnbufferedWithout,
            "stuck",
            vec![element(1, ObjectTypeCode::ChannelSend)],
            "",
            vec![],
        );
        let other = Report::new(
            Severity::Warning,
            BugKind::LeakUnbufferedWithout,
            "stuck",
            vec![],
            "",
            vec![element(1, ObjectTypeCode::ChannelSend)],
        );
        assert_ne!(one.dedup_key(), other.dedup_key());
    }

    #[test]
    fn test_display_is_compact() {
        let report = Report::new(
            Severity::Critical,
            BugKind::PotentialSendOnClosed,
            "send",
            vec![element(14, ObjectTypeCode::ChannelSend)],
            "close",
            vec![element(22, ObjectTypeCode::ChannelClose)],
        );
        let shown = report.to_string();
        assert!(shown.contains("PSendOnClosed"));
        assert!(shown.contains("CS@main.go:14"));
        assert!(shown.contains("CC@main.go:22"));
    }
}
