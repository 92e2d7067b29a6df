//! Identifier newtypes and source positions shared across the analyzer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Routine (goroutine-like logical thread) identifier, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutineId(pub u32);

impl RoutineId {
    /// Zero-based index of this routine in a vector-clock or arena slot
    pub fn index(self) -> usize {
        debug_assert!(self.0 >= 1, "routine ids are 1-based");
        self.0 as usize - 1
    }
}

impl fmt::Display for RoutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Identifier of a concurrency object (channel, mutex, wait group, ...).
///
/// Atomic events use the memory address as the object id. Id 0 is the
/// nil object (an operation on a nil channel carries id 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl ObjectId {
    /// The nil object
    pub const NIL: ObjectId = ObjectId(0);

    /// True for operations recorded against a nil object
    pub fn is_nil(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable trace-wide event identifier: index into the trace arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u32);

impl EventId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Source position of a recorded operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub file: String,
    pub line: u32,
}

impl Position {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// Parse a `file:line` string.
    ///
    /// The file part may itself contain colons (windows drives), so the
    /// split happens at the last colon.
    pub fn parse(s: &str) -> Option<Self> {
        let (file, line) = s.rsplit_once(':')?;
        if file.is_empty() {
            return None;
        }
        let line = line.parse().ok()?;
        Some(Self::new(file, line))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routine_index_is_zero_based() {
        assert_eq!(RoutineId(1).index(), 0);
        assert_eq!(RoutineId(7).index(), 6);
    }

    #[test]
    fn test_position_parse() {
        let pos = Position::parse("pkg/worker.go:42").unwrap();
        assert_eq!(pos.file, "pkg/worker.go");
        assert_eq!(pos.line, 42);
        assert_eq!(pos.to_string(), "pkg/worker.go:42");
    }

    #[test]
    fn test_position_parse_rejects_garbage() {
        assert!(Position::parse("no-colon").is_none());
        assert!(Position::parse(":12").is_none());
        assert!(Position::parse("file.go:notaline").is_none());
    }

    #[test]
    fn test_nil_object() {
        assert!(ObjectId::NIL.is_nil());
        assert!(!ObjectId(3).is_nil());
    }
}
