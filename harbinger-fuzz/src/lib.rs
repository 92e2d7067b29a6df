//! # Harbinger Fuzzing Feedback
//!
//! The analysis driver discovers operations that are concurrent with
//! other operations on the same object: concurrent once winners and
//! losers, concurrent mutex acquires, concurrent sends, concurrent
//! recvs. An external fuzzer uses these facts to pick schedule
//! mutations. This crate is the contract: four append-only lists of
//! [`ConcurrentEntry`] values, one per operation class.

use harbinger_report::Element;
use serde::{Deserialize, Serialize};

/// Operation class of a feedback entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Once,
    Mutex,
    Send,
    Recv,
}

/// One concurrency fact: an operation plus the number of concurrent
/// same-object operations observed for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrentEntry {
    pub element: Element,
    pub counter: u64,
    pub kind: FeedbackKind,
}

/// Collected feedback of one analysis run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FuzzFeedback {
    once: Vec<ConcurrentEntry>,
    mutex: Vec<ConcurrentEntry>,
    send: Vec<ConcurrentEntry>,
    recv: Vec<ConcurrentEntry>,
}

impl FuzzFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one concurrency fact to its class list
    pub fn record(&mut self, kind: FeedbackKind, element: Element, counter: u64) {
        let entry = ConcurrentEntry {
            element,
            counter,
            kind,
        };
        self.list_mut(kind).push(entry);
    }

    pub fn entries(&self, kind: FeedbackKind) -> &[ConcurrentEntry] {
        match kind {
            FeedbackKind::Once => &self.once,
            FeedbackKind::Mutex => &self.mutex,
            FeedbackKind::Send => &self.send,
            FeedbackKind::Recv => &self.recv,
        }
    }

    fn list_mut(&mut self, kind: FeedbackKind) -> &mut Vec<ConcurrentEntry> {
        match kind {
            FeedbackKind::Once => &mut self.once,
            FeedbackKind::Mutex => &mut self.mutex,
            FeedbackKind::Send => &mut self.send,
            FeedbackKind::Recv => &mut self.recv,
        }
    }

    pub fn len(&self) -> usize {
        self.once.len() + self.mutex.len() + self.send.len() + self.recv.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbinger_report::ObjectTypeCode;
    use harbinger_trace::{ObjectId, Position, RoutineId};

    fn element() -> Element {
        Element::new(
            RoutineId(2),
            ObjectId(7),
            12,
            ObjectTypeCode::ChannelRecv,
            Position::new("worker.go", 33),
        )
    }

    #[test]
    fn test_entries_land_in_their_class() {
        let mut feedback = FuzzFeedback::new();
        feedback.record(FeedbackKind::Recv, element(), 1);
        feedback.record(FeedbackKind::Recv, element(), 2);
        feedback.record(FeedbackKind::Mutex, element(), 1);

        assert_eq!(feedback.entries(FeedbackKind::Recv).len(), 2);
        assert_eq!(feedback.entries(FeedbackKind::Mutex).len(), 1);
        assert!(feedback.entries(FeedbackKind::Once).is_empty());
        assert_eq!(feedback.len(), 3);
    }

    #[test]
    fn test_entries_keep_counters() {
        let mut feedback = FuzzFeedback::new();
        feedback.record(FeedbackKind::Send, element(), 4);
        assert_eq!(feedback.entries(FeedbackKind::Send)[0].counter, 4);
    }
}
