//! Run configuration.

use serde::{Deserialize, Serialize};

/// Which bug analyses a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct AnalysisSelection {
    pub send_on_closed: bool,
    pub recv_on_closed: bool,
    pub close_on_closed: bool,
    pub done_before_add: bool,
    pub concurrent_recv: bool,
    pub leak: bool,
    pub unlock_before_lock: bool,
    pub resource_deadlock: bool,
    /// Mutex-and-channel cycles; off by default, see `with_mixed_deadlock`
    pub mixed_deadlock: bool,
}

impl AnalysisSelection {
    /// Every analysis, including mixed deadlock
    pub fn all() -> Self {
        Self {
            send_on_closed: true,
            recv_on_closed: true,
            close_on_closed: true,
            done_before_add: true,
            concurrent_recv: true,
            leak: true,
            unlock_before_lock: true,
            resource_deadlock: true,
            mixed_deadlock: true,
        }
    }

    /// No analysis; the run only derives HB state
    pub fn none() -> Self {
        Self {
            send_on_closed: false,
            recv_on_closed: false,
            close_on_closed: false,
            done_before_add: false,
            concurrent_recv: false,
            leak: false,
            unlock_before_lock: false,
            resource_deadlock: false,
            mixed_deadlock: false,
        }
    }
}

impl Default for AnalysisSelection {
    /// Everything except mixed deadlock
    fn default() -> Self {
        Self {
            mixed_deadlock: false,
            ..Self::all()
        }
    }
}

/// Options of one analysis run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct AnalysisOptions {
    /// Order buffered sends (and recvs) on a channel totally
    pub assume_fifo_channels: bool,
    /// Drop mutex release→acquire ordering from the HB relation,
    /// yielding more candidate concurrent events
    pub ignore_critical_sections: bool,
    pub analyses: AnalysisSelection,
    /// Emit concurrency facts for an external fuzzer
    pub fuzzing: bool,
    /// Drop warning-class reports entirely
    pub suppress_warnings: bool,
}

impl AnalysisOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fifo_channels(mut self, fifo: bool) -> Self {
        self.assume_fifo_channels = fifo;
        self
    }

    pub fn with_ignored_critical_sections(mut self, ignore: bool) -> Self {
        self.ignore_critical_sections = ignore;
        self
    }

    pub fn with_analyses(mut self, analyses: AnalysisSelection) -> Self {
        self.analyses = analyses;
        self
    }

    pub fn with_fuzzing(mut self, fuzzing: bool) -> Self {
        self.fuzzing = fuzzing;
        self
    }

    pub fn with_suppressed_warnings(mut self, suppress: bool) -> Self {
        self.suppress_warnings = suppress;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_enables_core_analyses() {
        let selection = AnalysisSelection::default();
        assert!(selection.leak);
        assert!(selection.resource_deadlock);
        assert!(!selection.mixed_deadlock);
    }

    #[test]
    fn test_builder_chain() {
        let opts = AnalysisOptions::new()
            .with_fifo_channels(true)
            .with_fuzzing(true)
            .with_analyses(AnalysisSelection::none());
        assert!(opts.assume_fifo_channels);
        assert!(opts.fuzzing);
        assert!(!opts.analyses.leak);
        assert!(!opts.ignore_critical_sections);
    }

    #[test]
    fn test_options_round_trip_serde() {
        let opts = AnalysisOptions::new().with_ignored_critical_sections(true);
        let json = serde_json::to_string(&opts).unwrap();
        let back: AnalysisOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, opts);
    }
}
