//! Best-effort verdict persistence.

use parking_lot::Mutex;
use warden_contracts::Verdict;

/// Receives every emitted verdict for audit or analytics.
///
/// Contract: `record` must not block and must not panic; it runs on the
/// verdict path after the decision is already made, and a slow or broken
/// sink must never delay or fail a request. Implementations that talk to
/// storage should enqueue internally and flush elsewhere.
pub trait VerdictSink: Send + Sync {
    fn record(&self, verdict: &Verdict);
}

/// In-memory sink for tests and the CLI.
#[derive(Default)]
pub struct MemorySink {
    verdicts: Mutex<Vec<Verdict>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Verdict> {
        self.verdicts.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.verdicts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VerdictSink for MemorySink {
    fn record(&self, verdict: &Verdict) {
        self.verdicts.lock().push(verdict.clone());
    }
}
