//! Per-session state: dialogue, PIG, version history, last committed
//! model, and a single-flight guard scoped to this session alone (never
//! a process-wide flag — see design notes on the busy guard).

use std::sync::atomic::{AtomicBool, Ordering};

use crate::dialogue::Dialogue;
use crate::pig::{Pig, VersionHistory};
use crate::types::{BoundingBox, ExecutionResult};

pub struct Session {
    pub id: String,
    pub dialogue: Dialogue,
    pub pig: Pig,
    pub history: VersionHistory,
    pub last_script: Option<String>,
    pub committed_bbox: Option<BoundingBox>,
    pub committed_volume: Option<f64>,
    busy: AtomicBool,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            dialogue: Dialogue::new(id.clone()),
            id,
            pig: Pig::new(),
            history: VersionHistory::new(),
            last_script: None,
            committed_bbox: None,
            committed_volume: None,
            busy: AtomicBool::new(false),
        }
    }

    /// Acquire the per-session turn guard. Returns `false` if a turn is
    /// already in flight for this session; other sessions are
    /// unaffected.
    pub fn try_begin_turn(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_turn(&self) {
        self.busy.store(false, Ordering::Release);
    }

    pub fn commit_execution(&mut self, result: &ExecutionResult) {
        self.committed_bbox = result.bbox;
        self.committed_volume = result.volume;
        self.last_script = Some(result.script.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_guard_is_exclusive_within_a_session() {
        let session = Session::new("s1");
        assert!(session.try_begin_turn());
        assert!(!session.try_begin_turn());
        session.end_turn();
        assert!(session.try_begin_turn());
    }
}
